//! Supervises server launch sequencing.

use std::sync::Arc;
use std::thread;

use tracing::{error, info};

use crate::bootstrap::{ConfigLoader, SystemConfigLoader};
use crate::launcher::{ConnectionLauncher, ServerSettings, StopHandle};
use crate::objects::Services;
use crate::reporter::{ServerReporter, StructuredReporter};
use crate::telemetry;

use super::PROCESS_TARGET;
use super::daemonizer::{Daemonizer, SystemDaemonizer};
use super::errors::LaunchError;
use super::guard::PidFileGuard;
use super::shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

/// Process-level collaborators needed to control the server lifecycle.
pub(crate) struct ProcessControl<D, S> {
    pub(crate) daemonizer: D,
    pub(crate) shutdown: S,
}

/// Collaborators required to launch the server.
pub(crate) struct LaunchPlan<L, D, S> {
    pub(crate) loader: L,
    pub(crate) process: ProcessControl<D, S>,
    pub(crate) services: Services,
    pub(crate) reporter: Arc<dyn ServerReporter>,
}

/// Loads configuration and serves `services` until a termination signal
/// arrives, using the production collaborators.
///
/// # Errors
///
/// Returns an error when configuration, telemetry, daemonisation, the PID
/// file or the launcher fails.
pub fn run_daemon(services: Services) -> Result<(), LaunchError> {
    run_daemon_with(LaunchPlan {
        loader: SystemConfigLoader,
        process: ProcessControl {
            daemonizer: SystemDaemonizer::new(),
            shutdown: SystemShutdownSignal::new(),
        },
        services,
        reporter: Arc::new(StructuredReporter::new()),
    })
}

/// Runs the server with injected collaborators.
pub(crate) fn run_daemon_with<L, D, S>(plan: LaunchPlan<L, D, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    D: Daemonizer,
    S: ShutdownSignal + 'static,
{
    let LaunchPlan {
        loader,
        process,
        services,
        reporter,
    } = plan;
    let ProcessControl {
        daemonizer,
        shutdown,
    } = process;

    let config = loader.load()?;
    telemetry::initialise(config.log_filter(), config.log_format())?;
    info!(
        target: PROCESS_TARGET,
        port = config.port(),
        launch = %config.launch(),
        daemonize = config.daemonize(),
        "starting server"
    );
    let settings = ServerSettings::from_config(&config)?;
    let mut pid_file = config.pid_file().map(PidFileGuard::acquire).transpose()?;
    if config.daemonize() {
        daemonizer.daemonize()?;
    }
    if let Some(guard) = pid_file.as_mut() {
        guard.write_pid(std::process::id())?;
    }

    let stop = StopHandle::new();
    watch_shutdown(shutdown, stop.clone())?;
    run_server(&settings, services, &stop, reporter)?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}

/// Binds `settings` and serves `services` on the calling thread until
/// `stop` is signalled.
///
/// # Errors
///
/// Returns an error when the launcher cannot be bound or started.
pub fn run_server(
    settings: &ServerSettings,
    services: Services,
    stop: &StopHandle,
    reporter: Arc<dyn ServerReporter>,
) -> Result<(), LaunchError> {
    let launcher = ConnectionLauncher::from_settings(settings, services, reporter)?;
    launcher.run(stop)?;
    Ok(())
}

fn watch_shutdown<S>(signal: S, stop: StopHandle) -> Result<(), LaunchError>
where
    S: ShutdownSignal + 'static,
{
    thread::Builder::new()
        .name("easycluster-signals".to_owned())
        .spawn(move || {
            if let Err(failure) = signal.wait() {
                error!(
                    target: PROCESS_TARGET,
                    error = %failure,
                    "shutdown listener failed; stopping"
                );
            }
            stop.stop();
        })
        .map_err(|source| ShutdownError::Install { source })?;
    Ok(())
}
