//! Strategies for serving an accepted connection.

use std::fmt;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use easycluster_config::{LaunchStrategy, SharedSecret};
use tracing::{debug, error};

use super::{LAUNCHER_TARGET, LauncherError, ServerSettings};
use crate::objects::Services;
use crate::reporter::ServerReporter;
use crate::server::{ConnectionStream, ServerError, serve_connection};

/// A peer that passed the allow-list.
#[derive(Debug)]
pub struct AcceptedConnection {
    /// Blocking stream to the peer.
    pub stream: TcpStream,
    /// Peer address.
    pub peer: SocketAddr,
}

/// Everything a worker needs to serve one connection.
#[derive(Clone)]
pub struct ConnectionJob {
    services: Services,
    secret: Option<SharedSecret>,
    reporter: Arc<dyn ServerReporter>,
}

impl ConnectionJob {
    /// Job serving `services`, authenticating with `secret` when set.
    pub fn new(
        services: Services,
        secret: Option<SharedSecret>,
        reporter: Arc<dyn ServerReporter>,
    ) -> Self {
        Self {
            services,
            secret,
            reporter,
        }
    }

    /// Serves `stream` to completion.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the connection.
    pub fn serve(&self, stream: ConnectionStream) -> Result<(), ServerError> {
        serve_connection(
            stream,
            self.secret.clone(),
            &self.services,
            Arc::clone(&self.reporter),
        )
    }

    /// Services handed to every connection.
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Shared secret, if any.
    pub fn secret(&self) -> Option<&SharedSecret> {
        self.secret.as_ref()
    }
}

impl fmt::Debug for ConnectionJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionJob")
            .field("services", &self.services)
            .field("keyed", &self.secret.is_some())
            .finish_non_exhaustive()
    }
}

/// Hands accepted connections to whatever serves them.
pub trait ConnectionWorker: Send {
    /// Starts serving `connection`. The launcher's copy of the stream is
    /// closed once this returns. `listener` is the launcher's socket, which
    /// process-based workers must not leak into children.
    ///
    /// # Errors
    ///
    /// Returns an error when the worker cannot be started.
    fn launch(
        &self,
        connection: AcceptedConnection,
        listener: &TcpListener,
    ) -> Result<(), LauncherError>;

    /// Collects finished workers. Called whenever the accept loop is idle.
    fn reap(&self) {}
}

impl<T: ConnectionWorker + Sync> ConnectionWorker for Arc<T> {
    fn launch(
        &self,
        connection: AcceptedConnection,
        listener: &TcpListener,
    ) -> Result<(), LauncherError> {
        (**self).launch(connection, listener)
    }

    fn reap(&self) {
        (**self).reap();
    }
}

/// Serves each connection on its own thread, isolating panics.
#[derive(Debug)]
pub struct ThreadWorker {
    job: ConnectionJob,
    running: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadWorker {
    /// Worker running `job` for every connection.
    pub fn new(job: ConnectionJob) -> Self {
        Self {
            job,
            running: Mutex::new(Vec::new()),
        }
    }

    /// Number of connection threads not yet reaped.
    pub fn running(&self) -> usize {
        self.running.lock().map_or(0, |running| running.len())
    }
}

impl ConnectionWorker for ThreadWorker {
    fn launch(
        &self,
        connection: AcceptedConnection,
        _listener: &TcpListener,
    ) -> Result<(), LauncherError> {
        let job = self.job.clone();
        let AcceptedConnection { stream, peer } = connection;
        let handle = thread::Builder::new()
            .name(format!("easycluster-conn-{peer}"))
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.serve(stream.into())));
                debug!(target: LAUNCHER_TARGET, peer = %peer, "connection thread finished");
                if outcome.is_err() {
                    error!(target: LAUNCHER_TARGET, peer = %peer, "connection thread panicked");
                }
            })
            .map_err(LauncherError::worker(LaunchStrategy::Thread))?;
        if let Ok(mut running) = self.running.lock() {
            running.push(handle);
        }
        Ok(())
    }

    fn reap(&self) {
        let Ok(mut running) = self.running.lock() else {
            return;
        };
        let (finished, live): (Vec<_>, Vec<_>) =
            running.drain(..).partition(JoinHandle::is_finished);
        *running = live;
        for handle in finished {
            // Panics were caught inside the thread.
            let _ = handle.join();
        }
    }
}

/// Worker implementing the configured launch strategy.
///
/// # Errors
///
/// Returns [`LauncherError::UnsupportedStrategy`] when the strategy cannot
/// run on this platform.
pub fn worker_for(
    settings: &ServerSettings,
    job: ConnectionJob,
) -> Result<Box<dyn ConnectionWorker>, LauncherError> {
    match settings.launch {
        LaunchStrategy::Thread => Ok(Box::new(ThreadWorker::new(job))),
        #[cfg(unix)]
        LaunchStrategy::Fork => Ok(Box::new(super::ForkWorker::new(job))),
        #[cfg(windows)]
        LaunchStrategy::Spawn => Ok(Box::new(super::SpawnWorker::new(
            job,
            settings.log_filter.clone(),
            settings.log_format,
        ))),
        strategy => Err(LauncherError::UnsupportedStrategy { strategy }),
    }
}
