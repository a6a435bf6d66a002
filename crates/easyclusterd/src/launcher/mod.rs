//! Listening socket, accept loop and per-connection workers.
//!
//! The launcher owns the listening socket. Each accepted peer is checked
//! against the allow-list and then handed to a [`ConnectionWorker`], which
//! serves it in a forked child, a spawned child process or a thread
//! depending on the configured launch strategy.

mod bind;
mod errors;
#[cfg(unix)]
mod fork;
mod listener;
mod settings;
#[cfg(windows)]
mod spawn;
mod stop;
mod worker;

pub use self::errors::LauncherError;
#[cfg(unix)]
pub use self::fork::ForkWorker;
pub use self::listener::{ConnectionLauncher, LauncherHandle};
pub use self::settings::ServerSettings;
#[cfg(windows)]
pub use self::spawn::{RUNNER_ARG, RunnerError, SpawnWorker, run_connection_runner};
pub use self::stop::StopHandle;
pub use self::worker::{AcceptedConnection, ConnectionJob, ConnectionWorker, ThreadWorker, worker_for};

const LAUNCHER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::launcher");
