//! Implements the daemonisation backend for the `easyclusterd` process.

use thiserror::Error;

/// Abstraction over daemonisation strategies.
pub trait Daemonizer: Send + Sync {
    /// Detaches the process into the background.
    fn daemonize(&self) -> Result<(), DaemonizeError>;
}

/// Errors surfaced by the daemonisation backend.
#[derive(Debug, Error)]
pub enum DaemonizeError {
    /// System-level daemonisation failed.
    #[cfg(unix)]
    #[error("{0}")]
    System(#[from] daemonize_me::DaemonError),
    /// The platform has no notion of detaching from a terminal.
    #[error("daemonising is not supported on this platform")]
    Unsupported,
}

/// Daemoniser that delegates to `daemonize-me`.
#[derive(Debug, Default)]
pub struct SystemDaemonizer;

impl SystemDaemonizer {
    /// Builds a new system daemoniser.
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl Daemonizer for SystemDaemonizer {
    fn daemonize(&self) -> Result<(), DaemonizeError> {
        use std::ffi::OsStr;
        use std::path::Path;

        use daemonize_me::Daemon;
        use tracing::info;

        use super::PROCESS_TARGET;

        info!(target: PROCESS_TARGET, "daemonising into background");
        Daemon::new()
            .work_dir(Path::new("/"))
            .name(OsStr::new(env!("CARGO_PKG_NAME")))
            .start()?;
        info!(
            target: PROCESS_TARGET,
            pid = std::process::id(),
            "daemon process detached; continuing in child"
        );
        Ok(())
    }
}

#[cfg(not(unix))]
impl Daemonizer for SystemDaemonizer {
    fn daemonize(&self) -> Result<(), DaemonizeError> {
        Err(DaemonizeError::Unsupported)
    }
}
