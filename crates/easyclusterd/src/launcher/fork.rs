//! Process-per-connection serving on POSIX.

use std::net::TcpListener;
use std::os::fd::AsRawFd;
use std::process;

use easycluster_config::LaunchStrategy;
use nix::errno::Errno;
use nix::sys::signal::{SigHandler, Signal, signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, close, fork};
use tracing::{debug, warn};

use super::worker::{AcceptedConnection, ConnectionJob, ConnectionWorker};
use super::{LAUNCHER_TARGET, LauncherError};

const RESET_SIGNALS: [Signal; 4] = [
    Signal::SIGTERM,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGHUP,
];

/// Forks once per connection. The child closes the listening socket,
/// serves the connection and exits; the parent reaps children from the
/// accept loop without blocking.
#[derive(Debug)]
pub struct ForkWorker {
    job: ConnectionJob,
}

impl ForkWorker {
    /// Worker running `job` in a child process per connection.
    pub fn new(job: ConnectionJob) -> Self {
        Self { job }
    }

    fn serve_in_child(&self, connection: AcceptedConnection, listener: &TcpListener) -> ! {
        if let Err(error) = close(listener.as_raw_fd()) {
            warn!(target: LAUNCHER_TARGET, error = %error, "child could not close listener");
        }
        for signal_kind in RESET_SIGNALS {
            // SAFETY: restoring the default disposition installs no handler
            // code. Only the forking thread exists in the child.
            if let Err(error) = unsafe { signal(signal_kind, SigHandler::SigDfl) } {
                warn!(
                    target: LAUNCHER_TARGET,
                    signal = %signal_kind,
                    error = %error,
                    "child could not reset signal disposition"
                );
            }
        }
        let code = match self.job.serve(connection.stream.into()) {
            Ok(()) => 0,
            Err(_) => 1,
        };
        process::exit(code)
    }
}

impl ConnectionWorker for ForkWorker {
    fn launch(
        &self,
        connection: AcceptedConnection,
        listener: &TcpListener,
    ) -> Result<(), LauncherError> {
        // SAFETY: the child only serves this connection on the forking
        // thread and leaves through `process::exit`, never returning into
        // the accept loop. The parent also runs the signal watcher
        // thread. A lock that thread held at fork time (allocator, stderr,
        // subscriber) stays held forever in the child, so the child's
        // logging and allocation can deadlock in that case.
        let forked = unsafe { fork() }
            .map_err(|errno| LauncherError::worker(LaunchStrategy::Fork)(errno.into()))?;
        match forked {
            ForkResult::Parent { child } => {
                debug!(
                    target: LAUNCHER_TARGET,
                    child = child.as_raw(),
                    peer = %connection.peer,
                    "connection handed to child"
                );
                Ok(())
            }
            ForkResult::Child => self.serve_in_child(connection, listener),
        }
    }

    fn reap(&self) {
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => return,
                Ok(status) => {
                    debug!(target: LAUNCHER_TARGET, status = ?status, "reaped connection child");
                }
                Err(Errno::EINTR) => {}
                Err(error) => {
                    warn!(target: LAUNCHER_TARGET, error = %error, "waitpid failed");
                    return;
                }
            }
        }
    }
}
