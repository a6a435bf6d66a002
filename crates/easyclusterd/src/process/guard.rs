use std::fs::{self, OpenOptions};
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use super::PROCESS_TARGET;
use super::errors::LaunchError;

/// Owns the PID file for the lifetime of the server and removes it on drop.
#[derive(Debug)]
pub(crate) struct PidFileGuard {
    path: Utf8PathBuf,
    written: bool,
}

impl PidFileGuard {
    /// Claims `path`, refusing when it names a live process. Stale files are
    /// overwritten by [`write_pid`](Self::write_pid).
    pub(crate) fn acquire(path: &Utf8Path) -> Result<Self, LaunchError> {
        if let Some(pid) = read_pid(path)
            && pid != 0
        {
            if check_process(pid)? {
                info!(
                    target: PROCESS_TARGET,
                    pid,
                    "refusing to start: existing server alive"
                );
                return Err(LaunchError::AlreadyRunning { pid });
            }
            warn!(
                target: PROCESS_TARGET,
                pid,
                file = %path,
                "existing server not detected; replacing stale pid file"
            );
        }
        Ok(Self {
            path: path.to_path_buf(),
            written: false,
        })
    }

    pub(crate) fn write_pid(&mut self, pid: u32) -> Result<(), LaunchError> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let pid_error = |source| LaunchError::PidWrite {
            path: self.path.clone(),
            source,
        };
        let mut file = options.open(&self.path).map_err(pid_error)?;
        writeln!(file, "{pid}").map_err(pid_error)?;
        file.sync_all().map_err(pid_error)?;
        self.written = true;
        info!(target: PROCESS_TARGET, pid, file = %self.path, "pid file written");
        Ok(())
    }
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        if !self.written {
            return;
        }
        if let Err(error) = fs::remove_file(&self.path)
            && error.kind() != io::ErrorKind::NotFound
        {
            warn!(
                target: PROCESS_TARGET,
                file = %self.path,
                error = %error,
                "failed to remove pid file"
            );
        }
    }
}

fn read_pid(path: &Utf8Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse::<u32>().ok()
}

#[cfg(unix)]
fn check_process(pid: u32) -> Result<bool, LaunchError> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return Ok(false);
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH | Errno::ECHILD) => Ok(false),
        Err(errno) => Err(LaunchError::CheckProcess {
            pid,
            source: errno.into(),
        }),
    }
}

// Liveness cannot be probed without extra Win32 features; any recorded pid
// is treated as stale.
#[cfg(not(unix))]
fn check_process(_pid: u32) -> Result<bool, LaunchError> {
    Ok(false)
}
