//! Accept loop feeding connection workers.

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use super::bind::bind_listener;
use super::worker::{AcceptedConnection, ConnectionJob, ConnectionWorker, worker_for};
use super::{LAUNCHER_TARGET, LauncherError, ServerSettings, StopHandle};
use crate::address::AllowList;
use crate::objects::Services;
use crate::reporter::ServerReporter;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Owns the listening socket and hands permitted peers to a worker.
pub struct ConnectionLauncher {
    listener: TcpListener,
    allow: AllowList,
    worker: Box<dyn ConnectionWorker>,
    reporter: Arc<dyn ServerReporter>,
}

impl ConnectionLauncher {
    /// Binds `settings` and serves `services` with the configured launch
    /// strategy.
    ///
    /// # Errors
    ///
    /// Returns an error when the strategy is unavailable or binding fails.
    pub fn from_settings(
        settings: &ServerSettings,
        services: Services,
        reporter: Arc<dyn ServerReporter>,
    ) -> Result<Self, LauncherError> {
        let job = ConnectionJob::new(services, settings.secret.clone(), Arc::clone(&reporter));
        let worker = worker_for(settings, job)?;
        Self::bind(settings, worker, reporter)
    }

    /// Binds the address named by `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error when the address cannot be resolved or bound.
    pub fn bind(
        settings: &ServerSettings,
        worker: Box<dyn ConnectionWorker>,
        reporter: Arc<dyn ServerReporter>,
    ) -> Result<Self, LauncherError> {
        let listener = bind_listener(settings.bind.as_deref(), settings.port, settings.disable_ipv6)?;
        Ok(Self::from_listener(
            listener,
            settings.allow.clone(),
            worker,
            reporter,
        ))
    }

    /// Wraps an already bound listener.
    pub fn from_listener(
        listener: TcpListener,
        allow: AllowList,
        worker: Box<dyn ConnectionWorker>,
        reporter: Arc<dyn ServerReporter>,
    ) -> Self {
        Self {
            listener,
            allow,
            worker,
            reporter,
        }
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error when the socket cannot report its address.
    pub fn local_addr(&self) -> Result<SocketAddr, LauncherError> {
        self.listener
            .local_addr()
            .map_err(|source| LauncherError::Listener { source })
    }

    /// Accepts connections on the calling thread until `stop` is signalled.
    ///
    /// # Errors
    ///
    /// Returns an error when the listener cannot be made non-blocking.
    pub fn run(self, stop: &StopHandle) -> Result<(), LauncherError> {
        self.listener
            .set_nonblocking(true)
            .map_err(|source| LauncherError::Listener { source })?;
        self.reporter.listening(self.local_addr()?);

        let mut last_error = None::<io::ErrorKind>;
        while !stop.is_stopped() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    last_error = None;
                    self.admit(stream, peer);
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    self.worker.reap();
                    thread::sleep(ACCEPT_BACKOFF);
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => {
                    let kind = error.kind();
                    if last_error != Some(kind) {
                        warn!(target: LAUNCHER_TARGET, error = %error, "accept failed");
                    }
                    last_error = Some(kind);
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }
        debug!(target: LAUNCHER_TARGET, "accept loop stopped");
        self.worker.reap();
        Ok(())
    }

    /// Runs the accept loop on a background thread.
    ///
    /// # Errors
    ///
    /// Returns an error when the thread cannot be spawned.
    pub fn start(self) -> Result<LauncherHandle, LauncherError> {
        let stop = StopHandle::new();
        let loop_stop = stop.clone();
        let handle = thread::Builder::new()
            .name("easycluster-accept".to_owned())
            .spawn(move || self.run(&loop_stop))
            .map_err(|source| LauncherError::Listener { source })?;
        Ok(LauncherHandle {
            stop,
            handle: Some(handle),
        })
    }

    fn admit(&self, stream: std::net::TcpStream, peer: SocketAddr) {
        if !self.allow.permits(peer.ip()) {
            self.reporter.connection_rejected(peer);
            return;
        }
        self.reporter.connection_accepted(peer);
        if let Err(error) = stream.set_nonblocking(false) {
            warn!(target: LAUNCHER_TARGET, peer = %peer, error = %error, "could not configure stream");
            return;
        }
        let connection = AcceptedConnection { stream, peer };
        if let Err(error) = self.worker.launch(connection, &self.listener) {
            self.reporter.launch_failed(peer, &error);
        }
    }
}

/// Handle to an accept loop running on a background thread.
pub struct LauncherHandle {
    stop: StopHandle,
    handle: Option<JoinHandle<Result<(), LauncherError>>>,
}

impl LauncherHandle {
    /// Asks the accept loop to stop.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Stop signal shared with the accept loop.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Waits for the accept loop to exit.
    ///
    /// # Errors
    ///
    /// Returns the loop's error, or [`LauncherError::ThreadPanic`].
    pub fn join(mut self) -> Result<(), LauncherError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| LauncherError::ThreadPanic)?,
            None => Ok(()),
        }
    }
}

impl Drop for LauncherHandle {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::ThreadWorker;
    use crate::tests::support::{RecordingReporter, ReporterEvent};
    use rstest::rstest;
    use std::net::TcpStream;

    fn launcher(allow: &[&str], reporter: &Arc<RecordingReporter>) -> ConnectionLauncher {
        let listener = bind_listener(Some("127.0.0.1"), 0, true).expect("bind loopback");
        let reporter = Arc::clone(reporter) as Arc<dyn ServerReporter>;
        let job = ConnectionJob::new(Services::default(), None, Arc::clone(&reporter));
        ConnectionLauncher::from_listener(
            listener,
            AllowList::from_strings(allow).expect("allow-list"),
            Box::new(ThreadWorker::new(job)),
            reporter,
        )
    }

    #[rstest]
    fn accepts_permitted_peers_until_stopped() {
        let reporter = Arc::new(RecordingReporter::default());
        let launcher = launcher(&[], &reporter);
        let addr = launcher.local_addr().expect("local addr");
        let handle = launcher.start().expect("start launcher");

        let _client = TcpStream::connect(addr).expect("connect");
        assert!(reporter.wait_for(
            |event| matches!(event, ReporterEvent::Accepted(_)),
            Duration::from_secs(2)
        ));

        handle.stop();
        handle.join().expect("join launcher");
        assert!(reporter.events().contains(&ReporterEvent::Listening(addr)));
    }

    #[rstest]
    fn peers_outside_the_allow_list_are_dropped() {
        let reporter = Arc::new(RecordingReporter::default());
        let launcher = launcher(&["10.0.0.0/8"], &reporter);
        let addr = launcher.local_addr().expect("local addr");
        let handle = launcher.start().expect("start launcher");

        let _client = TcpStream::connect(addr).expect("connect");
        assert!(reporter.wait_for(
            |event| matches!(event, ReporterEvent::Rejected(_)),
            Duration::from_secs(2)
        ));
        drop(handle);
        assert!(
            !reporter
                .events()
                .iter()
                .any(|event| matches!(event, ReporterEvent::Accepted(_)))
        );
    }
}
