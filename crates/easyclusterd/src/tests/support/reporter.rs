//! Test double for [`ServerReporter`] that records lifecycle events.

use std::net::SocketAddr;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::launcher::LauncherError;
use crate::reporter::ServerReporter;
use crate::server::ServerError;

/// Lifecycle events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReporterEvent {
    Listening(SocketAddr),
    Accepted(SocketAddr),
    Rejected(SocketAddr),
    LaunchFailed { peer: SocketAddr, message: String },
    Established { peer: String, authenticated: bool },
    Replaced(String),
    Closed(String),
    Failed { peer: String, message: String },
}

/// Records reporter events for assertions.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ReporterEvent>>,
    recorded: Condvar,
}

impl RecordingReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<ReporterEvent> {
        self.events
            .lock()
            .expect("reporter mutex poisoned")
            .clone()
    }

    /// Blocks until an event matching `predicate` is recorded.
    pub fn wait_for<P>(&self, predicate: P, timeout: Duration) -> bool
    where
        P: Fn(&ReporterEvent) -> bool,
    {
        let guard = self.events.lock().expect("reporter mutex poisoned");
        let (guard, _) = self
            .recorded
            .wait_timeout_while(guard, timeout, |events| !events.iter().any(&predicate))
            .expect("reporter mutex poisoned");
        guard.iter().any(predicate)
    }

    fn record(&self, event: ReporterEvent) {
        self.events
            .lock()
            .expect("reporter mutex poisoned")
            .push(event);
        self.recorded.notify_all();
    }
}

impl ServerReporter for RecordingReporter {
    fn listening(&self, address: SocketAddr) {
        self.record(ReporterEvent::Listening(address));
    }

    fn connection_accepted(&self, peer: SocketAddr) {
        self.record(ReporterEvent::Accepted(peer));
    }

    fn connection_rejected(&self, peer: SocketAddr) {
        self.record(ReporterEvent::Rejected(peer));
    }

    fn launch_failed(&self, peer: SocketAddr, error: &LauncherError) {
        self.record(ReporterEvent::LaunchFailed {
            peer,
            message: error.to_string(),
        });
    }

    fn session_established(&self, peer: &str, authenticated: bool) {
        self.record(ReporterEvent::Established {
            peer: peer.to_owned(),
            authenticated,
        });
    }

    fn session_replaced(&self, peer: &str) {
        self.record(ReporterEvent::Replaced(peer.to_owned()));
    }

    fn connection_closed(&self, peer: &str) {
        self.record(ReporterEvent::Closed(peer.to_owned()));
    }

    fn connection_failed(&self, peer: &str, error: &ServerError) {
        self.record(ReporterEvent::Failed {
            peer: peer.to_owned(),
            message: error.to_string(),
        });
    }
}
