//! Structured reporting for listener and connection lifecycle events.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::launcher::LauncherError;
use crate::server::ServerError;

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait ServerReporter: Send + Sync {
    /// Invoked once the listening socket is bound.
    fn listening(&self, address: SocketAddr);

    /// Invoked when the allow-list admits a peer.
    fn connection_accepted(&self, peer: SocketAddr);

    /// Invoked when the allow-list turns a peer away.
    fn connection_rejected(&self, peer: SocketAddr);

    /// Invoked when a connection could not be handed to a worker.
    fn launch_failed(&self, peer: SocketAddr, error: &LauncherError);

    /// Invoked after the handshake succeeds.
    fn session_established(&self, peer: &str, authenticated: bool);

    /// Invoked when a hot swap hands the session to successor services.
    fn session_replaced(&self, peer: &str);

    /// Invoked after an orderly or peer-initiated close.
    fn connection_closed(&self, peer: &str);

    /// Invoked when a connection ends with an error.
    fn connection_failed(&self, peer: &str, error: &ServerError);
}

impl<T> ServerReporter for Arc<T>
where
    T: ServerReporter + ?Sized,
{
    fn listening(&self, address: SocketAddr) {
        (**self).listening(address);
    }

    fn connection_accepted(&self, peer: SocketAddr) {
        (**self).connection_accepted(peer);
    }

    fn connection_rejected(&self, peer: SocketAddr) {
        (**self).connection_rejected(peer);
    }

    fn launch_failed(&self, peer: SocketAddr, error: &LauncherError) {
        (**self).launch_failed(peer, error);
    }

    fn session_established(&self, peer: &str, authenticated: bool) {
        (**self).session_established(peer, authenticated);
    }

    fn session_replaced(&self, peer: &str) {
        (**self).session_replaced(peer);
    }

    fn connection_closed(&self, peer: &str) {
        (**self).connection_closed(peer);
    }

    fn connection_failed(&self, peer: &str, error: &ServerError) {
        (**self).connection_failed(peer, error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredReporter;

impl StructuredReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ServerReporter for StructuredReporter {
    fn listening(&self, address: SocketAddr) {
        tracing::info!(
            target: "easyclusterd::connection",
            event = "listening",
            address = %address,
            "server listening"
        );
    }

    fn connection_accepted(&self, peer: SocketAddr) {
        tracing::info!(
            target: "easyclusterd::connection",
            event = "connection_accepted",
            peer = %peer,
            "connection accepted"
        );
    }

    fn connection_rejected(&self, peer: SocketAddr) {
        tracing::warn!(
            target: "easyclusterd::connection",
            event = "connection_rejected",
            peer = %peer,
            "connection rejected by allow-list"
        );
    }

    fn launch_failed(&self, peer: SocketAddr, error: &LauncherError) {
        tracing::error!(
            target: "easyclusterd::connection",
            event = "launch_failed",
            peer = %peer,
            error = %error,
            "failed to start connection worker"
        );
    }

    fn session_established(&self, peer: &str, authenticated: bool) {
        tracing::info!(
            target: "easyclusterd::connection",
            event = "session_established",
            peer,
            authenticated,
            "session established"
        );
    }

    fn session_replaced(&self, peer: &str) {
        tracing::info!(
            target: "easyclusterd::connection",
            event = "session_replaced",
            peer,
            "session handed to upgraded services"
        );
    }

    fn connection_closed(&self, peer: &str) {
        tracing::info!(
            target: "easyclusterd::connection",
            event = "connection_closed",
            peer,
            "connection closed"
        );
    }

    fn connection_failed(&self, peer: &str, error: &ServerError) {
        tracing::warn!(
            target: "easyclusterd::connection",
            event = "connection_failed",
            peer,
            error = %error,
            "connection failed"
        );
    }
}
