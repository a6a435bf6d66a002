//! Connection lifecycle and receive loop.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use easycluster_config::SharedSecret;
use easycluster_wire::{
    ErrorMessage, Frame, Goodbye, MessageKind, ReleaseMessage, RequestMessage, SessionInit,
    decode_payload, version_is_compatible,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::session::Session;
use super::stream::ConnectionStream;
use super::{HANDSHAKE_TIMEOUT, POLL_INTERVAL, SERVER_TARGET, ServerError, handshake};
use crate::dispatch::{DispatchRouter, ExecutionContext, ReplySink, Routing, Step};
use crate::objects::{Services, Successor};
use crate::reporter::ServerReporter;

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing exchanged yet.
    AwaitingHandshake,
    /// Challenge sent; waiting for the peer's answer.
    Authenticating,
    /// Serving requests.
    Established,
    /// Goodbye received; finishing queued work.
    Draining,
    /// Terminal.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingHandshake => "awaiting_handshake",
            Self::Authenticating => "authenticating",
            Self::Established => "established",
            Self::Draining => "draining",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Result of running a connection server.
pub enum RunOutcome {
    /// The connection is finished.
    Done,
    /// A hot swap happened; keep driving the successor on the same session.
    Continue(ConnectionServer),
}

enum Flow {
    Continue,
    Replace(Successor),
    Close,
}

/// Serves one connection for one set of services.
pub struct ConnectionServer {
    session: Session,
    secret: Option<SharedSecret>,
    router: DispatchRouter,
    reporter: Arc<dyn ServerReporter>,
    state: ConnectionState,
    keepalive_due: Option<Instant>,
}

impl ConnectionServer {
    /// Server for a freshly accepted stream. With a secret the peer must
    /// pass the challenge before anything else happens.
    ///
    /// # Errors
    ///
    /// Returns an error when the socket cannot be duplicated or the key is
    /// unusable.
    pub fn new(
        stream: ConnectionStream,
        secret: Option<SharedSecret>,
        services: &Services,
        reporter: Arc<dyn ServerReporter>,
    ) -> Result<Self, ServerError> {
        let session = Session::open(stream, secret.as_ref())?;
        Ok(Self::with_session(
            session,
            secret,
            services,
            reporter,
            ConnectionState::AwaitingHandshake,
        ))
    }

    fn with_session(
        session: Session,
        secret: Option<SharedSecret>,
        services: &Services,
        reporter: Arc<dyn ServerReporter>,
        state: ConnectionState,
    ) -> Self {
        let replies = Arc::clone(session.outbound()) as Arc<dyn ReplySink>;
        let context = Arc::new(ExecutionContext::new(services, replies));
        let keepalive_due = session
            .keepalive_interval()
            .map(|interval| Instant::now() + interval);
        Self {
            session,
            secret,
            router: DispatchRouter::new(context),
            reporter,
            state,
            keepalive_due,
        }
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Peer description used in logs.
    pub fn peer(&self) -> &str {
        self.session.peer()
    }

    /// Runs until the connection ends or a hot swap hands it on.
    ///
    /// # Errors
    ///
    /// Returns an error for authentication failures, protocol violations and
    /// transport failures other than the peer disconnecting.
    pub fn run(mut self) -> Result<RunOutcome, ServerError> {
        if self.state == ConnectionState::AwaitingHandshake {
            self.authenticate()?;
        }
        match self.serve() {
            Ok(None) => {
                self.finish_lines()?;
                Ok(RunOutcome::Done)
            }
            Ok(Some(successor)) => self.hand_over(successor),
            Err(error) => {
                // Queued line work still runs to completion; the first
                // error stays the reported one.
                let _ = self.finish_lines();
                Err(error)
            }
        }
    }

    /// Joins every line worker and closes the connection, surfacing a fatal
    /// error raised by work that was still queued.
    fn finish_lines(&mut self) -> Result<(), ServerError> {
        self.router.drain();
        self.state = ConnectionState::Closed;
        match self.router.context().take_fatal() {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    fn authenticate(&mut self) -> Result<(), ServerError> {
        if self.session.is_keyed() {
            self.state = ConnectionState::Authenticating;
        }
        if let Err(error) = handshake::establish(&mut self.session, HANDSHAKE_TIMEOUT) {
            self.state = ConnectionState::Closed;
            return Err(self.abort(error));
        }
        self.state = ConnectionState::Established;
        self.reporter
            .session_established(self.session.peer(), self.secret.is_some());
        Ok(())
    }

    fn hand_over(mut self, successor: Successor) -> Result<RunOutcome, ServerError> {
        self.router.drain();
        if let Some(error) = self.router.context().take_fatal() {
            self.state = ConnectionState::Closed;
            return Err(error.into());
        }
        info!(target: SERVER_TARGET, peer = self.session.peer(), "hot swap");
        let Self {
            session,
            secret,
            reporter,
            ..
        } = self;
        Ok(RunOutcome::Continue(Self::with_session(
            session,
            secret,
            &successor.services,
            reporter,
            ConnectionState::Established,
        )))
    }

    /// Receive loop. Returns the successor when a hot swap was requested.
    fn serve(&mut self) -> Result<Option<Successor>, ServerError> {
        loop {
            if let Some(error) = self.router.context().take_fatal() {
                return Err(error.into());
            }
            if let Some(successor) = self.router.context().take_handoff() {
                return Ok(Some(successor));
            }

            let wait = self.next_wait();
            match self.session.next_frame(wait) {
                Ok(Some(frame)) => {
                    self.touch_keepalive();
                    match self.handle_frame(frame) {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Replace(successor)) => return Ok(Some(successor)),
                        Ok(Flow::Close) => return Ok(None),
                        Err(error) => return Err(self.abort(error)),
                    }
                }
                Ok(None) => self.send_keepalive_if_due()?,
                Err(error) if error.is_disconnect() => {
                    // A worker that aborted the connection shut the socket
                    // down; its error takes precedence over the EOF.
                    if let Some(fatal) = self.router.context().take_fatal() {
                        return Err(fatal.into());
                    }
                    debug!(target: SERVER_TARGET, peer = self.session.peer(), "peer disconnected");
                    return Ok(None);
                }
                Err(error) => return Err(self.abort(error.into())),
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame) -> Result<Flow, ServerError> {
        match frame.kind {
            MessageKind::Init => {
                let init: SessionInit = decode(&frame)?;
                self.accept_init(init)?;
                Ok(Flow::Continue)
            }
            MessageKind::Request => {
                let mut request: RequestMessage = decode(&frame)?;
                let garbage = std::mem::take(&mut request.garbage);
                self.router.context().release(&garbage)?;
                self.route(request)
            }
            MessageKind::Release => {
                let release: ReleaseMessage = decode(&frame)?;
                self.router.context().release(&release.handles)?;
                Ok(Flow::Continue)
            }
            MessageKind::Keepalive => Ok(Flow::Continue),
            MessageKind::Goodbye => {
                let goodbye: Goodbye = decode(&frame)?;
                self.drain_after(&goodbye)?;
                Ok(Flow::Close)
            }
            MessageKind::Error => {
                let message = decode::<ErrorMessage>(&frame).map_or_else(
                    |_| String::from_utf8_lossy(&frame.payload).into_owned(),
                    |error| error.message,
                );
                warn!(
                    target: SERVER_TARGET,
                    peer = self.session.peer(),
                    reason = %message,
                    "peer reported an error"
                );
                Ok(Flow::Close)
            }
            MessageKind::Challenge | MessageKind::ChallengeResponse | MessageKind::Response => {
                Err(ServerError::protocol(format!(
                    "unexpected {} frame on an established connection",
                    frame.kind
                )))
            }
        }
    }

    fn accept_init(&mut self, init: SessionInit) -> Result<(), ServerError> {
        if !version_is_compatible(&init.version) {
            return Err(ServerError::protocol(format!(
                "incompatible peer version {}",
                init.version
            )));
        }
        debug!(
            target: SERVER_TARGET,
            peer = self.session.peer(),
            version = %init.version,
            keepalive_ms = init.keepalive_interval_ms,
            "peer session info received"
        );
        self.session.set_init(init);
        self.touch_keepalive();
        Ok(())
    }

    fn route(&mut self, request: RequestMessage) -> Result<Flow, ServerError> {
        match Routing::from_message(request)? {
            Routing::EndLine(line) => {
                self.router.end_line(&line);
                Ok(Flow::Continue)
            }
            Routing::Call { route, request } => match self.router.dispatch(route, request) {
                Ok(Step::Done) => Ok(Flow::Continue),
                Ok(Step::Replace(successor)) => Ok(Flow::Replace(successor)),
                Err(error) => {
                    // Reported and recorded like a worker failure; the loop
                    // picks it up on the next iteration.
                    self.router.context().fail(error);
                    Ok(Flow::Continue)
                }
            },
        }
    }

    fn drain_after(&mut self, goodbye: &Goodbye) -> Result<(), ServerError> {
        self.state = ConnectionState::Draining;
        debug!(
            target: SERVER_TARGET,
            peer = self.session.peer(),
            reason = goodbye.reason.as_deref().unwrap_or(""),
            "goodbye received"
        );
        if !goodbye.acknowledge {
            let reply = Goodbye {
                reason: None,
                acknowledge: true,
            };
            if let Err(error) = self.session.outbound().send(MessageKind::Goodbye, &reply)
                && !error.is_disconnect()
            {
                return Err(error);
            }
        }
        self.router.drain();
        if let Some(error) = self.router.context().take_fatal() {
            return Err(error.into());
        }
        Ok(())
    }

    fn next_wait(&self) -> Duration {
        self.keepalive_due.map_or(POLL_INTERVAL, |due| {
            due.saturating_duration_since(Instant::now())
                .min(POLL_INTERVAL)
        })
    }

    fn touch_keepalive(&mut self) {
        self.keepalive_due = self
            .session
            .keepalive_interval()
            .map(|interval| Instant::now() + interval);
    }

    fn send_keepalive_if_due(&mut self) -> Result<(), ServerError> {
        let Some(due) = self.keepalive_due else {
            return Ok(());
        };
        if Instant::now() < due {
            return Ok(());
        }
        self.session.outbound().send_raw(MessageKind::Keepalive, &[])?;
        self.touch_keepalive();
        Ok(())
    }

    /// Reports `error` to the peer and shuts the socket down.
    fn abort(&self, error: ServerError) -> ServerError {
        if !error.is_disconnect() {
            self.session.outbound().close_with_error(&error.to_string());
        }
        error
    }
}

fn decode<T: DeserializeOwned>(frame: &Frame) -> Result<T, ServerError> {
    decode_payload(&frame.payload).map_err(ServerError::payload(frame.kind))
}

/// Serves `stream` to completion, following hot swaps.
///
/// # Errors
///
/// Returns the error that ended the connection; a peer disconnect is not an
/// error.
pub fn serve_connection(
    stream: ConnectionStream,
    secret: Option<SharedSecret>,
    services: &Services,
    reporter: Arc<dyn ServerReporter>,
) -> Result<(), ServerError> {
    let peer = stream.peer_label();
    let result = ConnectionServer::new(stream, secret, services, Arc::clone(&reporter))
        .and_then(|server| drive(server, reporter.as_ref()));
    match &result {
        Ok(()) => reporter.connection_closed(&peer),
        Err(error) => reporter.connection_failed(&peer, error),
    }
    result
}

fn drive(mut server: ConnectionServer, reporter: &dyn ServerReporter) -> Result<(), ServerError> {
    loop {
        match server.run()? {
            RunOutcome::Done => return Ok(()),
            RunOutcome::Continue(next) => {
                reporter.session_replaced(next.peer());
                server = next;
            }
        }
    }
}
