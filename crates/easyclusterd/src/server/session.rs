//! Authenticated transport state that survives hot swaps.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use easycluster_config::SharedSecret;
use easycluster_wire::{
    CLIENT_LABEL, ErrorMessage, Frame, FrameError, FrameReader, FrameWriter, MessageKind,
    ResponseMessage, SERVER_LABEL, SessionInit, encode_payload,
};
use serde::Serialize;
use tracing::debug;

use super::{SERVER_TARGET, ServerError};
use super::stream::ConnectionStream;
use crate::dispatch::{DispatchError, ReplySink};

struct SendHalf {
    frames: FrameWriter,
    stream: ConnectionStream,
}

/// Outbound side of a connection, shared by the receive loop and workers.
///
/// Frames are written whole under one lock so replies from different lines
/// never interleave.
pub(crate) struct Outbound {
    send: Mutex<SendHalf>,
    control: ConnectionStream,
}

impl Outbound {
    fn new(stream: ConnectionStream, frames: FrameWriter) -> io::Result<Self> {
        let control = stream.try_clone()?;
        Ok(Self {
            send: Mutex::new(SendHalf { frames, stream }),
            control,
        })
    }

    /// Writes one frame.
    pub(crate) fn send_raw(&self, kind: MessageKind, payload: &[u8]) -> Result<(), FrameError> {
        let mut half = self
            .send
            .lock()
            .map_err(|_| FrameError::Io {
                source: io::Error::other("send lock poisoned"),
            })?;
        let SendHalf { frames, stream } = &mut *half;
        frames.write_frame(stream, kind, payload)
    }

    /// Serialises and writes one frame.
    pub(crate) fn send<T: Serialize>(&self, kind: MessageKind, message: &T) -> Result<(), ServerError> {
        let payload = encode_payload(message).map_err(ServerError::payload(kind))?;
        Ok(self.send_raw(kind, &payload)?)
    }

    /// Reports a fatal error to the peer in an unsigned frame and shuts the
    /// socket down. Failures are ignored; the peer may already be gone.
    pub(crate) fn close_with_error(&self, message: &str) {
        let body = ErrorMessage {
            message: message.to_owned(),
        };
        match encode_payload(&body) {
            Ok(payload) => {
                if let Err(error) = self.send_raw(MessageKind::Error, &payload) {
                    debug!(target: SERVER_TARGET, error = %error, "could not send error frame");
                }
            }
            Err(error) => {
                debug!(target: SERVER_TARGET, error = %error, "could not encode error frame");
            }
        }
        self.shutdown();
    }

    /// Shuts the socket down, waking the receive loop.
    pub(crate) fn shutdown(&self) {
        if let Err(error) = self.control.shutdown() {
            debug!(target: SERVER_TARGET, error = %error, "socket shutdown failed");
        }
    }
}

impl ReplySink for Outbound {
    fn respond(&self, response: &ResponseMessage) -> Result<(), DispatchError> {
        let payload = encode_payload(response)?;
        self.send_raw(MessageKind::Response, &payload)
            .map_err(DispatchError::reply)
    }

    fn abort(&self, error: &DispatchError) {
        self.close_with_error(&error.to_string());
    }
}

/// Everything about a connection that outlives one set of services: the
/// socket, both MAC chains, buffered input and the peer's session data.
pub(crate) struct Session {
    stream: ConnectionStream,
    frames: FrameReader,
    outbound: Arc<Outbound>,
    peer: String,
    keyed: bool,
    init: Option<SessionInit>,
}

impl Session {
    /// Wraps an accepted stream, keying both directions when a secret is
    /// configured.
    pub(crate) fn open(stream: ConnectionStream, secret: Option<&SharedSecret>) -> Result<Self, ServerError> {
        let (writer, reader) = match secret {
            Some(secret) => (
                FrameWriter::keyed(secret.as_bytes(), SERVER_LABEL)?,
                FrameReader::keyed(secret.as_bytes(), CLIENT_LABEL)?,
            ),
            None => (FrameWriter::unkeyed(), FrameReader::unkeyed()),
        };
        let peer = stream.peer_label();
        let send_stream = stream.try_clone().map_err(ServerError::stream)?;
        let outbound = Outbound::new(send_stream, writer).map_err(ServerError::stream)?;
        Ok(Self {
            stream,
            frames: reader,
            outbound: Arc::new(outbound),
            peer,
            keyed: secret.is_some(),
            init: None,
        })
    }

    /// Waits up to `wait` for the next frame.
    pub(crate) fn next_frame(&mut self, wait: Duration) -> Result<Option<Frame>, FrameError> {
        self.stream
            .set_read_timeout(Some(wait.max(Duration::from_millis(1))))?;
        self.frames.poll(&mut self.stream)
    }

    /// Lifts the pre-authentication frame ceiling.
    pub(crate) const fn trust_peer(&mut self) {
        self.frames.lift_limit();
    }

    pub(crate) fn outbound(&self) -> &Arc<Outbound> {
        &self.outbound
    }

    pub(crate) fn peer(&self) -> &str {
        &self.peer
    }

    pub(crate) const fn is_keyed(&self) -> bool {
        self.keyed
    }

    pub(crate) fn set_init(&mut self, init: SessionInit) {
        self.init = Some(init);
    }

    /// Keepalive period the peer asked for, if any.
    pub(crate) fn keepalive_interval(&self) -> Option<Duration> {
        self.init
            .as_ref()
            .and_then(|init| init.keepalive_interval_ms)
            .filter(|&millis| millis > 0)
            .map(Duration::from_millis)
    }
}

impl Drop for Session {
    // Detached workers may still hold the outbound half; closing here makes
    // the end of the session visible to the peer regardless.
    fn drop(&mut self) {
        self.outbound.shutdown();
    }
}
