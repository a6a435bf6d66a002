//! Error types for connection serving.

use std::io;
use std::time::Duration;

use easycluster_wire::{FrameError, MessageKind, PayloadError};
use thiserror::Error;

use crate::dispatch::DispatchError;

/// Errors that end a connection.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Framing, signature or transport failure.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// A frame's payload did not parse.
    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: MessageKind,
        #[source]
        source: PayloadError,
    },

    /// The peer failed the challenge.
    #[error("authentication failed: {reason}")]
    Authentication { reason: String },

    /// The peer did not answer the challenge in time.
    #[error("peer did not authenticate within {timeout:?}")]
    HandshakeTimeout { timeout: Duration },

    /// Request execution failed fatally.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The peer sent something the protocol does not allow here.
    #[error("protocol violation: {reason}")]
    Protocol { reason: String },

    /// The socket could not be configured.
    #[error("socket error: {source}")]
    Stream {
        #[source]
        source: io::Error,
    },
}

impl ServerError {
    pub(crate) fn payload(kind: MessageKind) -> impl FnOnce(PayloadError) -> Self {
        move |source| Self::Payload { kind, source }
    }

    pub(crate) fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    pub(crate) fn stream(source: io::Error) -> Self {
        Self::Stream { source }
    }

    /// Whether the peer simply went away.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Frame(error) => error.is_disconnect(),
            Self::Dispatch(error) => error.is_disconnect(),
            _ => false,
        }
    }
}
