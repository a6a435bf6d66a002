//! Error types for request execution failures.
//!
//! Application failures never appear here: they are turned into remote
//! errors and returned to the caller. A `DispatchError` always ends the
//! connection.

use std::io;

use easycluster_wire::{FrameError, PayloadError};
use thiserror::Error;

use super::LogicalLine;
use crate::objects::UnknownHandle;
use crate::objects::codec::DecodeError;

/// Errors that end a connection while executing requests.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request targeted a handle the table does not hold.
    #[error(transparent)]
    UnknownHandle(#[from] UnknownHandle),

    /// An argument could not be decoded.
    #[error("failed to decode arguments: {0}")]
    Decode(#[from] DecodeError),

    /// A request that must target an object named none.
    #[error("{route} request names no target")]
    MissingTarget { route: &'static str },

    /// The response payload could not be serialised.
    #[error("failed to encode response: {0}")]
    Encode(#[from] PayloadError),

    /// The response could not be written.
    #[error("failed to send response: {source}")]
    Reply {
        #[source]
        source: FrameError,
    },

    /// A worker thread could not be started.
    #[error("failed to start worker for {line}: {source}")]
    Spawn {
        line: String,
        #[source]
        source: io::Error,
    },

    /// The line's worker exited before accepting the request.
    #[error("line {line} is no longer accepting requests")]
    LineClosed { line: LogicalLine },

    /// Connection state lock poisoned by a panicking thread.
    #[error("connection state lock poisoned")]
    Poisoned,
}

impl DispatchError {
    /// Wraps a transport failure raised while replying.
    pub fn reply(source: FrameError) -> Self {
        Self::Reply { source }
    }

    /// Whether the failure came from the peer going away rather than from
    /// anything the peer sent.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Reply { source } if source.is_disconnect())
    }
}
