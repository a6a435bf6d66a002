use std::io;

use thiserror::Error;

/// Errors raised while reading or writing frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer closed the stream.
    #[error("connection closed by peer")]
    Closed,
    /// Reading from or writing to the stream failed.
    #[error("frame transport failed: {source}")]
    Io {
        /// Underlying IO error.
        #[from]
        source: io::Error,
    },
    /// The header announced a payload larger than currently permitted.
    #[error("frame of {length} bytes exceeds the {limit} byte limit")]
    Oversized {
        /// Announced payload length.
        length: usize,
        /// Limit in force when the header arrived.
        limit: usize,
    },
    /// The kind byte does not name a known message.
    #[error("unknown message kind {byte}")]
    UnknownKind {
        /// Offending byte.
        byte: u8,
    },
    /// The MAC tag did not match the frame.
    #[error("frame signature mismatch")]
    BadSignature,
    /// The shared secret could not key the MAC.
    #[error("invalid signing key")]
    InvalidKey,
}

impl FrameError {
    /// Whether the error means the peer went away rather than misbehaved.
    ///
    /// End of stream, resets and aborts are treated as ordinary disconnects.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Closed => true,
            Self::Io { source } => matches!(
                source.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Errors raised while encoding or decoding JSON payloads.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The payload was not valid JSON for the expected message.
    #[error("malformed payload: {source}")]
    Json {
        /// Underlying serde error.
        #[from]
        source: serde_json::Error,
    },
}
