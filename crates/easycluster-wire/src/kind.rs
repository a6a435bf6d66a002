use std::fmt;

use crate::errors::FrameError;

/// Message kinds carried in the first byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Unsigned failure report; the sender closes the connection afterwards.
    Error = 0,
    /// Server nonce that the client must echo back under its MAC chain.
    Challenge = 1,
    /// Client echo of the challenge nonce.
    ChallengeResponse = 2,
    /// Liveness probe; carries no payload.
    Keepalive = 3,
    /// Method invocation.
    Request = 4,
    /// Result of a method invocation.
    Response = 5,
    /// Session parameters exchanged once the peer is trusted.
    Init = 6,
    /// Orderly shutdown request or acknowledgement.
    Goodbye = 7,
    /// Handles the peer no longer references.
    Release = 8,
}

impl MessageKind {
    /// Wire byte for this kind.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether frames of this kind carry a MAC tag on keyed connections.
    #[must_use]
    pub const fn is_signed(self) -> bool {
        !matches!(self, Self::Error)
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Challenge => "challenge",
            Self::ChallengeResponse => "challenge_response",
            Self::Keepalive => "keepalive",
            Self::Request => "request",
            Self::Response => "response",
            Self::Init => "init",
            Self::Goodbye => "goodbye",
            Self::Release => "release",
        }
    }
}

#[expect(clippy::use_self, reason = "`Self::Error` is ambiguous inside `TryFrom`")]
impl TryFrom<u8> for MessageKind {
    type Error = FrameError;

    fn try_from(byte: u8) -> Result<Self, FrameError> {
        // `Self::Error` would name the associated type here.
        Ok(match byte {
            0 => MessageKind::Error,
            1 => MessageKind::Challenge,
            2 => MessageKind::ChallengeResponse,
            3 => MessageKind::Keepalive,
            4 => MessageKind::Request,
            5 => MessageKind::Response,
            6 => MessageKind::Init,
            7 => MessageKind::Goodbye,
            8 => MessageKind::Release,
            other => return Err(FrameError::UnknownKind { byte: other }),
        })
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
