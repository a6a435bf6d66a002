//! Single-shot challenge/response authentication.
//!
//! A keyed server sends a fresh nonce and expects exactly one signed
//! CHALLENGE_RESPONSE echoing it. The signature is checked by the frame
//! reader's MAC chain, so a peer holding the wrong key fails on its first
//! frame. Anything else, or silence past the deadline, ends the connection
//! before any application code runs.

use std::time::{Duration, Instant};

use easycluster_wire::{FrameError, MessageKind, Nonce, PROTOCOL_VERSION, SessionInit};
use tracing::debug;

use super::session::Session;
use super::{SERVER_TARGET, ServerError};

/// Authenticates the peer when the session is keyed, then announces the
/// server's session parameters.
pub(crate) fn establish(session: &mut Session, timeout: Duration) -> Result<(), ServerError> {
    if session.is_keyed() {
        challenge(session, timeout)?;
    }
    session.trust_peer();
    session.outbound().send(
        MessageKind::Init,
        &SessionInit {
            version: PROTOCOL_VERSION.to_owned(),
            keepalive_interval_ms: None,
        },
    )
}

fn challenge(session: &mut Session, timeout: Duration) -> Result<(), ServerError> {
    let nonce = Nonce::generate();
    session
        .outbound()
        .send_raw(MessageKind::Challenge, nonce.as_bytes())?;
    debug!(target: SERVER_TARGET, peer = session.peer(), "challenge sent");

    let deadline = Instant::now() + timeout;
    let frame = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ServerError::HandshakeTimeout { timeout });
        }
        match session.next_frame(remaining) {
            Ok(Some(frame)) => break frame,
            Ok(None) => {}
            Err(error) if error.is_disconnect() => return Err(error.into()),
            Err(FrameError::BadSignature) => {
                return Err(authentication("challenge response signature mismatch"));
            }
            Err(error) => return Err(authentication(&error.to_string())),
        }
    };

    if frame.kind != MessageKind::ChallengeResponse {
        return Err(authentication(&format!(
            "expected challenge_response, got {}",
            frame.kind
        )));
    }
    if !nonce.matches(&frame.payload) {
        return Err(authentication("challenge response does not echo the nonce"));
    }
    Ok(())
}

fn authentication(reason: &str) -> ServerError {
    ServerError::Authentication {
        reason: reason.to_owned(),
    }
}
