//! Rolling HMAC chains, one per direction.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::errors::FrameError;

type HmacSha256 = Hmac<Sha256>;

/// Length of a frame tag.
pub const MAC_BYTES: usize = 32;

/// Chain seed for frames sent by the server.
pub const SERVER_LABEL: &[u8] = b"SRVR";

/// Chain seed for frames sent by the client.
pub const CLIENT_LABEL: &[u8] = b"CLNT";

/// One direction's MAC chain.
///
/// Each tag is `HMAC(key, previous ‖ header ‖ payload)` where `previous` is
/// the prior tag in the same direction, or the seed label for the first
/// frame.
#[derive(Clone)]
pub struct MacChain {
    keyed: HmacSha256,
    previous: Vec<u8>,
}

impl MacChain {
    /// Starts a chain keyed with `key` and seeded with `label`.
    pub fn new(key: &[u8], label: &[u8]) -> Result<Self, FrameError> {
        let keyed = HmacSha256::new_from_slice(key).map_err(|_| FrameError::InvalidKey)?;
        Ok(Self {
            keyed,
            previous: label.to_vec(),
        })
    }

    fn compute(&self, header: &[u8], payload: &[u8]) -> [u8; MAC_BYTES] {
        let mut mac = self.keyed.clone();
        mac.update(&self.previous);
        mac.update(header);
        mac.update(payload);
        let mut tag = [0_u8; MAC_BYTES];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        tag
    }

    /// Signs a frame and advances the chain.
    pub fn sign(&mut self, header: &[u8], payload: &[u8]) -> [u8; MAC_BYTES] {
        let tag = self.compute(header, payload);
        self.previous = tag.to_vec();
        tag
    }

    /// Checks a received tag in constant time, advancing the chain only when
    /// it matches.
    pub fn verify(&mut self, header: &[u8], payload: &[u8], tag: &[u8]) -> Result<(), FrameError> {
        let expected = self.compute(header, payload);
        if bool::from(expected.as_slice().ct_eq(tag)) {
            self.previous = expected.to_vec();
            Ok(())
        } else {
            Err(FrameError::BadSignature)
        }
    }
}

impl std::fmt::Debug for MacChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacChain").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn paired_chains_stay_in_step() {
        let mut sender = MacChain::new(b"secret", SERVER_LABEL).expect("key");
        let mut receiver = MacChain::new(b"secret", SERVER_LABEL).expect("key");
        for payload in [&b"one"[..], b"two", b"three"] {
            let tag = sender.sign(b"hdr", payload);
            receiver.verify(b"hdr", payload, &tag).expect("tag verifies");
        }
    }

    #[rstest]
    fn replayed_tag_fails_after_chain_advances() {
        let mut sender = MacChain::new(b"secret", CLIENT_LABEL).expect("key");
        let mut receiver = MacChain::new(b"secret", CLIENT_LABEL).expect("key");
        let tag = sender.sign(b"hdr", b"payload");
        receiver.verify(b"hdr", b"payload", &tag).expect("first use");
        let error = receiver
            .verify(b"hdr", b"payload", &tag)
            .expect_err("replay must fail");
        assert!(matches!(error, FrameError::BadSignature));
    }

    #[rstest]
    fn directions_do_not_share_tags() {
        let mut server = MacChain::new(b"secret", SERVER_LABEL).expect("key");
        let mut client = MacChain::new(b"secret", CLIENT_LABEL).expect("key");
        let tag = server.sign(b"hdr", b"payload");
        assert!(client.verify(b"hdr", b"payload", &tag).is_err());
    }

    #[rstest]
    fn wrong_key_is_rejected() {
        let mut sender = MacChain::new(b"secret", SERVER_LABEL).expect("key");
        let mut receiver = MacChain::new(b"other", SERVER_LABEL).expect("key");
        let tag = sender.sign(b"hdr", b"payload");
        assert!(receiver.verify(b"hdr", b"payload", &tag).is_err());
    }
}
