use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;

/// Length of a challenge nonce.
pub const NONCE_BYTES: usize = 32;

const TIMESTAMP_BYTES: usize = 8;

/// Challenge nonce: an eight-byte big-endian timestamp followed by random
/// bytes, so nonces never repeat even with a weak random source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_BYTES]);

impl Nonce {
    /// Draws a fresh nonce.
    #[must_use]
    #[expect(
        clippy::big_endian_bytes,
        reason = "the timestamp prefix is big-endian on the wire"
    )]
    pub fn generate() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        let mut bytes = [0_u8; NONCE_BYTES];
        let (stamp, random) = bytes.split_at_mut(TIMESTAMP_BYTES);
        stamp.copy_from_slice(&nanos.to_be_bytes());
        rand::thread_rng().fill_bytes(random);
        Self(bytes)
    }

    /// Raw nonce bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; NONCE_BYTES] {
        &self.0
    }

    /// Whether `echo` reproduces this nonce exactly.
    #[must_use]
    pub fn matches(&self, echo: &[u8]) -> bool {
        self.0.as_slice() == echo
    }
}
