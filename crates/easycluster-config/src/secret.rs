//! Shared-secret loading and generation.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use rand::RngCore;
use thiserror::Error;

/// Length in bytes of keys produced by [`generate_key`].
pub const SHARED_SECRET_BYTES: usize = 32;

/// Secret shared between the server and its clients, used to key the
/// challenge/response handshake and the per-frame signatures.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(Vec<u8>);

impl SharedSecret {
    /// Wraps raw key bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, KeyError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(KeyError::Empty);
        }
        Ok(Self(bytes))
    }

    /// Decodes hex text. Whitespace, including the trailing newline a key
    /// file usually ends with, is ignored.
    pub fn from_hex(text: &str) -> Result<Self, KeyError> {
        let compact: String = text.chars().filter(|ch| !ch.is_whitespace()).collect();
        let bytes = hex::decode(&compact).map_err(|source| KeyError::Decode { source })?;
        Self::from_bytes(bytes)
    }

    /// Reads a hex key file.
    pub fn read_from(path: &Utf8Path) -> Result<Self, KeyError> {
        let text = fs::read_to_string(path).map_err(|source| KeyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_hex(&text)
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecret")
            .field("len", &self.0.len())
            .finish_non_exhaustive()
    }
}

/// Errors raised while loading or writing shared secrets.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The key file could not be read.
    #[error("failed to read key file '{path}': {source}")]
    Read {
        /// Key file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The key text was not valid hex.
    #[error("key is not valid hex: {source}")]
    Decode {
        /// Underlying decode error.
        #[source]
        source: hex::FromHexError,
    },
    /// The key decoded to zero bytes.
    #[error("key must not be empty")]
    Empty,
    /// Writing a generated key failed.
    #[error("failed to write key file '{path}': {source}")]
    Write {
        /// Key file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Writes a fresh random key to `path` as hex and returns it.
///
/// The file is created with owner-only permissions on Unix. An existing file
/// is left untouched unless `overwrite` is set.
pub fn generate_key(path: &Utf8Path, overwrite: bool) -> Result<SharedSecret, KeyError> {
    let mut bytes = vec![0_u8; SHARED_SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);

    let mut options = OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let write_error = |source| KeyError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut file = options.open(path).map_err(write_error)?;
    writeln!(file, "{}", hex::encode(&bytes)).map_err(write_error)?;
    file.sync_all().map_err(write_error)?;
    SharedSecret::from_bytes(bytes)
}
