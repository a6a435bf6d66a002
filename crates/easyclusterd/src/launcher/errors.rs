//! Error types for binding and running the launcher.

use std::io;
use std::net::SocketAddr;

use easycluster_config::{KeyError, LaunchStrategy};
use thiserror::Error;

use crate::address::AddressFormatError;

/// Errors surfaced while binding the listener or launching workers.
#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("failed to resolve bind address {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("no usable addresses resolved for {host}:{port}")]
    ResolveEmpty { host: String, port: u16 },
    #[error("failed to bind TCP listener at {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to configure listener: {source}")]
    Listener {
        #[source]
        source: io::Error,
    },
    #[error("invalid allow-list entry: {0}")]
    AllowList(#[from] AddressFormatError),
    #[error("failed to load shared secret: {0}")]
    Key(#[from] KeyError),
    #[error("launch strategy '{strategy}' is not supported on this platform")]
    UnsupportedStrategy { strategy: LaunchStrategy },
    #[error("failed to start {strategy} worker: {source}")]
    Worker {
        strategy: LaunchStrategy,
        #[source]
        source: io::Error,
    },
    #[error("accept loop thread panicked")]
    ThreadPanic,
}

impl LauncherError {
    pub(crate) fn worker(strategy: LaunchStrategy) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Worker { strategy, source }
    }
}
