//! Protocol state machine for one client connection.
//!
//! A [`ConnectionServer`] authenticates the peer, then runs the receive loop:
//! frames are read with a bounded wait so keepalives, worker failures and
//! hot-swap handoffs are noticed even while the peer is silent. Requests are
//! handed to the connection's [`DispatchRouter`](crate::dispatch::DispatchRouter).

mod connection;
mod errors;
mod handshake;
mod session;
mod stream;

use std::time::Duration;

pub use self::connection::{ConnectionServer, ConnectionState, RunOutcome, serve_connection};
pub use self::errors::ServerError;
pub use self::stream::ConnectionStream;

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

/// Longest the receive loop blocks before checking for worker events.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Time a keyed peer has to answer the challenge.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
