//! Request execution and logical-line ordering for one connection.
//!
//! Every request names where it runs. Inline requests execute on the
//! receive loop before the next frame is read, detached requests on a
//! throwaway thread, and requests for a named [`LogicalLine`] on that line's
//! worker thread in arrival order. Lines are independent of each other: a
//! stuck call blocks only its own line.
//!
//! Results travel back through a [`ReplySink`], which the connection server
//! implements on top of its send lock. Fatal errors raised on a worker are
//! recorded on the shared [`ExecutionContext`] and the sink is asked to
//! abort the connection, which wakes the receive loop.

mod errors;
mod executor;
mod request;
mod router;

pub use self::errors::DispatchError;
pub use self::executor::{ExecutionContext, ReplySink, Step, execute};
pub use self::request::{LogicalLine, PendingRequest, Route, Routing};
pub use self::router::DispatchRouter;

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
