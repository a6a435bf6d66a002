//! EasyCluster server: exposes live server-side objects to remote peers.
//!
//! A [`ConnectionLauncher`] owns the listening socket. Peers that pass the
//! [`AllowList`] are served by a forked child, a spawned child process or a
//! thread, depending on the configured [`LaunchStrategy`]. Each connection
//! authenticates the peer against the shared secret, then runs a
//! [`ConnectionServer`] whose receive loop hands requests to a
//! [`DispatchRouter`]. Objects returned from calls stay on the server; the
//! connection's [`RemoteObjectTable`] gives the peer opaque handles to them
//! until the peer reports them as garbage.
//!
//! Applications describe what a connection can reach with [`Services`]:
//! globals, functions and upgrade hooks that the root object (handle 0)
//! exposes. An upgrade hook may replace a connection's services mid-session
//! without dropping the authenticated socket.
//!
//! [`LaunchStrategy`]: easycluster_config::LaunchStrategy

mod address;
mod bootstrap;
pub mod dispatch;
pub mod launcher;
mod local;
pub mod objects;
mod process;
mod reporter;
pub mod server;
mod telemetry;

pub use address::{AddressFamily, AddressFormatError, AddressRule, AllowList};
pub use bootstrap::{ConfigLoader, StaticConfigLoader, SystemConfigLoader};
pub use dispatch::DispatchRouter;
pub use launcher::{ConnectionLauncher, LauncherError, LauncherHandle, ServerSettings, StopHandle};
pub use local::spawn_local;
pub use objects::{RemoteObject, RemoteObjectTable, Services, Value};
pub use process::{LaunchError, run_daemon, run_server};
pub use reporter::{ServerReporter, StructuredReporter};
pub use server::{ConnectionServer, ConnectionStream, ServerError, serve_connection};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
