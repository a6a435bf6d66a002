//! Test harness utilities shared by unit and behavioural suites.

mod client;
mod objects;
mod reporter;
mod server;
mod sink;

pub use client::{CLIENT_TIMEOUT, Closure, TestClient, int_value, remote_handle};
pub use objects::{Counter, Label};
pub use reporter::{RecordingReporter, ReporterEvent};
pub use server::{TEST_KEY, TestServer, counter_services};
pub use sink::RecordingSink;
