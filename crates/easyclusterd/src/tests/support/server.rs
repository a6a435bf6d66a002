//! Loopback server served by threads, for end-to-end tests.

use std::net::SocketAddr;
use std::sync::Arc;

use easycluster_config::SharedSecret;

use super::{Counter, Label, RecordingReporter, TestClient};
use crate::address::AllowList;
use crate::launcher::{
    ConnectionJob, ConnectionLauncher, LauncherHandle, ServerSettings, ThreadWorker,
};
use crate::objects::{Args, CallError, ObjectRef, Services, Value};
use crate::reporter::ServerReporter;

/// Shared secret used by keyed test servers.
pub const TEST_KEY: &[u8] = b"easycluster-test-key-0123456789";

/// Services with a per-connection `counter`, a `label`, an `add` function
/// and a `v2` upgrade that swaps in a `version` global.
pub fn counter_services() -> Services {
    Services::builder()
        .global("counter", || Value::Object(ObjectRef::new(Counter::default())))
        .global("label", || Value::Object(ObjectRef::new(Label::new("first"))))
        .function("add", |args: Args| -> Result<Value, CallError> {
            Ok(Value::Int(
                args.require_int(0, "a")? + args.require_int(1, "b")?,
            ))
        })
        .upgrade("v2", |_data: Value| -> Result<Services, CallError> {
            Ok(Services::builder()
                .global_value("version", Value::Int(2))
                .build())
        })
        .build()
}

/// Accept loop on an ephemeral loopback port, stopped on drop.
pub struct TestServer {
    address: SocketAddr,
    reporter: Arc<RecordingReporter>,
    handle: Option<LauncherHandle>,
}

impl TestServer {
    /// Starts serving `services`, keyed when `key` is set and limited to
    /// the `allow` entries.
    pub fn start(services: Services, key: Option<&[u8]>, allow: &[&str]) -> Self {
        let settings = ServerSettings {
            allow: AllowList::from_strings(allow).expect("allow-list"),
            secret: key.map(|bytes| SharedSecret::from_bytes(bytes).expect("test key")),
            ..ServerSettings::loopback()
        };
        let reporter = Arc::new(RecordingReporter::default());
        let shared = Arc::clone(&reporter) as Arc<dyn ServerReporter>;
        let job = ConnectionJob::new(services, settings.secret.clone(), Arc::clone(&shared));
        let launcher = ConnectionLauncher::bind(&settings, Box::new(ThreadWorker::new(job)), shared)
            .expect("bind loopback launcher");
        let address = launcher.local_addr().expect("local addr");
        let handle = launcher.start().expect("start launcher");
        Self {
            address,
            reporter,
            handle: Some(handle),
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn reporter(&self) -> &RecordingReporter {
        &self.reporter
    }

    /// Connects a client holding `key` for both directions.
    pub fn client(&self, key: Option<&[u8]>) -> TestClient {
        TestClient::connect(self.address, key)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop();
            let _ = handle.join();
        }
    }
}
