//! In-process connections without a listener.

use std::io;
use std::sync::Arc;
use std::thread;

use tracing::debug;

use crate::objects::Services;
use crate::reporter::{ServerReporter, StructuredReporter};
use crate::server::{ConnectionStream, serve_connection};

const LOCAL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::local");

/// Serves `services` over one end of a connected local socket pair on a
/// background thread and returns the other end. No shared secret is used;
/// the peer receives INIT straight away.
///
/// # Errors
///
/// Returns an error when the socket pair or the thread cannot be created.
pub fn spawn_local(services: &Services) -> io::Result<ConnectionStream> {
    let (client, server) = local_pair()?;
    let services = services.clone();
    let reporter: Arc<dyn ServerReporter> = Arc::new(StructuredReporter::new());
    thread::Builder::new()
        .name("easycluster-local".to_owned())
        .spawn(move || {
            if let Err(error) = serve_connection(server, None, &services, reporter) {
                debug!(target: LOCAL_TARGET, error = %error, "local connection ended");
            }
        })?;
    Ok(client)
}

#[cfg(unix)]
fn local_pair() -> io::Result<(ConnectionStream, ConnectionStream)> {
    let (client, server) = std::os::unix::net::UnixStream::pair()?;
    Ok((client.into(), server.into()))
}

#[cfg(not(unix))]
fn local_pair() -> io::Result<(ConnectionStream, ConnectionStream)> {
    use std::net::{Ipv4Addr, TcpListener, TcpStream};

    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let client = TcpStream::connect(listener.local_addr()?)?;
    let (server, _) = listener.accept()?;
    Ok((client.into(), server.into()))
}
