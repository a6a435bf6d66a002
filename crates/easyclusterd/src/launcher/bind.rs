//! Listening socket setup.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, ToSocketAddrs};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::debug;

use super::{LAUNCHER_TARGET, LauncherError};

const LISTEN_BACKLOG: i32 = 128;

/// Binds the configured address.
///
/// Without an explicit address the launcher prefers one dual-stack IPv6
/// socket and falls back to IPv4 when the platform refuses it or IPv6 is
/// disabled.
pub(crate) fn bind_listener(
    host: Option<&str>,
    port: u16,
    disable_ipv6: bool,
) -> Result<TcpListener, LauncherError> {
    let candidates = match host {
        Some(host) => resolve(host, port, disable_ipv6)?,
        None => wildcard_addresses(port, disable_ipv6),
    };

    let mut last_failure = None;
    for address in candidates {
        match bind_socket(address) {
            Ok(listener) => return Ok(listener),
            Err(source) => {
                debug!(
                    target: LAUNCHER_TARGET,
                    address = %address,
                    error = %source,
                    "bind attempt failed"
                );
                last_failure = Some(LauncherError::Bind {
                    addr: address,
                    source,
                });
            }
        }
    }
    Err(last_failure.unwrap_or_else(|| LauncherError::ResolveEmpty {
        host: host.unwrap_or("*").to_owned(),
        port,
    }))
}

fn wildcard_addresses(port: u16, disable_ipv6: bool) -> Vec<SocketAddr> {
    let ipv4 = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    if disable_ipv6 {
        vec![ipv4]
    } else {
        vec![SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)), ipv4]
    }
}

fn resolve(host: &str, port: u16, disable_ipv6: bool) -> Result<Vec<SocketAddr>, LauncherError> {
    let addresses: Vec<SocketAddr> = match host.parse::<IpAddr>() {
        Ok(ip) => vec![SocketAddr::new(ip, port)],
        Err(_) => (host, port)
            .to_socket_addrs()
            .map_err(|source| LauncherError::Resolve {
                host: host.to_owned(),
                port,
                source,
            })?
            .collect(),
    };
    let usable: Vec<SocketAddr> = addresses
        .into_iter()
        .filter(|address| !(disable_ipv6 && address.is_ipv6()))
        .collect();
    if usable.is_empty() {
        return Err(LauncherError::ResolveEmpty {
            host: host.to_owned(),
            port,
        });
    }
    Ok(usable)
}

fn bind_socket(address: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))?;
    if address.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    #[cfg(unix)]
    socket.set_reuse_address(true)?;
    socket.bind(&address.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    Ok(socket.into())
}
