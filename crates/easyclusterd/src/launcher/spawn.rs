//! Process-per-connection serving on Windows.
//!
//! Windows cannot fork, so the launcher starts a fresh copy of the current
//! executable with [`RUNNER_ARG`], duplicates the accepted socket into it
//! with `WSADuplicateSocketW` and writes a JSON handoff to the child's
//! stdin. The child rebuilds the socket and serves it.

use std::env;
use std::io::{self, Read, Write};
use std::mem;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::windows::io::{AsRawSocket, FromRawSocket, RawSocket};
use std::process::{Command, Stdio};
use std::ptr;
use std::slice;

use easycluster_config::{KeyError, LaunchStrategy, LogFormat, SharedSecret};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use windows_sys::Win32::Networking::WinSock::{
    FROM_PROTOCOL_INFO, INVALID_SOCKET, SOCKET, WSA_FLAG_OVERLAPPED, WSADATA,
    WSADuplicateSocketW, WSAGetLastError, WSAPROTOCOL_INFOW, WSASocketW, WSAStartup,
};

use super::worker::{AcceptedConnection, ConnectionJob, ConnectionWorker};
use super::{LAUNCHER_TARGET, LauncherError};
use crate::objects::Services;
use crate::reporter::StructuredReporter;
use crate::server::ServerError;
use crate::telemetry::{self, TelemetryError};

/// Command-line flag that turns the binary into a single-connection runner.
pub const RUNNER_ARG: &str = "--easycluster-run-connection";

const WINSOCK_VERSION: u16 = 0x0202;

#[derive(Debug, Serialize, Deserialize)]
struct Handoff {
    protocol_info: String,
    peer: SocketAddr,
    secret: Option<String>,
    log_filter: String,
    log_format: LogFormat,
}

/// Errors raised inside a spawned connection runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The handoff could not be read from stdin.
    #[error("failed to read connection handoff: {0}")]
    Read(#[source] io::Error),
    /// The handoff was not valid JSON.
    #[error("malformed connection handoff: {0}")]
    Handoff(#[from] serde_json::Error),
    /// The duplicated protocol information was unusable.
    #[error("malformed socket protocol information")]
    ProtocolInfo,
    /// The socket could not be rebuilt.
    #[error("failed to rebuild socket: {0}")]
    Socket(#[source] io::Error),
    /// The shared secret did not decode.
    #[error(transparent)]
    Key(#[from] KeyError),
    /// Logging could not be configured.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// The connection ended with an error.
    #[error(transparent)]
    Serve(#[from] ServerError),
}

/// Starts one child process per connection.
#[derive(Debug)]
pub struct SpawnWorker {
    job: ConnectionJob,
    log_filter: String,
    log_format: LogFormat,
}

impl SpawnWorker {
    /// Worker handing connections to children that log like the launcher.
    pub fn new(job: ConnectionJob, log_filter: String, log_format: LogFormat) -> Self {
        Self {
            job,
            log_filter,
            log_format,
        }
    }

    fn handoff(&self, stream: &TcpStream, peer: SocketAddr, child: u32) -> io::Result<Handoff> {
        // SAFETY: WSAPROTOCOL_INFOW is plain data; zero is a valid pattern.
        let mut info: WSAPROTOCOL_INFOW = unsafe { mem::zeroed() };
        let socket = socket_handle(stream.as_raw_socket())?;
        // SAFETY: `socket` is a live socket owned by `stream` and `info`
        // is a valid out-pointer for the duration of the call.
        if unsafe { WSADuplicateSocketW(socket, child, &mut info) } != 0 {
            return Err(last_socket_error());
        }
        // SAFETY: `info` is initialised and outlives the borrowed slice.
        let bytes = unsafe {
            slice::from_raw_parts(
                ptr::from_ref(&info).cast::<u8>(),
                mem::size_of::<WSAPROTOCOL_INFOW>(),
            )
        };
        Ok(Handoff {
            protocol_info: hex::encode(bytes),
            peer,
            secret: self.job.secret().map(|secret| hex::encode(secret.as_bytes())),
            log_filter: self.log_filter.clone(),
            log_format: self.log_format,
        })
    }
}

impl ConnectionWorker for SpawnWorker {
    fn launch(
        &self,
        connection: AcceptedConnection,
        _listener: &TcpListener,
    ) -> Result<(), LauncherError> {
        let executable =
            env::current_exe().map_err(LauncherError::worker(LaunchStrategy::Spawn))?;
        let mut child = Command::new(executable)
            .arg(RUNNER_ARG)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(LauncherError::worker(LaunchStrategy::Spawn))?;

        let sent = self
            .handoff(&connection.stream, connection.peer, child.id())
            .and_then(|handoff| serde_json::to_vec(&handoff).map_err(io::Error::other))
            .and_then(|payload| match child.stdin.take() {
                Some(mut stdin) => stdin.write_all(&payload),
                None => Err(io::Error::other("child stdin unavailable")),
            });
        if let Err(error) = sent {
            if let Err(kill_error) = child.kill() {
                debug!(target: LAUNCHER_TARGET, error = %kill_error, "could not kill runner");
            }
            return Err(LauncherError::worker(LaunchStrategy::Spawn)(error));
        }
        debug!(
            target: LAUNCHER_TARGET,
            child = child.id(),
            peer = %connection.peer,
            "connection handed to runner"
        );
        Ok(())
    }
}

/// Entry point for a process started with [`RUNNER_ARG`]: reads the handoff
/// from stdin and serves the duplicated socket with `services`.
///
/// # Errors
///
/// Returns an error when the handoff is unusable or the connection ends
/// with an error.
pub fn run_connection_runner(services: &Services) -> Result<(), RunnerError> {
    let mut input = Vec::new();
    io::stdin().read_to_end(&mut input).map_err(RunnerError::Read)?;
    let handoff: Handoff = serde_json::from_slice(&input)?;
    telemetry::initialise(&handoff.log_filter, handoff.log_format)?;

    let stream = rebuild_socket(&handoff.protocol_info)?;
    let secret = handoff
        .secret
        .as_deref()
        .map(SharedSecret::from_hex)
        .transpose()?;
    debug!(target: LAUNCHER_TARGET, peer = %handoff.peer, "runner serving connection");
    let job = ConnectionJob::new(
        services.clone(),
        secret,
        std::sync::Arc::new(StructuredReporter::new()),
    );
    Ok(job.serve(stream.into())?)
}

fn rebuild_socket(protocol_info: &str) -> Result<TcpStream, RunnerError> {
    let bytes = hex::decode(protocol_info).map_err(|_| RunnerError::ProtocolInfo)?;
    if bytes.len() != mem::size_of::<WSAPROTOCOL_INFOW>() {
        return Err(RunnerError::ProtocolInfo);
    }
    // SAFETY: the length matches and the struct is plain data.
    let info: WSAPROTOCOL_INFOW = unsafe { ptr::read_unaligned(bytes.as_ptr().cast()) };

    // SAFETY: WSADATA is plain data and is only written by the call.
    let mut data: WSADATA = unsafe { mem::zeroed() };
    // SAFETY: `data` is a valid out-pointer.
    if unsafe { WSAStartup(WINSOCK_VERSION, &mut data) } != 0 {
        return Err(RunnerError::Socket(last_socket_error()));
    }
    // SAFETY: `info` came from WSADuplicateSocketW targeting this process.
    let socket = unsafe {
        WSASocketW(
            FROM_PROTOCOL_INFO,
            FROM_PROTOCOL_INFO,
            FROM_PROTOCOL_INFO,
            &info,
            0,
            WSA_FLAG_OVERLAPPED,
        )
    };
    if socket == INVALID_SOCKET {
        return Err(RunnerError::Socket(last_socket_error()));
    }
    let raw = RawSocket::try_from(socket).map_err(|_| RunnerError::ProtocolInfo)?;
    // SAFETY: `socket` is a fresh handle owned by nothing else.
    Ok(unsafe { TcpStream::from_raw_socket(raw) })
}

fn socket_handle(raw: RawSocket) -> io::Result<SOCKET> {
    SOCKET::try_from(raw).map_err(|_| io::Error::other("socket handle out of range"))
}

fn last_socket_error() -> io::Error {
    // SAFETY: reads thread-local Winsock state only.
    io::Error::from_raw_os_error(unsafe { WSAGetLastError() })
}
