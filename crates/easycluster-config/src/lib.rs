//! Layered configuration for the EasyCluster server.
//!
//! Values resolve from built-in defaults, an optional configuration file,
//! `EASYCLUSTER_*` environment variables and finally command-line flags, in
//! that order of increasing precedence. Loading is delegated to
//! [`ortho_config`]; this crate owns the schema, the defaults and the helpers
//! that turn raw values (key files, launch strategy names) into typed data.

mod defaults;
mod launch;
mod logging;
mod secret;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_PORT, default_launch_strategy, default_log_filter,
    default_log_filter_string, default_log_format,
};
pub use launch::{LaunchStrategy, LaunchStrategyParseError};
pub use logging::{LogFormat, LogFormatParseError};
pub use secret::{KeyError, SHARED_SECRET_BYTES, SharedSecret, generate_key};

/// Server configuration shared by the launcher, the connection workers and
/// the binary entry point.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "EASYCLUSTER")]
pub struct Config {
    /// TCP port the launcher listens on.
    #[ortho_config(default = DEFAULT_PORT)]
    pub port: u16,
    /// Interface address to bind. `None` binds every interface.
    #[serde(default)]
    pub bind: Option<String>,
    /// Skip the dual-stack IPv6 socket and bind IPv4 only.
    #[serde(default)]
    pub disable_ipv6: bool,
    /// Source-address rules (`10.0.0.0/8`, `::1`) permitted to connect.
    /// An empty list admits every peer.
    #[serde(default)]
    pub allow: Vec<String>,
    /// Path to a file holding the hex-encoded shared secret.
    #[serde(default)]
    pub key_file: Option<Utf8PathBuf>,
    /// Hex-encoded shared secret given inline. Ignored when `key_file` is set.
    #[serde(default)]
    pub key: Option<String>,
    /// How accepted connections are handed to workers.
    #[ortho_config(default = default_launch_strategy())]
    pub launch: LaunchStrategy,
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Detach into the background before serving.
    #[serde(default)]
    pub daemonize: bool,
    /// File receiving the server PID once it is running.
    #[serde(default)]
    pub pid_file: Option<Utf8PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: None,
            disable_ipv6: false,
            allow: Vec::new(),
            key_file: None,
            key: None,
            launch: default_launch_strategy(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            daemonize: false,
            pid_file: None,
        }
    }
}

impl Config {
    /// Port the launcher binds.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Interface address to bind, if one was configured.
    #[must_use]
    pub fn bind(&self) -> Option<&str> {
        self.bind.as_deref()
    }

    /// Whether IPv6 dual-stack binding is disabled.
    #[must_use]
    pub const fn ipv6_disabled(&self) -> bool {
        self.disable_ipv6
    }

    /// Raw allow-list entries.
    #[must_use]
    pub fn allow(&self) -> &[String] {
        &self.allow
    }

    /// Connection launch strategy.
    #[must_use]
    pub const fn launch(&self) -> LaunchStrategy {
        self.launch
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Whether the server should detach into the background.
    #[must_use]
    pub const fn daemonize(&self) -> bool {
        self.daemonize
    }

    /// PID file location, if any.
    #[must_use]
    pub fn pid_file(&self) -> Option<&Utf8Path> {
        self.pid_file.as_deref()
    }

    /// Resolves the shared secret from `key_file` or `key`.
    ///
    /// Returns `Ok(None)` when neither is configured, in which case the
    /// server accepts peers without a challenge.
    pub fn shared_secret(&self) -> Result<Option<SharedSecret>, KeyError> {
        if let Some(path) = self.key_file.as_deref() {
            return SharedSecret::read_from(path).map(Some);
        }
        self.key
            .as_deref()
            .map(SharedSecret::from_hex)
            .transpose()
    }
}
