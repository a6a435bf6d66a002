//! Launcher settings resolved from configuration.

use easycluster_config::{Config, LaunchStrategy, LogFormat, SharedSecret};
use tracing::warn;

use super::{LAUNCHER_TARGET, LauncherError};
use crate::address::AllowList;

/// Everything the launcher needs, resolved from configuration.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// TCP port.
    pub port: u16,
    /// Interface address; `None` binds every interface.
    pub bind: Option<String>,
    /// Bind IPv4 only.
    pub disable_ipv6: bool,
    /// Peers permitted to connect.
    pub allow: AllowList,
    /// Key for the challenge and frame signatures.
    pub secret: Option<SharedSecret>,
    /// How accepted connections are served.
    pub launch: LaunchStrategy,
    /// Filter handed to spawned connection runners.
    pub log_filter: String,
    /// Format handed to spawned connection runners.
    pub log_format: LogFormat,
}

impl ServerSettings {
    /// Resolves the allow-list and shared secret named by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error when an allow-list entry is malformed, the key
    /// cannot be read or the launch strategy is unavailable here.
    pub fn from_config(config: &Config) -> Result<Self, LauncherError> {
        let launch = config.launch();
        if !launch.is_supported() {
            return Err(LauncherError::UnsupportedStrategy { strategy: launch });
        }
        let secret = config.shared_secret()?;
        if secret.is_none() {
            warn!(
                target: LAUNCHER_TARGET,
                "no shared secret configured; connections will not be authenticated"
            );
        }
        Ok(Self {
            port: config.port(),
            bind: config.bind().map(str::to_owned),
            disable_ipv6: config.ipv6_disabled(),
            allow: AllowList::from_strings(config.allow())?,
            secret,
            launch,
            log_filter: config.log_filter().to_owned(),
            log_format: config.log_format(),
        })
    }

    /// Loopback settings on an ephemeral port served by threads.
    #[must_use]
    pub fn loopback() -> Self {
        Self {
            port: 0,
            bind: Some("127.0.0.1".to_owned()),
            disable_ipv6: true,
            allow: AllowList::default(),
            secret: None,
            launch: LaunchStrategy::Thread,
            log_filter: easycluster_config::DEFAULT_LOG_FILTER.to_owned(),
            log_format: LogFormat::default(),
        }
    }
}
