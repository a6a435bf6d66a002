use crate::launch::LaunchStrategy;
use crate::logging::LogFormat;

/// Default TCP port for the server.
pub const DEFAULT_PORT: u16 = 11998;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the binaries.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Launch strategy native to the host platform.
///
/// POSIX hosts fork a worker per connection; Windows duplicates the socket
/// into a freshly spawned child process.
#[must_use]
pub const fn default_launch_strategy() -> LaunchStrategy {
    if cfg!(windows) {
        LaunchStrategy::Spawn
    } else {
        LaunchStrategy::Fork
    }
}
