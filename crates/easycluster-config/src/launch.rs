use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How the launcher hands an accepted connection to a worker.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LaunchStrategy {
    /// Fork the launcher; the child serves the connection and exits.
    Fork,
    /// Spawn the current executable and pass it a duplicated socket.
    Spawn,
    /// Serve on a dedicated thread inside the launcher process.
    Thread,
}

impl LaunchStrategy {
    /// Whether the strategy can run on the current platform.
    #[must_use]
    pub const fn is_supported(self) -> bool {
        match self {
            Self::Fork => cfg!(unix),
            Self::Spawn => cfg!(windows),
            Self::Thread => true,
        }
    }
}

/// Errors encountered while parsing a [`LaunchStrategy`] from text.
pub type LaunchStrategyParseError = strum::ParseError;
