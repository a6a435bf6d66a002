//! Requests as the router sees them.

use std::collections::BTreeMap;
use std::fmt;

use easycluster_wire::{LineSelector, RequestMessage, WireValue};

use super::errors::DispatchError;

/// Caller-chosen key; requests sharing one execute in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalLine(String);

impl LogicalLine {
    /// Line with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name of the line.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a request executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// On the receive loop.
    Inline,
    /// On a throwaway thread.
    Detached,
    /// On the named line's worker.
    Line(LogicalLine),
}

impl Route {
    /// Short label for logs and errors.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Detached => "detached",
            Self::Line(_) => "line",
        }
    }
}

impl From<LineSelector> for Route {
    fn from(selector: LineSelector) -> Self {
        match selector {
            LineSelector::Inline => Self::Inline,
            LineSelector::Detached => Self::Detached,
            LineSelector::Named(name) => Self::Line(LogicalLine(name)),
        }
    }
}

/// Method invocation waiting to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    /// Correlation id; `None` suppresses the response.
    pub id: Option<u64>,
    /// Target handle.
    pub target: u64,
    /// Method name.
    pub method: String,
    /// Encoded positional arguments.
    pub args: Vec<WireValue>,
    /// Encoded keyword arguments.
    pub kwargs: BTreeMap<String, WireValue>,
}

/// What an inbound request asks the router to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Routing {
    /// Execute a call.
    Call {
        /// Where it runs.
        route: Route,
        /// The call itself.
        request: PendingRequest,
    },
    /// Finish the queued work on a line, then retire its worker.
    EndLine(LogicalLine),
}

impl Routing {
    /// Interprets a request message. The garbage list is ignored; the server
    /// releases it before routing.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::MissingTarget`] when an inline or detached
    /// request names no target.
    pub fn from_message(message: RequestMessage) -> Result<Self, DispatchError> {
        let route = Route::from(message.line);
        let Some(target) = message.target else {
            return match route {
                Route::Line(line) => Ok(Self::EndLine(line)),
                other => Err(DispatchError::MissingTarget {
                    route: other.label(),
                }),
            };
        };
        Ok(Self::Call {
            route,
            request: PendingRequest {
                id: message.id,
                target,
                method: message.method,
                args: message.args,
                kwargs: message.kwargs,
            },
        })
    }
}
