use std::error::Error as StdError;

use easycluster_wire::RemoteError;
use thiserror::Error;

/// Failure raised by an application method.
///
/// Call errors travel back to the caller inside a normal response; they
/// never close the connection.
#[derive(Debug, Error)]
pub enum CallError {
    /// The object has no method with the requested name.
    #[error("{type_name} has no method '{method}'")]
    NoMethod {
        /// Kind of the target object.
        type_name: String,
        /// Requested method.
        method: String,
    },
    /// The object has no attribute with the requested name.
    #[error("{type_name} has no attribute '{name}'")]
    NoAttribute {
        /// Kind of the target object.
        type_name: String,
        /// Requested attribute.
        name: String,
    },
    /// A required argument was not supplied.
    #[error("missing argument '{name}'")]
    MissingArgument {
        /// Argument name.
        name: String,
    },
    /// An argument had the wrong type.
    #[error("argument '{name}' must be {expected}, got {found}")]
    WrongType {
        /// Argument name.
        name: String,
        /// Expected type.
        expected: &'static str,
        /// Supplied type.
        found: &'static str,
    },
    /// A global or function name is not registered.
    #[error("name '{name}' is not defined")]
    UnknownName {
        /// Missing name.
        name: String,
    },
    /// Application-defined failure.
    #[error("{message}")]
    Application {
        /// Error class reported to the caller.
        kind: String,
        /// Description.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
    /// The method panicked.
    #[error("method panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
    },
}

impl CallError {
    /// Application failure with a class name and message.
    pub fn application(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Application {
            kind: kind.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Application failure wrapping another error, whose cause chain becomes
    /// the remote trace.
    pub fn from_error<E>(kind: impl Into<String>, error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Application {
            kind: kind.into(),
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    /// Error class reported to the caller.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::NoMethod { .. } | Self::NoAttribute { .. } => "AttributeError",
            Self::MissingArgument { .. } | Self::WrongType { .. } => "TypeError",
            Self::UnknownName { .. } => "NameError",
            Self::Application { kind, .. } => kind,
            Self::Panicked { .. } => "Panic",
        }
    }

    /// Structured form sent in a response.
    #[must_use]
    pub fn to_remote(&self) -> RemoteError {
        let mut trace = Vec::new();
        let mut cause = self.source();
        while let Some(error) = cause {
            trace.push(error.to_string());
            cause = error.source();
        }
        RemoteError {
            kind: self.kind().to_owned(),
            message: self.to_string(),
            trace,
        }
    }
}
