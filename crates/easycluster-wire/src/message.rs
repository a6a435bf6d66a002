//! Typed payloads for each message kind.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::PayloadError;
use crate::value::WireValue;

/// Session parameters announced by each side once the peer is trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInit {
    /// Protocol version spoken by the sender.
    pub version: String,
    /// Keepalive period requested by a client, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keepalive_interval_ms: Option<u64>,
}

/// Where a request executes on the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineSelector {
    /// On the connection's receive loop, before the next frame is read.
    Inline,
    /// On a throwaway thread; unordered with respect to everything else.
    Detached,
    /// On the named logical line, after every earlier request for that line.
    Named(String),
}

/// Method invocation.
///
/// A request naming a line but no target ends that line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    /// Correlation id. Requests without one get no response.
    #[serde(default)]
    pub id: Option<u64>,
    /// Handles the client has dropped since its last message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub garbage: Vec<u64>,
    /// Execution line.
    pub line: LineSelector,
    /// Target object handle.
    #[serde(default)]
    pub target: Option<u64>,
    /// Method name.
    #[serde(default)]
    pub method: String,
    /// Positional arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<WireValue>,
    /// Keyword arguments.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kwargs: BTreeMap<String, WireValue>,
}

/// Structured application failure returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Error class, e.g. `AttributeError` or `panic`.
    pub kind: String,
    /// Human readable description.
    pub message: String,
    /// Cause chain, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<String>,
}

/// Result carried by a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The call returned a value.
    Value(WireValue),
    /// The call failed.
    Error(RemoteError),
}

/// Reply to a request that carried an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Id of the request being answered.
    pub id: u64,
    /// Call result.
    pub outcome: Outcome,
}

/// Garbage report sent outside a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseMessage {
    /// Handles the client no longer references.
    pub handles: Vec<u64>,
}

/// Orderly shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Goodbye {
    /// Optional reason, logged by the receiver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Set when this goodbye answers one from the other side.
    #[serde(default)]
    pub acknowledge: bool,
}

/// Body of an unsigned error frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Description of the failure that ended the connection.
    pub message: String,
}

/// Serialises a payload to JSON bytes.
pub fn encode_payload<T: Serialize>(message: &T) -> Result<Vec<u8>, PayloadError> {
    Ok(serde_json::to_vec(message)?)
}

/// Parses a JSON payload.
pub fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PayloadError> {
    Ok(serde_json::from_slice(bytes)?)
}
