//! Values as they appear inside request and response payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata a peer needs to build a local proxy for a kind of remote object.
///
/// Two objects share a kind exactly when their descriptors are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Kind name, for diagnostics and proxy naming.
    pub name: String,
    /// Callable members.
    #[serde(default)]
    pub methods: Vec<String>,
    /// Plain attributes, fetched on every access.
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Attributes the peer may cache after the first fetch.
    #[serde(default)]
    pub cached_attributes: Vec<String>,
}

impl TypeDescriptor {
    /// Descriptor with a name and no members.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
            attributes: Vec::new(),
            cached_attributes: Vec::new(),
        }
    }

    /// Adds callable members.
    #[must_use]
    pub fn with_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods.extend(methods.into_iter().map(Into::into));
        self
    }

    /// Adds plain attributes.
    #[must_use]
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Adds cacheable attributes.
    #[must_use]
    pub fn with_cached_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cached_attributes
            .extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Whether `name` is listed as a method.
    #[must_use]
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.iter().any(|method| method == name)
    }
}

/// Reference to a server object sent in place of the object itself.
///
/// `tag` is present the first time a handle is issued; `descriptor` only the
/// first time its kind is seen on the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRef {
    /// Handle naming the object for the rest of the connection.
    pub handle: u64,
    /// Kind of the object, sent when the handle is new.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<u32>,
    /// Kind metadata, sent when the kind is new.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<TypeDescriptor>,
}

/// Dynamic value crossing the connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireValue {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 text.
    Str(String),
    /// Opaque bytes.
    Bytes(Vec<u8>),
    /// Ordered sequence.
    List(Vec<WireValue>),
    /// String-keyed mapping.
    Map(BTreeMap<String, WireValue>),
    /// Server object exposed to the client.
    Remote(RemoteRef),
    /// Client reference back to a server object it was previously given.
    Handle(u64),
}
