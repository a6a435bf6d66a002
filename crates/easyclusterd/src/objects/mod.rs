//! Server objects and the per-connection table that exposes them.
//!
//! Applications implement [`RemoteObject`] for anything a client should be
//! able to call. Objects returned from a call are never copied to the client;
//! the [`RemoteObjectTable`] assigns them a handle the first time they cross
//! the connection and keeps them alive until the client reports the handle as
//! garbage or the connection closes.

mod args;
pub(crate) mod codec;
mod errors;
mod root;
mod services;
mod table;
mod value;

use easycluster_wire::TypeDescriptor;

pub use args::Args;
pub use errors::CallError;
pub use root::{ROOT_METHODS, RootObject};
pub use services::{RemoteFunction, Services, ServicesBuilder, Successor, UpgradeHook};
pub use table::{Exposure, ROOT_HANDLE, RemoteObjectTable, TypeTag, UnknownHandle};
pub use value::{ObjectRef, Value};

/// Object callable from the other end of a connection.
///
/// Methods run on whichever thread the dispatch router picks, possibly
/// concurrently with other calls on the same object, so implementations
/// guard their own state.
pub trait RemoteObject: Send + Sync + 'static {
    /// Kind metadata. Objects returning equal descriptors share a type tag.
    fn descriptor(&self) -> TypeDescriptor;

    /// Invokes `method` with the decoded arguments.
    fn call_method(&self, method: &str, args: Args) -> Result<Value, CallError>;

    /// Reads an attribute.
    fn get_attribute(&self, name: &str) -> Result<Value, CallError> {
        Err(CallError::NoAttribute {
            type_name: self.descriptor().name,
            name: name.to_owned(),
        })
    }

    /// Writes an attribute.
    fn set_attribute(&self, name: &str, value: Value) -> Result<(), CallError> {
        drop(value);
        Err(CallError::NoAttribute {
            type_name: self.descriptor().name,
            name: name.to_owned(),
        })
    }

    /// Deletes an attribute.
    fn delete_attribute(&self, name: &str) -> Result<(), CallError> {
        Err(CallError::NoAttribute {
            type_name: self.descriptor().name,
            name: name.to_owned(),
        })
    }
}
