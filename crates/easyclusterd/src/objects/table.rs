//! Handle and type-tag bookkeeping for one connection.

use std::collections::HashMap;
use std::fmt;

use easycluster_wire::TypeDescriptor;
use thiserror::Error;

use super::ObjectRef;

/// Handle permanently bound to the connection's root object.
pub const ROOT_HANDLE: u64 = 0;

/// Connection-scoped identifier for a kind of object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeTag(u32);

impl TypeTag {
    /// Numeric value sent on the wire.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What the client needs to learn about an object being returned to it.
///
/// `tag` is set only when the handle is new, and `descriptor` only when the
/// object's kind has not been described on this connection before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exposure {
    /// Handle naming the object.
    pub handle: u64,
    /// Kind of a newly issued handle.
    pub tag: Option<TypeTag>,
    /// Kind metadata on first sight of the kind.
    pub descriptor: Option<TypeDescriptor>,
}

/// The client referred to a handle the table does not hold.
///
/// Handles are only ever issued by the server, so this is a protocol error
/// and the connection is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown object handle {handle}")]
pub struct UnknownHandle {
    /// Offending handle.
    pub handle: u64,
}

/// Per-connection map between live objects and the handles the client holds.
#[derive(Debug)]
pub struct RemoteObjectTable {
    objects: HashMap<u64, ObjectRef>,
    handles: HashMap<usize, u64>,
    kinds: HashMap<TypeDescriptor, TypeTag>,
    next_handle: u64,
    next_tag: u32,
}

impl RemoteObjectTable {
    /// Table holding only `root`, at [`ROOT_HANDLE`].
    #[must_use]
    pub fn new(root: ObjectRef) -> Self {
        let mut handles = HashMap::new();
        handles.insert(root.identity(), ROOT_HANDLE);
        let mut objects = HashMap::new();
        objects.insert(ROOT_HANDLE, root);
        Self {
            objects,
            handles,
            kinds: HashMap::new(),
            next_handle: ROOT_HANDLE + 1,
            next_tag: 0,
        }
    }

    /// Returns the handle for `object`, issuing one if needed.
    ///
    /// Handles come from a counter that only moves forward, so a released
    /// handle is never reissued on the same connection.
    pub fn ensure_handle(&mut self, object: &ObjectRef) -> Exposure {
        if let Some(&handle) = self.handles.get(&object.identity()) {
            return Exposure {
                handle,
                tag: None,
                descriptor: None,
            };
        }

        let handle = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(object.identity(), handle);
        self.objects.insert(handle, object.clone());

        let descriptor = object.descriptor();
        let (tag, descriptor) = match self.kinds.get(&descriptor) {
            Some(&tag) => (tag, None),
            None => {
                let tag = TypeTag(self.next_tag);
                self.next_tag += 1;
                self.kinds.insert(descriptor.clone(), tag);
                (tag, Some(descriptor))
            }
        };
        Exposure {
            handle,
            tag: Some(tag),
            descriptor,
        }
    }

    /// Live object behind `handle`.
    pub fn resolve(&self, handle: u64) -> Result<ObjectRef, UnknownHandle> {
        self.objects
            .get(&handle)
            .cloned()
            .ok_or(UnknownHandle { handle })
    }

    /// Drops the listed handles, returning how many were held.
    ///
    /// The root handle and handles the table does not hold are ignored.
    pub fn release(&mut self, handles: &[u64]) -> usize {
        handles
            .iter()
            .filter(|&&handle| handle != ROOT_HANDLE)
            .filter_map(|handle| self.objects.remove(handle))
            .map(|object| self.handles.remove(&object.identity()))
            .count()
    }

    /// Whether `handle` is live.
    #[must_use]
    pub fn contains(&self, handle: u64) -> bool {
        self.objects.contains_key(&handle)
    }

    /// Number of live handles, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the table is empty. Never true while the root is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Number of kinds described so far.
    #[must_use]
    pub fn kind_count(&self) -> usize {
        self.kinds.len()
    }
}

#[cfg(test)]
mod tests;
