//! Translation between live values and their wire form.
//!
//! Encoding swaps every object for a [`RemoteRef`] issued by the table;
//! decoding swaps every [`WireValue::Handle`] back for the object it names.

use easycluster_wire::{RemoteRef, WireValue};
use thiserror::Error;

use super::{RemoteObjectTable, UnknownHandle, Value};

/// Errors raised while decoding client-supplied values.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The client named a handle the table does not hold.
    #[error(transparent)]
    UnknownHandle(#[from] UnknownHandle),
    /// The client sent a server-side reference instead of a bare handle.
    #[error("client sent a remote reference for handle {handle}")]
    UnexpectedRemote {
        /// Handle inside the reference.
        handle: u64,
    },
}

/// Encodes `value`, issuing handles for any objects it contains.
pub fn encode_value(table: &mut RemoteObjectTable, value: &Value) -> WireValue {
    match value {
        Value::Null => WireValue::Null,
        Value::Bool(flag) => WireValue::Bool(*flag),
        Value::Int(number) => WireValue::Int(*number),
        Value::Float(number) => WireValue::Float(*number),
        Value::Str(text) => WireValue::Str(text.clone()),
        Value::Bytes(bytes) => WireValue::Bytes(bytes.clone()),
        Value::List(items) => {
            WireValue::List(items.iter().map(|item| encode_value(table, item)).collect())
        }
        Value::Map(entries) => WireValue::Map(
            entries
                .iter()
                .map(|(key, item)| (key.clone(), encode_value(table, item)))
                .collect(),
        ),
        Value::Object(object) => {
            let exposure = table.ensure_handle(object);
            WireValue::Remote(RemoteRef {
                handle: exposure.handle,
                tag: exposure.tag.map(|tag| tag.get()),
                descriptor: exposure.descriptor,
            })
        }
    }
}

/// Decodes a client value, resolving handles against `table`.
pub fn decode_value(table: &RemoteObjectTable, wire: WireValue) -> Result<Value, DecodeError> {
    Ok(match wire {
        WireValue::Null => Value::Null,
        WireValue::Bool(flag) => Value::Bool(flag),
        WireValue::Int(number) => Value::Int(number),
        WireValue::Float(number) => Value::Float(number),
        WireValue::Str(text) => Value::Str(text),
        WireValue::Bytes(bytes) => Value::Bytes(bytes),
        WireValue::List(items) => Value::List(
            items
                .into_iter()
                .map(|item| decode_value(table, item))
                .collect::<Result<_, _>>()?,
        ),
        WireValue::Map(entries) => Value::Map(
            entries
                .into_iter()
                .map(|(key, item)| decode_value(table, item).map(|value| (key, value)))
                .collect::<Result<_, _>>()?,
        ),
        WireValue::Handle(handle) => Value::Object(table.resolve(handle)?),
        WireValue::Remote(reference) => {
            return Err(DecodeError::UnexpectedRemote {
                handle: reference.handle,
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{ObjectRef, ROOT_HANDLE, RootObject, Services};
    use crate::tests::support::Counter;
    use rstest::{fixture, rstest};
    use std::collections::BTreeMap;

    #[fixture]
    fn table() -> RemoteObjectTable {
        RemoteObjectTable::new(ObjectRef::new(RootObject::new(&Services::default())))
    }

    /// Rewrites server references the way a client echoes them back.
    fn as_client_echo(wire: WireValue) -> WireValue {
        match wire {
            WireValue::Remote(reference) => WireValue::Handle(reference.handle),
            WireValue::List(items) => WireValue::List(items.into_iter().map(as_client_echo).collect()),
            WireValue::Map(entries) => WireValue::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, as_client_echo(value)))
                    .collect(),
            ),
            other => other,
        }
    }

    #[rstest]
    fn objects_round_trip_through_handles(mut table: RemoteObjectTable) {
        let counter = ObjectRef::new(Counter::default());
        let mut map = BTreeMap::new();
        map.insert("counter".to_owned(), Value::Object(counter.clone()));
        map.insert("n".to_owned(), Value::Int(4));
        let value = Value::List(vec![Value::Map(map), Value::from("text")]);

        let wire = encode_value(&mut table, &value);
        let decoded = decode_value(&table, as_client_echo(wire)).expect("decode");

        let items = decoded.as_list().expect("list");
        let entries = items.first().and_then(Value::as_map).expect("map");
        let echoed = entries
            .get("counter")
            .and_then(Value::as_object)
            .expect("object");
        assert!(echoed.same_object(&counter));
        assert_eq!(entries.get("n").and_then(Value::as_int), Some(4));
        assert_eq!(items.get(1).and_then(Value::as_str), Some("text"));
    }

    #[rstest]
    fn re_encoding_is_idempotent(mut table: RemoteObjectTable) {
        let value = Value::Object(ObjectRef::new(Counter::default()));
        let first = encode_value(&mut table, &value);
        let decoded = decode_value(&table, as_client_echo(first.clone())).expect("decode");
        let second = encode_value(&mut table, &decoded);

        let (WireValue::Remote(first), WireValue::Remote(second)) = (first, second) else {
            panic!("objects should encode as remote references");
        };
        assert_eq!(first.handle, second.handle);
        assert!(first.descriptor.is_some());
        assert!(second.tag.is_none());
        assert!(second.descriptor.is_none());
    }

    #[rstest]
    fn unknown_handles_fail_to_decode(table: RemoteObjectTable) {
        let error = decode_value(&table, WireValue::Handle(999)).expect_err("unknown");
        assert!(matches!(
            error,
            DecodeError::UnknownHandle(UnknownHandle { handle: 999 })
        ));
    }

    #[rstest]
    fn root_handle_decodes_to_the_root(table: RemoteObjectTable) {
        let root = decode_value(&table, WireValue::Handle(ROOT_HANDLE)).expect("root");
        let root = root.as_object().expect("object");
        assert_eq!(root.descriptor().name, "RootObject");
    }

    #[rstest]
    fn client_supplied_remote_refs_are_rejected(table: RemoteObjectTable) {
        let wire = WireValue::Remote(RemoteRef {
            handle: 0,
            tag: None,
            descriptor: None,
        });
        assert!(matches!(
            decode_value(&table, wire),
            Err(DecodeError::UnexpectedRemote { handle: 0 })
        ));
    }
}
