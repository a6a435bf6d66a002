//! Unit tests for the remote object table.

use rstest::{fixture, rstest};

use super::*;
use crate::objects::{ObjectRef, RootObject, Services};
use crate::tests::support::{Counter, Label};

#[fixture]
fn table() -> RemoteObjectTable {
    let root = ObjectRef::new(RootObject::new(&Services::default()));
    RemoteObjectTable::new(root)
}

#[rstest]
fn root_sits_at_handle_zero(table: RemoteObjectTable) {
    assert!(table.contains(ROOT_HANDLE));
    assert_eq!(table.len(), 1);
    let root = table.resolve(ROOT_HANDLE).expect("root resolves");
    assert_eq!(root.descriptor().name, "RootObject");
}

#[rstest]
fn exposing_twice_reuses_the_handle_and_describes_once(mut table: RemoteObjectTable) {
    let counter = ObjectRef::new(Counter::default());

    let first = table.ensure_handle(&counter);
    assert!(first.handle > ROOT_HANDLE);
    assert!(first.tag.is_some());
    assert!(first.descriptor.is_some());

    let second = table.ensure_handle(&counter);
    assert_eq!(second.handle, first.handle);
    assert_eq!(second.tag, None);
    assert_eq!(second.descriptor, None);
}

#[rstest]
fn second_object_of_a_kind_gets_only_the_tag(mut table: RemoteObjectTable) {
    let first = table.ensure_handle(&ObjectRef::new(Counter::default()));
    let second = table.ensure_handle(&ObjectRef::new(Counter::default()));
    assert_ne!(first.handle, second.handle);
    assert_eq!(first.tag, second.tag);
    assert!(second.descriptor.is_none());

    let label = table.ensure_handle(&ObjectRef::new(Label::new("x")));
    assert_ne!(label.tag, first.tag);
    assert!(label.descriptor.is_some());
    assert_eq!(table.kind_count(), 2);
}

#[rstest]
fn released_handles_no_longer_resolve(mut table: RemoteObjectTable) {
    let counter = ObjectRef::new(Counter::default());
    let exposure = table.ensure_handle(&counter);

    assert_eq!(table.release(&[exposure.handle]), 1);
    let error = table.resolve(exposure.handle).expect_err("released");
    assert_eq!(error, UnknownHandle {
        handle: exposure.handle
    });
}

#[rstest]
fn released_handles_are_never_reissued(mut table: RemoteObjectTable) {
    let counter = ObjectRef::new(Counter::default());
    let first = table.ensure_handle(&counter);
    table.release(&[first.handle]);

    let again = table.ensure_handle(&counter);
    assert!(again.handle > first.handle);
    // The kind stays cached even though every object of it was released.
    assert!(again.descriptor.is_none());
    assert!(again.tag.is_some());
}

#[rstest]
fn root_and_unknown_handles_survive_release(mut table: RemoteObjectTable) {
    assert_eq!(table.release(&[ROOT_HANDLE, 999]), 0);
    assert!(table.contains(ROOT_HANDLE));
}

#[rstest]
fn never_issued_handle_is_unknown(table: RemoteObjectTable) {
    assert!(matches!(
        table.resolve(999),
        Err(UnknownHandle { handle: 999 })
    ));
}

#[rstest]
fn exposing_the_root_returns_handle_zero(mut table: RemoteObjectTable) {
    let root = table.resolve(ROOT_HANDLE).expect("root");
    let exposure = table.ensure_handle(&root);
    assert_eq!(exposure.handle, ROOT_HANDLE);
    assert!(exposure.tag.is_none());
}
