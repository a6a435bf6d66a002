//! Behavioural tests for allow-list enforcement at accept time.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::tests::support::{
    CLIENT_TIMEOUT, ReporterEvent, TestClient, TestServer, counter_services,
};

#[derive(Default)]
struct AccessWorld {
    server: Option<TestServer>,
    client: Option<TestClient>,
}

impl AccessWorld {
    fn server(&self) -> &TestServer {
        self.server.as_ref().expect("server should be running")
    }

    fn client(&mut self) -> &mut TestClient {
        self.client.as_mut().expect("peer should be connected")
    }

    fn saw(&self, predicate: impl Fn(&ReporterEvent) -> bool) -> bool {
        self.server().reporter().wait_for(predicate, CLIENT_TIMEOUT)
    }
}

impl Drop for AccessWorld {
    fn drop(&mut self) {
        self.client = None;
        self.server = None;
    }
}

#[fixture]
fn world() -> RefCell<AccessWorld> {
    RefCell::new(AccessWorld::default())
}

#[given("a server allowing {rule}")]
fn given_server_allowing(world: &RefCell<AccessWorld>, rule: String) {
    world.borrow_mut().server = Some(TestServer::start(
        counter_services(),
        None,
        &[rule.as_str()],
    ));
}

#[given("a server with no allow-list")]
fn given_unrestricted_server(world: &RefCell<AccessWorld>) {
    world.borrow_mut().server = Some(TestServer::start(counter_services(), None, &[]));
}

#[when("a peer connects")]
fn when_peer_connects(world: &RefCell<AccessWorld>) {
    let mut world = world.borrow_mut();
    let client = world.server().client(None);
    world.client = Some(client);
}

#[then("the peer is accepted")]
fn then_peer_accepted(world: &RefCell<AccessWorld>) {
    assert!(
        world
            .borrow()
            .saw(|event| matches!(event, ReporterEvent::Accepted(_)))
    );
}

#[then("the peer is rejected")]
fn then_peer_rejected(world: &RefCell<AccessWorld>) {
    let world = world.borrow();
    assert!(world.saw(|event| matches!(event, ReporterEvent::Rejected(_))));
    let events = world.server().reporter().events();
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, ReporterEvent::Accepted(_))),
        "rejected peer was also accepted: {events:?}"
    );
}

#[then("the peer completes the handshake")]
fn then_peer_handshakes(world: &RefCell<AccessWorld>) {
    let init = world.borrow_mut().client().handshake(None);
    assert!(easycluster_wire::version_is_compatible(&init.version));
}

#[then("the peer sees the connection close without an error")]
fn then_peer_sees_close(world: &RefCell<AccessWorld>) {
    let closure = world.borrow_mut().client().expect_closed();
    assert!(closure.error.is_none(), "unexpected ERROR frame: {closure:?}");
}

#[scenario(
    path = "tests/features/access_control.feature",
    name = "Peers inside the allow-list are served"
)]
fn allowed_peers_are_served(#[from(world)] world: RefCell<AccessWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/access_control.feature",
    name = "Peers outside the allow-list are dropped"
)]
fn disallowed_peers_are_dropped(#[from(world)] world: RefCell<AccessWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/access_control.feature",
    name = "An empty allow-list admits every peer"
)]
fn empty_allow_list_admits_everyone(#[from(world)] world: RefCell<AccessWorld>) {
    drop(world);
}
