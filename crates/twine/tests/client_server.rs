mod common;

use std::sync::atomic::{AtomicU16, Ordering};

use glam::Vec2;
use twine::net::Requester;
use twine::{
    Category, Entity, EntityStore, NetworkMode, REJECT, Role, Session, SessionConfig, Topology,
};

use common::{Ports, config, wait_until};

static PORT_COUNTER: AtomicU16 = AtomicU16::new(41000);

fn next_ports() -> Ports {
    Ports::from_block(PORT_COUNTER.fetch_add(20, Ordering::SeqCst))
}

fn server_config(ports: &Ports) -> SessionConfig {
    config(ports, NetworkMode::ClientServer, Role::Server)
}

fn client_config(ports: &Ports) -> SessionConfig {
    config(ports, NetworkMode::ClientServer, Role::Client)
}

fn scene() -> EntityStore {
    let mut platform = Entity::new("platform", Category::Moving);
    platform.networked = true;
    EntityStore::with_entities([Entity::new("floor", Category::Stationary), platform])
}

fn position_of(store: &EntityStore, name: &str) -> Option<Vec2> {
    store.find_by_name(name).map(|e| e.position)
}

#[test]
fn test_two_clients_see_broadcast_and_departure() {
    let ports = next_ports();
    let server = Session::start(server_config(&ports), scene()).unwrap();
    assert_eq!(server.info().topology, Topology::CsServer);
    assert_eq!(server.info().id, 0);

    let client_a = Session::start(client_config(&ports), EntityStore::new()).unwrap();
    let client_b = Session::start(client_config(&ports), EntityStore::new()).unwrap();
    assert_eq!(client_a.info().id, 1);
    assert_eq!(client_b.info().id, 2);
    assert!(server.store().find_by_name("player_1").is_some());
    assert!(server.store().find_by_name("player_2").is_some());

    server
        .store()
        .update_position("player_1", Vec2::new(10.0, 20.0));
    assert!(server.broadcast() >= 2);

    assert!(wait_until(1000, || {
        position_of(client_b.store(), "player_1") == Some(Vec2::new(10.0, 20.0))
    }));
    assert!(client_a.store().find_by_name("player_1").is_some());
    assert!(wait_until(1000, || client_b.store().find_by_name("platform").is_some()));

    drop(client_a);

    assert!(wait_until(2000, || {
        server.broadcast();
        client_b.store().find_by_name("player_1").is_none()
    }));
    assert!(server.store().find_by_name("player_1").is_none());
    assert!(server.is_retired("player_1"));

    server.broadcast();
    assert!(client_b.store().find_by_name("player_1").is_none());
    assert!(client_b.store().find_by_name("player_2").is_some());
}

#[test]
fn test_client_update_reaches_server_and_other_clients() {
    let ports = next_ports();
    let server = Session::start(server_config(&ports), scene()).unwrap();
    let client_a = Session::start(client_config(&ports), EntityStore::new()).unwrap();
    let client_b = Session::start(client_config(&ports), EntityStore::new()).unwrap();

    client_a
        .store()
        .update_position("player_1", Vec2::new(3.0, 4.0));
    assert_eq!(client_a.broadcast(), 1);

    assert!(wait_until(1000, || {
        position_of(server.store(), "player_1") == Some(Vec2::new(3.0, 4.0))
    }));

    server.broadcast();
    assert!(wait_until(1000, || {
        position_of(client_b.store(), "player_1") == Some(Vec2::new(3.0, 4.0))
    }));
    // The author keeps its own value.
    assert_eq!(
        position_of(client_a.store(), "player_1"),
        Some(Vec2::new(3.0, 4.0))
    );

    let stats = client_a.stats();
    assert_eq!(stats.updates_sent, 1);
    assert!(server.stats().updates_received >= 1);
}

#[test]
fn test_join_ids_are_sequential_and_overflow_is_invisible() {
    let ports = next_ports();
    let mut server_cfg = server_config(&ports);
    server_cfg.max_players = 2;
    let server = Session::start(server_cfg, scene()).unwrap();

    let mut client_cfg = client_config(&ports);
    client_cfg.connect_timeout_ms = 300;
    let clients: Vec<Session> = (0..3)
        .map(|_| Session::start(client_cfg.clone(), EntityStore::new()).unwrap())
        .collect();

    let ids: Vec<u32> = clients.iter().map(|c| c.info().id).collect();
    assert_eq!(ids, [1, 2, 3]);
    assert!(wait_until(1000, || server.stats().participants_admitted == 3));
    assert!(server.store().find_by_name("player_3").is_none());

    // Admitted beyond capacity: no update channel, nothing is sent.
    assert_eq!(clients[2].broadcast(), 0);
}

#[test]
fn test_server_rejects_discover_and_garbage() {
    let ports = next_ports();
    let server = Session::start(server_config(&ports), scene()).unwrap();
    let join_addr = server.join_addr().unwrap().to_string();

    let mut requester = Requester::connect(&join_addr, server.config().connect_timeout()).unwrap();
    assert_eq!(requester.request(b"discover").unwrap(), REJECT);
    assert_eq!(requester.request(b"leave").unwrap(), REJECT);
    assert_eq!(server.stats().participants_admitted, 0);
}

#[test]
fn test_client_without_server_fails_to_start() {
    let ports = next_ports();
    let mut cfg = client_config(&ports);
    cfg.connect_timeout_ms = 100;
    assert!(Session::start(cfg, EntityStore::new()).is_err());
}

#[test]
fn test_shutdown_joins_every_thread() {
    let ports = next_ports();
    let server = Session::start(server_config(&ports), scene()).unwrap();
    let client = Session::start(client_config(&ports), EntityStore::new()).unwrap();
    assert!(server.worker_count() >= 3);

    client.shutdown();
    assert_eq!(client.worker_count(), 0);
    server.shutdown();
    assert_eq!(server.worker_count(), 0);
}
