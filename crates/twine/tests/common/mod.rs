#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};

use twine::{NetworkMode, Role, SessionConfig};

/// Join port, broadcast port and player port base of one test, laid out so
/// that player ports stay clear of the next block.
pub struct Ports {
    pub join: u16,
    pub broadcast: u16,
    pub player_base: u16,
}

impl Ports {
    pub fn from_block(base: u16) -> Self {
        Self {
            join: base,
            broadcast: base + 1,
            player_base: base + 2,
        }
    }
}

pub fn config(ports: &Ports, mode: NetworkMode, role: Role) -> SessionConfig {
    SessionConfig {
        mode,
        role,
        remote_addr: String::from("127.0.0.1"),
        advertise_addr: String::from("127.0.0.1"),
        bind_addr: String::from("127.0.0.1"),
        join_port: ports.join,
        broadcast_port: ports.broadcast,
        player_port_base: ports.player_base,
        max_players: 4,
        connect_timeout_ms: 1000,
    }
}

/// Polls `condition` until it holds or `timeout_ms` passes.
pub fn wait_until(timeout_ms: u64, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(timeout_ms) {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
