use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::{
    DEFAULT_BROADCAST_PORT, DEFAULT_JOIN_PORT, DEFAULT_MAX_PLAYERS, DEFAULT_PLAYER_PORT_BASE,
};
use crate::world::player_name;

use super::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum NetworkMode {
    #[default]
    Single,
    ClientServer,
    PeerToPeer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Role {
    #[default]
    Client,
    Server,
    Host,
    Peer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    Single,
    CsServer,
    CsClient,
    P2pHost,
    P2pPeer,
}

impl Topology {
    pub fn resolve(mode: NetworkMode, role: Role) -> Result<Self, SessionError> {
        match (mode, role) {
            (NetworkMode::Single, _) => Ok(Self::Single),
            (NetworkMode::ClientServer, Role::Server) => Ok(Self::CsServer),
            (NetworkMode::ClientServer, Role::Client) => Ok(Self::CsClient),
            (NetworkMode::PeerToPeer, Role::Host) => Ok(Self::P2pHost),
            (NetworkMode::PeerToPeer, Role::Peer) => Ok(Self::P2pPeer),
            (mode, role) => Err(SessionError::InvalidRole { mode, role }),
        }
    }

    pub fn is_authoritative(self) -> bool {
        matches!(self, Self::CsServer | Self::P2pHost)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub mode: NetworkMode,
    pub role: Role,
    /// Server (client-server) or host (peer-to-peer) to join.
    pub remote_addr: String,
    /// Address other participants use to reach our publish endpoint.
    pub advertise_addr: String,
    pub bind_addr: String,
    pub join_port: u16,
    pub broadcast_port: u16,
    pub player_port_base: u16,
    pub max_players: u32,
    pub connect_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: NetworkMode::Single,
            role: Role::Client,
            remote_addr: String::from("127.0.0.1"),
            advertise_addr: String::from("127.0.0.1"),
            bind_addr: String::from("0.0.0.0"),
            join_port: DEFAULT_JOIN_PORT,
            broadcast_port: DEFAULT_BROADCAST_PORT,
            player_port_base: DEFAULT_PLAYER_PORT_BASE,
            max_players: DEFAULT_MAX_PLAYERS,
            connect_timeout_ms: 2000,
        }
    }
}

impl SessionConfig {
    pub fn topology(&self) -> Result<Topology, SessionError> {
        Topology::resolve(self.mode, self.role)
    }

    pub fn validate(&self) -> Result<Topology, SessionError> {
        let topology = self.topology()?;
        match topology {
            Topology::CsClient | Topology::P2pPeer if self.remote_addr.trim().is_empty() => {
                return Err(SessionError::MissingAddress("remote"));
            }
            Topology::P2pHost | Topology::P2pPeer if self.advertise_addr.trim().is_empty() => {
                return Err(SessionError::MissingAddress("advertise"));
            }
            Topology::CsServer | Topology::P2pHost if self.bind_addr.trim().is_empty() => {
                return Err(SessionError::MissingAddress("bind"));
            }
            _ => {}
        }
        Ok(topology)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn player_port(&self, id: u32) -> Result<u16, SessionError> {
        u16::try_from(id)
            .ok()
            .and_then(|id| self.player_port_base.checked_add(id))
            .ok_or(SessionError::PortOverflow(id))
    }

    pub fn join_bind(&self) -> String {
        format!("{}:{}", self.bind_addr, self.join_port)
    }

    pub fn join_endpoint(&self) -> String {
        format!("{}:{}", self.remote_addr, self.join_port)
    }

    pub fn broadcast_bind(&self) -> String {
        format!("{}:{}", self.bind_addr, self.broadcast_port)
    }

    pub fn broadcast_endpoint(&self) -> String {
        format!("{}:{}", self.remote_addr, self.broadcast_port)
    }

    pub fn player_bind(&self, id: u32) -> Result<String, SessionError> {
        Ok(format!("{}:{}", self.bind_addr, self.player_port(id)?))
    }

    pub fn player_endpoint(&self, host: &str, id: u32) -> Result<String, SessionError> {
        Ok(format!("{}:{}", host, self.player_port(id)?))
    }
}

/// Who this process is within the session. Fixed once startup completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub mode: NetworkMode,
    pub role: Role,
    pub topology: Topology,
    /// Participant id; 0 on a client-server server, which is not a participant.
    pub id: u32,
    pub remote_addr: String,
    /// Our own publish endpoint, empty when we publish nothing peers connect to.
    pub publish_addr: String,
}

impl NetworkInfo {
    pub fn single() -> Self {
        Self {
            mode: NetworkMode::Single,
            role: Role::Client,
            topology: Topology::Single,
            id: 1,
            remote_addr: String::new(),
            publish_addr: String::new(),
        }
    }

    pub fn is_authoritative(&self) -> bool {
        self.topology.is_authoritative()
    }

    pub fn own_entity_name(&self) -> Option<String> {
        match self.topology {
            Topology::CsClient | Topology::P2pHost | Topology::P2pPeer => Some(player_name(self.id)),
            Topology::Single | Topology::CsServer => None,
        }
    }

    pub fn is_own(&self, name: &str) -> bool {
        self.own_entity_name().is_some_and(|own| own == name)
    }
}
