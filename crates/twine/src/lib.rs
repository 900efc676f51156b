pub mod net;
pub mod session;
pub mod world;

pub use net::{
    ACK, CodecError, DEFAULT_BROADCAST_PORT, DEFAULT_JOIN_PORT, DEFAULT_MAX_PLAYERS,
    DEFAULT_PLAYER_PORT_BASE, EntityUpdate, HOST_ID, JoinReply, JoinRequest, NetworkStats,
    REJECT, TransportError,
};
pub use session::{
    Broadcaster, NetworkInfo, NetworkMode, Role, Session, SessionConfig, SessionError, Topology,
};
pub use world::{Category, Components, Entity, EntityStore, participant_id, player_name};
