mod lifecycle;
mod protocol;
mod stats;
mod transport;

pub use lifecycle::{SocketCloser, StopFlag, WorkerSet};
pub use protocol::{
    ACK, ADDRESS_LEN, CodecError, DEFAULT_BROADCAST_PORT, DEFAULT_JOIN_PORT, DEFAULT_MAX_PLAYERS,
    DEFAULT_PLAYER_PORT_BASE, EntityUpdate, HOST_ID, JoinReply, JoinRequest, MAX_FRAME_SIZE,
    NAME_LEN, REJECT,
};
pub use stats::{NetworkStats, SyncStats};
pub use transport::{
    Publisher, Replier, Requester, Subscriber, TransportError, connect_until, connect_with_retry,
    read_frame, write_frame,
};
