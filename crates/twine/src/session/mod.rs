mod broadcast;
mod config;
mod context;
mod error;
mod join;
mod receiver;
mod topology;

pub use broadcast::Broadcaster;
pub use config::{NetworkInfo, NetworkMode, Role, SessionConfig, Topology};
pub use error::SessionError;
pub use receiver::Applied;
pub use topology::Session;
