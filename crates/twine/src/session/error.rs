use crate::net::TransportError;

use super::config::{NetworkMode, Role};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("role {role:?} is not valid in {mode:?} mode")]
    InvalidRole { mode: NetworkMode, role: Role },
    #[error("{0} address is required for this role")]
    MissingAddress(&'static str),
    #[error("no port available for participant {0}")]
    PortOverflow(u32),
    #[error("failed to bind {purpose} endpoint {addr}: {source}")]
    Bind {
        purpose: &'static str,
        addr: String,
        #[source]
        source: TransportError,
    },
    #[error("failed to reach {purpose} endpoint {addr}: {source}")]
    Connect {
        purpose: &'static str,
        addr: String,
        #[source]
        source: TransportError,
    },
    #[error("join handshake failed: {0}")]
    Join(#[source] TransportError),
    #[error("join rejected by {0}")]
    Rejected(String),
    #[error("join reply carried invalid participant id {0}")]
    InvalidParticipantId(i32),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SessionError {
    pub(crate) fn bind(purpose: &'static str, addr: &str, source: impl Into<TransportError>) -> Self {
        Self::Bind {
            purpose,
            addr: addr.to_owned(),
            source: source.into(),
        }
    }

    pub(crate) fn connect(
        purpose: &'static str,
        addr: &str,
        source: impl Into<TransportError>,
    ) -> Self {
        Self::Connect {
            purpose,
            addr: addr.to_owned(),
            source: source.into(),
        }
    }
}
