use bytemuck::{Pod, Zeroable};
use glam::Vec2;

pub const NAME_LEN: usize = 32;
pub const ADDRESS_LEN: usize = 48;
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

pub const DEFAULT_JOIN_PORT: u16 = 5555;
pub const DEFAULT_BROADCAST_PORT: u16 = 5556;
pub const DEFAULT_PLAYER_PORT_BASE: u16 = 6000;
pub const DEFAULT_MAX_PLAYERS: u32 = 4;
pub const HOST_ID: u32 = 1;

pub const ACK: &[u8] = b"ack";
pub const REJECT: &[u8] = b"error";

const JOIN: &str = "join";
const DISCOVER: &str = "discover";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("record size mismatch: expected {expected} bytes, got {actual}")]
    Size { expected: usize, actual: usize },
    #[error("unrecognized request: {0:?}")]
    UnknownRequest(String),
}

/// Position and liveness of one entity, sent as a raw fixed-size image.
/// `active == 0` is the only deletion signal on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct EntityUpdate {
    name: [u8; NAME_LEN],
    x: f32,
    y: f32,
    address: [u8; ADDRESS_LEN],
    active: u8,
    _pad: [u8; 3],
}

impl EntityUpdate {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(name: &str, position: Vec2, address: &str, active: bool) -> Self {
        Self {
            name: pack_str(name),
            x: position.x,
            y: position.y,
            address: pack_str(address),
            active: active as u8,
            _pad: [0; 3],
        }
    }

    pub fn name(&self) -> String {
        unpack_str(&self.name)
    }

    pub fn address(&self) -> String {
        unpack_str(&self.address)
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn is_active(&self) -> bool {
        self.active != 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        read_record(data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct JoinReply {
    pub participant_id: i32,
}

impl JoinReply {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(participant_id: u32) -> Self {
        Self {
            participant_id: participant_id as i32,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        read_record(data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinRequest {
    Join { address: Option<String> },
    Discover,
}

impl JoinRequest {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Join { address: None } => JOIN.as_bytes().to_vec(),
            Self::Join {
                address: Some(address),
            } => format!("{JOIN} {address}").into_bytes(),
            Self::Discover => DISCOVER.as_bytes().to_vec(),
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, CodecError> {
        let text = String::from_utf8_lossy(data);
        let text = text.trim_end_matches('\0').trim();

        match text.split_once(' ') {
            None if text == JOIN => Ok(Self::Join { address: None }),
            None if text == DISCOVER => Ok(Self::Discover),
            Some((JOIN, address)) if !address.trim().is_empty() => Ok(Self::Join {
                address: Some(address.trim().to_owned()),
            }),
            _ => Err(CodecError::UnknownRequest(text.to_owned())),
        }
    }
}

fn read_record<T: Pod>(data: &[u8]) -> Result<T, CodecError> {
    let expected = std::mem::size_of::<T>();
    if data.len() != expected {
        return Err(CodecError::Size {
            expected,
            actual: data.len(),
        });
    }
    Ok(bytemuck::pod_read_unaligned(data))
}

// Over-long input is cut at the last char boundary that fits.
fn pack_str<const N: usize>(value: &str) -> [u8; N] {
    let mut end = value.len().min(N);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut buf = [0u8; N];
    buf[..end].copy_from_slice(&value.as_bytes()[..end]);
    buf
}

fn unpack_str(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}
