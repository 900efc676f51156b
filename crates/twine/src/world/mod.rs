mod entity;
mod store;

pub use entity::{Category, Components, Entity, PLAYER_PREFIX, participant_id, player_name};
pub use store::EntityStore;
