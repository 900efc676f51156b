use bitflags::bitflags;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::net::EntityUpdate;

pub const PLAYER_PREFIX: &str = "player_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum Category {
    #[default]
    Controllable = 0,
    Moving = 1,
    Stationary = 2,
    SpawnPoint = 3,
    SideBoundary = 4,
    DeathZone = 5,
    Camera = 6,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Components: u8 {
        const POSITION = 1 << 0;
        const SIZE = 1 << 1;
        const VELOCITY = 1 << 2;
        const COLOR = 1 << 3;
        const TEXTURE = 1 << 4;
        const BEHAVIOR = 1 << 5;
    }
}

/// A named game object. The name is the identity across every process in a
/// session; everything else is state that travels with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub name: String,
    pub category: Category,
    pub components: Components,
    pub position: Vec2,
    pub size: Vec2,
    pub velocity: Vec2,
    pub color: [u8; 4],
    pub texture: Option<String>,
    /// Name of the per-title update callback, resolved by the game layer.
    pub behavior: Option<String>,
    /// Participant that authors this entity. 0 means the local scene itself
    /// (server-side level geometry, templates).
    pub owner: u32,
    /// Publish endpoint of the owning participant, empty when not networked
    /// through a peer.
    pub address: String,
    pub networked: bool,
    pub active: bool,
}

impl Entity {
    pub fn new(name: impl Into<String>, category: Category) -> Self {
        Self {
            name: name.into(),
            category,
            components: Components::POSITION,
            position: Vec2::ZERO,
            size: Vec2::ONE,
            velocity: Vec2::ZERO,
            color: [255, 255, 255, 255],
            texture: None,
            behavior: None,
            owner: 0,
            address: String::new(),
            networked: false,
            active: true,
        }
    }

    pub fn player(id: u32, spawn_position: Vec2) -> Self {
        Self {
            components: Components::POSITION | Components::SIZE | Components::VELOCITY,
            position: spawn_position,
            owner: id,
            networked: true,
            ..Self::new(player_name(id), Category::Controllable)
        }
    }

    /// Builds the entity of participant `id` by copying the presentation and
    /// ownership attributes of `template`. Position starts at the template's
    /// spawn point until the first update lands.
    pub fn from_template(template: &Entity, id: u32, address: impl Into<String>) -> Self {
        Self {
            name: player_name(id),
            category: Category::Controllable,
            components: template.components | Components::POSITION,
            position: template.position,
            size: template.size,
            velocity: Vec2::ZERO,
            color: template.color,
            texture: template.texture.clone(),
            behavior: template.behavior.clone(),
            owner: id,
            address: address.into(),
            networked: true,
            active: true,
        }
    }

    pub fn with_position(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    pub fn is_controllable(&self) -> bool {
        self.category == Category::Controllable
    }

    pub fn to_update(&self) -> EntityUpdate {
        EntityUpdate::new(&self.name, self.position, &self.address, self.active)
    }
}

pub fn player_name(id: u32) -> String {
    format!("{PLAYER_PREFIX}{id}")
}

/// Participant id encoded in `name`. Only names spelled exactly as
/// `player_name` would spell them count, so `player_01` is not a participant.
pub fn participant_id(name: &str) -> Option<u32> {
    let id: u32 = name.strip_prefix(PLAYER_PREFIX)?.parse().ok()?;
    (player_name(id) == name).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_copy_keeps_presentation() {
        let mut template = Entity::player(1, Vec2::new(4.0, 8.0));
        template.color = [10, 20, 30, 255];
        template.texture = Some(String::from("ship.png"));
        template.behavior = Some(String::from("platformer"));
        template.size = Vec2::new(2.0, 3.0);

        let copy = Entity::from_template(&template, 7, "10.0.0.7:6007");

        assert_eq!(copy.name, "player_7");
        assert_eq!(copy.owner, 7);
        assert_eq!(copy.color, template.color);
        assert_eq!(copy.texture, template.texture);
        assert_eq!(copy.behavior, template.behavior);
        assert_eq!(copy.size, template.size);
        assert_eq!(copy.address, "10.0.0.7:6007");
        assert!(copy.networked);
        assert!(copy.active);
    }

    #[test]
    fn participant_id_from_name() {
        assert_eq!(participant_id("player_12"), Some(12));
        assert_eq!(participant_id(&player_name(3)), Some(3));
        assert_eq!(participant_id("platform_1"), None);
        assert_eq!(participant_id("player_"), None);
        assert_eq!(participant_id("player_01"), None);
        assert_eq!(participant_id("player_+1"), None);
        assert_eq!(participant_id("player_0"), Some(0));
    }

    #[test]
    fn update_carries_liveness() {
        let mut entity = Entity::player(2, Vec2::new(1.5, -2.0));
        entity.active = false;

        let update = entity.to_update();
        assert_eq!(update.name(), "player_2");
        assert_eq!(update.position(), Vec2::new(1.5, -2.0));
        assert!(!update.is_active());
    }
}
