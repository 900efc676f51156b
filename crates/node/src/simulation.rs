use glam::Vec2;

use twine::{Category, Components, Entity, EntityStore, NetworkInfo};

pub const PLATFORM: &str = "platform";
const PLATFORM_SPEED: f32 = 2.0;
const PLATFORM_RANGE: f32 = 8.0;
const DRIFT_RATE: f32 = 0.5;

/// The level every node starts from. The template player is what remote
/// participants are copied from.
pub fn default_scene() -> EntityStore {
    let mut template = Entity::new("player_template", Category::Controllable);
    template.components |= Components::SIZE | Components::COLOR;
    template.size = Vec2::new(1.0, 2.0);
    template.color = [80, 160, 255, 255];
    template.position = Vec2::new(0.0, 1.0);

    let mut floor = Entity::new("floor", Category::Stationary);
    floor.components |= Components::SIZE;
    floor.size = Vec2::new(40.0, 1.0);

    let mut platform = Entity::new(PLATFORM, Category::Moving);
    platform.components |= Components::SIZE | Components::VELOCITY;
    platform.size = Vec2::new(4.0, 0.5);
    platform.position = Vec2::new(0.0, 6.0);
    platform.velocity = Vec2::new(PLATFORM_SPEED, 0.0);
    platform.networked = true;

    EntityStore::with_entities([
        template,
        floor,
        Entity::new("spawn", Category::SpawnPoint).with_position(Vec2::new(0.0, 1.0)),
        platform,
    ])
}

/// Stand-in for the game's physics step: the local player circles its spawn
/// and the authoritative side carries the platform back and forth.
pub fn step(store: &EntityStore, info: &NetworkInfo, elapsed: f32, dt: f32, radius: f32) {
    if let Some(name) = info.own_entity_name() {
        let angle = elapsed * DRIFT_RATE + info.id as f32;
        let offset = Vec2::from_angle(angle) * radius;
        store.update_position(&name, Vec2::new(0.0, 1.0) + offset);
    }

    if info.is_authoritative() {
        if let Some(platform) = store.find_by_name(PLATFORM) {
            store.update_position(PLATFORM, platform_position(platform.position, dt, elapsed));
        }
    }
}

fn platform_position(current: Vec2, dt: f32, elapsed: f32) -> Vec2 {
    let direction = if (elapsed / PLATFORM_RANGE * PLATFORM_SPEED) as u32 % 2 == 0 {
        1.0
    } else {
        -1.0
    };
    let x = (current.x + direction * PLATFORM_SPEED * dt).clamp(-PLATFORM_RANGE, PLATFORM_RANGE);
    Vec2::new(x, current.y)
}
