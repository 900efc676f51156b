use std::sync::Arc;

use glam::Vec2;
use parking_lot::Mutex;

use super::entity::Entity;

/// Shared, ordered collection of live entities.
///
/// Every operation takes the one lock for its own duration only; reads hand
/// back copies, so callers iterate without holding it. Cloning the store
/// yields another handle to the same collection.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    entities: Arc<Mutex<Vec<Entity>>>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let store = Self::new();
        for entity in entities {
            store.insert(entity);
        }
        store
    }

    pub fn snapshot(&self) -> Vec<Entity> {
        self.entities.lock().clone()
    }

    /// Appends `entity`. Returns false when the name is already present.
    pub fn insert(&self, entity: Entity) -> bool {
        let mut entities = self.entities.lock();
        if entities.iter().any(|e| e.name == entity.name) {
            return false;
        }
        entities.push(entity);
        true
    }

    pub fn remove_by_identity(&self, entity: &Entity) -> bool {
        self.remove_by_name(&entity.name)
    }

    pub fn remove_by_name(&self, name: &str) -> bool {
        let mut entities = self.entities.lock();
        let Some(index) = entities.iter().position(|e| e.name == name) else {
            return false;
        };
        entities.remove(index);
        true
    }

    pub fn find_by_name(&self, name: &str) -> Option<Entity> {
        self.entities
            .lock()
            .iter()
            .find(|e| e.name == name)
            .cloned()
    }

    pub fn update_position(&self, name: &str, position: Vec2) -> bool {
        let mut entities = self.entities.lock();
        match entities.iter_mut().find(|e| e.name == name) {
            Some(entity) => {
                entity.position = position;
                true
            }
            None => false,
        }
    }

    /// Marks the entity inactive so the next broadcast carries its tombstone.
    pub fn deactivate(&self, name: &str) -> bool {
        let mut entities = self.entities.lock();
        match entities.iter_mut().find(|e| e.name == name) {
            Some(entity) => {
                entity.active = false;
                true
            }
            None => false,
        }
    }

    pub fn first_controllable(&self) -> Option<Entity> {
        self.entities
            .lock()
            .iter()
            .find(|e| e.is_controllable())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entities.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
