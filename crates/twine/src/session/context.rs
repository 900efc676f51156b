use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use glam::Vec2;
use parking_lot::Mutex;

use crate::net::{SyncStats, WorkerSet};
use crate::world::{Entity, EntityStore};

use super::broadcast::Broadcaster;
use super::config::{NetworkInfo, SessionConfig};

/// Everything the threads of one session share. Built once at startup and
/// handed to each thread behind an `Arc`.
pub(crate) struct SyncContext {
    pub info: NetworkInfo,
    pub config: SessionConfig,
    pub store: EntityStore,
    pub stats: Arc<SyncStats>,
    pub workers: Arc<WorkerSet>,
    pub broadcaster: Arc<Broadcaster>,
    /// Names a receiver has seen removed. Records for them are ignored from
    /// then on; local game code may still reuse the name.
    pub retired: Mutex<HashSet<String>>,
    participants: AtomicU32,
}

impl SyncContext {
    pub fn new(
        info: NetworkInfo,
        config: SessionConfig,
        store: EntityStore,
        stats: Arc<SyncStats>,
        workers: Arc<WorkerSet>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        // The host holds id 1 itself, so its first admitted peer gets 2.
        let participants = if info.is_authoritative() { info.id } else { 0 };
        Self {
            info,
            config,
            store,
            stats,
            workers,
            broadcaster,
            retired: Mutex::new(HashSet::new()),
            participants: AtomicU32::new(participants),
        }
    }

    pub fn next_participant_id(&self) -> u32 {
        self.participants.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_retired(&self, name: &str) -> bool {
        self.retired.lock().contains(name)
    }

    pub fn template(&self) -> Entity {
        self.store
            .first_controllable()
            .unwrap_or_else(|| Entity::player(0, Vec2::ZERO))
    }

    /// Inserts the entity of participant `id` unless it already exists.
    /// Returns whether a new entity was created.
    pub fn materialize_participant(&self, id: u32, address: &str, position: Option<Vec2>) -> bool {
        let mut entity = Entity::from_template(&self.template(), id, address);
        if let Some(position) = position {
            entity.position = position;
        }
        let name = entity.name.clone();
        let inserted = self.store.insert(entity);
        if inserted {
            log::info!("Materialized {} (owner {})", name, id);
        }
        inserted
    }

    /// A context with no sockets behind it, for exercising the apply and
    /// author rules directly.
    #[cfg(test)]
    pub fn offline(info: NetworkInfo, store: EntityStore) -> Arc<Self> {
        use super::broadcast::Outlet;

        let stats = Arc::new(SyncStats::default());
        let broadcaster =
            Broadcaster::new(info.clone(), store.clone(), Arc::clone(&stats), Outlet::None);
        Arc::new(Self::new(
            info,
            SessionConfig::default(),
            store,
            stats,
            Arc::new(WorkerSet::new()),
            Arc::new(broadcaster),
        ))
    }
}
