use std::sync::Arc;

use parking_lot::Mutex;

use crate::net::{EntityUpdate, HOST_ID, Publisher, Requester, SyncStats};
use crate::world::{Entity, EntityStore};

use super::config::{NetworkInfo, Topology};

pub(crate) enum Outlet {
    None,
    Publish(Arc<Publisher>),
    /// Per-player request channel of a client-server client. Emptied for good
    /// after the first failure.
    Uplink(Mutex<Option<Requester>>),
}

/// Sends the entities this process authors, once per frame.
pub struct Broadcaster {
    info: NetworkInfo,
    store: EntityStore,
    stats: Arc<SyncStats>,
    outlet: Outlet,
}

impl Broadcaster {
    pub(crate) fn new(
        info: NetworkInfo,
        store: EntityStore,
        stats: Arc<SyncStats>,
        outlet: Outlet,
    ) -> Self {
        Self {
            info,
            store,
            stats,
            outlet,
        }
    }

    pub fn authors(&self, entity: &Entity) -> bool {
        match self.info.topology {
            Topology::Single => false,
            Topology::CsServer => entity.networked,
            Topology::CsClient | Topology::P2pPeer => self.info.is_own(&entity.name),
            Topology::P2pHost => {
                entity.networked && (entity.owner == HOST_ID || entity.owner == 0 || !entity.active)
            }
        }
    }

    /// One frame's pass. Returns the number of records handed to the network.
    pub fn broadcast(&self) -> usize {
        self.send_where(|entity| self.authors(entity))
    }

    /// Pass over every networked entity, used to bring a newly discovered
    /// peer up to date.
    pub fn broadcast_all(&self) -> usize {
        self.send_where(|entity| entity.networked || self.authors(entity))
    }

    fn send_where(&self, filter: impl Fn(&Entity) -> bool) -> usize {
        let mut sent = 0;
        for entity in self.store.snapshot().iter().filter(|e| filter(e)) {
            if self.send(&entity.to_update()) {
                sent += 1;
            }

            if !entity.active && self.store.remove_by_identity(entity) {
                self.stats.record_removed();
                log::info!("Pruned {} after sending its removal", entity.name);
            }
        }
        sent
    }

    fn send(&self, update: &EntityUpdate) -> bool {
        let bytes = update.as_bytes();
        match &self.outlet {
            Outlet::None => false,
            Outlet::Publish(publisher) => {
                publisher.publish(bytes);
                self.stats.record_sent(bytes.len());
                true
            }
            Outlet::Uplink(uplink) => {
                let mut uplink = uplink.lock();
                let Some(requester) = uplink.as_mut() else {
                    return false;
                };
                match requester.request(bytes) {
                    Ok(_) => {
                        self.stats.record_sent(bytes.len());
                        true
                    }
                    Err(e) => {
                        log::error!(
                            "Uplink to {} failed, no further updates will be sent: {}",
                            requester.remote_addr(),
                            e
                        );
                        *uplink = None;
                        false
                    }
                }
            }
        }
    }
}
