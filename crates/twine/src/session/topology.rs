use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::net::{HOST_ID, NetworkStats, Publisher, Requester, Subscriber, SyncStats, WorkerSet};
use crate::world::EntityStore;

use super::broadcast::{Broadcaster, Outlet};
use super::config::{NetworkInfo, SessionConfig, Topology};
use super::context::SyncContext;
use super::error::SessionError;
use super::{join, receiver};

/// A running synchronization session.
///
/// Owns every background thread it started; they are stopped and joined by
/// [`Session::shutdown`] or on drop.
pub struct Session {
    ctx: Arc<SyncContext>,
    join_addr: Option<SocketAddr>,
    publish_addr: Option<SocketAddr>,
}

impl Session {
    /// Sets up the sockets and threads for the configured role. Any failure
    /// here aborts startup and stops whatever had already been started.
    pub fn start(config: SessionConfig, store: EntityStore) -> Result<Self, SessionError> {
        let topology = config.validate()?;
        let workers = Arc::new(WorkerSet::new());

        let result = match topology {
            Topology::Single => Ok(Self::single(config, store, Arc::clone(&workers))),
            Topology::CsServer => Self::cs_server(config, store, Arc::clone(&workers)),
            Topology::CsClient => Self::cs_client(config, store, Arc::clone(&workers)),
            Topology::P2pHost => Self::p2p_host(config, store, Arc::clone(&workers)),
            Topology::P2pPeer => Self::p2p_peer(config, store, Arc::clone(&workers)),
        };

        match &result {
            Ok(session) => log::info!(
                "Session started as {:?} (participant {})",
                topology,
                session.ctx.info.id
            ),
            Err(e) => {
                log::error!("Session startup as {:?} failed: {}", topology, e);
                workers.shutdown();
            }
        }
        result
    }

    fn single(config: SessionConfig, store: EntityStore, workers: Arc<WorkerSet>) -> Self {
        let ctx = context(NetworkInfo::single(), config, store, workers, Outlet::None);
        Self {
            ctx,
            join_addr: None,
            publish_addr: None,
        }
    }

    fn cs_server(
        config: SessionConfig,
        store: EntityStore,
        workers: Arc<WorkerSet>,
    ) -> Result<Self, SessionError> {
        let broadcast_bind = config.broadcast_bind();
        let publisher = Publisher::bind(broadcast_bind.as_str(), &workers)
            .map_err(|e| SessionError::bind("broadcast", &broadcast_bind, e))?;
        let publish_addr = publisher.local_addr();

        let info = NetworkInfo {
            mode: config.mode,
            role: config.role,
            topology: Topology::CsServer,
            id: 0,
            remote_addr: String::new(),
            publish_addr: String::new(),
        };
        let outlet = Outlet::Publish(Arc::new(publisher));
        let ctx = context(info, config, store, workers, outlet);
        let join_addr = join::spawn_join_listener(&ctx)?;

        Ok(Self {
            ctx,
            join_addr: Some(join_addr),
            publish_addr: Some(publish_addr),
        })
    }

    fn cs_client(
        config: SessionConfig,
        store: EntityStore,
        workers: Arc<WorkerSet>,
    ) -> Result<Self, SessionError> {
        let timeout = config.connect_timeout();
        let id = {
            let join_endpoint = config.join_endpoint();
            let mut requester = Requester::connect(&join_endpoint, timeout)
                .map_err(|e| SessionError::connect("join", &join_endpoint, e))?;
            join::request_join(&mut requester, None)?
        };

        let broadcast_endpoint = config.broadcast_endpoint();
        let subscriber = Subscriber::connect(&broadcast_endpoint, timeout)
            .map_err(|e| SessionError::connect("broadcast", &broadcast_endpoint, e))?;

        let uplink_endpoint = config.player_endpoint(&config.remote_addr, id)?;
        let uplink = match Requester::connect(&uplink_endpoint, timeout) {
            Ok(requester) => Some(requester),
            Err(e) => {
                log::warn!(
                    "No update channel at {} ({}), running receive-only",
                    uplink_endpoint,
                    e
                );
                None
            }
        };

        let info = NetworkInfo {
            mode: config.mode,
            role: config.role,
            topology: Topology::CsClient,
            id,
            remote_addr: config.remote_addr.clone(),
            publish_addr: String::new(),
        };
        let outlet = Outlet::Uplink(Mutex::new(uplink));
        let ctx = context(info, config, store, workers, outlet);
        ctx.materialize_participant(id, "", None);
        receiver::start_subscription(&ctx, subscriber, None)?;

        Ok(Self {
            ctx,
            join_addr: None,
            publish_addr: None,
        })
    }

    fn p2p_host(
        config: SessionConfig,
        store: EntityStore,
        workers: Arc<WorkerSet>,
    ) -> Result<Self, SessionError> {
        let publish_bind = config.player_bind(HOST_ID)?;
        let publisher = Publisher::bind(publish_bind.as_str(), &workers)
            .map_err(|e| SessionError::bind("publish", &publish_bind, e))?;
        let publish_addr = publisher.local_addr();

        let info = NetworkInfo {
            mode: config.mode,
            role: config.role,
            topology: Topology::P2pHost,
            id: HOST_ID,
            remote_addr: String::new(),
            publish_addr: config.player_endpoint(&config.advertise_addr, HOST_ID)?,
        };
        let outlet = Outlet::Publish(Arc::new(publisher));
        let ctx = context(info, config, store, workers, outlet);
        ctx.materialize_participant(HOST_ID, &ctx.info.publish_addr, None);
        let join_addr = join::spawn_join_listener(&ctx)?;

        Ok(Self {
            ctx,
            join_addr: Some(join_addr),
            publish_addr: Some(publish_addr),
        })
    }

    fn p2p_peer(
        config: SessionConfig,
        store: EntityStore,
        workers: Arc<WorkerSet>,
    ) -> Result<Self, SessionError> {
        let timeout = config.connect_timeout();
        let join_endpoint = config.join_endpoint();
        let mut requester = Requester::connect(&join_endpoint, timeout)
            .map_err(|e| SessionError::connect("join", &join_endpoint, e))?;
        let id = join::request_join(&mut requester, Some(config.advertise_addr.as_str()))?;

        let publish_bind = config.player_bind(id)?;
        let publisher = Publisher::bind(publish_bind.as_str(), &workers)
            .map_err(|e| SessionError::bind("publish", &publish_bind, e))?;
        let publish_addr = publisher.local_addr();

        let host_endpoint = config.player_endpoint(&config.remote_addr, HOST_ID)?;
        let subscriber = Subscriber::connect(&host_endpoint, timeout)
            .map_err(|e| SessionError::connect("host broadcast", &host_endpoint, e))?;

        let info = NetworkInfo {
            mode: config.mode,
            role: config.role,
            topology: Topology::P2pPeer,
            id,
            remote_addr: config.remote_addr.clone(),
            publish_addr: config.player_endpoint(&config.advertise_addr, id)?,
        };
        let outlet = Outlet::Publish(Arc::new(publisher));
        let ctx = context(info, config, store, workers, outlet);
        ctx.materialize_participant(id, &ctx.info.publish_addr, None);
        receiver::start_subscription(&ctx, subscriber, Some(HOST_ID))?;

        join::request_discover(&mut requester)?;
        drop(requester);

        Ok(Self {
            ctx,
            join_addr: None,
            publish_addr: Some(publish_addr),
        })
    }

    pub fn info(&self) -> &NetworkInfo {
        &self.ctx.info
    }

    pub fn config(&self) -> &SessionConfig {
        &self.ctx.config
    }

    pub fn store(&self) -> &EntityStore {
        &self.ctx.store
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.ctx.broadcaster
    }

    /// Runs this frame's broadcast pass.
    pub fn broadcast(&self) -> usize {
        self.ctx.broadcaster.broadcast()
    }

    /// Whether records for `name` are now ignored by this session's receivers.
    pub fn is_retired(&self, name: &str) -> bool {
        self.ctx.is_retired(name)
    }

    pub fn stats(&self) -> NetworkStats {
        self.ctx.stats.snapshot()
    }

    /// Local address of the join endpoint, on the authoritative side.
    pub fn join_addr(&self) -> Option<SocketAddr> {
        self.join_addr
    }

    pub fn publish_addr(&self) -> Option<SocketAddr> {
        self.publish_addr
    }

    /// Background threads still running.
    pub fn worker_count(&self) -> usize {
        self.ctx.workers.len()
    }

    pub fn shutdown(&self) {
        if self.ctx.workers.is_stopping() {
            return;
        }
        log::info!("Stopping {:?} session", self.ctx.info.topology);
        self.ctx.workers.shutdown();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn context(
    info: NetworkInfo,
    config: SessionConfig,
    store: EntityStore,
    workers: Arc<WorkerSet>,
    outlet: Outlet,
) -> Arc<SyncContext> {
    let stats = Arc::new(SyncStats::default());
    let broadcaster = Broadcaster::new(info.clone(), store.clone(), Arc::clone(&stats), outlet);
    Arc::new(SyncContext::new(
        info,
        config,
        store,
        stats,
        workers,
        Arc::new(broadcaster),
    ))
}
