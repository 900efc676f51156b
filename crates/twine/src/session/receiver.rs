use std::collections::HashSet;
use std::sync::Arc;

use crate::net::{
    ACK, EntityUpdate, HOST_ID, REJECT, Replier, SocketCloser, StopFlag, Subscriber,
    TransportError,
};
use crate::world::{Category, Entity, participant_id, player_name};

use super::config::Topology;
use super::context::SyncContext;
use super::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Ignored,
    Materialized,
    Moved,
    Deactivated,
    Removed,
}

/// Applies one inbound record to the store. Last received wins.
///
/// The retired set stays locked for the whole call, so a concurrent removal
/// cannot slip between the check and the insert.
pub(crate) fn apply_update(ctx: &Arc<SyncContext>, update: &EntityUpdate) -> Applied {
    let name = update.name();
    if ctx.info.is_own(&name) {
        return Applied::Ignored;
    }

    let mut retired = ctx.retired.lock();
    if retired.contains(&name) {
        return Applied::Ignored;
    }

    match ctx.store.find_by_name(&name) {
        None if !update.is_active() => {
            retired.insert(name);
            Applied::Ignored
        }
        None => materialize(ctx, &name, update),
        Some(_) if update.is_active() => {
            ctx.store.update_position(&name, update.position());
            Applied::Moved
        }
        Some(entity) => lose_locked(ctx, &mut retired, &entity.name),
    }
}

/// Creates the entity for a first sighting under the name exactly as sent.
fn materialize(ctx: &Arc<SyncContext>, name: &str, update: &EntityUpdate) -> Applied {
    let address = update.address();
    let created = match participant_id(name) {
        Some(id) => {
            let created = ctx.materialize_participant(id, &address, Some(update.position()));
            if created
                && ctx.info.topology == Topology::P2pPeer
                && id != HOST_ID
                && id != ctx.info.id
                && !address.is_empty()
            {
                if let Err(e) = spawn_subscription(ctx, address, Some(id)) {
                    log::error!("Could not follow peer {}: {}", id, e);
                }
            }
            created
        }
        None => {
            let mut entity = Entity::new(name, Category::Moving).with_position(update.position());
            entity.address = address;
            entity.networked = true;
            ctx.store.insert(entity)
        }
    };

    if created {
        Applied::Materialized
    } else {
        Applied::Ignored
    }
}

fn lose(ctx: &SyncContext, name: &str) -> Applied {
    let mut retired = ctx.retired.lock();
    lose_locked(ctx, &mut retired, name)
}

/// The authoritative side keeps a deactivated copy so its next broadcast
/// relays the removal; everyone else drops the entity at once. Either way the
/// name is retired for this session's receivers.
fn lose_locked(ctx: &SyncContext, retired: &mut HashSet<String>, name: &str) -> Applied {
    retired.insert(name.to_owned());
    if ctx.info.is_authoritative() {
        if ctx.store.deactivate(name) {
            return Applied::Deactivated;
        }
    } else if ctx.store.remove_by_name(name) {
        ctx.stats.record_removed();
        log::info!("Removed {}", name);
        return Applied::Removed;
    }
    Applied::Ignored
}

/// Binds the per-player request channel of client `id` and serves it until
/// the client hangs up.
pub(crate) fn spawn_uplink(ctx: &Arc<SyncContext>, id: u32) -> Result<(), SessionError> {
    let addr = ctx.config.player_bind(id)?;
    let closer = SocketCloser::new();
    let replier = Replier::bind(addr.as_str(), closer.clone())
        .map_err(|e| SessionError::bind("player", &addr, e))?;

    let workers = Arc::clone(&ctx.workers);
    let ctx = Arc::clone(ctx);
    workers.spawn(format!("receiver-client-{id}"), closer, move |stop| {
        run_uplink(&ctx, replier, id, &stop)
    })?;
    Ok(())
}

fn run_uplink(ctx: &Arc<SyncContext>, mut replier: Replier, id: u32, stop: &StopFlag) {
    let served = player_name(id);
    while !stop.is_set() {
        let data = match replier.recv() {
            Ok(data) => data,
            Err(e) => {
                if !stop.is_set() {
                    log::info!("Client {} disconnected: {}", id, e);
                    lose(ctx, &served);
                }
                break;
            }
        };

        let update = match EntityUpdate::decode(&data) {
            Ok(update) => update,
            Err(e) => {
                log::warn!("Malformed update from client {}: {}", id, e);
                if replier.reply(REJECT).is_err() {
                    break;
                }
                continue;
            }
        };
        if let Err(e) = replier.reply(ACK) {
            if !stop.is_set() {
                log::info!("Client {} disconnected: {}", id, e);
                lose(ctx, &served);
            }
            break;
        }

        ctx.stats.record_received(data.len());
        if update.name() != served {
            log::warn!("Client {} tried to author {}", id, update.name());
            continue;
        }
        let applied = apply_update(ctx, &update);
        log::trace!("Client {} update {:?}", id, applied);
    }
}

/// Starts a receiver on an already connected subscription.
pub(crate) fn start_subscription(
    ctx: &Arc<SyncContext>,
    subscriber: Subscriber,
    served: Option<u32>,
) -> Result<(), SessionError> {
    let closer = SocketCloser::new();
    closer.track_stream(subscriber.stream()).map_err(TransportError::from)?;

    let name = format!("receiver-{}", subscriber.remote_addr());
    let workers = Arc::clone(&ctx.workers);
    let ctx = Arc::clone(ctx);
    workers.spawn(name, closer, move |stop| {
        run_subscription(&ctx, subscriber, served, &stop)
    })?;
    Ok(())
}

/// Starts a receiver that connects to `endpoint` from its own thread, so
/// the caller never waits on the remote side binding.
pub(crate) fn spawn_subscription(
    ctx: &Arc<SyncContext>,
    endpoint: String,
    served: Option<u32>,
) -> Result<(), SessionError> {
    let closer = SocketCloser::new();
    let thread_closer = closer.clone();
    let name = format!("receiver-{endpoint}");
    let workers = Arc::clone(&ctx.workers);
    let ctx = Arc::clone(ctx);

    workers.spawn(name, closer, move |stop| {
        let timeout = ctx.config.connect_timeout();
        let subscriber = match Subscriber::connect_until(&endpoint, timeout, &stop) {
            Ok(subscriber) => subscriber,
            Err(e) => {
                if !stop.is_set() {
                    log::error!("Could not subscribe to {}: {}", endpoint, e);
                    if let Some(id) = served {
                        lose(&ctx, &player_name(id));
                    }
                }
                return;
            }
        };
        if let Err(e) = thread_closer.track_stream(subscriber.stream()) {
            log::error!("Could not track subscription to {}: {}", endpoint, e);
            return;
        }
        run_subscription(&ctx, subscriber, served, &stop);
    })?;
    Ok(())
}

fn run_subscription(
    ctx: &Arc<SyncContext>,
    mut subscriber: Subscriber,
    served: Option<u32>,
    stop: &StopFlag,
) {
    let source = subscriber.remote_addr();
    log::info!("Receiving from {}", source);

    while !stop.is_set() {
        let data = match subscriber.recv() {
            Ok(data) => data,
            Err(e) => {
                if !stop.is_set() {
                    log::warn!("Lost source {}: {}", source, e);
                    if let Some(id) = served {
                        lose(ctx, &player_name(id));
                    }
                }
                break;
            }
        };
        if stop.is_set() {
            break;
        }

        match EntityUpdate::decode(&data) {
            Ok(update) => {
                ctx.stats.record_received(data.len());
                let applied = apply_update(ctx, &update);
                log::trace!("{} from {}: {:?}", update.name(), source, applied);
            }
            Err(e) => log::warn!("Malformed update from {}: {}", source, e),
        }
    }
}
