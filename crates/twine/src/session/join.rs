use std::net::SocketAddr;
use std::sync::Arc;

use crate::net::{
    ACK, JoinReply, JoinRequest, REJECT, Replier, Requester, SocketCloser, StopFlag,
    TransportError,
};

use super::config::Topology;
use super::context::SyncContext;
use super::error::SessionError;
use super::receiver;

/// Binds the join endpoint and starts the thread that admits participants.
pub(crate) fn spawn_join_listener(ctx: &Arc<SyncContext>) -> Result<SocketAddr, SessionError> {
    let addr = ctx.config.join_bind();
    let closer = SocketCloser::new();
    let replier = Replier::bind(addr.as_str(), closer.clone())
        .map_err(|e| SessionError::bind("join", &addr, e))?;
    let local_addr = replier.local_addr();

    let workers = Arc::clone(&ctx.workers);
    let ctx = Arc::clone(ctx);
    workers.spawn("join-listener", closer, move |stop| {
        run_join_listener(&ctx, replier, &stop)
    })?;
    Ok(local_addr)
}

fn run_join_listener(ctx: &Arc<SyncContext>, mut replier: Replier, stop: &StopFlag) {
    log::info!("Accepting joins on {}", replier.local_addr());

    while !stop.is_set() {
        let data = match replier.recv() {
            Ok(data) => data,
            Err(_) if stop.is_set() => break,
            // A requester hanging up only ends its own conversation.
            Err(e) if e.is_closed() => continue,
            Err(e) => {
                log::error!("Join listener on {} stopped: {}", replier.local_addr(), e);
                break;
            }
        };

        let result = match JoinRequest::parse(&data) {
            Ok(request) => handle_request(ctx, &mut replier, request),
            Err(e) => {
                log::warn!("Rejecting join request: {}", e);
                replier.reply(REJECT)
            }
        };
        if let Err(e) = result {
            if !stop.is_set() {
                log::warn!("Join reply failed: {}", e);
            }
        }
    }
}

fn handle_request(
    ctx: &Arc<SyncContext>,
    replier: &mut Replier,
    request: JoinRequest,
) -> Result<(), TransportError> {
    match request {
        JoinRequest::Join { address } => {
            if ctx.info.topology == Topology::P2pHost && address.is_none() {
                log::warn!("Rejecting peer join without an address");
                return replier.reply(REJECT);
            }

            let id = ctx.next_participant_id();
            replier.reply(JoinReply::new(id).as_bytes())?;
            ctx.stats.record_admitted();
            log::info!("Admitted participant {}", id);

            if id > ctx.config.max_players {
                log::warn!(
                    "Participant {} exceeds the limit of {} players, it will not be simulated",
                    id,
                    ctx.config.max_players
                );
                return Ok(());
            }
            if let Err(e) = attach(ctx, id, address.as_deref()) {
                log::error!("Could not attach participant {}: {}", id, e);
            }
            Ok(())
        }
        JoinRequest::Discover => {
            if ctx.info.topology != Topology::P2pHost {
                log::warn!("Rejecting discover on a {:?} session", ctx.info.topology);
                return replier.reply(REJECT);
            }
            replier.reply(ACK)?;
            let sent = ctx.broadcaster.broadcast_all();
            log::debug!("Discover pass sent {} updates", sent);
            Ok(())
        }
    }
}

/// Creates the participant's entity and the receiver that follows it.
fn attach(ctx: &Arc<SyncContext>, id: u32, address: Option<&str>) -> Result<(), SessionError> {
    match address {
        Some(host) => {
            let endpoint = ctx.config.player_endpoint(host, id)?;
            ctx.materialize_participant(id, &endpoint, None);
            receiver::spawn_subscription(ctx, endpoint, Some(id))
        }
        None => {
            ctx.materialize_participant(id, "", None);
            receiver::spawn_uplink(ctx, id)
        }
    }
}

/// One join round trip. Returns the participant id assigned to us.
pub(crate) fn request_join(
    requester: &mut Requester,
    address: Option<&str>,
) -> Result<u32, SessionError> {
    let request = JoinRequest::Join {
        address: address.map(str::to_owned),
    };
    let reply = requester
        .request(&request.to_bytes())
        .map_err(SessionError::Join)?;
    if reply == REJECT {
        return Err(SessionError::Rejected(requester.remote_addr().to_string()));
    }

    let reply = JoinReply::decode(&reply).map_err(|e| SessionError::Join(e.into()))?;
    u32::try_from(reply.participant_id)
        .ok()
        .filter(|id| *id >= 1)
        .ok_or(SessionError::InvalidParticipantId(reply.participant_id))
}

/// Asks the host to send everything it knows. The acknowledgement is not
/// inspected.
pub(crate) fn request_discover(requester: &mut Requester) -> Result<(), SessionError> {
    requester
        .request(&JoinRequest::Discover.to_bytes())
        .map_err(SessionError::Join)?;
    Ok(())
}
