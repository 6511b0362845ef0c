//! Keeps every router's database eventually consistent.
//!
//! State-changing steps run against a locked `RouterState` and return the
//! messages that must go out; `deliver` sends them once the lock is gone.

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{Result, RouterError};
use crate::network::transport;
use crate::protocol::database::Ingest;
use crate::protocol::messages::ProtocolMessage;
use crate::types::{LinkAdvertisement, RouterIdentity};
use crate::RouterState;

/// A message addressed to one neighbor.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub to: RouterIdentity,
    pub message: ProtocolMessage,
}

/// Builds, stores and addresses a fresh self-advertisement to every
/// `TWO_WAY` neighbor.
pub fn originate(state: &mut RouterState) -> Vec<Outbound> {
    let own = state.lsd.self_advertisement();
    let sequence = if own.is_placeholder() { 0 } else { own.sequence + 1 };
    let lsa = LinkAdvertisement {
        link_state_id: state.identity.simulated_ip.clone(),
        sequence,
        links: state.ports.descriptors(),
    };
    info!("Originating LSA seq {} with {} links", lsa.sequence, lsa.links.len());
    state.lsd.ingest(lsa.clone());

    state
        .ports
        .adjacent()
        .map(|link| Outbound {
            to: link.remote.clone(),
            message: ProtocolMessage::lsa_update(&state.identity, &link.remote.simulated_ip, lsa.clone()),
        })
        .collect()
}

/// Originates only if the adjacency differs from what was last advertised.
pub fn refresh(state: &mut RouterState) -> Vec<Outbound> {
    let own = state.lsd.self_advertisement();
    if !own.is_placeholder() && own.links == state.ports.descriptors() {
        debug!("Self LSA seq {} already current", own.sequence);
        return Vec::new();
    }
    originate(state)
}

/// Current self-advertisement for a single neighbor, unchanged.
pub fn advertise_to(state: &RouterState, peer: &str) -> Option<Outbound> {
    let own = state.lsd.self_advertisement();
    if own.is_placeholder() {
        return None;
    }
    let link = state.ports.link_to(peer)?;
    Some(Outbound {
        to: link.remote.clone(),
        message: ProtocolMessage::lsa_update(&state.identity, peer, own.clone()),
    })
}

/// Called once a link to `peer` reached `TWO_WAY`.
pub fn announce_adjacency(state: &mut RouterState, peer: &str) -> Vec<Outbound> {
    let outbound = refresh(state);
    if outbound.is_empty() {
        return advertise_to(state, peer).into_iter().collect();
    }
    outbound
}

/// Handles a received `LSA_UPDATE`: ingest gate, forwarding, weight
/// reconciliation and the reply to a newly seen router.
pub fn on_update(state: &mut RouterState, message: &ProtocolMessage) -> Result<Vec<Outbound>> {
    let lsa = message
        .advertisement()
        .ok_or_else(|| {
            RouterError::MalformedMessage(format!("LSAUPDATE from {} carries no LSA", message.src_ip))
        })?
        .clone();

    if lsa.link_state_id == state.identity.simulated_ip {
        debug!("Ignoring own LSA seq {} relayed by {}", lsa.sequence, message.src_ip);
        return Ok(Vec::new());
    }

    let first_seen = match state.lsd.ingest(lsa.clone()) {
        Ingest::Stale => {
            debug!("Stale LSA {} seq {} from {}", lsa.link_state_id, lsa.sequence, message.src_ip);
            return Ok(Vec::new());
        }
        Ingest::Accepted { first_seen } => first_seen,
    };
    info!(
        "Accepted LSA {} seq {} ({} links) from {}",
        lsa.link_state_id,
        lsa.sequence,
        lsa.links.len(),
        message.src_ip
    );

    let mut outbound: Vec<Outbound> = state
        .ports
        .adjacent()
        .filter(|link| {
            link.remote.simulated_ip != message.src_ip && link.remote.simulated_ip != lsa.link_state_id
        })
        .map(|link| Outbound {
            to: link.remote.clone(),
            message: message.restamp(&state.identity, &link.remote.simulated_ip),
        })
        .collect();

    let reconciled = reconcile_weight(state, &lsa);
    let unannounced = first_seen && !already_announced_to(state, &lsa.link_state_id);
    if unannounced {
        info!("New router {} in database", lsa.link_state_id);
    }
    if reconciled || unannounced {
        outbound.extend(originate(state));
    }

    Ok(outbound)
}

/// A `TWO_WAY` neighbor listed in our stored self-advertisement has already
/// received it through the handshake flood.
fn already_announced_to(state: &RouterState, router_id: &str) -> bool {
    let adjacent = state.ports.link_to(router_id).is_some_and(|link| link.is_adjacent());
    adjacent && state.lsd.self_advertisement().lists(router_id)
}

/// Adopts the weight a neighbor advertises for our shared link.
///
/// When both ends have advertised different weights the lower identifier
/// keeps its value, so the pair settles instead of swapping forever.
fn reconcile_weight(state: &mut RouterState, lsa: &LinkAdvertisement) -> bool {
    let local_id = state.identity.simulated_ip.clone();
    let Some(advertised) = lsa.weight_to(&local_id) else {
        return false;
    };
    let ours = state.lsd.self_advertisement().weight_to(&lsa.link_state_id);
    let Some(link) = state.ports.link_to_mut(&lsa.link_state_id) else {
        return false;
    };
    if !link.is_adjacent() {
        return false;
    }
    let weight = match u32::try_from(advertised) {
        Ok(weight) => weight,
        Err(_) => {
            warn!("{} advertises invalid weight {} for our link", lsa.link_state_id, advertised);
            return false;
        }
    };
    if weight == link.weight {
        return false;
    }
    if ours.is_some() && local_id < lsa.link_state_id {
        debug!(
            "Keeping weight {} to {} over advertised {}",
            link.weight, lsa.link_state_id, weight
        );
        return false;
    }

    info!("Weight to {} changed {} -> {}", lsa.link_state_id, link.weight, weight);
    link.weight = weight;
    true
}

/// Best-effort fan-out: each neighbor gets its own connection and a failure
/// only affects that neighbor.
pub async fn deliver(outbound: Vec<Outbound>) {
    let mut sends = JoinSet::new();
    for Outbound { to, message } in outbound {
        sends.spawn(async move {
            match transport::send_one(&to, &message).await {
                Ok(()) => debug!("Sent {} to {}", message.kind, to),
                Err(e) => warn!("Failed to send {} to {}: {}", message.kind, to, e),
            }
        });
    }
    while sends.join_next().await.is_some() {}
}
