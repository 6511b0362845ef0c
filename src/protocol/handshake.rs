//! Three-leg handshake bringing a link from `DOWN` to `TWO_WAY`.
//!
//! The same exchange drives `HELLO` (discovery), `CONNECT` (operator-initiated
//! linking) and `UPDATE_WEIGHT` (a handshake that also carries a new weight):
//!
//! ```text
//! initiator                      responder
//!     | ---- request ---------------> |  slot created if needed, DOWN -> INIT
//!     | <--- reply (same kind) ------ |
//!     |  TWO_WAY                      |
//!     | ---- confirmation ----------> |  TWO_WAY, originate
//!     | <--- close ------------------ |
//!     |  originate                    |
//! ```

use tracing::{debug, info, warn};

use crate::error::{Result, RouterError};
use crate::network::Connection;
use crate::protocol::flooding;
use crate::protocol::messages::{MessageKind, ProtocolMessage, Rejection};
use crate::types::HandshakeStatus;
use crate::SharedRouterState;

/// Weight given to a link created by a request that carries none.
pub const DEFAULT_WEIGHT: u32 = 1;

/// Runs the initiator side with the peer attached under `peer`.
///
/// `weight` overrides the weight sent in the request; `UPDATE_WEIGHT` passes
/// the new weight here.
pub async fn initiate(
    state: &SharedRouterState,
    peer: &str,
    kind: MessageKind,
    weight: Option<u32>,
) -> Result<()> {
    let (request, remote) = {
        let guard = state.lock().await;
        let link = guard
            .ports
            .link_to(peer)
            .ok_or_else(|| RouterError::MismatchedLink(peer.to_string()))?;
        let weight = weight.unwrap_or(link.weight);
        let request = ProtocolMessage::new(&guard.identity, peer, kind).with_weight(weight);
        (request, link.remote.clone())
    };

    let mut connection = Connection::open(&remote).await?;
    connection.send(&request).await?;
    let reply = connection.expect().await?;
    check_reply(&reply, kind, peer)?;
    info!("received {} from {};", kind, reply.src_ip);

    let previous = {
        let mut guard = state.lock().await;
        let link = guard
            .ports
            .link_to_mut(peer)
            .ok_or_else(|| RouterError::MismatchedLink(peer.to_string()))?;
        let previous = (link.status, link.weight);
        if kind == MessageKind::UpdateWeight {
            if let Some(weight) = request.weight {
                link.weight = weight;
            }
        }
        if link.set_status(HandshakeStatus::TwoWay) {
            info!("set {} STATE to TWO_WAY", peer);
        }
        previous
    };

    if let Err(e) = connection.send(&request).await {
        let mut guard = state.lock().await;
        if let Some(link) = guard.ports.link_to_mut(peer) {
            link.set_status(previous.0);
            link.weight = previous.1;
        }
        return Err(e);
    }

    // The responder closes only after it committed TWO_WAY.
    match connection.receive().await {
        Ok(None) => {}
        Ok(Some(extra)) => debug!("Ignoring trailing {} from {}", extra.kind, extra.src_ip),
        Err(e) => debug!("Handshake connection to {} ended with {}", peer, e),
    }

    let outbound = {
        let mut guard = state.lock().await;
        flooding::announce_adjacency(&mut guard, peer)
    };
    flooding::deliver(outbound).await;
    Ok(())
}

fn check_reply(reply: &ProtocolMessage, kind: MessageKind, peer: &str) -> Result<()> {
    match reply.rejection {
        Some(Rejection::NoCapacity) => return Err(RouterError::NoCapacity),
        Some(Rejection::MismatchedLink) => return Err(RouterError::MismatchedLink(peer.to_string())),
        None => {}
    }
    if reply.kind != kind {
        return Err(RouterError::MalformedMessage(format!(
            "expected {} reply from {}, got {}",
            kind, peer, reply.kind
        )));
    }
    if reply.src_ip != peer {
        return Err(RouterError::MismatchedLink(reply.src_ip.clone()));
    }
    Ok(())
}

/// Runs the responder side for a request already read from `connection`.
pub async fn respond(
    state: &SharedRouterState,
    mut connection: Connection,
    request: ProtocolMessage,
) -> Result<()> {
    let kind = request.kind;
    let peer = request.sender();
    info!("received {} from {};", kind, peer.simulated_ip);

    let admitted = {
        let mut guard = state.lock().await;
        let local = guard.identity.clone();
        let slot = if kind == MessageKind::UpdateWeight {
            guard
                .ports
                .slot_of(&peer.simulated_ip)
                .ok_or_else(|| RouterError::MismatchedLink(peer.simulated_ip.clone()))
        } else {
            guard
                .ports
                .find_or_create_for_peer(&peer, request.weight.unwrap_or(DEFAULT_WEIGHT))
        };

        match slot.and_then(|slot| {
            guard
                .ports
                .get_mut(slot)
                .ok_or_else(|| RouterError::MismatchedLink(peer.simulated_ip.clone()))
        }) {
            Ok(link) => {
                if link.status == HandshakeStatus::Down {
                    link.set_status(HandshakeStatus::Init);
                    info!("set {} STATE to INIT;", peer.simulated_ip);
                }
                let reply = ProtocolMessage::new(&local, &peer.simulated_ip, kind)
                    .with_neighbor(&peer.simulated_ip)
                    .with_weight(request.weight.unwrap_or(link.weight));
                Ok(reply)
            }
            Err(e) => {
                let reason = match e {
                    RouterError::NoCapacity => Rejection::NoCapacity,
                    _ => Rejection::MismatchedLink,
                };
                Err((ProtocolMessage::rejection(&local, &request, reason), e))
            }
        }
    };

    let reply = match admitted {
        Ok(reply) => reply,
        Err((rejection, e)) => {
            warn!("Rejecting {} from {}: {}", kind, peer.simulated_ip, e);
            connection.send(&rejection).await?;
            return Err(e);
        }
    };
    connection.send(&reply).await?;

    let confirmation = connection.expect().await?;
    if confirmation.kind != kind || confirmation.src_ip != peer.simulated_ip {
        return Err(RouterError::MalformedMessage(format!(
            "expected {} confirmation from {}, got {} from {}",
            kind, peer.simulated_ip, confirmation.kind, confirmation.src_ip
        )));
    }
    info!("received {} from {};", kind, confirmation.src_ip);

    let outbound = {
        let mut guard = state.lock().await;
        let link = guard
            .ports
            .link_to_mut(&peer.simulated_ip)
            .ok_or_else(|| RouterError::MismatchedLink(peer.simulated_ip.clone()))?;
        if matches!(kind, MessageKind::Connect | MessageKind::UpdateWeight) {
            if let Some(weight) = confirmation.weight {
                link.weight = weight;
            }
        }
        if link.set_status(HandshakeStatus::TwoWay) {
            info!("set {} STATE to TWO_WAY;", peer.simulated_ip);
        }
        flooding::announce_adjacency(&mut guard, &peer.simulated_ip)
    };

    if let Err(e) = connection.close().await {
        debug!("Closing handshake with {}: {}", peer.simulated_ip, e);
    }
    flooding::deliver(outbound).await;
    Ok(())
}
