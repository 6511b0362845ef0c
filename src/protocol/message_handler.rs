use tracing::{debug, info, warn};

use crate::error::{Result, RouterError};
use crate::network::Connection;
use crate::protocol::messages::{MessageKind, ProtocolMessage, Rejection};
use crate::protocol::{flooding, handshake};
use crate::SharedRouterState;

/// Worker for one accepted connection: reads the first message and
/// dispatches on its kind.
pub async fn handle_connection(state: SharedRouterState, mut connection: Connection) -> Result<()> {
    let Some(message) = connection.receive().await? else {
        debug!("{} closed without sending", connection.peer_addr());
        return Ok(());
    };
    dispatch(&state, connection, message).await
}

pub async fn dispatch(
    state: &SharedRouterState,
    mut connection: Connection,
    message: ProtocolMessage,
) -> Result<()> {
    let local = state.lock().await.identity.clone();
    if message.dst_ip != local.simulated_ip {
        warn!("{} from {} addressed to {}", message.kind, message.src_ip, message.dst_ip);
        if message.kind != MessageKind::LsaUpdate {
            let rejection = ProtocolMessage::rejection(&local, &message, Rejection::MismatchedLink);
            connection.send(&rejection).await?;
        }
        return Err(RouterError::MismatchedLink(message.dst_ip));
    }

    match message.kind {
        MessageKind::Hello | MessageKind::Connect | MessageKind::UpdateWeight => {
            handshake::respond(state, connection, message).await
        }
        MessageKind::LsaUpdate => handle_lsa_update(state, message).await,
        MessageKind::Disconnect => handle_disconnect(state, connection, message).await,
    }
}

async fn handle_lsa_update(state: &SharedRouterState, message: ProtocolMessage) -> Result<()> {
    let outbound = {
        let mut guard = state.lock().await;
        flooding::on_update(&mut guard, &message)?
    };
    flooding::deliver(outbound).await;
    Ok(())
}

async fn handle_disconnect(
    state: &SharedRouterState,
    mut connection: Connection,
    request: ProtocolMessage,
) -> Result<()> {
    let peer = request.src_ip.clone();
    let reply = {
        let guard = state.lock().await;
        let local = &guard.identity;
        match guard.ports.slot_of(&peer) {
            Some(_) => {
                Ok(ProtocolMessage::new(local, &peer, MessageKind::Disconnect).with_neighbor(&peer))
            }
            None => Err(ProtocolMessage::rejection(local, &request, Rejection::MismatchedLink)),
        }
    };

    let reply = match reply {
        Ok(reply) => reply,
        Err(rejection) => {
            warn!("DISCONNECT from {} matches no link", peer);
            connection.send(&rejection).await?;
            return Err(RouterError::MismatchedLink(peer));
        }
    };
    if let Err(e) = connection.send(&reply).await {
        warn!("Failed to acknowledge DISCONNECT from {}: {}", peer, e);
    }

    let outbound = {
        let mut guard = state.lock().await;
        if let Some(slot) = guard.ports.slot_of(&peer) {
            guard.ports.release(slot);
            info!("Link to {} on port {} removed by peer", peer, slot);
        }
        flooding::refresh(&mut guard)
    };
    if let Err(e) = connection.close().await {
        debug!("Closing DISCONNECT exchange with {}: {}", peer, e);
    }
    flooding::deliver(outbound).await;
    Ok(())
}
