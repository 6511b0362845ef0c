use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use crate::algorithms::PathResult;
use crate::config::RouterConfig;
use crate::error::{Result, RouterError};
use crate::network::{Connection, Listener, NeighborLink};
use crate::protocol::message_handler::handle_connection;
use crate::protocol::{
    flooding, handshake, LinkStateDatabase, MessageKind, ProtocolMessage, Rejection,
};
use crate::types::RouterIdentity;
use crate::{RouterId, RouterState, SharedRouterState};

/// Pause after a failed accept, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Handle on one running router: the accept loop and every operator command
/// share the same state.
#[derive(Clone)]
pub struct Router {
    identity: RouterIdentity,
    state: SharedRouterState,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Router {
    /// Binds the listener. The identity carries the port actually bound, so
    /// port 0 in the config yields an ephemeral port.
    pub async fn bind(config: &RouterConfig) -> Result<(Self, Listener)> {
        let listener = Listener::bind(&config.process_ip, config.process_port).await?;
        let port = listener.local_addr()?.port();
        let identity = RouterIdentity::new(config.process_ip.clone(), port, config.simulated_ip.clone());
        let state = Arc::new(Mutex::new(RouterState::new(identity.clone(), config.capacity)));
        let (shutdown, _) = watch::channel(false);

        info!("Router {} listening on {}", identity.simulated_ip, identity.transport_addr());
        let router = Self {
            identity,
            state,
            shutdown: Arc::new(shutdown),
        };
        Ok((router, listener))
    }

    /// Binds and spawns the accept loop in the background.
    pub async fn start(config: &RouterConfig) -> Result<Self> {
        let (router, listener) = Self::bind(config).await?;
        tokio::spawn(router.clone().serve(listener));
        Ok(router)
    }

    /// Accept loop: one task per connection until `quit`.
    pub async fn serve(self, listener: Listener) {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return;
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(connection) => {
                        let state = self.state.clone();
                        tokio::spawn(async move {
                            let peer = connection.peer_addr();
                            if let Err(e) = handle_connection(state, connection).await {
                                warn!("Connection from {} failed: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                _ = shutdown.changed() => break,
            }
        }
        info!("Router {} stopped accepting connections", self.identity.simulated_ip);
    }

    pub fn identity(&self) -> &RouterIdentity {
        &self.identity
    }

    pub fn state(&self) -> &SharedRouterState {
        &self.state
    }

    /// Occupies a free slot with a `DOWN` link; the peer is not contacted.
    pub async fn attach_neighbor(
        &self,
        process_ip: &str,
        process_port: u32,
        simulated_ip: &str,
        weight: u32,
    ) -> Result<usize> {
        let mut state = self.state.lock().await;
        let slot = state.ports.attach(process_ip, process_port, simulated_ip, weight)?;
        info!("Attached {} on port {} with weight {}", simulated_ip, slot, weight);
        Ok(slot)
    }

    /// Sends `HELLO` to every attached peer not yet at `TWO_WAY`.
    pub async fn start_handshakes(&self) -> Vec<(RouterId, Result<()>)> {
        let peers: Vec<RouterId> = {
            let state = self.state.lock().await;
            state
                .ports
                .iter()
                .filter(|(_, link)| !link.is_adjacent())
                .map(|(_, link)| link.remote.simulated_ip.clone())
                .collect()
        };

        let mut results = Vec::with_capacity(peers.len());
        for peer in peers {
            let outcome = handshake::initiate(&self.state, &peer, MessageKind::Hello, None).await;
            if let Err(e) = &outcome {
                warn!("HELLO to {} failed: {}", peer, e);
            }
            results.push((peer, outcome));
        }
        results
    }

    /// Attaches the peer then runs a `CONNECT` handshake with it. A failed
    /// handshake leaves the new slot at `DOWN`.
    pub async fn connect_neighbor(
        &self,
        process_ip: &str,
        process_port: u32,
        simulated_ip: &str,
        weight: u32,
    ) -> Result<()> {
        self.attach_neighbor(process_ip, process_port, simulated_ip, weight).await?;
        handshake::initiate(&self.state, simulated_ip, MessageKind::Connect, None).await
    }

    /// Changes the weight of an existing link through an `UPDATE_WEIGHT`
    /// handshake; both ends adopt it and re-originate.
    pub async fn update_weight(
        &self,
        process_ip: &str,
        process_port: u32,
        simulated_ip: &str,
        weight: u32,
    ) -> Result<()> {
        {
            let state = self.state.lock().await;
            let matches = state.ports.link_to(simulated_ip).is_some_and(|link| {
                link.remote.process_ip == process_ip && u32::from(link.remote.process_port) == process_port
            });
            if !matches {
                return Err(RouterError::MismatchedLink(simulated_ip.to_string()));
            }
        }
        handshake::initiate(&self.state, simulated_ip, MessageKind::UpdateWeight, Some(weight)).await
    }

    /// Tears down a `TWO_WAY` link and floods the change.
    ///
    /// An unreachable peer is still detached locally, and so is a peer that
    /// answers it no longer has the link. Any other rejection or unexpected
    /// reply leaves the slot as it was.
    pub async fn disconnect_slot(&self, slot: usize) -> Result<()> {
        let (request, remote) = {
            let state = self.state.lock().await;
            let link = state
                .ports
                .get(slot)
                .filter(|link| link.is_adjacent())
                .ok_or(RouterError::InvalidSlot(slot))?;
            let remote = link.remote.clone();
            let request =
                ProtocolMessage::new(&state.identity, &remote.simulated_ip, MessageKind::Disconnect)
                    .with_neighbor(&remote.simulated_ip);
            (request, remote)
        };

        match Self::exchange(&remote, &request).await {
            Ok(reply) => {
                if reply.src_ip != remote.simulated_ip {
                    return Err(RouterError::MismatchedLink(remote.simulated_ip));
                }
                match reply.rejection {
                    Some(Rejection::MismatchedLink) => {
                        info!("{} already dropped the link", remote.simulated_ip);
                    }
                    Some(Rejection::NoCapacity) => {
                        return Err(RouterError::MismatchedLink(remote.simulated_ip));
                    }
                    None => {}
                }
                if reply.kind != MessageKind::Disconnect {
                    return Err(RouterError::MalformedMessage(format!(
                        "expected DISCONNECT reply from {}, got {}",
                        remote.simulated_ip, reply.kind
                    )));
                }
            }
            Err(RouterError::Transport(e)) => {
                warn!("{} unreachable, detaching anyway: {}", remote, e);
            }
            Err(e) => return Err(e),
        }

        // The slot may have been emptied or reused during the exchange.
        let outbound = {
            let mut state = self.state.lock().await;
            let current = state
                .ports
                .slot_of(&remote.simulated_ip)
                .filter(|&current| state.ports.get(current).is_some_and(NeighborLink::is_adjacent));
            match current {
                Some(current) => {
                    state.ports.detach(current)?;
                    info!("Detached {} from port {}", remote.simulated_ip, current);
                }
                None => info!("Link to {} already removed", remote.simulated_ip),
            }
            flooding::refresh(&mut state)
        };
        flooding::deliver(outbound).await;
        Ok(())
    }

    async fn exchange(remote: &RouterIdentity, request: &ProtocolMessage) -> Result<ProtocolMessage> {
        let mut connection = Connection::open(remote).await?;
        connection.send(request).await?;
        connection.expect().await
    }

    pub async fn shortest_path_to(&self, destination: &str) -> PathResult {
        self.state.lock().await.lsd.shortest_path(destination)
    }

    pub async fn list_neighbors(&self) -> Vec<(usize, NeighborLink)> {
        let state = self.state.lock().await;
        state.ports.iter().map(|(slot, link)| (slot, link.clone())).collect()
    }

    pub async fn render_database(&self) -> String {
        self.state.lock().await.lsd.render()
    }

    /// Snapshot of the database.
    pub async fn link_state_database(&self) -> LinkStateDatabase {
        self.state.lock().await.lsd.clone()
    }

    /// Disconnects every `TWO_WAY` link, best effort, then stops the accept
    /// loop.
    pub async fn quit(&self) {
        let slots: Vec<usize> = {
            let state = self.state.lock().await;
            state
                .ports
                .iter()
                .filter(|(_, link)| link.is_adjacent())
                .map(|(slot, _)| slot)
                .collect()
        };
        for slot in slots {
            if let Err(e) = self.disconnect_slot(slot).await {
                warn!("Disconnecting port {} on quit: {}", slot, e);
            }
        }
        self.shutdown.send_replace(true);
        info!("Router {} quit", self.identity.simulated_ip);
    }

    /// Resolves once `quit` has run.
    pub async fn stopped(&self) {
        let mut shutdown = self.shutdown.subscribe();
        let _ = shutdown.wait_for(|stopped| *stopped).await;
    }
}
