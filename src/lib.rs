pub mod algorithms;
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod router;
pub mod terminal;
pub mod types;

use std::sync::Arc;
use tokio::sync::Mutex;

use network::PortTable;
use protocol::LinkStateDatabase;
use types::RouterIdentity;

/// Simulated address of a router; the protocol-level identifier.
pub type RouterId = String;

/// Everything a router mutates: its slots and its database. Every logical
/// operation takes the lock once and drops it before any network I/O.
#[derive(Debug)]
pub struct RouterState {
    pub identity: RouterIdentity,
    pub ports: PortTable,
    pub lsd: LinkStateDatabase,
}

impl RouterState {
    pub fn new(identity: RouterIdentity, capacity: usize) -> Self {
        Self {
            ports: PortTable::new(identity.clone(), capacity),
            lsd: LinkStateDatabase::new(&identity.simulated_ip),
            identity,
        }
    }
}

pub type SharedRouterState = Arc<Mutex<RouterState>>;
