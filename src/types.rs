use serde::{Deserialize, Serialize};
use std::fmt;

use crate::RouterId;

pub type SequenceNumber = i64;

/// Sequence number of an advertisement that has never been flooded.
pub const NEVER_ADVERTISED: SequenceNumber = SequenceNumber::MIN;

/// Simulated address of a router plus the real address of its listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouterIdentity {
    pub simulated_ip: RouterId,
    pub process_ip: String,
    pub process_port: u16,
}

impl RouterIdentity {
    pub fn new(process_ip: impl Into<String>, process_port: u16, simulated_ip: impl Into<String>) -> Self {
        Self {
            simulated_ip: simulated_ip.into(),
            process_ip: process_ip.into(),
            process_port,
        }
    }

    pub fn transport_addr(&self) -> String {
        format!("{}:{}", self.process_ip, self.process_port)
    }
}

impl fmt::Display for RouterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.simulated_ip, self.transport_addr())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum HandshakeStatus {
    #[default]
    Down,
    Init,
    TwoWay,
}

impl fmt::Display for HandshakeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandshakeStatus::Down => "DOWN",
            HandshakeStatus::Init => "INIT",
            HandshakeStatus::TwoWay => "TWO_WAY",
        };
        f.write_str(s)
    }
}

/// One adjacency inside an advertisement.
///
/// `weight` is signed on the wire so a corrupt negative cost is
/// representable; the shortest-path engine skips such edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDescriptor {
    pub neighbor_id: RouterId,
    pub neighbor_port: i32,
    pub weight: i64,
}

/// A router's self-description, versioned by sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAdvertisement {
    pub link_state_id: RouterId,
    pub sequence: SequenceNumber,
    pub links: Vec<LinkDescriptor>,
}

impl LinkAdvertisement {
    /// Bookkeeping entry a database is seeded with before the first
    /// real origination.
    pub fn placeholder(router_id: &str) -> Self {
        Self {
            link_state_id: router_id.to_string(),
            sequence: NEVER_ADVERTISED,
            links: vec![LinkDescriptor {
                neighbor_id: router_id.to_string(),
                neighbor_port: -1,
                weight: 0,
            }],
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.sequence == NEVER_ADVERTISED
    }

    pub fn weight_to(&self, neighbor_id: &str) -> Option<i64> {
        self.links
            .iter()
            .find(|link| link.neighbor_id == neighbor_id)
            .map(|link| link.weight)
    }

    pub fn lists(&self, neighbor_id: &str) -> bool {
        self.links.iter().any(|link| link.neighbor_id == neighbor_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ordering_follows_handshake_progress() {
        assert!(HandshakeStatus::Down < HandshakeStatus::Init);
        assert!(HandshakeStatus::Init < HandshakeStatus::TwoWay);
        assert_eq!(HandshakeStatus::default(), HandshakeStatus::Down);
    }

    #[test]
    fn placeholder_is_self_referential() {
        let lsa = LinkAdvertisement::placeholder("192.168.1.1");
        assert!(lsa.is_placeholder());
        assert_eq!(lsa.weight_to("192.168.1.1"), Some(0));
        assert!(!lsa.lists("192.168.1.2"));
    }
}
