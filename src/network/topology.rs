use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};
use crate::types::{HandshakeStatus, LinkDescriptor, RouterIdentity};

pub const DEFAULT_CAPACITY: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborLink {
    pub remote: RouterIdentity,
    pub weight: u32,
    pub status: HandshakeStatus,
    pub last_change: DateTime<Utc>,
}

impl NeighborLink {
    fn new(remote: RouterIdentity, weight: u32) -> Self {
        Self {
            remote,
            weight,
            status: HandshakeStatus::Down,
            last_change: Utc::now(),
        }
    }

    /// Returns true if the status actually changed.
    pub fn set_status(&mut self, status: HandshakeStatus) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        self.last_change = Utc::now();
        true
    }

    pub fn is_adjacent(&self) -> bool {
        self.status >= HandshakeStatus::TwoWay
    }
}

/// The fixed set of attachment slots of one router.
#[derive(Debug, Clone)]
pub struct PortTable {
    local: RouterIdentity,
    slots: Vec<Option<NeighborLink>>,
}

impl PortTable {
    pub fn new(local: RouterIdentity, capacity: usize) -> Self {
        Self {
            local,
            slots: vec![None; capacity],
        }
    }

    /// Occupies a free slot with a `DOWN` link. Purely local: the peer is
    /// not contacted and nothing is flooded.
    pub fn attach(
        &mut self,
        process_ip: &str,
        process_port: u32,
        simulated_ip: &str,
        weight: u32,
    ) -> Result<usize> {
        if self.is_self(process_ip, process_port, simulated_ip) {
            return Err(RouterError::SelfAttach(simulated_ip.to_string()));
        }
        if self.slot_of(simulated_ip).is_some() {
            return Err(RouterError::DuplicateAttach(simulated_ip.to_string()));
        }
        let slot = self.free_slot().ok_or(RouterError::NoCapacity)?;
        let port = match u16::try_from(process_port) {
            Ok(port) if port != 0 => port,
            _ => return Err(RouterError::InvalidPort(process_port)),
        };

        let remote = RouterIdentity::new(process_ip, port, simulated_ip);
        self.slots[slot] = Some(NeighborLink::new(remote, weight));
        Ok(slot)
    }

    /// Empties a `TWO_WAY` slot. Notifying the peer and flooding are the
    /// caller's job.
    pub fn detach(&mut self, slot: usize) -> Result<NeighborLink> {
        match self.get(slot) {
            Some(link) if link.is_adjacent() => {}
            _ => return Err(RouterError::InvalidSlot(slot)),
        }
        self.release(slot).ok_or(RouterError::InvalidSlot(slot))
    }

    /// Empties a slot regardless of its status.
    pub fn release(&mut self, slot: usize) -> Option<NeighborLink> {
        self.slots.get_mut(slot).and_then(Option::take)
    }

    /// Slot for an inbound handshake: the existing one for this peer, or a
    /// fresh `DOWN` slot.
    pub fn find_or_create_for_peer(&mut self, remote: &RouterIdentity, weight: u32) -> Result<usize> {
        if remote.simulated_ip == self.local.simulated_ip {
            return Err(RouterError::SelfAttach(remote.simulated_ip.clone()));
        }
        if let Some(slot) = self.slot_of(&remote.simulated_ip) {
            return Ok(slot);
        }
        let slot = self.free_slot().ok_or(RouterError::NoCapacity)?;
        self.slots[slot] = Some(NeighborLink::new(remote.clone(), weight));
        Ok(slot)
    }

    pub fn slot_of(&self, simulated_ip: &str) -> Option<usize> {
        self.iter()
            .find(|(_, link)| link.remote.simulated_ip == simulated_ip)
            .map(|(slot, _)| slot)
    }

    pub fn get(&self, slot: usize) -> Option<&NeighborLink> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut NeighborLink> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    pub fn link_to(&self, simulated_ip: &str) -> Option<&NeighborLink> {
        self.slot_of(simulated_ip).and_then(|slot| self.get(slot))
    }

    pub fn link_to_mut(&mut self, simulated_ip: &str) -> Option<&mut NeighborLink> {
        let slot = self.slot_of(simulated_ip)?;
        self.get_mut(slot)
    }

    pub fn neighbor_count(&self, min_status: HandshakeStatus) -> usize {
        self.iter().filter(|(_, link)| link.status >= min_status).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &NeighborLink)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, link)| link.as_ref().map(|link| (slot, link)))
    }

    pub fn adjacent(&self) -> impl Iterator<Item = &NeighborLink> {
        self.iter().map(|(_, link)| link).filter(|link| link.is_adjacent())
    }

    /// One descriptor per `TWO_WAY` link, in slot order.
    pub fn descriptors(&self) -> Vec<LinkDescriptor> {
        self.adjacent()
            .map(|link| LinkDescriptor {
                neighbor_id: link.remote.simulated_ip.clone(),
                neighbor_port: i32::from(link.remote.process_port),
                weight: i64::from(link.weight),
            })
            .collect()
    }

    fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    fn is_self(&self, process_ip: &str, process_port: u32, simulated_ip: &str) -> bool {
        simulated_ip == self.local.simulated_ip
            || simulated_ip == self.local.process_ip
            || (process_ip == self.local.process_ip && process_port == u32::from(self.local.process_port))
    }
}
