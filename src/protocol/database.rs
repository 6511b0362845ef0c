use std::collections::BTreeMap;
use std::fmt::Write;

use crate::algorithms::dijkstra::{self, PathResult};
use crate::types::{LinkAdvertisement, SequenceNumber};
use crate::RouterId;

/// Outcome of offering an advertisement to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// Stored; `first_seen` is set when the origin was unknown before.
    Accepted { first_seen: bool },
    /// Not newer than what is stored; nothing changed.
    Stale,
}

impl Ingest {
    pub fn is_accepted(self) -> bool {
        matches!(self, Ingest::Accepted { .. })
    }
}

/// Latest known advertisement per router. Entries are only ever replaced by
/// a strictly newer sequence number, never merged or removed.
#[derive(Debug, Clone)]
pub struct LinkStateDatabase {
    own: LinkAdvertisement,
    store: BTreeMap<RouterId, LinkAdvertisement>,
}

impl LinkStateDatabase {
    pub fn new(local_id: &str) -> Self {
        Self {
            own: LinkAdvertisement::placeholder(local_id),
            store: BTreeMap::new(),
        }
    }

    pub fn local_id(&self) -> &str {
        &self.own.link_state_id
    }

    pub fn ingest(&mut self, lsa: LinkAdvertisement) -> Ingest {
        if lsa.link_state_id == self.own.link_state_id {
            if lsa.sequence > self.own.sequence {
                self.own = lsa;
                return Ingest::Accepted { first_seen: false };
            }
            return Ingest::Stale;
        }

        match self.store.get(&lsa.link_state_id) {
            Some(stored) if lsa.sequence <= stored.sequence => Ingest::Stale,
            Some(_) => {
                self.store.insert(lsa.link_state_id.clone(), lsa);
                Ingest::Accepted { first_seen: false }
            }
            None => {
                self.store.insert(lsa.link_state_id.clone(), lsa);
                Ingest::Accepted { first_seen: true }
            }
        }
    }

    pub fn self_advertisement(&self) -> &LinkAdvertisement {
        &self.own
    }

    pub fn get(&self, router_id: &str) -> Option<&LinkAdvertisement> {
        if router_id == self.own.link_state_id {
            Some(&self.own)
        } else {
            self.store.get(router_id)
        }
    }

    pub fn sequence_of(&self, router_id: &str) -> Option<SequenceNumber> {
        self.get(router_id).map(|lsa| lsa.sequence)
    }

    pub fn contains(&self, router_id: &str) -> bool {
        self.get(router_id).is_some()
    }

    /// Every advertisement, ordered by identifier.
    pub fn iter(&self) -> impl Iterator<Item = &LinkAdvertisement> {
        let mut all: Vec<&LinkAdvertisement> = self.store.values().collect();
        let at = all.partition_point(|lsa| lsa.link_state_id < self.own.link_state_id);
        all.insert(at, &self.own);
        all.into_iter()
    }

    pub fn shortest_path(&self, destination: &str) -> PathResult {
        dijkstra::shortest_path(self, destination)
    }

    pub fn render(&self) -> String {
        let mut output = String::new();
        for lsa in self.iter() {
            let _ = write!(output, "{}({}):\t", lsa.link_state_id, lsa.sequence);
            for link in &lsa.links {
                let _ = write!(output, "{},{},{}\t", link.neighbor_id, link.neighbor_port, link.weight);
            }
            output.push('\n');
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LinkDescriptor, NEVER_ADVERTISED};

    fn lsa(id: &str, sequence: i64) -> LinkAdvertisement {
        LinkAdvertisement {
            link_state_id: id.to_string(),
            sequence,
            links: vec![LinkDescriptor {
                neighbor_id: "10.0.0.1".to_string(),
                neighbor_port: 5000,
                weight: 2,
            }],
        }
    }

    #[test]
    fn seeded_with_self_placeholder() {
        let lsd = LinkStateDatabase::new("10.0.0.1");
        let own = lsd.self_advertisement();
        assert_eq!(own.link_state_id, "10.0.0.1");
        assert_eq!(own.sequence, NEVER_ADVERTISED);
        assert_eq!(own.links.len(), 1);
        assert_eq!(lsd.iter().count(), 1);
    }

    #[test]
    fn ingest_replaces_only_if_newer() {
        let mut lsd = LinkStateDatabase::new("10.0.0.1");
        assert_eq!(lsd.ingest(lsa("10.0.0.2", 3)), Ingest::Accepted { first_seen: true });
        assert_eq!(lsd.ingest(lsa("10.0.0.2", 3)), Ingest::Stale);
        assert_eq!(lsd.ingest(lsa("10.0.0.2", 1)), Ingest::Stale);
        assert_eq!(lsd.sequence_of("10.0.0.2"), Some(3));
        assert_eq!(lsd.ingest(lsa("10.0.0.2", 4)), Ingest::Accepted { first_seen: false });
        assert_eq!(lsd.sequence_of("10.0.0.2"), Some(4));
    }

    #[test]
    fn sequence_numbers_never_decrease() {
        let mut lsd = LinkStateDatabase::new("10.0.0.1");
        let mut highest = i64::MIN;
        for sequence in [5, 2, 7, 7, 0, 9, 8, 9] {
            let outcome = lsd.ingest(lsa("10.0.0.2", sequence));
            assert_eq!(outcome.is_accepted(), sequence > highest);
            highest = highest.max(sequence);
            assert_eq!(lsd.sequence_of("10.0.0.2"), Some(highest));
        }
    }

    #[test]
    fn first_origination_replaces_placeholder() {
        let mut lsd = LinkStateDatabase::new("10.0.0.1");
        assert_eq!(lsd.ingest(lsa("10.0.0.1", 0)), Ingest::Accepted { first_seen: false });
        assert_eq!(lsd.self_advertisement().sequence, 0);
        assert_eq!(lsd.ingest(lsa("10.0.0.1", 0)), Ingest::Stale);
    }

    #[test]
    fn render_is_sorted_and_stable() {
        let mut lsd = LinkStateDatabase::new("10.0.0.2");
        lsd.ingest(lsa("10.0.0.3", 1));
        lsd.ingest(lsa("10.0.0.1", 0));
        let rendered = lsd.render();
        let ids: Vec<&str> = rendered
            .lines()
            .map(|line| line.split('(').next().unwrap())
            .collect();
        assert_eq!(ids, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        assert!(rendered.starts_with("10.0.0.1(0):\t10.0.0.1,5000,2\t\n"));

        lsd.ingest(lsa("10.0.0.3", 1));
        assert_eq!(lsd.render(), rendered);
    }
}
