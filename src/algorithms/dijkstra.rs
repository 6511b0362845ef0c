use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;
use tracing::warn;

use crate::protocol::LinkStateDatabase;
use crate::RouterId;

/// Routers from source to destination and the weight of each traversed edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub hops: Vec<RouterId>,
    pub weights: Vec<u64>,
}

impl Route {
    pub fn cost(&self) -> u64 {
        self.weights.iter().sum()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hops = self.hops.iter();
        if let Some(first) = hops.next() {
            write!(f, "{}", first)?;
        }
        for (hop, weight) in hops.zip(&self.weights) {
            write!(f, " ->({}) {}", weight, hop)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathResult {
    NoPath,
    Found(Route),
}

impl fmt::Display for PathResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathResult::NoPath => f.write_str("no path"),
            PathResult::Found(route) => route.fmt(f),
        }
    }
}

/// Single-source shortest path from the database's own router.
///
/// Nodes are the stored advertisement identifiers; `u → v` exists when `u`'s
/// advertisement lists `v`. The frontier is ordered by distance and then by
/// identifier, so equal-cost ties resolve the same way on every run. Edges
/// with a negative weight are logged and skipped.
pub fn shortest_path(lsd: &LinkStateDatabase, destination: &str) -> PathResult {
    let source = lsd.local_id();
    if lsd.get(destination).is_none() {
        return PathResult::NoPath;
    }

    let mut distances: HashMap<&str, u64> = HashMap::new();
    let mut previous: HashMap<&str, (&str, u64)> = HashMap::new();
    let mut settled: HashSet<&str> = HashSet::new();
    let mut frontier = BinaryHeap::new();

    distances.insert(source, 0);
    frontier.push(Reverse((0u64, source)));

    while let Some(Reverse((distance, node))) = frontier.pop() {
        if settled.contains(node) || distance > distances.get(node).copied().unwrap_or(u64::MAX) {
            continue;
        }

        if let Some(lsa) = lsd.get(node) {
            for link in &lsa.links {
                let next = link.neighbor_id.as_str();
                if settled.contains(next) || lsd.get(next).is_none() {
                    continue;
                }
                let weight = match u64::try_from(link.weight) {
                    Ok(weight) => weight,
                    Err(_) => {
                        warn!("Skipping edge {} -> {} with invalid weight {}", node, next, link.weight);
                        continue;
                    }
                };

                let candidate = distance.saturating_add(weight);
                if candidate < distances.get(next).copied().unwrap_or(u64::MAX) {
                    distances.insert(next, candidate);
                    previous.insert(next, (node, weight));
                    frontier.push(Reverse((candidate, next)));
                }
            }
        }

        settled.insert(node);
    }

    if !settled.contains(destination) {
        return PathResult::NoPath;
    }

    let mut hops = vec![destination.to_string()];
    let mut weights = Vec::new();
    let mut current = destination;
    while let Some(&(prev, weight)) = previous.get(current) {
        hops.push(prev.to_string());
        weights.push(weight);
        current = prev;
    }
    hops.reverse();
    weights.reverse();

    PathResult::Found(Route { hops, weights })
}
