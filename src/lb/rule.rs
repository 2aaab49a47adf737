use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::server::Server;

/// Zone key for servers the discovery backend reported no locality for
const UNKNOWN_ZONE: &str = "unknown";

/// A candidate annotated with its reachability verdict for one
/// selection attempt
#[derive(Debug, Clone)]
pub struct Candidate {
    pub server: Server,
    pub reachable: bool,
}

/// Picks exactly one server from the filtered, reachability-annotated
/// candidate set.
///
/// `None` means no available server. An implementation must return a
/// server present in its input and must re-derive any scoring from the
/// live candidate set on every call; the only cross-call state allowed
/// is a counter or random number source.
pub trait SelectionRule: Send + Sync {
    fn choose(&self, candidates: &[Candidate]) -> Option<Server>;
}

/// Zone-avoidance selection.
///
/// Partitions candidates by zone and scores each zone by its fraction
/// of reachable servers. Zones scoring below `threshold` relative to
/// the best zone are excluded; the pick is uniform over the reachable
/// servers of the remaining zones. When all zones score equally, every
/// reachable candidate stays in the pool, so the tie-break is uniform
/// over all of them.
pub struct ZoneAvoidanceRule {
    threshold: f64,
    rng: Mutex<StdRng>,
}

impl ZoneAvoidanceRule {
    /// Create a rule with an entropy-seeded random source.
    /// `threshold` is the relative availability cutoff in (0, 1].
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Create a rule with a fixed seed, for deterministic selection
    pub fn with_seed(threshold: f64, seed: u64) -> Self {
        Self {
            threshold,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn pick(&self, len: usize) -> usize {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen_range(0..len)
    }
}

impl SelectionRule for ZoneAvoidanceRule {
    fn choose(&self, candidates: &[Candidate]) -> Option<Server> {
        if candidates.is_empty() {
            return None;
        }

        // Per-zone (reachable, total), keyed in stable order
        let mut zones: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for candidate in candidates {
            let zone = candidate.server.zone().unwrap_or(UNKNOWN_ZONE);
            let entry = zones.entry(zone).or_insert((0, 0));
            entry.1 += 1;
            if candidate.reachable {
                entry.0 += 1;
            }
        }

        let score = |(reachable, total): (usize, usize)| reachable as f64 / total as f64;
        let best = zones
            .values()
            .map(|&counts| score(counts))
            .fold(0.0_f64, f64::max);

        let kept: HashSet<&str> = zones
            .iter()
            .filter(|&(_, &counts)| score(counts) >= best * self.threshold)
            .map(|(&zone, _)| zone)
            .collect();

        let pool: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| c.reachable)
            .filter(|c| kept.contains(c.server.zone().unwrap_or(UNKNOWN_ZONE)))
            .collect();

        if pool.is_empty() {
            return None;
        }
        Some(pool[self.pick(pool.len())].server.clone())
    }
}

/// Round-robin over the reachable candidates, for deployments without
/// zone metadata.
pub struct RoundRobinRule {
    counter: AtomicUsize,
}

impl RoundRobinRule {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinRule {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionRule for RoundRobinRule {
    fn choose(&self, candidates: &[Candidate]) -> Option<Server> {
        let reachable: Vec<&Candidate> = candidates.iter().filter(|c| c.reachable).collect();
        if reachable.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % reachable.len();
        Some(reachable[index].server.clone())
    }
}
