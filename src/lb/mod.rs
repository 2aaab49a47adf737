//! Load balancing pipeline for one logical client name.
//!
//! # Components
//!
//! - [`Server`]: a candidate endpoint with optional discovery metadata
//! - [`Registry`]: periodically refreshed snapshot of candidate servers,
//!   fed by a pluggable [`ServerSource`]
//! - [`HealthProbe`]: reachability checks ([`NoOpProbe`] by default,
//!   [`TcpProbe`] for active probing with a cached result)
//! - [`SelectionFilter`]: narrows the candidate set before selection
//!   ([`ZonePreferenceFilter`], [`PassThroughFilter`])
//! - [`SelectionRule`]: picks one server from the filtered,
//!   reachability-annotated candidates ([`ZoneAvoidanceRule`],
//!   [`RoundRobinRule`])
//! - [`LoadBalancer`]: composes the above into a single `choose()` and
//!   owns the background refresh and probe tasks
//!
//! # Pipeline
//!
//! `choose()` runs: registry snapshot → filter → probe annotation → rule.
//! Each stage produces a new sequence; nothing is mutated in place, so
//! concurrent callers always observe a fully-consistent snapshot.
//!
//! # Thread safety
//!
//! The registry snapshot is an `Arc` swapped under a lock held only for
//! the pointer exchange; `choose()` never blocks on a refresh in
//! progress. Probe caches are updated off the selection path.

pub mod balancer;
pub mod filter;
pub mod probe;
pub mod registry;
pub mod rule;
pub mod server;

use std::time::Duration;

pub use balancer::{LoadBalancer, LoadBalancerBuilder};
pub use filter::{PassThroughFilter, SelectionFilter, ZonePreferenceFilter};
pub use probe::{HealthProbe, NoOpProbe, TcpProbe};
pub use registry::{Registry, ServerSource, Snapshot, StaticServerList};
pub use rule::{Candidate, RoundRobinRule, SelectionRule, ZoneAvoidanceRule};
pub use server::{Server, ServerMeta};

/// Errors surfaced by the selection and routing pipeline
#[derive(Debug, thiserror::Error)]
pub enum BalanceError {
    /// The filtered, health-pruned candidate set is empty. Not retried
    /// internally; retry policy belongs to the caller.
    #[error("no available server for client '{0}'")]
    NoAvailableServer(String),

    /// A client configuration is missing or out of range for the selected
    /// policy. Fatal at construction time.
    #[error("invalid configuration for client '{client}': {reason}")]
    InvalidConfiguration { client: String, reason: String },

    /// The discovery backend could not be reached during a refresh.
    /// Recovered locally by serving the last-known snapshot.
    #[error("discovery backend unavailable: {0}")]
    DiscoveryUnavailable(String),

    /// A health probe exceeded its deadline; the server is treated as
    /// unreachable for that attempt.
    #[error("health probe timed out after {0:?}")]
    ProbeTimeout(Duration),

    /// A chosen server's address could not be assembled into a valid URI
    #[error("invalid server address: {0}")]
    InvalidServerAddress(String),
}
