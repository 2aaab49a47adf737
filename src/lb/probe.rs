use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::registry::Registry;
use super::server::Server;
use super::BalanceError;

/// Reachability capability consulted on every selection attempt.
///
/// `is_reachable` must not block: implementations that perform network
/// I/O keep a cache updated by a background task started via `start`.
pub trait HealthProbe: Send + Sync {
    /// Reachability verdict for this selection attempt
    fn is_reachable(&self, server: &Server) -> bool;

    /// Spawn the background task keeping probe state current, if the
    /// implementation needs one
    fn start(self: Arc<Self>, registry: Arc<Registry>) -> Option<JoinHandle<()>> {
        let _ = registry;
        None
    }
}

/// Default probe: every server is reachable.
///
/// Health checking is the discovery backend's responsibility by default;
/// this variant keeps the selection path free of probe state entirely.
pub struct NoOpProbe;

impl HealthProbe for NoOpProbe {
    fn is_reachable(&self, _server: &Server) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy)]
struct ProbeResult {
    reachable: bool,
    checked_at: Instant,
}

/// Active probe: TCP connect with a hard deadline, cached per server.
///
/// Results are cached for `cache_ttl`; the maintenance loop re-probes
/// the current snapshot every `cache_ttl / 2`, off the selection path.
/// A probe that exceeds its deadline fails closed (unreachable) for the
/// cached interval. Servers with no fresh result are treated as
/// reachable: exclusion requires evidence, not absence of it.
pub struct TcpProbe {
    probe_timeout: Duration,
    cache_ttl: Duration,
    cache: RwLock<HashMap<String, ProbeResult>>,
}

impl TcpProbe {
    pub fn new(probe_timeout: Duration, cache_ttl: Duration) -> Self {
        Self {
            probe_timeout,
            cache_ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn cached(&self, addr: &str) -> Option<ProbeResult> {
        let guard = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(addr).copied()
    }

    fn record(&self, addr: String, reachable: bool) {
        let mut guard = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(
            addr,
            ProbeResult {
                reachable,
                checked_at: Instant::now(),
            },
        );
    }

    /// Probe one server and update its cached result
    pub async fn probe_one(&self, server: &Server) {
        let addr = server.addr();
        let reachable = match timeout(self.probe_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(server = %addr, error = %e, "probe connect failed");
                false
            }
            Err(_) => {
                let e = BalanceError::ProbeTimeout(self.probe_timeout);
                debug!(server = %addr, error = %e, "failing closed");
                false
            }
        };

        let previous = self.cached(&addr).map(|r| r.reachable);
        if previous != Some(reachable) {
            if reachable {
                info!(server = %addr, "server reachable");
            } else {
                warn!(server = %addr, "server unreachable");
            }
        }
        self.record(addr, reachable);
    }

    /// Probe all servers concurrently and wait for the cycle to finish
    pub async fn probe_all(self: Arc<Self>, servers: Vec<Server>) {
        let mut handles = Vec::with_capacity(servers.len());
        for server in servers {
            let probe = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                probe.probe_one(&server).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl HealthProbe for TcpProbe {
    fn is_reachable(&self, server: &Server) -> bool {
        match self.cached(&server.addr()) {
            Some(result) if result.checked_at.elapsed() <= self.cache_ttl => result.reachable,
            // No fresh verdict: leave the server in play
            _ => true,
        }
    }

    fn start(self: Arc<Self>, registry: Arc<Registry>) -> Option<JoinHandle<()>> {
        let interval = self.cache_ttl / 2;
        Some(tokio::spawn(async move {
            info!(
                client = %registry.client(),
                interval_ms = interval.as_millis() as u64,
                "probe maintenance started"
            );
            loop {
                let snapshot = registry.snapshot();
                Arc::clone(&self).probe_all(snapshot.servers.clone()).await;
                sleep(interval).await;
            }
        }))
    }
}
