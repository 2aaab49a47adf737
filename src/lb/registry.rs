use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::task::spawn_blocking;
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

use super::server::Server;
use super::BalanceError;

/// Pull interface to the discovery backend.
///
/// Implementations return the complete current member list for one
/// logical client name. The registry treats the source as opaque; it
/// only needs host, port, and metadata per member. `fetch` may block on
/// network I/O; the registry runs it on a blocking task with a timeout.
pub trait ServerSource: Send + Sync {
    fn fetch(&self) -> Result<Vec<Server>, BalanceError>;
}

/// Server source seeded from static configuration.
///
/// Accepts `host:port` entries or full URLs (`http://host:port`). A URL
/// without an explicit port uses the scheme default.
pub struct StaticServerList {
    servers: Vec<Server>,
}

impl StaticServerList {
    /// Create a source from already-built servers
    pub fn new(servers: Vec<Server>) -> Self {
        Self { servers }
    }

    /// Parse configured endpoint strings into a source
    pub fn from_entries(client: &str, entries: &[String]) -> Result<Self, BalanceError> {
        let invalid = |entry: &str, reason: String| BalanceError::InvalidConfiguration {
            client: client.to_string(),
            reason: format!("bad server entry '{entry}': {reason}"),
        };

        let mut servers = Vec::with_capacity(entries.len());
        for entry in entries {
            let server = if entry.contains("://") {
                let url = Url::parse(entry).map_err(|e| invalid(entry, e.to_string()))?;
                let host = url
                    .host_str()
                    .ok_or_else(|| invalid(entry, "missing host".to_string()))?
                    .to_string();
                let port = url
                    .port_or_known_default()
                    .ok_or_else(|| invalid(entry, "missing port".to_string()))?;
                Server::new(host, port)
            } else {
                let (host, port) = entry
                    .rsplit_once(':')
                    .ok_or_else(|| invalid(entry, "expected host:port".to_string()))?;
                let port = port
                    .parse::<u16>()
                    .map_err(|e| invalid(entry, format!("bad port: {e}")))?;
                Server::new(host, port)
            };
            servers.push(server);
        }
        Ok(Self { servers })
    }
}

impl ServerSource for StaticServerList {
    fn fetch(&self) -> Result<Vec<Server>, BalanceError> {
        Ok(self.servers.clone())
    }
}

/// One complete, immutable view of the candidate server set
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Candidate servers, in source order
    pub servers: Vec<Server>,
    /// Whether the last refresh failed and this view is last-known-good
    pub stale: bool,
    /// When this view was produced
    pub refreshed_at: Instant,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            servers: Vec::new(),
            stale: false,
            refreshed_at: Instant::now(),
        }
    }
}

/// Holds the current server snapshot for one logical client name.
///
/// `refresh` produces a full replacement snapshot. On failure the
/// registry keeps serving the last-known-good snapshot, marked stale,
/// and never fails the selection path. Publication is an `Arc` swap;
/// readers hold the lock only long enough to clone the pointer, so a
/// concurrent `choose()` sees either the old or the new set in full.
pub struct Registry {
    client: String,
    source: Arc<dyn ServerSource>,
    current: RwLock<Arc<Snapshot>>,
    refresh_timeout: Duration,
}

impl Registry {
    /// Create a registry with an empty initial snapshot
    pub fn new(client: impl Into<String>, source: Arc<dyn ServerSource>, refresh_timeout: Duration) -> Self {
        Self {
            client: client.into(),
            source,
            current: RwLock::new(Arc::new(Snapshot::empty())),
            refresh_timeout,
        }
    }

    /// Logical client name this registry serves
    pub fn client(&self) -> &str {
        &self.client
    }

    /// Get the most recently completed snapshot. Never blocks on a
    /// refresh in progress.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Pull the source and publish a replacement snapshot.
    ///
    /// Runs the pull on a blocking task under `refresh_timeout`. Any
    /// failure (source error, panic, deadline) retains the previous
    /// snapshot and marks it stale.
    pub async fn refresh(&self) {
        let source = Arc::clone(&self.source);
        match timeout(self.refresh_timeout, spawn_blocking(move || source.fetch())).await {
            Ok(Ok(Ok(servers))) => {
                debug!(
                    client = %self.client,
                    servers = servers.len(),
                    "published refreshed server list"
                );
                self.publish(Snapshot {
                    servers,
                    stale: false,
                    refreshed_at: Instant::now(),
                });
            }
            Ok(Ok(Err(e))) => self.mark_stale(&e.to_string()),
            Ok(Err(e)) => self.mark_stale(&format!("discovery pull panicked: {e}")),
            Err(_) => self.mark_stale(&format!(
                "discovery pull exceeded {:?}",
                self.refresh_timeout
            )),
        }
    }

    fn publish(&self, snapshot: Snapshot) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(snapshot);
    }

    fn mark_stale(&self, error: &str) {
        let previous = self.snapshot();
        warn!(
            client = %self.client,
            error = %error,
            servers = previous.servers.len(),
            "refresh failed, serving last-known-good server list"
        );
        if !previous.stale {
            self.publish(Snapshot {
                servers: previous.servers.clone(),
                stale: true,
                refreshed_at: previous.refreshed_at,
            });
        }
    }
}
