//! Lifecycle for named clients.
//!
//! One started [`LoadBalancer`] per logical client name, built from
//! [`Config`] at startup and torn down with [`ClientRegistry::shutdown`].
//! Distinct client names never share a registry snapshot or probe
//! cache; each balancer owns its own.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Config;
use crate::lb::{BalanceError, LoadBalancer};
use crate::router::RequestRouter;

/// Factory and owner of the per-client-name load balancers
pub struct ClientRegistry {
    clients: HashMap<String, Arc<LoadBalancer>>,
}

impl ClientRegistry {
    /// Build and start one balancer per configured client name.
    ///
    /// Any invalid client configuration fails the whole build; nothing
    /// is left half-started.
    pub async fn new(config: &Config) -> Result<Self, BalanceError> {
        let mut clients = HashMap::new();
        for (name, client_config) in &config.clients {
            let balancer = Arc::new(
                LoadBalancer::builder(name.clone(), client_config.clone()).build()?,
            );
            balancer.start().await;
            info!(client = %name, "load balancer started");
            clients.insert(name.clone(), balancer);
        }
        Ok(Self { clients })
    }

    /// Look up the balancer for a logical client name
    pub fn client(&self, name: &str) -> Option<Arc<LoadBalancer>> {
        self.clients.get(name).cloned()
    }

    /// Build a router over the named client's balancer
    pub fn router(&self, name: &str) -> Option<RequestRouter> {
        self.client(name).map(RequestRouter::new)
    }

    /// Configured client names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    /// Stop every balancer's background tasks. Idempotent.
    pub fn shutdown(&self) {
        for (name, balancer) in &self.clients {
            balancer.shutdown();
            debug!(client = %name, "load balancer stopped");
        }
    }
}
