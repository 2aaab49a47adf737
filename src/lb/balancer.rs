use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::info;

use super::filter::{SelectionFilter, ZonePreferenceFilter};
use super::probe::{HealthProbe, NoOpProbe, TcpProbe};
use super::registry::{Registry, ServerSource, StaticServerList};
use super::rule::{Candidate, SelectionRule, ZoneAvoidanceRule};
use super::server::Server;
use super::BalanceError;
use crate::config::ClientConfig;

/// Client-side load balancer for one logical client name.
///
/// Composes the pipeline: registry snapshot → filter → probe
/// annotation → rule. `choose()` is synchronous and safe for
/// concurrent callers; it reads the most recently completed snapshot
/// and never waits on a refresh in progress. The balancer owns the
/// refresh cadence and the probe maintenance task; `shutdown()` stops
/// both.
pub struct LoadBalancer {
    client: String,
    config: Arc<ClientConfig>,
    registry: Arc<Registry>,
    probe: Arc<dyn HealthProbe>,
    filter: Box<dyn SelectionFilter>,
    rule: Box<dyn SelectionRule>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LoadBalancer {
    /// Start assembling a balancer for a logical client name
    pub fn builder(client: impl Into<String>, config: ClientConfig) -> LoadBalancerBuilder {
        LoadBalancerBuilder {
            client: client.into(),
            config,
            source: None,
            probe: None,
            filter: None,
            rule: None,
        }
    }

    /// Logical client name this balancer serves
    pub fn client(&self) -> &str {
        &self.client
    }

    /// The registry feeding this balancer
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Pick one server from the current snapshot.
    ///
    /// Fails with [`BalanceError::NoAvailableServer`] when the
    /// filtered, health-pruned candidate set is empty. Never blocks on
    /// a refresh; concurrent callers each see a complete snapshot.
    pub fn choose(&self) -> Result<Server, BalanceError> {
        let snapshot = self.registry.snapshot();
        if snapshot.servers.is_empty() {
            return Err(BalanceError::NoAvailableServer(self.client.clone()));
        }

        let filtered = self.filter.apply(&snapshot.servers);
        let candidates: Vec<Candidate> = filtered
            .into_iter()
            .map(|server| Candidate {
                reachable: self.probe.is_reachable(&server),
                server,
            })
            .collect();

        self.rule
            .choose(&candidates)
            .ok_or_else(|| BalanceError::NoAvailableServer(self.client.clone()))
    }

    /// Refresh the registry once, outside the periodic cadence
    pub async fn refresh_now(&self) {
        self.registry.refresh().await;
    }

    /// Perform the initial refresh and spawn the periodic refresh and
    /// probe maintenance tasks
    pub async fn start(&self) {
        self.registry.refresh().await;

        let registry = Arc::clone(&self.registry);
        let interval = self.config.refresh_interval();
        let client = self.client.clone();
        let refresh = tokio::spawn(async move {
            info!(
                client = %client,
                interval_secs = interval.as_secs(),
                "registry refresh loop started"
            );
            loop {
                sleep(interval).await;
                registry.refresh().await;
            }
        });

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.push(refresh);
        if let Some(maintenance) = Arc::clone(&self.probe).start(Arc::clone(&self.registry)) {
            tasks.push(maintenance);
        }
    }

    /// Stop the background tasks. Idempotent.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

/// Assembles a [`LoadBalancer`] from a client configuration plus the
/// four substitution points: server source, health probe, selection
/// filter, selection rule. Each defaults to the stock implementation
/// when not supplied.
pub struct LoadBalancerBuilder {
    client: String,
    config: ClientConfig,
    source: Option<Arc<dyn ServerSource>>,
    probe: Option<Arc<dyn HealthProbe>>,
    filter: Option<Box<dyn SelectionFilter>>,
    rule: Option<Box<dyn SelectionRule>>,
}

impl LoadBalancerBuilder {
    /// Replace the configuration-seeded server source
    pub fn with_source(mut self, source: Arc<dyn ServerSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Replace the default health probe
    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Replace the default zone-preference filter
    pub fn with_filter(mut self, filter: Box<dyn SelectionFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Replace the default zone-avoidance rule
    pub fn with_rule(mut self, rule: Box<dyn SelectionRule>) -> Self {
        self.rule = Some(rule);
        self
    }

    /// Validate the configuration and build the balancer.
    ///
    /// Configuration problems fail here, never later per-request.
    pub fn build(self) -> Result<LoadBalancer, BalanceError> {
        let client = self.client;
        let config = self.config;
        config.validate(&client)?;

        let source: Arc<dyn ServerSource> = match self.source {
            Some(source) => source,
            None => {
                if config.servers.is_empty() {
                    return Err(BalanceError::InvalidConfiguration {
                        client,
                        reason: "no servers configured and no server source supplied".to_string(),
                    });
                }
                Arc::new(StaticServerList::from_entries(&client, &config.servers)?)
            }
        };

        let probe: Arc<dyn HealthProbe> = match self.probe {
            Some(probe) => probe,
            None if config.active_probe => Arc::new(TcpProbe::new(
                config.probe_timeout(),
                config.probe_cache_ttl(),
            )),
            None => Arc::new(NoOpProbe),
        };

        let filter = self
            .filter
            .unwrap_or_else(|| Box::new(ZonePreferenceFilter::new(config.preferred_zone.clone())));

        let rule: Box<dyn SelectionRule> = match self.rule {
            Some(rule) => rule,
            None => match config.random_seed {
                Some(seed) => Box::new(ZoneAvoidanceRule::with_seed(
                    config.availability_threshold,
                    seed,
                )),
                None => Box::new(ZoneAvoidanceRule::new(config.availability_threshold)),
            },
        };

        let registry = Arc::new(Registry::new(
            client.clone(),
            source,
            config.refresh_timeout(),
        ));

        Ok(LoadBalancer {
            client,
            config: Arc::new(config),
            registry,
            probe,
            filter,
            rule,
            tasks: Mutex::new(Vec::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lb::server::ServerMeta;

    struct HostDownProbe {
        down: &'static str,
    }

    impl HealthProbe for HostDownProbe {
        fn is_reachable(&self, server: &Server) -> bool {
            server.host != self.down
        }
    }

    fn config_with(servers: &[&str]) -> ClientConfig {
        ClientConfig {
            servers: servers.iter().map(|s| s.to_string()).collect(),
            random_seed: Some(1),
            ..ClientConfig::default()
        }
    }

    #[tokio::test]
    async fn test_choose_before_any_refresh_is_no_available_server() {
        let lb = LoadBalancer::builder("orders", config_with(&["a:80"]))
            .build()
            .unwrap();

        assert!(matches!(
            lb.choose(),
            Err(BalanceError::NoAvailableServer(_))
        ));
    }

    #[tokio::test]
    async fn test_choose_returns_member_of_snapshot() {
        let lb = LoadBalancer::builder("orders", config_with(&["a:80", "b:80", "c:80"]))
            .build()
            .unwrap();
        lb.refresh_now().await;

        for _ in 0..50 {
            let chosen = lb.choose().unwrap();
            assert!(["a", "b", "c"].contains(&chosen.host.as_str()));
        }
    }

    #[tokio::test]
    async fn test_unreachable_servers_are_pruned() {
        let lb = LoadBalancer::builder("orders", config_with(&["a:80", "b:80"]))
            .with_probe(Arc::new(HostDownProbe { down: "a" }))
            .build()
            .unwrap();
        lb.refresh_now().await;

        for _ in 0..50 {
            assert_eq!(lb.choose().unwrap().host, "b");
        }
    }

    #[tokio::test]
    async fn test_all_unreachable_is_no_available_server() {
        let lb = LoadBalancer::builder("orders", config_with(&["a:80"]))
            .with_probe(Arc::new(HostDownProbe { down: "a" }))
            .build()
            .unwrap();
        lb.refresh_now().await;

        assert!(matches!(
            lb.choose(),
            Err(BalanceError::NoAvailableServer(_))
        ));
    }

    #[tokio::test]
    async fn test_zone_preference_applies_through_pipeline() {
        let servers = vec![
            Server::with_meta(
                "east-1",
                80,
                ServerMeta::Discovery {
                    instance_id: "i-1".to_string(),
                    zone: "east".to_string(),
                    secure_port_enabled: false,
                },
            ),
            Server::with_meta(
                "west-1",
                80,
                ServerMeta::Discovery {
                    instance_id: "i-2".to_string(),
                    zone: "west".to_string(),
                    secure_port_enabled: false,
                },
            ),
        ];
        let config = ClientConfig {
            preferred_zone: Some("west".to_string()),
            random_seed: Some(1),
            ..ClientConfig::default()
        };
        let lb = LoadBalancer::builder("orders", config)
            .with_source(Arc::new(StaticServerList::new(servers)))
            .build()
            .unwrap();
        lb.refresh_now().await;

        for _ in 0..20 {
            assert_eq!(lb.choose().unwrap().host, "west-1");
        }
    }

    #[test]
    fn test_build_rejects_bad_threshold() {
        let config = ClientConfig {
            availability_threshold: 0.0,
            ..config_with(&["a:80"])
        };
        let result = LoadBalancer::builder("orders", config).build();
        assert!(matches!(
            result,
            Err(BalanceError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_build_rejects_empty_static_server_list() {
        let result = LoadBalancer::builder("orders", ClientConfig::default()).build();
        assert!(matches!(
            result,
            Err(BalanceError::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_choose_during_publish() {
        let lb = Arc::new(
            LoadBalancer::builder("orders", config_with(&["a:80", "b:80", "c:80"]))
                .build()
                .unwrap(),
        );
        lb.refresh_now().await;

        let choosers: Vec<_> = (0..4)
            .map(|_| {
                let lb = Arc::clone(&lb);
                std::thread::spawn(move || {
                    for _ in 0..2_000 {
                        let chosen = lb.choose().unwrap();
                        assert!(["a", "b", "c"].contains(&chosen.host.as_str()));
                    }
                })
            })
            .collect();

        for _ in 0..200 {
            lb.refresh_now().await;
        }

        for chooser in choosers {
            chooser.join().unwrap();
        }
    }
}
