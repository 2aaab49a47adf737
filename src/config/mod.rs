use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::lb::BalanceError;

/// Per-client configuration bundle.
///
/// Immutable after construction for a given client name; shared by
/// reference across the balancer's sub-components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Static seed list of servers (`host:port` or URL entries) for the
    /// configuration-based server source
    #[serde(default)]
    pub servers: Vec<String>,

    /// Seconds between registry refreshes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Seconds a single refresh may take before the stale snapshot is
    /// retained
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_secs: u64,

    /// Zone to prefer during filtering, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_zone: Option<String>,

    /// Relative availability cutoff for zone avoidance, in (0, 1]
    #[serde(default = "default_availability_threshold")]
    pub availability_threshold: f64,

    /// Enable the active TCP probe (default is the no-op probe)
    #[serde(default)]
    pub active_probe: bool,

    /// Hard deadline for one probe attempt, in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Seconds a probe verdict stays valid
    #[serde(default = "default_probe_cache_ttl")]
    pub probe_cache_ttl_secs: u64,

    /// Fixed selection seed; test-only override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_seed: Option<u64>,
}

fn default_refresh_interval() -> u64 {
    30
}

fn default_refresh_timeout() -> u64 {
    5
}

fn default_availability_threshold() -> f64 {
    0.8
}

fn default_probe_timeout_ms() -> u64 {
    1000
}

fn default_probe_cache_ttl() -> u64 {
    10
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            refresh_interval_secs: default_refresh_interval(),
            refresh_timeout_secs: default_refresh_timeout(),
            preferred_zone: None,
            availability_threshold: default_availability_threshold(),
            active_probe: false,
            probe_timeout_ms: default_probe_timeout_ms(),
            probe_cache_ttl_secs: default_probe_cache_ttl(),
            random_seed: None,
        }
    }
}

impl ClientConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn probe_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.probe_cache_ttl_secs)
    }

    /// Reject configurations the selected policies cannot run with.
    /// Called at balancer construction, never per-request.
    pub fn validate(&self, client: &str) -> Result<(), BalanceError> {
        let invalid = |reason: &str| BalanceError::InvalidConfiguration {
            client: client.to_string(),
            reason: reason.to_string(),
        };

        if !(self.availability_threshold > 0.0 && self.availability_threshold <= 1.0) {
            return Err(invalid("availability_threshold must be in (0, 1]"));
        }
        if self.refresh_interval_secs == 0 {
            return Err(invalid("refresh_interval_secs must be positive"));
        }
        if self.refresh_timeout_secs == 0 {
            return Err(invalid("refresh_timeout_secs must be positive"));
        }
        if self.active_probe {
            if self.probe_timeout_ms == 0 {
                return Err(invalid("probe_timeout_ms must be positive"));
            }
            if self.probe_cache_ttl_secs == 0 {
                return Err(invalid("probe_cache_ttl_secs must be positive"));
            }
        }
        Ok(())
    }
}

/// Top-level configuration: one section per logical client name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub clients: HashMap<String, ClientConfig>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the configuration for a logical client name
    pub fn client(&self, name: &str) -> Option<&ClientConfig> {
        self.clients.get(name)
    }
}

/// Load configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    let config: Config =
        serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

    Ok(config)
}

/// Load a single-client configuration from environment variables.
///
/// - `STEER_CLIENT` — logical client name (default "default")
/// - `STEER_SERVERS` — comma-separated `host:port` or URL entries
/// - `STEER_PREFERRED_ZONE` — optional zone preference
/// - `STEER_REFRESH_INTERVAL` — optional, seconds
/// - `STEER_AVAILABILITY_THRESHOLD` — optional, (0, 1]
/// - `STEER_ACTIVE_PROBE` — optional, "true" to enable the TCP probe
pub fn load_from_env() -> Result<Config> {
    // Pick up a .env file when present; its absence is not an error
    let _ = dotenvy::dotenv();

    let name = std::env::var("STEER_CLIENT").unwrap_or_else(|_| "default".to_string());

    let servers_str =
        std::env::var("STEER_SERVERS").context("STEER_SERVERS environment variable not set")?;

    let servers: Vec<String> = servers_str
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if servers.is_empty() {
        anyhow::bail!("STEER_SERVERS contains no valid entries");
    }

    let mut client = ClientConfig {
        servers,
        ..ClientConfig::default()
    };

    if let Ok(zone) = std::env::var("STEER_PREFERRED_ZONE") {
        client.preferred_zone = Some(zone);
    }
    if let Ok(interval) = std::env::var("STEER_REFRESH_INTERVAL") {
        client.refresh_interval_secs = interval
            .parse()
            .context("STEER_REFRESH_INTERVAL is not a number")?;
    }
    if let Ok(threshold) = std::env::var("STEER_AVAILABILITY_THRESHOLD") {
        client.availability_threshold = threshold
            .parse()
            .context("STEER_AVAILABILITY_THRESHOLD is not a number")?;
    }
    if let Ok(active) = std::env::var("STEER_ACTIVE_PROBE") {
        client.active_probe = active == "true" || active == "1";
    }

    let mut config = Config::new();
    config.clients.insert(name, client);
    Ok(config)
}

/// Load configuration from a YAML file when a path is given, otherwise
/// from the environment
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    match config_path {
        Some(path) => load_from_yaml(path),
        None => load_from_env(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_yaml() {
        let yaml = r#"
clients:
  billing:
    servers:
      - billing-1.example.com:8080
      - billing-2.example.com:8080
    refresh_interval_secs: 10
    preferred_zone: us-east-1a
    availability_threshold: 0.9
    active_probe: true
    probe_timeout_ms: 250
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let client = config.client("billing").unwrap();

        assert_eq!(client.servers.len(), 2);
        assert_eq!(client.refresh_interval_secs, 10);
        assert_eq!(client.preferred_zone.as_deref(), Some("us-east-1a"));
        assert_eq!(client.availability_threshold, 0.9);
        assert!(client.active_probe);
        assert_eq!(client.probe_timeout_ms, 250);
    }

    #[test]
    fn test_default_values() {
        let yaml = r#"
clients:
  minimal:
    servers:
      - a.example.com:80
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let client = config.client("minimal").unwrap();

        assert_eq!(client.refresh_interval_secs, 30);
        assert_eq!(client.availability_threshold, 0.8);
        assert!(!client.active_probe);
        assert_eq!(client.preferred_zone, None);
        assert_eq!(client.random_seed, None);
    }

    #[test]
    fn test_validate_threshold_bounds() {
        let mut config = ClientConfig::default();
        assert!(config.validate("c").is_ok());

        config.availability_threshold = 0.0;
        assert!(matches!(
            config.validate("c"),
            Err(BalanceError::InvalidConfiguration { .. })
        ));

        config.availability_threshold = 1.5;
        assert!(config.validate("c").is_err());
    }

    #[test]
    fn test_validate_probe_parameters_only_when_active() {
        let mut config = ClientConfig {
            probe_timeout_ms: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate("c").is_ok(), "no-op probe ignores probe params");

        config.active_probe = true;
        assert!(config.validate("c").is_err());
    }

    #[test]
    fn test_validate_zero_refresh_interval() {
        let config = ClientConfig {
            refresh_interval_secs: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate("c").is_err());
    }
}
