use std::fmt;

/// Metadata attached to a server by the discovery backend.
///
/// Servers seeded from static configuration only carry host and port
/// (`Basic`). Servers obtained from a richer discovery backend carry
/// locality and secure-port information (`Discovery`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMeta {
    /// Host and port only; nothing else is known about the server.
    Basic,

    /// Discovery-enriched metadata.
    Discovery {
        /// Instance identifier assigned by the discovery backend
        instance_id: String,
        /// Locality grouping (e.g., availability zone)
        zone: String,
        /// Whether the server advertises a secure (TLS) port
        secure_port_enabled: bool,
    },
}

/// A single candidate endpoint for one logical client name.
///
/// Servers are immutable: each registry refresh produces a fresh set
/// rather than mutating servers in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    /// Hostname or IP address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Discovery metadata, if any
    pub meta: ServerMeta,
}

impl Server {
    /// Create a server with host and port only
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            meta: ServerMeta::Basic,
        }
    }

    /// Create a server with discovery metadata
    pub fn with_meta(host: impl Into<String>, port: u16, meta: ServerMeta) -> Self {
        Self {
            host: host.into(),
            port,
            meta,
        }
    }

    /// `host:port`, used as the probe cache key and the rewritten authority
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Zone reported by the discovery backend, if known
    pub fn zone(&self) -> Option<&str> {
        match &self.meta {
            ServerMeta::Basic => None,
            ServerMeta::Discovery { zone, .. } => Some(zone),
        }
    }

    /// Whether this server should be reached over the secure scheme.
    ///
    /// Discovery metadata carries an explicit flag. Without it, fall back
    /// to a best-effort heuristic: a port number that textually ends in
    /// "443" (443, 8443, ...) is taken as secure. The heuristic is an
    /// approximation, not a security guarantee.
    pub fn is_secure(&self) -> bool {
        match &self.meta {
            ServerMeta::Discovery {
                secure_port_enabled,
                ..
            } => *secure_port_enabled,
            ServerMeta::Basic => self.port.to_string().ends_with("443"),
        }
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovery(zone: &str, secure: bool) -> ServerMeta {
        ServerMeta::Discovery {
            instance_id: "i-1".to_string(),
            zone: zone.to_string(),
            secure_port_enabled: secure,
        }
    }

    #[test]
    fn test_basic_server() {
        let server = Server::new("a.example.com", 8080);
        assert_eq!(server.addr(), "a.example.com:8080");
        assert_eq!(server.zone(), None);
        assert!(!server.is_secure());
    }

    #[test]
    fn test_port_suffix_heuristic() {
        assert!(Server::new("a", 443).is_secure());
        assert!(Server::new("a", 8443).is_secure());
        assert!(!Server::new("a", 4430).is_secure());
        assert!(!Server::new("a", 80).is_secure());
    }

    #[test]
    fn test_discovery_flag_wins_over_port() {
        // Explicit metadata overrides the port heuristic in both directions
        let secure = Server::with_meta("a", 80, discovery("zone-1", true));
        assert!(secure.is_secure());

        let insecure = Server::with_meta("a", 8443, discovery("zone-1", false));
        assert!(!insecure.is_secure());
    }

    #[test]
    fn test_zone() {
        let server = Server::with_meta("a", 80, discovery("us-east-1a", false));
        assert_eq!(server.zone(), Some("us-east-1a"));
    }
}
