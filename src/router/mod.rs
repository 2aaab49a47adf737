//! Retargets outgoing requests to a balancer-chosen server.
//!
//! The router replaces the request URI's authority with the chosen
//! server's `host:port`, preserving path and query, and upgrades the
//! scheme to `https` when the server advertises secure-port support.
//! The upgrade is strictly one-directional: a request already on
//! `https` is never downgraded.

use std::sync::Arc;

use http::{Request, Uri};
use tracing::debug;

use crate::lb::{BalanceError, LoadBalancer, Server};

/// Routes requests addressed to a logical client name through its
/// load balancer
pub struct RequestRouter {
    balancer: Arc<LoadBalancer>,
}

impl RequestRouter {
    pub fn new(balancer: Arc<LoadBalancer>) -> Self {
        Self { balancer }
    }

    /// The balancer this router consults
    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.balancer
    }

    /// Retarget one request to a chosen server.
    ///
    /// Fails with [`BalanceError::NoAvailableServer`] when selection
    /// fails; the original, unroutable target is never returned
    /// silently.
    pub fn route<B>(&self, request: Request<B>) -> Result<Request<B>, BalanceError> {
        let server = self.balancer.choose()?;
        let (mut parts, body) = request.into_parts();
        parts.uri = rewrite_uri(&parts.uri, &server)?;
        debug!(
            client = %self.balancer.client(),
            server = %server,
            target = %parts.uri,
            "request retargeted"
        );
        Ok(Request::from_parts(parts, body))
    }
}

/// Rebuild a URI against a chosen server.
///
/// Path and query are carried over unchanged. The scheme is upgraded
/// to `https` when the request is not already secure and the server
/// advertises secure support; otherwise the original scheme is kept
/// (`http` when absent).
///
/// Fragments are not carried: [`http::Uri`] does not model them, so a
/// fragment on the inbound target is dropped during parsing before
/// this function runs. Request targets on the wire never carry
/// fragments, so nothing reaching the router is affected.
pub fn rewrite_uri(uri: &Uri, server: &Server) -> Result<Uri, BalanceError> {
    let scheme = if uri.scheme_str() == Some("https") {
        "https"
    } else if server.is_secure() {
        "https"
    } else {
        uri.scheme_str().unwrap_or("http")
    };

    let authority = server.addr();
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    Uri::builder()
        .scheme(scheme)
        .authority(authority.as_str())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| BalanceError::InvalidServerAddress(format!("{authority}: {e}")))
}
