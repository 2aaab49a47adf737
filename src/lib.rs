//! steer - client-side load balancing with zone-aware selection and
//! request retargeting
//!
//! Given a logical client name, steer resolves a periodically
//! refreshed set of candidate servers, picks one via a pluggable
//! selection pipeline, and rewrites an outgoing request's target URI
//! to the chosen server, upgrading the scheme to `https` when the
//! server advertises secure-port support.

pub mod clients;
pub mod config;
pub mod lb;
pub mod router;

pub use clients::ClientRegistry;
pub use config::{ClientConfig, Config};
pub use lb::{BalanceError, LoadBalancer, Server};
pub use router::RequestRouter;
