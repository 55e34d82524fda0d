//! piawg Network Layer
//!
//! HTTPS plumbing for talking to the VPN provider.
//!
//! Two kinds of outbound call exist:
//! 1. Bootstrap calls (server feed, CA bundle) → plain HTTPS, webpki roots
//! 2. Provider API calls → [`PinnedTransport`]: the hostname is answered
//!    from a static resolver with a caller-chosen IP, and the TLS session
//!    trusts only the provider's root CA
//!
//! Every request is a single HTTP/1.1 GET on a fresh connection, with a
//! connect deadline and an overall deadline. Bodies are read in full.

mod auth;
mod client;
mod error;
mod pinned;
mod resolver;

pub use auth::{Credentials, RequestAuth};
pub use client::{HttpClient, HttpClientConfig, Response};
pub use error::TransportError;
pub use pinned::{PinnedTransport, pinned_tls_config};
pub use resolver::{Server, StaticResolver};
