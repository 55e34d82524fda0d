//! piawg VPN - WireGuard Provisioning for Private Internet Access
//!
//! Turns account credentials into a ready-to-use WireGuard config by talking
//! to the provider's region servers over certificate-pinned TLS.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │ ServerDirectory  │────▶│  region → server │
//! │ (signed feed)    │     │  (meta / wg)     │
//! └──────────────────┘     └────────┬─────────┘
//!                                   │
//!          ┌────────────────────────┴──────────────────┐
//!          ▼                                           ▼
//! ┌──────────────────┐  token   ┌──────────────────┐  result  ┌──────────────┐
//! │ generateToken    │─────────▶│ addKey :1337     │─────────▶│  WgConfig    │
//! │ (Basic auth)     │          │ (token in URL)   │          │  document    │
//! └──────────────────┘          └──────────────────┘          └──────────────┘
//!          ▲                             ▲
//!          └──────── PinnedTransport ────┘
//!            (static DNS, pinned root CA)
//! ```
//!
//! # Security
//!
//! - API hosts are reached by IP from the feed, never through public DNS
//! - API TLS trusts only the provider's root CA
//! - Basic credentials and the token are never sent on the same request
//! - Keys and credentials are not persisted or logged

mod auth;
mod config;
mod directory;
mod exchange;
mod generator;
mod keys;
mod provider;

pub use auth::{API_PORT, TOKEN_PATH, authenticate, token_url};
pub use config::{
    ALLOWED_IPS, Endpoint, PERSISTENT_KEEPALIVE, RenderError, WG_PORT, WgConfig, WgConfigBuilder,
    render,
};
pub use directory::{DirectoryError, Region, RegionInfo, ServerDirectory, ServerRole};
pub use exchange::{KeyExchangeResult, add_key_url, register_key};
pub use generator::{
    GenerateError, GeneratorConfig, ProvisionOptions, Stage, WgGenerator, provision,
};
pub use keys::{KeyError, KeyPair, PrivateKey, PublicKey};
pub use provider::{
    CA_CERT_URL, DEFAULT_REGION, PiaClient, ProviderEndpoints, ProviderError, SERVER_LIST_URL,
    WgProvider,
};

pub use piawg_network::{Credentials, HttpClient, HttpClientConfig, PinnedTransport, Server};
