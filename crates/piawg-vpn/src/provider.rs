//! VPN Provider Client
//!
//! [`WgProvider`] is everything the config generator needs from the
//! provider: a token, a key registration, and the identity of the metadata
//! server. [`PiaClient`] is the networked implementation; tests substitute
//! their own.
//!
//! # Usage
//!
//! ```rust,ignore
//! let client = PiaClient::connect(credentials, Region::from("us_california"), &endpoints, config).await?;
//! let token = client.token().await?;
//! let result = client.add_key(&token, key_pair.public_key()).await?;
//! ```

use async_trait::async_trait;
use piawg_network::{Credentials, HttpClient, HttpClientConfig, PinnedTransport, Server, TransportError};
use std::sync::Arc;
use tracing::info;

use crate::auth::API_PORT;
use crate::config::WG_PORT;
use crate::directory::{DirectoryError, Region, ServerDirectory, ServerRole};
use crate::exchange::KeyExchangeResult;
use crate::{auth, exchange};

/// Provider server feed
pub const SERVER_LIST_URL: &str = "https://serverlist.piaservers.net/vpninfo/servers/v6";

/// Provider root CA used to pin API calls
pub const CA_CERT_URL: &str =
    "https://raw.githubusercontent.com/pia-foss/desktop/master/daemon/res/ca/rsa_4096.crt";

/// Region used when none is given
pub const DEFAULT_REGION: &str = "us_california";

/// Bootstrap URLs and API ports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub server_list_url: String,
    pub ca_cert_url: String,
    /// Port of `generateToken` on metadata servers
    pub api_port: u16,
    /// Port of `addKey` on registration servers
    pub registration_port: u16,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            server_list_url: SERVER_LIST_URL.to_string(),
            ca_cert_url: CA_CERT_URL.to_string(),
            api_port: API_PORT,
            registration_port: WG_PORT,
        }
    }
}

/// Provider errors
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Failure loading the pinned CA
    pub fn is_certificate(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Certificate(_)))
    }
}

/// Operations the config generator needs from a provider
#[async_trait]
pub trait WgProvider: Send + Sync {
    /// Short-lived auth token
    async fn token(&self) -> Result<String, ProviderError>;

    /// Register `public_key`, authorised by `token`
    async fn add_key(&self, token: &str, public_key: &str) -> Result<KeyExchangeResult, ProviderError>;

    /// Metadata server of the selected region
    fn metadata_server(&self) -> Result<Server, ProviderError>;
}

/// Networked provider client bound to one account and region
pub struct PiaClient {
    directory: Arc<ServerDirectory>,
    transport: Arc<PinnedTransport>,
    credentials: Credentials,
    region: Region,
    api_port: u16,
    registration_port: u16,
}

impl PiaClient {
    /// Assemble from parts. Credentials must be non-empty.
    pub fn new(
        directory: Arc<ServerDirectory>,
        transport: Arc<PinnedTransport>,
        credentials: Credentials,
        region: Region,
    ) -> Result<Self, ProviderError> {
        if !credentials.is_complete() {
            return Err(ProviderError::Validation(
                "username and password cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            directory,
            transport,
            credentials,
            region,
            api_port: API_PORT,
            registration_port: WG_PORT,
        })
    }

    /// Override the token and `addKey` ports
    pub fn with_ports(mut self, api_port: u16, registration_port: u16) -> Self {
        self.api_port = api_port;
        self.registration_port = registration_port;
        self
    }

    /// Download the server list and prepare a pinned transport.
    ///
    /// The CA itself is fetched lazily on the first API call.
    pub async fn connect(
        credentials: Credentials,
        region: Region,
        endpoints: &ProviderEndpoints,
        config: HttpClientConfig,
    ) -> Result<Self, ProviderError> {
        if !credentials.is_complete() {
            return Err(ProviderError::Validation(
                "username and password cannot be empty".to_string(),
            ));
        }

        let http = HttpClient::new(config);
        let directory = ServerDirectory::fetch(&http, &endpoints.server_list_url).await?;
        let transport = PinnedTransport::new(http, endpoints.ca_cert_url.clone());

        info!("Creating client for region {}", region);
        Ok(Self::new(Arc::new(directory), Arc::new(transport), credentials, region)?
            .with_ports(endpoints.api_port, endpoints.registration_port))
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn directory(&self) -> &ServerDirectory {
        &self.directory
    }
}

#[async_trait]
impl WgProvider for PiaClient {
    async fn token(&self) -> Result<String, ProviderError> {
        auth::authenticate(
            &self.transport,
            &self.directory,
            &self.credentials,
            &self.region,
            self.api_port,
        )
        .await
    }

    async fn add_key(&self, token: &str, public_key: &str) -> Result<KeyExchangeResult, ProviderError> {
        exchange::register_key(
            &self.transport,
            &self.directory,
            token,
            public_key,
            &self.region,
            self.registration_port,
        )
        .await
    }

    fn metadata_server(&self) -> Result<Server, ProviderError> {
        Ok(self
            .directory
            .server_for(&self.region, ServerRole::Metadata)?
            .clone())
    }
}
