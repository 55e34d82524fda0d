//! Config Generator
//!
//! Runs the provisioning pipeline:
//!
//! ```text
//! token → keys → addKey → render
//! ```
//!
//! Stages run strictly in order; the first failure stops the run and is
//! reported with the stage it came from. Nothing is retried.

use piawg_network::{Credentials, HttpClientConfig, TransportError};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{self, RenderError};
use crate::directory::{DirectoryError, Region};
use crate::keys::KeyPair;
use crate::provider::{PiaClient, ProviderEndpoints, ProviderError, WgProvider};

/// Pipeline stage, for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Directory,
    Certificate,
    Auth,
    Register,
    Render,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Directory => "directory",
            Stage::Certificate => "cert",
            Stage::Auth => "auth",
            Stage::Register => "register",
            Stage::Render => "render",
        };
        f.write_str(name)
    }
}

/// Pipeline errors, one variant per stage
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("error fetching server list")]
    Directory(#[source] ProviderError),

    #[error("error loading pinned CA certificate")]
    Certificate(#[source] ProviderError),

    #[error("error getting token")]
    Auth(#[source] ProviderError),

    #[error("error adding WireGuard public key")]
    Register(#[source] ProviderError),

    #[error("error rendering WireGuard config")]
    Render(#[source] RenderError),

    #[error("provisioning did not finish within {0:?}")]
    Timeout(Duration),
}

impl GenerateError {
    /// Stage that failed; `None` for input validation and overall timeout
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Validation(_) | Self::Timeout(_) => None,
            Self::Directory(_) => Some(Stage::Directory),
            Self::Certificate(_) => Some(Stage::Certificate),
            Self::Auth(_) => Some(Stage::Auth),
            Self::Register(_) => Some(Stage::Register),
            Self::Render(_) => Some(Stage::Render),
        }
    }

    /// Lookup failure for the requested region
    pub fn is_unknown_region(&self) -> bool {
        matches!(
            self,
            Self::Directory(ProviderError::Directory(e))
                | Self::Auth(ProviderError::Directory(e))
                | Self::Register(ProviderError::Directory(e))
                if e.is_lookup()
        )
    }

    /// Provider rejected the credentials (HTTP 401/403 on the token call)
    pub fn is_auth_rejected(&self) -> bool {
        matches!(
            self,
            Self::Auth(ProviderError::Transport(TransportError::Status { status: 401 | 403, .. }))
        )
    }

    /// A failure surfacing from a provider call is attributed to the CA
    /// stage when the pinned certificate could not be loaded.
    fn from_stage(stage: Stage, err: ProviderError) -> Self {
        if err.is_certificate() {
            return Self::Certificate(err);
        }
        match stage {
            Stage::Directory => Self::Directory(err),
            Stage::Certificate => Self::Certificate(err),
            Stage::Auth => Self::Auth(err),
            Stage::Register => Self::Register(err),
            Stage::Render => Self::Render(RenderError::ServerIdentity(err.to_string())),
        }
    }
}

/// Generator options
#[derive(Debug, Clone, Default)]
pub struct GeneratorConfig {
    /// Append `ServerCommonName = <metadata server>` to the document
    pub server_name: bool,
    /// Keys to use; generated when `None`
    pub key_pair: Option<KeyPair>,
}

/// Produces a WireGuard config document from a provider
pub struct WgGenerator<P: WgProvider> {
    provider: P,
    config: GeneratorConfig,
}

impl<P: WgProvider> WgGenerator<P> {
    pub fn new(provider: P, config: GeneratorConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Run token → keys → addKey → render
    pub async fn generate(&self) -> Result<String, GenerateError> {
        info!("Getting token");
        let token = self
            .provider
            .token()
            .await
            .map_err(|e| GenerateError::from_stage(Stage::Auth, e))?;

        let key_pair = self.key_pair();

        info!("Adding WireGuard public key");
        let result = self
            .provider
            .add_key(&token, key_pair.public_key())
            .await
            .map_err(|e| GenerateError::from_stage(Stage::Register, e))?;

        info!("Rendering WireGuard config");
        let identity = if self.config.server_name {
            let server = self
                .provider
                .metadata_server()
                .map_err(|e| GenerateError::from_stage(Stage::Render, e))?;
            server.common_name().to_string()
        } else {
            String::new()
        };

        config::render(&result, &key_pair, self.config.server_name, &identity)
            .map_err(GenerateError::Render)
    }

    fn key_pair(&self) -> KeyPair {
        match &self.config.key_pair {
            Some(pair) => {
                debug!("Using supplied key pair");
                pair.clone()
            }
            None => {
                debug!("Generating WireGuard keys");
                let pair = KeyPair::generate();
                debug!("Public key: {}", pair.public_key());
                pair
            }
        }
    }
}

/// Everything one provisioning run needs
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    pub credentials: Credentials,
    pub region: Region,
    pub endpoints: ProviderEndpoints,
    pub http: HttpClientConfig,
    pub generator: GeneratorConfig,
    /// Deadline for the whole run
    pub timeout: Option<Duration>,
}

impl ProvisionOptions {
    pub fn new(credentials: Credentials, region: Region) -> Self {
        Self {
            credentials,
            region,
            endpoints: ProviderEndpoints::default(),
            http: HttpClientConfig::default(),
            generator: GeneratorConfig::default(),
            timeout: Some(Duration::from_secs(120)),
        }
    }
}

/// Fetch the directory, then run the generator against the live provider
pub async fn provision(options: ProvisionOptions) -> Result<String, GenerateError> {
    if !options.credentials.is_complete() {
        return Err(GenerateError::Validation(
            "username and password cannot be empty".to_string(),
        ));
    }

    let run = async {
        let client = PiaClient::connect(
            options.credentials.clone(),
            options.region.clone(),
            &options.endpoints,
            options.http.clone(),
        )
        .await
        .map_err(|e| GenerateError::from_stage(Stage::Directory, e))?;

        if !client.directory().contains(&options.region) {
            return Err(GenerateError::Directory(ProviderError::Directory(
                DirectoryError::UnknownRegion(options.region.clone()),
            )));
        }

        WgGenerator::new(client, options.generator.clone())
            .generate()
            .await
    };

    match options.timeout {
        Some(limit) => tokio::time::timeout(limit, run)
            .await
            .map_err(|_| GenerateError::Timeout(limit))?,
        None => run.await,
    }
}
