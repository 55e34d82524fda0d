//! Certificate-Pinned Transport
//!
//! Carries every call to the provider's API servers:
//! 1. Pinned CA is loaded once (downloaded on first use, then memoized)
//! 2. The server's common name resolves to the server's IP, nothing else
//! 3. TLS trusts only the pinned CA, no system or webpki roots
//! 4. GET with `Content-Type: application/json` and one auth scheme
//! 5. Full body read; any status other than 200 is an error

use hyper::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use rustls::pki_types::CertificateDer;
use rustls::pki_types::pem::PemObject;
use rustls::{ClientConfig, RootCertStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::auth::RequestAuth;
use crate::client::{self, HttpClient, HttpClientConfig, Response};
use crate::error::TransportError;
use crate::resolver::{Server, StaticResolver};

/// Build a TLS client config whose only trust anchors are the PEM certs.
pub fn pinned_tls_config(pem: &[u8]) -> Result<Arc<ClientConfig>, TransportError> {
    let mut roots = RootCertStore::empty();
    for cert in CertificateDer::pem_slice_iter(pem) {
        let cert = cert.map_err(|e| TransportError::Certificate(format!("invalid PEM: {e}")))?;
        roots
            .add(cert)
            .map_err(|e| TransportError::Certificate(e.to_string()))?;
    }

    if roots.is_empty() {
        return Err(TransportError::Certificate(
            "no certificates found in CA bundle".to_string(),
        ));
    }

    Ok(Arc::new(
        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    ))
}

/// HTTPS transport pinned to the provider's root CA
pub struct PinnedTransport {
    /// Bootstrap client used to download the CA
    bootstrap: HttpClient,
    /// Where the CA bundle lives; `None` when supplied up front
    ca_url: Option<String>,
    /// Pinned TLS config, published once
    tls: OnceCell<Arc<ClientConfig>>,
    config: HttpClientConfig,
}

impl PinnedTransport {
    /// Transport that downloads the CA from `ca_url` on first use
    pub fn new(bootstrap: HttpClient, ca_url: impl Into<String>) -> Self {
        let config = bootstrap.config().clone();
        Self {
            bootstrap,
            ca_url: Some(ca_url.into()),
            tls: OnceCell::new(),
            config,
        }
    }

    /// Transport with the CA already in hand
    pub fn with_ca_pem(pem: &[u8], config: HttpClientConfig) -> Result<Self, TransportError> {
        let tls = pinned_tls_config(pem)?;
        Ok(Self {
            bootstrap: HttpClient::new(config.clone()),
            ca_url: None,
            tls: OnceCell::new_with(Some(tls)),
            config,
        })
    }

    /// Whether the pinned CA has been loaded
    pub fn is_loaded(&self) -> bool {
        self.tls.initialized()
    }

    /// Pinned TLS config, downloading the CA on the first call.
    ///
    /// Concurrent first callers wait on a single download; a failed
    /// download leaves the cell empty.
    pub async fn tls_config(&self) -> Result<Arc<ClientConfig>, TransportError> {
        self.tls
            .get_or_try_init(|| async {
                let url = self.ca_url.as_deref().ok_or_else(|| {
                    TransportError::Certificate("no CA source configured".to_string())
                })?;
                info!("Downloading pinned CA from {}", url);
                let response = self
                    .bootstrap
                    .get(url)
                    .await
                    .map_err(|e| TransportError::Certificate(format!("download failed: {e}")))?;
                pinned_tls_config(&response.body)
            })
            .await
            .cloned()
    }

    /// GET `url` on `server`, whose common name must be the URL's host.
    pub async fn request(
        &self,
        server: &Server,
        url: &str,
        auth: RequestAuth<'_>,
    ) -> Result<Response, TransportError> {
        let uri = client::parse_https_url(url)?;
        let tls = self.tls_config().await?;

        let resolver = StaticResolver::pin(server)?;
        let host = client::uri_host(&uri)?;
        let ip = resolver.resolve(host)?;
        let addr = SocketAddr::new(ip, uri.port_u16().unwrap_or(443));

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        auth.apply(&mut headers)?;

        debug!(
            "Pinned request to {} (basic auth: {})",
            server,
            auth.is_basic()
        );

        client::send_get(tls, addr, &uri, headers, &self.config)
            .await?
            .error_for_status()
    }
}
