//! HTTPS Client
//!
//! Uses hyper's HTTP/1.1 connection API over tokio-rustls.
//! Features:
//! - Caller decides which socket address to dial and which roots to trust
//! - Connect deadline and whole-request deadline
//! - Full body read with a size cap (no streaming)

use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Bytes;
use hyper::header::{HOST, HeaderMap, USER_AGENT};
use hyper::{Method, Request, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use rustls::ClientConfig;
use rustls::pki_types::ServerName;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use crate::error::TransportError;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Whole-request deadline (connect, handshake, request and body)
    pub timeout: Duration,
    /// TCP connect deadline
    pub connect_timeout: Duration,
    /// User-Agent string
    pub user_agent: String,
    /// Maximum response body size
    pub max_body_size: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("pia-wg-config/{}", env!("CARGO_PKG_VERSION")),
            max_body_size: 4 * 1024 * 1024, // 4 MB, the server feed is ~1 MB
        }
    }
}

/// HTTP response wrapper
#[derive(Debug)]
pub struct Response {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Full response body
    pub body: Vec<u8>,
    /// Total request time
    pub total_time: Duration,
}

impl Response {
    /// Body as text, lossy
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Anything but 200 becomes [`TransportError::Status`] carrying the body.
    pub fn error_for_status(self) -> Result<Self, TransportError> {
        if self.status == StatusCode::OK {
            Ok(self)
        } else {
            Err(TransportError::Status {
                status: self.status.as_u16(),
                body: self.text(),
            })
        }
    }
}

/// Unpinned HTTPS client for bootstrap downloads (webpki roots, system DNS)
#[derive(Clone)]
pub struct HttpClient {
    config: HttpClientConfig,
    tls: Arc<ClientConfig>,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: HttpClientConfig) -> Self {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let tls = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        info!(
            "HTTP client initialized (timeout: {:?}, connect timeout: {:?})",
            config.timeout, config.connect_timeout
        );

        Self {
            config,
            tls: Arc::new(tls),
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(HttpClientConfig::default())
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// GET `url`; any status other than 200 is an error.
    pub async fn get(&self, url: &str) -> Result<Response, TransportError> {
        let uri = parse_https_url(url)?;
        let host = uri_host(&uri)?;
        let port = uri.port_u16().unwrap_or(443);

        let addr = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| TransportError::Resolve(format!("{host}: {e}")))?
            .next()
            .ok_or_else(|| TransportError::Resolve(format!("{host}: no addresses")))?;

        send_get(self.tls.clone(), addr, &uri, HeaderMap::new(), &self.config)
            .await?
            .error_for_status()
    }
}

/// Parse a URL, accepting only `https`
pub(crate) fn parse_https_url(url: &str) -> Result<Uri, TransportError> {
    let uri: Uri = url
        .parse()
        .map_err(|e: hyper::http::uri::InvalidUri| TransportError::InvalidUrl(e.to_string()))?;
    if uri.scheme_str() != Some("https") {
        return Err(TransportError::InvalidUrl(format!("{url}: only https is supported")));
    }
    uri_host(&uri)?;
    Ok(uri)
}

/// Host part without IPv6 brackets
pub(crate) fn uri_host(uri: &Uri) -> Result<&str, TransportError> {
    uri.host()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
        .filter(|h| !h.is_empty())
        .ok_or_else(|| TransportError::InvalidUrl("No host in URL".to_string()))
}

/// One GET on a fresh TLS connection to `addr`.
///
/// SNI and certificate verification use the URL's host, whatever `addr` is.
pub(crate) async fn send_get(
    tls: Arc<ClientConfig>,
    addr: SocketAddr,
    uri: &Uri,
    headers: HeaderMap,
    config: &HttpClientConfig,
) -> Result<Response, TransportError> {
    tokio::time::timeout(config.timeout, send_get_inner(tls, addr, uri, headers, config))
        .await
        .map_err(|_| TransportError::Timeout(config.timeout))?
}

async fn send_get_inner(
    tls: Arc<ClientConfig>,
    addr: SocketAddr,
    uri: &Uri,
    headers: HeaderMap,
    config: &HttpClientConfig,
) -> Result<Response, TransportError> {
    let start = Instant::now();
    let host = uri_host(uri)?;

    // 1. Build request (origin-form target, explicit Host)
    let authority = uri
        .authority()
        .map(|a| a.as_str().to_string())
        .unwrap_or_else(|| host.to_string());
    let target = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

    let mut request = Request::builder()
        .method(Method::GET)
        .uri(target)
        .header(HOST, authority)
        .header(USER_AGENT, &config.user_agent)
        .body(Full::new(Bytes::new()))
        .map_err(|e| TransportError::Http(e.to_string()))?;
    request.headers_mut().extend(headers);

    // 2. Connect
    let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| TransportError::Timeout(config.connect_timeout))?
        .map_err(|e| TransportError::ConnectionFailed(format!("{addr}: {e}")))?;

    // 3. TLS
    let connector = TlsConnector::from(tls);
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| TransportError::Tls(format!("Invalid server name: {host}")))?;
    let tls_stream = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| TransportError::Tls(format!("handshake with {host} at {addr}: {e}")))?;

    // 4. HTTP/1.1
    let io = TokioIo::new(tls_stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| TransportError::Http(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!("Connection closed with error: {}", e);
        }
    });

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| TransportError::Http(e.to_string()))?;

    // 5. Read response
    let status = response.status();
    let headers = response.headers().clone();

    let collected = Limited::new(response.into_body(), config.max_body_size)
        .collect()
        .await
        .map_err(|e| TransportError::Body(e.to_string()))?;
    let body = collected.to_bytes().to_vec();

    let total_time = start.elapsed();

    debug!(
        "HTTP GET https://{}{} via {} -> {} ({} bytes, {:?})",
        host,
        target.split('?').next().unwrap_or(target),
        addr,
        status,
        body.len(),
        total_time
    );

    Ok(Response {
        status,
        headers,
        body,
        total_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> Response {
        Response {
            status: StatusCode::from_u16(status).unwrap(),
            headers: HeaderMap::new(),
            body: body.as_bytes().to_vec(),
            total_time: Duration::ZERO,
        }
    }

    #[test]
    fn test_default_config() {
        let config = HttpClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.user_agent.starts_with("pia-wg-config/"));
    }

    #[test]
    fn test_only_200_is_accepted() {
        assert!(response(200, "{}").error_for_status().is_ok());

        let err = response(201, "created").error_for_status().unwrap_err();
        assert_eq!(err.status(), Some(201));

        match response(401, "bad credentials").error_for_status() {
            Err(TransportError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad credentials");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_https_url() {
        let uri = parse_https_url("https://host.example:1337/addKey?pt=a").unwrap();
        assert_eq!(uri_host(&uri).unwrap(), "host.example");
        assert_eq!(uri.port_u16(), Some(1337));

        assert!(matches!(
            parse_https_url("http://host.example/"),
            Err(TransportError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_https_url("not a url"),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_ipv6_host_brackets_stripped() {
        let uri = parse_https_url("https://[::1]:8443/").unwrap();
        assert_eq!(uri_host(&uri).unwrap(), "::1");
    }

    #[tokio::test]
    async fn test_connect_refused_is_network_error() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpClient::with_defaults();
        let uri = parse_https_url(&format!("https://localhost:{}/", addr.port())).unwrap();
        let result = send_get(client.tls.clone(), addr, &uri, HeaderMap::new(), client.config()).await;

        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_stalled_server_times_out() {
        // Accepts TCP but never answers the TLS ClientHello
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let config = HttpClientConfig {
            timeout: Duration::from_millis(200),
            ..HttpClientConfig::default()
        };
        let client = HttpClient::new(config);
        let uri = parse_https_url(&format!("https://localhost:{}/", addr.port())).unwrap();
        let result = send_get(client.tls.clone(), addr, &uri, HeaderMap::new(), client.config()).await;

        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }
}
