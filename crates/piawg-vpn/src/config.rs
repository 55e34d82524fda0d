//! WireGuard Configuration Document
//!
//! Builds the `wg-quick` style document handed to the user:
//!
//! ```text
//! [Interface]
//! PrivateKey = <private key>
//! Address = <peer ip>
//! DNS = <first dns server>
//! [Peer]
//! PublicKey = <server key>
//! AllowedIPs = 0.0.0.0/0
//! Endpoint = <server ip>:1337
//! PersistentKeepalive = 25
//! ServerCommonName = <metadata server>   (optional)
//! ```
//!
//! Field order is fixed and there is no trailing newline.

use std::fmt;

use crate::exchange::KeyExchangeResult;
use crate::keys::KeyPair;

/// WireGuard port on the provider's servers
pub const WG_PORT: u16 = 1337;

/// Route everything through the tunnel
pub const ALLOWED_IPS: &str = "0.0.0.0/0";

/// Keepalive interval (seconds)
pub const PERSISTENT_KEEPALIVE: u16 = 25;

/// Peer endpoint (host + port)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Complete tunnel configuration
#[derive(Clone, PartialEq, Eq)]
pub struct WgConfig {
    pub private_key: String,
    pub address: String,
    pub dns: String,
    pub peer_public_key: String,
    pub allowed_ips: String,
    pub endpoint: Endpoint,
    pub persistent_keepalive: u16,
    /// Informational only; not a wg-quick key
    pub server_common_name: Option<String>,
}

impl WgConfig {
    /// Render the document
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for WgConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[Interface]")?;
        writeln!(f, "PrivateKey = {}", self.private_key)?;
        writeln!(f, "Address = {}", self.address)?;
        writeln!(f, "DNS = {}", self.dns)?;
        writeln!(f, "[Peer]")?;
        writeln!(f, "PublicKey = {}", self.peer_public_key)?;
        writeln!(f, "AllowedIPs = {}", self.allowed_ips)?;
        writeln!(f, "Endpoint = {}", self.endpoint)?;
        write!(f, "PersistentKeepalive = {}", self.persistent_keepalive)?;
        if let Some(name) = &self.server_common_name {
            write!(f, "\nServerCommonName = {}", name)?;
        }
        Ok(())
    }
}

impl fmt::Debug for WgConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgConfig")
            .field("address", &self.address)
            .field("dns", &self.dns)
            .field("peer_public_key", &self.peer_public_key)
            .field("endpoint", &self.endpoint)
            .field("server_common_name", &self.server_common_name)
            .finish_non_exhaustive()
    }
}

/// Field-by-field builder for [`WgConfig`]
#[derive(Debug, Default, Clone)]
pub struct WgConfigBuilder {
    private_key: Option<String>,
    address: Option<String>,
    dns: Option<String>,
    peer_public_key: Option<String>,
    endpoint_host: Option<String>,
    server_common_name: Option<String>,
}

impl WgConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn dns(mut self, dns: impl Into<String>) -> Self {
        self.dns = Some(dns.into());
        self
    }

    pub fn peer_public_key(mut self, key: impl Into<String>) -> Self {
        self.peer_public_key = Some(key.into());
        self
    }

    pub fn endpoint_host(mut self, host: impl Into<String>) -> Self {
        self.endpoint_host = Some(host.into());
        self
    }

    /// Empty names are dropped
    pub fn server_common_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.server_common_name = (!name.is_empty()).then_some(name);
        self
    }

    pub fn build(self) -> Result<WgConfig, RenderError> {
        Ok(WgConfig {
            private_key: self.private_key.ok_or(RenderError::MissingField("PrivateKey"))?,
            address: self.address.ok_or(RenderError::MissingField("Address"))?,
            dns: self.dns.ok_or(RenderError::MissingField("DNS"))?,
            peer_public_key: self
                .peer_public_key
                .ok_or(RenderError::MissingField("PublicKey"))?,
            allowed_ips: ALLOWED_IPS.to_string(),
            endpoint: Endpoint::new(
                self.endpoint_host.ok_or(RenderError::MissingField("Endpoint"))?,
                WG_PORT,
            ),
            persistent_keepalive: PERSISTENT_KEEPALIVE,
            server_common_name: self.server_common_name,
        })
    }
}

/// Render the document for a registered key.
///
/// The `ServerCommonName` line appears only when `include_server_identity`
/// is set and `metadata_server_identity` is non-empty.
pub fn render(
    result: &KeyExchangeResult,
    key_pair: &KeyPair,
    include_server_identity: bool,
    metadata_server_identity: &str,
) -> Result<String, RenderError> {
    let dns = result.dns_servers.first().ok_or(RenderError::NoDnsServers)?;

    let mut builder = WgConfigBuilder::new()
        .private_key(key_pair.private_key())
        .address(&result.peer_ip)
        .dns(dns)
        .peer_public_key(&result.server_public_key)
        .endpoint_host(&result.server_ip);

    if include_server_identity {
        builder = builder.server_common_name(metadata_server_identity);
    }

    Ok(builder.build()?.render())
}

/// Rendering errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderError {
    #[error("Key exchange returned no DNS servers")]
    NoDnsServers,

    #[error("Missing config field: {0}")]
    MissingField(&'static str),

    #[error("Cannot determine server identity: {0}")]
    ServerIdentity(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = "[Interface]
PrivateKey = test_privatekey
Address = 4.5.6.7
DNS = 1.1.1.1
[Peer]
PublicKey = test_publickey
AllowedIPs = 0.0.0.0/0
Endpoint = 1.2.3.4:1337
PersistentKeepalive = 25";

    fn result() -> KeyExchangeResult {
        KeyExchangeResult {
            server_ip: "1.2.3.4".to_string(),
            dns_servers: vec!["1.1.1.1".to_string()],
            peer_ip: "4.5.6.7".to_string(),
            server_public_key: "test_publickey".to_string(),
            ..KeyExchangeResult::default()
        }
    }

    fn key_pair() -> KeyPair {
        KeyPair::from_strings("test_privatekey", "test_publickey").unwrap()
    }

    #[test]
    fn test_render_basic() {
        let config = render(&result(), &key_pair(), false, "").unwrap();
        assert_eq!(config, BASIC);
    }

    #[test]
    fn test_render_with_server_common_name() {
        let config = render(&result(), &key_pair(), true, "mock-server").unwrap();
        assert_eq!(config, format!("{BASIC}\nServerCommonName = mock-server"));
    }

    #[test]
    fn test_identity_ignored_unless_requested() {
        let config = render(&result(), &key_pair(), false, "mock-server").unwrap();
        assert_eq!(config, BASIC);
    }

    #[test]
    fn test_empty_identity_omits_line() {
        let config = render(&result(), &key_pair(), true, "").unwrap();
        assert_eq!(config, BASIC);
    }

    #[test]
    fn test_render_is_deterministic() {
        let first = render(&result(), &key_pair(), true, "mock-server").unwrap();
        let second = render(&result(), &key_pair(), true, "mock-server").unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn test_only_first_dns_used() {
        let mut result = result();
        result.dns_servers.push("9.9.9.9".to_string());
        let config = render(&result, &key_pair(), false, "").unwrap();
        assert!(config.contains("DNS = 1.1.1.1\n"));
        assert!(!config.contains("9.9.9.9"));
    }

    #[test]
    fn test_empty_dns_fails() {
        let mut result = result();
        result.dns_servers.clear();
        assert!(matches!(
            render(&result, &key_pair(), false, ""),
            Err(RenderError::NoDnsServers)
        ));
    }

    #[test]
    fn test_builder_missing_field() {
        let err = WgConfigBuilder::new()
            .private_key("k")
            .address("10.0.0.2")
            .dns("1.1.1.1")
            .endpoint_host("1.2.3.4")
            .build()
            .unwrap_err();
        assert!(matches!(err, RenderError::MissingField("PublicKey")));
    }

    #[test]
    fn test_debug_hides_private_key() {
        let config = WgConfigBuilder::new()
            .private_key("very_secret")
            .address("10.0.0.2")
            .dns("1.1.1.1")
            .peer_public_key("pub")
            .endpoint_host("1.2.3.4")
            .build()
            .unwrap();
        assert!(!format!("{:?}", config).contains("very_secret"));
        assert_eq!(config.endpoint.to_string(), "1.2.3.4:1337");
    }
}
