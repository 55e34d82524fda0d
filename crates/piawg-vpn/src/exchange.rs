//! WireGuard key registration against the region's registration server.

use piawg_network::{PinnedTransport, RequestAuth, Server};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::form_urlencoded::byte_serialize;

use crate::directory::{Region, ServerDirectory, ServerRole};
use crate::provider::ProviderError;

/// Tunnel parameters returned by `addKey`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExchangeResult {
    /// Informational, e.g. `OK`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "server_key")]
    pub server_public_key: String,
    pub server_port: u16,
    pub server_ip: String,
    #[serde(rename = "server_vip")]
    pub server_virtual_ip: String,
    pub peer_ip: String,
    #[serde(rename = "peer_pubkey")]
    pub peer_public_key: String,
    pub dns_servers: Vec<String>,
}

/// `addKey` endpoint with token and public key percent-encoded
pub fn add_key_url(server: &Server, port: u16, token: &str, public_key: &str) -> String {
    format!(
        "https://{}:{}/addKey?pt={}&pubkey={}",
        server.common_name(),
        port,
        encode(token),
        encode(public_key)
    )
}

fn encode(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}

/// Register `public_key` and receive the tunnel parameters
pub async fn register_key(
    transport: &PinnedTransport,
    directory: &ServerDirectory,
    token: &str,
    public_key: &str,
    region: &Region,
    port: u16,
) -> Result<KeyExchangeResult, ProviderError> {
    // An empty token would silently downgrade to Basic auth
    if token.is_empty() {
        return Err(ProviderError::Validation("token cannot be empty".to_string()));
    }
    if public_key.is_empty() {
        return Err(ProviderError::Validation("public key cannot be empty".to_string()));
    }

    let server = directory.server_for(region, ServerRole::Registration)?;
    let response = transport
        .request(
            server,
            &add_key_url(server, port, token, public_key),
            RequestAuth::Token,
        )
        .await?;

    let result = decode_result(&response.body)?;
    debug!(
        "Key registered on {} (peer ip {}, server {}:{})",
        server, result.peer_ip, result.server_ip, result.server_port
    );
    Ok(result)
}

fn decode_result(body: &[u8]) -> Result<KeyExchangeResult, ProviderError> {
    serde_json::from_slice(body)
        .map_err(|e| ProviderError::Decode(format!("addKey response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WG_PORT;

    const RESPONSE: &str = r#"{
        "status": "OK",
        "server_key": "c2VydmVyLWtleQ==",
        "server_port": 1337,
        "server_ip": "181.214.206.8",
        "server_vip": "10.2.112.1",
        "peer_ip": "10.2.123.45",
        "peer_pubkey": "cGVlci1rZXk=",
        "dns_servers": ["10.0.0.243", "10.0.0.242"]
    }"#;

    #[test]
    fn test_add_key_url_encodes_values() {
        let server = Server::new("losangeles403", "10.0.1.1").unwrap();
        let url = add_key_url(&server, WG_PORT, "tok en/+", "ab+cd/ef=");
        assert_eq!(
            url,
            "https://losangeles403:1337/addKey?pt=tok+en%2F%2B&pubkey=ab%2Bcd%2Fef%3D"
        );
    }

    #[test]
    fn test_decode_full_result() {
        let result = decode_result(RESPONSE.as_bytes()).unwrap();
        assert_eq!(result.status.as_deref(), Some("OK"));
        assert_eq!(result.server_public_key, "c2VydmVyLWtleQ==");
        assert_eq!(result.server_port, 1337);
        assert_eq!(result.server_ip, "181.214.206.8");
        assert_eq!(result.server_virtual_ip, "10.2.112.1");
        assert_eq!(result.peer_ip, "10.2.123.45");
        assert_eq!(result.peer_public_key, "cGVlci1rZXk=");
        assert_eq!(result.dns_servers, ["10.0.0.243", "10.0.0.242"]);
    }

    #[test]
    fn test_decode_missing_field_fails() {
        let body = RESPONSE.replace(r#""peer_ip": "10.2.123.45","#, "");
        assert!(matches!(
            decode_result(body.as_bytes()),
            Err(ProviderError::Decode(_))
        ));
    }

    #[test]
    fn test_status_optional() {
        let body = RESPONSE.replace(r#""status": "OK","#, "");
        assert!(decode_result(body.as_bytes()).unwrap().status.is_none());
    }

    #[tokio::test]
    async fn test_empty_token_rejected() {
        let transport = PinnedTransport::new(
            piawg_network::HttpClient::with_defaults(),
            "https://ca.invalid/root.crt",
        );
        let err = register_key(
            &transport,
            &ServerDirectory::default(),
            "",
            "pubkey",
            &Region::from("r"),
            WG_PORT,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(!transport.is_loaded());
    }
}
