//! Token generation against the region's metadata server.

use piawg_network::{Credentials, PinnedTransport, RequestAuth, Server};
use serde::Deserialize;
use tracing::debug;

use crate::directory::{Region, ServerDirectory, ServerRole};
use crate::provider::ProviderError;

pub const TOKEN_PATH: &str = "/authv3/generateToken";

/// HTTPS port of the metadata servers
pub const API_PORT: u16 = 443;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Token endpoint on a metadata server
pub fn token_url(server: &Server, port: u16) -> String {
    if port == API_PORT {
        format!("https://{}{}", server.common_name(), TOKEN_PATH)
    } else {
        format!("https://{}:{}{}", server.common_name(), port, TOKEN_PATH)
    }
}

/// Exchange account credentials for a short-lived token
pub async fn authenticate(
    transport: &PinnedTransport,
    directory: &ServerDirectory,
    credentials: &Credentials,
    region: &Region,
    port: u16,
) -> Result<String, ProviderError> {
    if !credentials.is_complete() {
        return Err(ProviderError::Validation(
            "username and password cannot be empty".to_string(),
        ));
    }

    let server = directory.server_for(region, ServerRole::Metadata)?;
    let response = transport
        .request(server, &token_url(server, port), RequestAuth::Basic(credentials))
        .await?;

    let token = decode_token(&response.body)?;
    debug!("Got token ({} chars) from {}", token.len(), server);
    Ok(token)
}

fn decode_token(body: &[u8]) -> Result<String, ProviderError> {
    let response: TokenResponse = serde_json::from_slice(body)
        .map_err(|e| ProviderError::Decode(format!("token response: {e}")))?;
    if response.token.is_empty() {
        return Err(ProviderError::Decode("token response: empty token".to_string()));
    }
    Ok(response.token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_url() {
        let server = Server::new("losangeles401", "10.0.0.1").unwrap();
        assert_eq!(token_url(&server, API_PORT), "https://losangeles401/authv3/generateToken");
        assert_eq!(token_url(&server, 8443), "https://losangeles401:8443/authv3/generateToken");
    }

    #[test]
    fn test_decode_token() {
        assert_eq!(decode_token(br#"{"token":"abc123"}"#).unwrap(), "abc123");
        assert_eq!(
            decode_token(br#"{"status":"OK","token":"abc123","expires":86400}"#).unwrap(),
            "abc123"
        );
    }

    #[test]
    fn test_decode_token_missing_field() {
        assert!(matches!(
            decode_token(br#"{"status":"ERROR"}"#),
            Err(ProviderError::Decode(_))
        ));
        assert!(matches!(
            decode_token(br#"{"token":""}"#),
            Err(ProviderError::Decode(_))
        ));
        assert!(matches!(decode_token(b"<html>"), Err(ProviderError::Decode(_))));
    }

    #[tokio::test]
    async fn test_empty_credentials_rejected_before_network() {
        let transport = PinnedTransport::new(
            piawg_network::HttpClient::with_defaults(),
            "https://ca.invalid/root.crt",
        );
        let directory = ServerDirectory::default();
        let credentials = Credentials::new("", "");

        let err = authenticate(&transport, &directory, &credentials, &Region::from("r"), API_PORT)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(!transport.is_loaded());
    }

    #[tokio::test]
    async fn test_unknown_region_rejected_before_network() {
        let transport = PinnedTransport::new(
            piawg_network::HttpClient::with_defaults(),
            "https://ca.invalid/root.crt",
        );
        let directory = ServerDirectory::default();
        let credentials = Credentials::new("user", "pass");

        let err = authenticate(&transport, &directory, &credentials, &Region::from("atlantis"), API_PORT)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Directory(ref e) if e.is_lookup()));
    }
}
