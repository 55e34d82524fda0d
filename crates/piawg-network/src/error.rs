use std::time::Duration;
use thiserror::Error;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid server: {0}")]
    InvalidServer(String),

    #[error("Cannot resolve host: {0}")]
    Resolve(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("CA certificate error: {0}")]
    Certificate(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Body read error: {0}")]
    Body(String),

    #[error("status code {status}, response body: {body}")]
    Status { status: u16, body: String },
}

impl TransportError {
    /// Trust-related failure (handshake or pinned CA)
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_) | Self::Certificate(_))
    }

    /// Non-200 answer from the server
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
