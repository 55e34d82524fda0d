//! WireGuard Key Management
//!
//! X25519 key generation plus the string key pair that flows through the
//! provisioning pipeline. A key pair is either generated here or supplied by
//! the caller and passed through untouched.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rand::rngs::OsRng;
use std::fmt;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

/// WireGuard private key (Curve25519)
#[derive(Clone)]
pub struct PrivateKey {
    secret: StaticSecret,
}

impl PrivateKey {
    /// Generate a new random private key
    pub fn generate() -> Self {
        Self {
            secret: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            secret: StaticSecret::from(bytes),
        }
    }

    /// Create from base64 string
    pub fn from_base64(s: &str) -> Result<Self, KeyError> {
        Ok(Self::from_bytes(decode_key(s)?))
    }

    /// Get the corresponding public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: X25519Public::from(&self.secret),
        }
    }

    /// Get raw bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Encode as base64
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.to_bytes())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([redacted])")
    }
}

/// WireGuard public key (Curve25519)
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    key: X25519Public,
}

impl PublicKey {
    /// Encode as base64
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.key.to_bytes())
    }
}

fn decode_key(s: &str) -> Result<[u8; 32], KeyError> {
    let bytes = BASE64.decode(s.trim()).map_err(|_| KeyError::InvalidBase64)?;
    bytes.try_into().map_err(|_| KeyError::InvalidLength)
}

/// Encoded key pair used for one provisioning run.
///
/// Supplied pairs are opaque: they are not decoded or checked against each
/// other, which keeps deterministic fixtures possible.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    private_key: String,
    public_key: String,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_private(&PrivateKey::generate())
    }

    /// Encode a private key and its derived public key
    pub fn from_private(private: &PrivateKey) -> Self {
        Self {
            private_key: private.to_base64(),
            public_key: private.public_key().to_base64(),
        }
    }

    /// Derive the pair from a base64 private key
    pub fn from_private_base64(private_key: &str) -> Result<Self, KeyError> {
        Ok(Self::from_private(&PrivateKey::from_base64(private_key)?))
    }

    /// Use caller-supplied keys as-is
    pub fn from_strings(
        private_key: impl Into<String>,
        public_key: impl Into<String>,
    ) -> Result<Self, KeyError> {
        let private_key = private_key.into();
        let public_key = public_key.into();
        if private_key.is_empty() || public_key.is_empty() {
            return Err(KeyError::Empty);
        }
        Ok(Self {
            private_key,
            public_key,
        })
    }

    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// Key parsing errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum KeyError {
    #[error("Invalid base64 encoding")]
    InvalidBase64,

    #[error("Invalid key length (expected 32 bytes)")]
    InvalidLength,

    #[error("Key pair needs both a private and a public key")]
    Empty,
}
