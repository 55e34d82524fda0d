//! Request authentication
//!
//! A provider call is authenticated in exactly one way: HTTP Basic with the
//! account credentials, or a token that the caller has already embedded in
//! the URL. The two never travel together.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hyper::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use std::fmt;

use crate::error::TransportError;

/// Account credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Both fields present
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// `Authorization` header value for HTTP Basic
    pub fn basic_header(&self) -> Result<HeaderValue, TransportError> {
        let encoded = BASE64.encode(format!("{}:{}", self.username, self.password));
        let mut value = HeaderValue::from_str(&format!("Basic {encoded}"))
            .map_err(|e| TransportError::Http(e.to_string()))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// How a single request authenticates
#[derive(Debug, Clone, Copy)]
pub enum RequestAuth<'a> {
    /// HTTP Basic with account credentials
    Basic(&'a Credentials),
    /// Token already carried in the URL; no `Authorization` header
    Token,
}

impl<'a> RequestAuth<'a> {
    /// Pick the scheme for a call: an empty token means Basic.
    pub fn for_token(token: &str, credentials: &'a Credentials) -> Self {
        if token.is_empty() {
            Self::Basic(credentials)
        } else {
            Self::Token
        }
    }

    pub fn is_basic(&self) -> bool {
        matches!(self, Self::Basic(_))
    }

    /// Write the scheme's headers. `Token` removes any stale `Authorization`.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<(), TransportError> {
        match self {
            Self::Basic(credentials) => {
                headers.insert(AUTHORIZATION, credentials.basic_header()?);
            }
            Self::Token => {
                headers.remove(AUTHORIZATION);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("p1234567", "hunter2")
    }

    #[test]
    fn test_empty_token_selects_basic() {
        let creds = creds();
        assert!(RequestAuth::for_token("", &creds).is_basic());
        assert!(!RequestAuth::for_token("abc", &creds).is_basic());
    }

    #[test]
    fn test_basic_header_encoding() {
        let value = creds().basic_header().unwrap();
        // base64("p1234567:hunter2")
        assert_eq!(value.to_str().unwrap(), "Basic cDEyMzQ1Njc6aHVudGVyMg==");
        assert!(value.is_sensitive());
    }

    #[test]
    fn test_token_never_carries_basic() {
        let creds = creds();
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic stale"));

        RequestAuth::for_token("some-token", &creds)
            .apply(&mut headers)
            .unwrap();
        assert!(headers.get(AUTHORIZATION).is_none());

        RequestAuth::for_token("", &creds).apply(&mut headers).unwrap();
        assert!(headers[AUTHORIZATION].to_str().unwrap().starts_with("Basic "));
    }

    #[test]
    fn test_debug_redacts_password() {
        let debug = format!("{:?}", creds());
        assert!(debug.contains("p1234567"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_is_complete() {
        assert!(creds().is_complete());
        assert!(!Credentials::new("", "x").is_complete());
        assert!(!Credentials::new("x", "").is_complete());
    }
}
