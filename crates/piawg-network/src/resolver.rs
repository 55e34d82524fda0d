//! Static Name Resolution
//!
//! Provider API hosts are not meant to be found through public DNS. Each
//! request instead carries its own one-entry zone: the server's common name
//! answers with the server's IP, everything else fails. The certificate is
//! still checked against the common name, so the socket lands on the chosen
//! instance while TLS identity is preserved.

use std::collections::HashMap;
use std::net::IpAddr;
use tracing::debug;

use crate::error::TransportError;

/// A provider server: TLS identity plus the address to dial
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Server {
    common_name: String,
    ip: String,
}

impl Server {
    /// Both fields must be non-empty.
    pub fn new(common_name: impl Into<String>, ip: impl Into<String>) -> Result<Self, TransportError> {
        let common_name = common_name.into();
        let ip = ip.into();
        if common_name.is_empty() {
            return Err(TransportError::InvalidServer("empty common name".to_string()));
        }
        if ip.is_empty() {
            return Err(TransportError::InvalidServer(format!("{common_name} has no IP")));
        }
        Ok(Self { common_name, ip })
    }

    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }
}

impl std::fmt::Display for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.common_name, self.ip)
    }
}

/// Host → address table consulted instead of DNS
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    zone: HashMap<String, IpAddr>,
}

impl StaticResolver {
    /// Empty zone; every lookup fails
    pub fn new() -> Self {
        Self::default()
    }

    /// Zone answering only for `server`
    pub fn pin(server: &Server) -> Result<Self, TransportError> {
        let mut resolver = Self::new();
        resolver.insert(server)?;
        Ok(resolver)
    }

    /// Add a record for `server`
    pub fn insert(&mut self, server: &Server) -> Result<(), TransportError> {
        let ip: IpAddr = server.ip.parse().map_err(|_| {
            TransportError::InvalidServer(format!("{} has invalid IP {:?}", server.common_name, server.ip))
        })?;
        self.zone.insert(normalize(&server.common_name), ip);
        Ok(())
    }

    /// Resolve a host
    pub fn resolve(&self, host: &str) -> Result<IpAddr, TransportError> {
        let ip = self
            .zone
            .get(&normalize(host))
            .copied()
            .ok_or_else(|| TransportError::Resolve(format!("{host} is not in the pinned zone")))?;
        debug!("Pinned resolve {} -> {}", host, ip);
        Ok(ip)
    }
}

/// DNS names compare case-insensitively and ignore a trailing root dot.
fn normalize(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}
