//! Server Directory
//!
//! The provider publishes its region and server topology as a JSON document
//! followed by a detached signature on the same response. The signature is
//! ignored: everything after the last `}` is dropped before decoding.
//!
//! Each region lists servers per role. Only two roles matter here:
//!
//! | Role | Feed key | Used for |
//! |------|----------|----------|
//! | Metadata | `meta` | token generation |
//! | Registration | `wg` | WireGuard key registration |
//!
//! Selection is "first listed", with no latency or load heuristic.

use piawg_network::{HttpClient, Server, TransportError};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Region identifier, compared exactly (e.g. `us_california`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Region(String);

impl Region {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Region {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server role within a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerRole {
    /// Authentication / token generation
    Metadata,
    /// WireGuard key registration
    Registration,
}

impl std::fmt::Display for ServerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerRole::Metadata => f.write_str("metadata"),
            ServerRole::Registration => f.write_str("tunnel-registration"),
        }
    }
}

/// Descriptive region data kept for listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionInfo {
    pub id: Region,
    pub name: String,
    pub country: String,
    pub port_forward: bool,
}

/// Directory errors
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Failed to download server list")]
    Network(#[from] TransportError),

    #[error("Malformed server list: {0}")]
    Parse(String),

    #[error("Unknown region '{0}'")]
    UnknownRegion(Region),

    #[error("Region '{region}' has no {role} servers")]
    NoServers { region: Region, role: ServerRole },
}

impl DirectoryError {
    /// Region lookup failure (as opposed to fetch/parse)
    pub fn is_lookup(&self) -> bool {
        matches!(self, Self::UnknownRegion(_) | Self::NoServers { .. })
    }
}

#[derive(Debug, Deserialize)]
struct Feed {
    regions: Vec<FeedRegion>,
}

#[derive(Debug, Deserialize)]
struct FeedRegion {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    port_forward: bool,
    #[serde(default)]
    servers: FeedServers,
}

#[derive(Debug, Default, Deserialize)]
struct FeedServers {
    #[serde(default)]
    meta: Vec<FeedServer>,
    #[serde(default)]
    wg: Vec<FeedServer>,
}

#[derive(Debug, Deserialize)]
struct FeedServer {
    #[serde(default)]
    ip: String,
    #[serde(default)]
    cn: String,
}

/// Region → servers, per role. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct ServerDirectory {
    metadata: HashMap<Region, Vec<Server>>,
    registration: HashMap<Region, Vec<Server>>,
    regions: BTreeMap<Region, RegionInfo>,
}

impl ServerDirectory {
    /// Download and decode the server feed
    pub async fn fetch(http: &HttpClient, url: &str) -> Result<Self, DirectoryError> {
        info!("Fetching server list from {}", url);
        let response = http.get(url).await?;
        let directory = Self::parse(&response.body)?;
        info!("Server list loaded ({} regions)", directory.regions.len());
        Ok(directory)
    }

    /// Decode a raw feed body, signature trailer included
    pub fn parse(body: &[u8]) -> Result<Self, DirectoryError> {
        let json = strip_signature(body)?;
        let feed: Feed =
            serde_json::from_slice(json).map_err(|e| DirectoryError::Parse(e.to_string()))?;
        Ok(Self::from_feed(feed))
    }

    fn from_feed(feed: Feed) -> Self {
        let mut directory = Self::default();

        for region in feed.regions {
            let id = Region::new(region.id);
            let metadata = collect_servers(&id, ServerRole::Metadata, region.servers.meta);
            let registration = collect_servers(&id, ServerRole::Registration, region.servers.wg);

            directory.metadata.insert(id.clone(), metadata);
            directory.registration.insert(id.clone(), registration);
            directory.regions.insert(
                id.clone(),
                RegionInfo {
                    id,
                    name: region.name,
                    country: region.country,
                    port_forward: region.port_forward,
                },
            );
        }

        directory
    }

    /// All servers for a role in a region, in feed order
    pub fn servers(&self, region: &Region, role: ServerRole) -> Option<&[Server]> {
        let map = match role {
            ServerRole::Metadata => &self.metadata,
            ServerRole::Registration => &self.registration,
        };
        map.get(region).map(Vec::as_slice)
    }

    /// First listed server for a role in a region
    pub fn server_for(&self, region: &Region, role: ServerRole) -> Result<&Server, DirectoryError> {
        let servers = self
            .servers(region, role)
            .ok_or_else(|| DirectoryError::UnknownRegion(region.clone()))?;
        let server = servers.first().ok_or_else(|| DirectoryError::NoServers {
            region: region.clone(),
            role,
        })?;
        debug!("Selected {} server for {}: {}", role, region, server);
        Ok(server)
    }

    pub fn contains(&self, region: &Region) -> bool {
        self.regions.contains_key(region)
    }

    /// Regions sorted by id
    pub fn regions(&self) -> impl Iterator<Item = &RegionInfo> {
        self.regions.values()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Cut the body after its last `}`
fn strip_signature(body: &[u8]) -> Result<&[u8], DirectoryError> {
    let end = body
        .iter()
        .rposition(|&b| b == b'}')
        .ok_or_else(|| DirectoryError::Parse("no JSON object in response".to_string()))?;
    Ok(&body[..=end])
}

fn collect_servers(region: &Region, role: ServerRole, raw: Vec<FeedServer>) -> Vec<Server> {
    raw.into_iter()
        .filter_map(|s| match Server::new(s.cn, s.ip) {
            Ok(server) => Some(server),
            Err(e) => {
                warn!("Skipping {} server in {}: {}", role, region, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"{"groups":{},"regions":[
        {"id":"us_california","name":"US California","country":"US","port_forward":false,
         "servers":{"meta":[{"ip":"10.0.0.1","cn":"losangeles401"},{"ip":"10.0.0.2","cn":"losangeles402"}],
                    "wg":[{"ip":"10.0.1.1","cn":"losangeles403"}],
                    "ovpnudp":[{"ip":"10.0.2.1","cn":"losangeles404"}]}},
        {"id":"uk_london","name":"UK London","country":"GB","port_forward":true,
         "servers":{"meta":[{"ip":"10.1.0.1","cn":"london401"}],"wg":[]}},
        {"id":"de_frankfurt","name":"DE Frankfurt","country":"DE"}
    ]}"#;

    fn with_signature(json: &str) -> Vec<u8> {
        let mut body = json.as_bytes().to_vec();
        body.extend_from_slice(b"\n\nTm90IGEgcmVhbCBzaWduYXR1cmUK/+==\n");
        body
    }

    fn directory() -> ServerDirectory {
        ServerDirectory::parse(&with_signature(FEED)).unwrap()
    }

    #[test]
    fn test_parse_ignores_signature_trailer() {
        let directory = directory();
        assert_eq!(directory.len(), 3);
        assert!(directory.contains(&Region::from("uk_london")));
    }

    #[test]
    fn test_parse_without_trailer() {
        let directory = ServerDirectory::parse(FEED.as_bytes()).unwrap();
        assert_eq!(directory.len(), 3);
    }

    #[test]
    fn test_parse_trailer_with_binary_bytes() {
        let mut body = FEED.as_bytes().to_vec();
        body.extend_from_slice(&[0x00, 0xff, 0xfe, b'\n', 0x80]);
        assert_eq!(ServerDirectory::parse(&body).unwrap().len(), 3);
    }

    #[test]
    fn test_parse_without_brace_fails() {
        let err = ServerDirectory::parse(b"no json here").unwrap_err();
        assert!(matches!(err, DirectoryError::Parse(_)));
    }

    #[test]
    fn test_parse_invalid_prefix_fails() {
        let err = ServerDirectory::parse(b"{\"regions\": [}garbage").unwrap_err();
        assert!(matches!(err, DirectoryError::Parse(_)));
    }

    #[test]
    fn test_server_for_returns_first_listed() {
        let directory = directory();
        let region = Region::from("us_california");

        let meta = directory.server_for(&region, ServerRole::Metadata).unwrap();
        assert_eq!(meta.common_name(), "losangeles401");
        assert_eq!(meta.ip(), "10.0.0.1");

        let wg = directory.server_for(&region, ServerRole::Registration).unwrap();
        assert_eq!(wg.common_name(), "losangeles403");
    }

    #[test]
    fn test_all_servers_kept_in_order() {
        let directory = directory();
        let servers = directory
            .servers(&Region::from("us_california"), ServerRole::Metadata)
            .unwrap();
        let names: Vec<_> = servers.iter().map(Server::common_name).collect();
        assert_eq!(names, ["losangeles401", "losangeles402"]);
    }

    #[test]
    fn test_unknown_region_is_lookup_error() {
        let err = directory()
            .server_for(&Region::from("atlantis"), ServerRole::Metadata)
            .unwrap_err();
        assert!(matches!(err, DirectoryError::UnknownRegion(_)));
        assert!(err.is_lookup());
    }

    #[test]
    fn test_region_match_is_exact() {
        let err = directory()
            .server_for(&Region::from("US_California"), ServerRole::Metadata)
            .unwrap_err();
        assert!(matches!(err, DirectoryError::UnknownRegion(_)));
    }

    #[test]
    fn test_empty_role_list_is_lookup_error() {
        let directory = directory();

        let err = directory
            .server_for(&Region::from("uk_london"), ServerRole::Registration)
            .unwrap_err();
        assert!(matches!(err, DirectoryError::NoServers { .. }));

        // Region without a servers object at all
        let err = directory
            .server_for(&Region::from("de_frankfurt"), ServerRole::Metadata)
            .unwrap_err();
        assert!(err.is_lookup());
    }

    #[test]
    fn test_incomplete_servers_skipped() {
        let feed = r#"{"regions":[{"id":"r","servers":{"meta":[{"cn":"","ip":"1.1.1.1"},{"cn":"ok","ip":"2.2.2.2"}]}}]}"#;
        let directory = ServerDirectory::parse(feed.as_bytes()).unwrap();
        let server = directory
            .server_for(&Region::from("r"), ServerRole::Metadata)
            .unwrap();
        assert_eq!(server.common_name(), "ok");
    }

    #[test]
    fn test_regions_sorted() {
        let directory = directory();
        let ids: Vec<_> = directory.regions().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["de_frankfurt", "uk_london", "us_california"]);

        let london = directory.regions().find(|r| r.id.as_str() == "uk_london").unwrap();
        assert_eq!(london.name, "UK London");
        assert!(london.port_forward);
    }
}
