use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sliplink_frame::{FrameConfig, DEFAULT_MAX_FRAME_LEN};

use crate::error::{LinkError, Result};

/// Where a link's bytes go.
///
/// Written as `scheme:target` in configuration files:
/// `tcp:127.0.0.1:7000`, `unix:/run/line.sock`, `serial:/dev/ttyUSB0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Endpoint {
    /// TCP `host:port`.
    Tcp(String),
    /// Unix domain socket path.
    Unix(PathBuf),
    /// Serial (or other character) device path.
    Serial(PathBuf),
}

impl FromStr for Endpoint {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        let (scheme, target) = s
            .split_once(':')
            .ok_or_else(|| LinkError::InvalidConfig(format!("endpoint '{s}' has no scheme")))?;
        if target.is_empty() {
            return Err(LinkError::InvalidConfig(format!(
                "endpoint '{s}' has an empty target"
            )));
        }
        match scheme {
            "tcp" => {
                if !target.contains(':') {
                    return Err(LinkError::InvalidConfig(format!(
                        "tcp endpoint '{s}' needs host:port"
                    )));
                }
                Ok(Self::Tcp(target.to_string()))
            }
            "unix" => Ok(Self::Unix(PathBuf::from(target))),
            "serial" => Ok(Self::Serial(PathBuf::from(target))),
            other => Err(LinkError::InvalidConfig(format!(
                "unknown endpoint scheme '{other}' (expected tcp, unix or serial)"
            ))),
        }
    }
}

impl TryFrom<String> for Endpoint {
    type Error = LinkError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp:{addr}"),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Serial(path) => write!(f, "serial:{}", path.display()),
        }
    }
}

/// One configured link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkEntry {
    /// Address of the node at the other end of the link.
    pub next_hop: Ipv4Addr,
    pub endpoint: Endpoint,
}

/// Link layer configuration file.
///
/// ```json
/// {
///   "ignore_checksum": false,
///   "max_frame_len": 16777216,
///   "links": [
///     { "next_hop": "10.0.0.2", "endpoint": "serial:/dev/ttyUSB0" },
///     { "next_hop": "10.0.0.3", "endpoint": "tcp:127.0.0.1:7000" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkConfig {
    /// Tell the upper layer to skip datagram checksums.
    #[serde(default)]
    pub ignore_checksum: bool,
    /// Largest datagram accepted on any link. Default: 16 MiB.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
    pub links: Vec<LinkEntry>,
}

fn default_max_frame_len() -> usize {
    DEFAULT_MAX_FRAME_LEN
}

impl LinkConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| LinkError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Check the invariants the link layer relies on.
    pub fn validate(&self) -> Result<()> {
        if self.links.is_empty() {
            return Err(LinkError::NoLinks);
        }
        if self.max_frame_len == 0 {
            return Err(LinkError::InvalidConfig(
                "max_frame_len must be greater than zero".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for entry in &self.links {
            if !seen.insert(entry.next_hop) {
                return Err(LinkError::DuplicateNextHop(entry.next_hop.to_string()));
            }
        }
        Ok(())
    }

    /// Framing settings shared by every link.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_frame_len: self.max_frame_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = LinkConfig::from_json(
            r#"{
                "ignore_checksum": true,
                "max_frame_len": 1500,
                "links": [
                    { "next_hop": "10.0.0.2", "endpoint": "serial:/dev/ttyUSB0" },
                    { "next_hop": "10.0.0.3", "endpoint": "tcp:127.0.0.1:7000" },
                    { "next_hop": "10.0.0.4", "endpoint": "unix:/tmp/line.sock" }
                ]
            }"#,
        )
        .unwrap();

        assert!(config.ignore_checksum);
        assert_eq!(config.frame_config().max_frame_len, 1500);
        assert_eq!(config.links.len(), 3);
        assert_eq!(
            config.links[0].endpoint,
            Endpoint::Serial(PathBuf::from("/dev/ttyUSB0"))
        );
        assert_eq!(
            config.links[1].endpoint,
            Endpoint::Tcp("127.0.0.1:7000".to_string())
        );
        assert_eq!(config.links[2].next_hop, Ipv4Addr::new(10, 0, 0, 4));
    }

    #[test]
    fn defaults_apply() {
        let config = LinkConfig::from_json(
            r#"{ "links": [ { "next_hop": "1.2.3.4", "endpoint": "tcp:localhost:9" } ] }"#,
        )
        .unwrap();
        assert!(!config.ignore_checksum);
        assert_eq!(config.max_frame_len, DEFAULT_MAX_FRAME_LEN);
    }

    #[test]
    fn rejects_empty_links() {
        let err = LinkConfig::from_json(r#"{ "links": [] }"#).unwrap_err();
        assert!(matches!(err, LinkError::NoLinks));
    }

    #[test]
    fn rejects_duplicate_next_hop() {
        let err = LinkConfig::from_json(
            r#"{ "links": [
                { "next_hop": "10.0.0.2", "endpoint": "tcp:a:1" },
                { "next_hop": "10.0.0.2", "endpoint": "tcp:b:2" }
            ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, LinkError::DuplicateNextHop(ref hop) if hop == "10.0.0.2"));
    }

    #[test]
    fn rejects_bad_endpoint_and_address() {
        let err = LinkConfig::from_json(
            r#"{ "links": [ { "next_hop": "10.0.0.2", "endpoint": "carrier-pigeon:coop" } ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, LinkError::Json(_)));

        let err = LinkConfig::from_json(
            r#"{ "links": [ { "next_hop": "not-an-ip", "endpoint": "tcp:a:1" } ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, LinkError::Json(_)));
    }

    #[test]
    fn rejects_zero_frame_len() {
        let err = LinkConfig::from_json(
            r#"{ "max_frame_len": 0, "links": [ { "next_hop": "1.1.1.1", "endpoint": "tcp:a:1" } ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, LinkError::InvalidConfig(_)));
    }

    #[test]
    fn endpoint_parse_and_display() {
        for text in ["tcp:127.0.0.1:80", "unix:/tmp/x.sock", "serial:/dev/ttyS0"] {
            let endpoint: Endpoint = text.parse().unwrap();
            assert_eq!(endpoint.to_string(), text);
        }
        assert!("tcp:nohostport".parse::<Endpoint>().is_err());
        assert!("serial:".parse::<Endpoint>().is_err());
        assert!("/dev/ttyS0".parse::<Endpoint>().is_err());
    }

    #[test]
    fn config_serializes_endpoints_as_strings() {
        let config = LinkConfig {
            ignore_checksum: false,
            max_frame_len: 512,
            links: vec![LinkEntry {
                next_hop: Ipv4Addr::new(192, 168, 1, 2),
                endpoint: Endpoint::Tcp("127.0.0.1:7000".to_string()),
            }],
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["links"][0]["endpoint"], "tcp:127.0.0.1:7000");
        assert_eq!(json["links"][0]["next_hop"], "192.168.1.2");
    }

    #[test]
    fn missing_file_reports_path() {
        let err = LinkConfig::from_path("/nonexistent/sliplink.json").unwrap_err();
        assert!(matches!(err, LinkError::ReadConfig { .. }));
    }
}
