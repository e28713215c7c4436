use crate::color::DeviceColor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A bridge found on the local network.
///
/// Identity is the `(network_address, unique_id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceInfo {
    network_address: String,
    unique_id: String,
}

impl DeviceInfo {
    pub fn new<A: Into<String>, I: Into<String>>(network_address: A, unique_id: I) -> Self {
        Self {
            network_address: network_address.into(),
            unique_id: unique_id.into(),
        }
    }

    pub fn network_address(&self) -> &str {
        &self.network_address
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.unique_id, self.network_address)
    }
}

/// A bridge that was successfully connected at least once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub device: DeviceInfo,
    pub last_connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    IpScan,
    Nupnp,
    Upnp,
}

impl DiscoveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryMethod::IpScan => "ip_scan",
            DiscoveryMethod::Nupnp => "nupnp",
            DiscoveryMethod::Upnp => "upnp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOptions {
    pub methods: Vec<DiscoveryMethod>,
}

/// Events reported by a bridge while a connection is being established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeEvent {
    Connected,
    Authenticated,
    NotAuthenticated,
    LinkButtonNotPressed,
}

/// Identifier of a single light fixture behind a bridge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LightId(pub String);

impl fmt::Display for LightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightCommand {
    pub light: LightId,
    pub on: bool,
    pub color: DeviceColor,
}

/// Outcome of one fan-out over all fixtures of a bridge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandReport {
    pub attempted: usize,
    pub failures: Vec<String>,
}

impl CommandReport {
    pub fn succeeded(&self) -> usize {
        self.attempted.saturating_sub(self.failures.len())
    }
}
