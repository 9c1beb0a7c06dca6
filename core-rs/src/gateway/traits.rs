//! Gateway client trait
//!
//! Defines the narrow interface the port manager consumes from a UPnP client.
//! Implementations include:
//! - IgdNextClient (real SSDP/SOAP via igd-next)
//! - InMemoryGateway (simulated IGD table for dry runs and tests)

use crate::errors::{Result, UpnpError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Transport protocol of a port mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = UpnpError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("TCP") {
            Ok(Protocol::Tcp)
        } else if s.eq_ignore_ascii_case("UDP") {
            Ok(Protocol::Udp)
        } else {
            Err(UpnpError::InvalidProtocol(s.to_string()))
        }
    }
}

/// SSDP discovery parameters
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryOptions {
    pub timeout: Duration,
    /// Source port for the M-SEARCH socket (0 = any, 1 = same as 1900)
    pub local_port: u16,
    pub ipv6: bool,
    pub ttl: u8,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2000),
            local_port: 0,
            ipv6: false,
            ttl: 2,
        }
    }
}

/// A device answering the SSDP search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Root description URL (`LOCATION` header)
    pub description_url: String,
    /// Search target (`ST` header)
    pub search_target: String,
}

impl DiscoveredDevice {
    pub fn is_internet_gateway(&self) -> bool {
        self.search_target.contains("InternetGatewayDevice")
    }
}

/// Resolved control binding of the gateway's WAN connection service
///
/// Required by every mapping call. Owned by the session for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPoint {
    pub control_url: String,
    pub service_type: String,
    pub base_url: String,
}

/// Result of the valid-IGD query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GatewayStatus {
    NoIgd,
    Connected,
    NotConnected,
    NotIgd,
}

/// LAN-facing address and status of the selected gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidGateway {
    pub lan_address: String,
    pub status: GatewayStatus,
}

/// One row of the gateway's generic port-mapping table
///
/// Also used as the request body of AddPortMapping, so a foreign mapping can
/// be replayed with every attribute it was observed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMappingEntry {
    pub external_port: u16,
    pub protocol: Protocol,
    pub internal_port: u16,
    pub internal_client: String,
    pub description: String,
    /// Empty string means any remote host
    pub remote_host: String,
    /// Seconds, 0 = permanent
    pub lease_duration: u32,
    pub enabled: bool,
}

/// UPnP client capability interface
///
/// Every call is synchronous and bounded by the client's own request timeout.
/// Errors use the `UpnpError` taxonomy:
/// - `Transport` for HTTP / socket failures
/// - `LeaseUnsupported` for error 725
/// - `NoMoreEntries` for error 713 during enumeration
/// - `Protocol` for any other UPnP error code
pub trait IgdClient {
    /// Run SSDP discovery and return every device that answered
    fn discover(&mut self, options: &DiscoveryOptions) -> Result<Vec<DiscoveredDevice>>;

    /// Fetch and parse the device description, resolving control URLs
    fn describe(&mut self, device: &DiscoveredDevice) -> Result<ControlPoint>;

    /// Query the selected gateway's status and the local address facing it
    fn valid_gateway(
        &mut self,
        devices: &[DiscoveredDevice],
        control: &ControlPoint,
    ) -> Result<ValidGateway>;

    /// Connection type (IP_Routed, ...), diagnostic only
    fn connection_type(&mut self, control: &ControlPoint) -> Result<String>;

    fn add_port_mapping(&mut self, control: &ControlPoint, mapping: &PortMappingEntry) -> Result<()>;

    fn delete_port_mapping(
        &mut self,
        control: &ControlPoint,
        external_port: u16,
        protocol: Protocol,
        remote_host: &str,
    ) -> Result<()>;

    /// Read the entry at `index` of the generic port-mapping table
    fn port_mapping_entry(&mut self, control: &ControlPoint, index: u32) -> Result<PortMappingEntry>;

    /// Release anything held from discovery. Must tolerate repeated calls.
    fn release(&mut self) {}
}
