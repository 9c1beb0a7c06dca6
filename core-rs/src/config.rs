/**
 * config.rs
 * Parser for netplay-upnp configuration files (YAML format)
 *
 * Format:
 * ```yaml
 * apiVersion: netplay-upnp/v1
 * discovery:
 *   timeoutMs: 2000
 *   localPort: 0
 *   ipv6: false
 *   ttl: 2
 * mapping:
 *   marker: M64Plus
 *   defaultLeaseSecs: 43200
 *   vendorPrefix: "UPnP:"
 * retry:
 *   maxAttempts: 5
 *   delayMs: 10
 * ```
 *
 * Every key is optional.
 */

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::errors::UpnpError;
use crate::gateway::DiscoveryOptions;
use crate::port::{LeaseDuration, RetryPolicy, DEFAULT_LEASE_SECS};

pub const API_VERSION: &str = "netplay-upnp/v1";

/// Identifying substring in the descriptions of our mappings
pub const DEFAULT_MARKER: &str = "M64Plus";

/// Description prefix some routers add on their own
pub const DEFAULT_VENDOR_PREFIX: &str = "UPnP:";

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UpnpConfig {
    pub api_version: String,
    pub discovery: DiscoveryConfig,
    pub mapping: MappingConfig,
    pub retry: RetryConfig,
}

/// SSDP discovery settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoveryConfig {
    pub timeout_ms: u64,
    /// 0 = any, 1 = same as 1900
    pub local_port: u16,
    pub ipv6: bool,
    pub ttl: u8,
}

/// Ownership and lease settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MappingConfig {
    pub marker: String,
    pub default_lease_secs: u32,
    pub vendor_prefix: String,
}

/// Host-level retry settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for UpnpConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            discovery: DiscoveryConfig::default(),
            mapping: MappingConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            local_port: 0,
            ipv6: false,
            ttl: 2,
        }
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            default_lease_secs: DEFAULT_LEASE_SECS,
            vendor_prefix: DEFAULT_VENDOR_PREFIX.to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 10,
        }
    }
}

impl UpnpConfig {
    /// Load configuration from specified path
    ///
    /// # Arguments
    /// * `path` - Path to YAML configuration file
    ///
    /// # Example
    /// ```no_run
    /// use netplay_upnp::UpnpConfig;
    ///
    /// let config = UpnpConfig::load("netplay-upnp.yaml").unwrap();
    /// assert_eq!(config.mapping.marker, "M64Plus");
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, UpnpError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(UpnpError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)?;
        let config: UpnpConfig = serde_yaml::from_str(&content)?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Ensures:
    /// - apiVersion is "netplay-upnp/v1"
    /// - marker is non-empty
    /// - discovery timeout and retry attempts are non-zero
    pub fn validate(&self) -> Result<(), UpnpError> {
        if self.api_version != API_VERSION {
            return Err(UpnpError::ValidationError(format!(
                "Invalid apiVersion: expected '{}', got '{}'",
                API_VERSION, self.api_version
            )));
        }

        if self.mapping.marker.trim().is_empty() {
            return Err(UpnpError::ValidationError(
                "mapping.marker cannot be empty".to_string(),
            ));
        }

        if self.discovery.timeout_ms == 0 {
            return Err(UpnpError::ValidationError(
                "discovery.timeoutMs must be greater than zero".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(UpnpError::ValidationError(
                "retry.maxAttempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            timeout: Duration::from_millis(self.discovery.timeout_ms),
            local_port: self.discovery.local_port,
            ipv6: self.discovery.ipv6,
            ttl: self.discovery.ttl,
        }
    }

    pub fn default_lease(&self) -> LeaseDuration {
        LeaseDuration::from_secs(self.mapping.default_lease_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.delay_ms),
        )
    }
}
