//! Gateway session state

use crate::gateway::{ControlPoint, GatewayStatus};
use serde::Serialize;
use std::fmt;

/// Default requested lease: 12 hours
pub const DEFAULT_LEASE_SECS: u32 = 43200;

/// Coarse initialization state of the port manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InitState {
    None,
    Busy,
    Done,
}

impl fmt::Display for InitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitState::None => f.write_str("none"),
            InitState::Busy => f.write_str("busy"),
            InitState::Done => f.write_str("done"),
        }
    }
}

/// Requested mapping lifetime in seconds, 0 = permanent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeaseDuration(u32);

impl LeaseDuration {
    pub const PERMANENT: LeaseDuration = LeaseDuration(0);

    pub fn from_secs(secs: u32) -> Self {
        LeaseDuration(secs)
    }

    pub fn as_secs(&self) -> u32 {
        self.0
    }

    pub fn is_permanent(&self) -> bool {
        self.0 == 0
    }
}

impl Default for LeaseDuration {
    fn default() -> Self {
        LeaseDuration(DEFAULT_LEASE_SECS)
    }
}

impl fmt::Display for LeaseDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resources acquired by a successful discovery
///
/// Exists only while the manager is DONE; dropping it is the release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySession {
    pub control: ControlPoint,
    pub lan_ip: String,
    pub status: GatewayStatus,
}
