//! Error types for the UPnP port-forwarding core

use thiserror::Error;

/// miniupnp-style code for an HTTP / socket level failure
pub const HTTP_ERROR_CODE: i32 = -3;

/// UPnP error 606
pub const ACTION_NOT_AUTHORIZED: i32 = 606;

/// UPnP error 713, returned once enumeration runs past the last entry
pub const SPECIFIED_ARRAY_INDEX_INVALID: i32 = 713;

/// UPnP error 714
pub const NO_SUCH_ENTRY_IN_ARRAY: i32 = 714;

/// UPnP error 718
pub const CONFLICT_IN_MAPPING_ENTRY: i32 = 718;

/// UPnP error 725
pub const ONLY_PERMANENT_LEASES_SUPPORTED: i32 = 725;

#[derive(Error, Debug)]
pub enum UpnpError {
    #[error("UPnP session not ready: {0}")]
    NotReady(String),

    #[error("Gateway only supports permanent leases")]
    LeaseUnsupported,

    #[error("Gateway unreachable: {0}")]
    Transport(String),

    #[error("Gateway rejected request (error: {code}): {message}")]
    Protocol { code: i32, message: String },

    #[error("No more port mapping entries")]
    NoMoreEntries,

    #[error("No UPnP gateway detected: {0}")]
    NoGateway(String),

    #[error("Unsupported gateway action: {0}")]
    Unsupported(String),

    #[error("Invalid protocol: {0}")]
    InvalidProtocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl UpnpError {
    pub fn protocol(code: i32, message: impl Into<String>) -> Self {
        UpnpError::Protocol {
            code,
            message: message.into(),
        }
    }

    /// Numeric result code as reported by the gateway collaborator
    ///
    /// Local errors (not-ready, config, IO) have no gateway code.
    pub fn code(&self) -> Option<i32> {
        match self {
            UpnpError::LeaseUnsupported => Some(ONLY_PERMANENT_LEASES_SUPPORTED),
            UpnpError::Transport(_) => Some(HTTP_ERROR_CODE),
            UpnpError::Protocol { code, .. } => Some(*code),
            UpnpError::NoMoreEntries => Some(SPECIFIED_ARRAY_INDEX_INVALID),
            _ => None,
        }
    }

    /// True when the gateway should be considered unreachable
    pub fn is_transport(&self) -> bool {
        matches!(self, UpnpError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, UpnpError>;
