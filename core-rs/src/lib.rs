//! # netplay-upnp
//!
//! Automatic router port-forwarding for peer-to-peer netplay, over UPnP IGD.
//!
//! ## What it does
//!
//! - Discovers the Internet Gateway Device on the LAN and the local address facing it
//! - Opens and closes external port mappings to this machine
//! - Tells mappings created by this application (LAN IP + description marker)
//!   apart from foreign ones already on the router
//! - Borrows a port someone else mapped and hands it back on shutdown
//! - Deletes every mapping it created when the session ends
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  host: PortForwarder / upnp_* fns    │  bool API, bounded retry
//! └──────────────────┬───────────────────┘
//!                    │
//! ┌──────────────────▼───────────────────┐
//! │  port::PortManager                   │  state machine + ledger
//! └──────────────────┬───────────────────┘
//!                    │ IgdClient
//! ┌──────────────────▼───────────────────┐
//! │  gateway: IgdNextClient | InMemory   │  SSDP / SOAP
//! └──────────────────────────────────────┘
//! ```

pub mod config;
pub mod errors;
pub mod gateway;
pub mod host;
pub mod port;

pub use config::UpnpConfig;
pub use errors::UpnpError;
pub use gateway::{
    ControlPoint, DiscoveredDevice, DiscoveryOptions, GatewayStatus, IgdClient, IgdNextClient,
    InMemoryGateway, PortMappingEntry, Protocol,
};
pub use host::{configure, upnp_add, upnp_init, upnp_init_state, upnp_remove, upnp_shutdown, PortForwarder};
pub use port::{
    ForeignMapping, InitState, LeaseDuration, MappingLedger, OwnedMapping, PortManager, RetryPolicy,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
