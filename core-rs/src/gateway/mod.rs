//! Gateway module for UPnP IGD access
//!
//! Provides the client interface (IgdClient trait) consumed by the port
//! manager, and implementations:
//! - IgdNextClient: real router via SSDP + SOAP
//! - InMemoryGateway: simulated router table

mod traits;
mod igd;
pub mod memory;

pub use traits::{
    ControlPoint, DiscoveredDevice, DiscoveryOptions, GatewayStatus, IgdClient, PortMappingEntry,
    Protocol, ValidGateway,
};
pub use igd::IgdNextClient;
pub use memory::{Fault, GatewayAction, GatewayCall, InMemoryGateway};
