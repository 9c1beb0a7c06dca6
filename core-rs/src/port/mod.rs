/**
 * port module
 * Router port-forwarding lifecycle: session, ledger, mutations, restoration
 */

pub mod fields;
pub mod ledger;
pub mod manager;
pub mod retry;
pub mod session;

pub use ledger::{Classification, ForeignMapping, MappingLedger, OwnedMapping};
pub use manager::PortManager;
pub use retry::RetryPolicy;
pub use session::{GatewaySession, InitState, LeaseDuration, DEFAULT_LEASE_SECS};
