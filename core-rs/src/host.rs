//! Host-facing entry points
//!
//! `PortForwarder` wraps a `PortManager` with the calling conventions the
//! host application uses: plain booleans, protocol names as strings, and a
//! bounded retry around add/remove. Dropping it runs the shutdown sequence.
//!
//! The free functions at the bottom drive one process-wide forwarder for
//! hosts that cannot carry a context object around.

use once_cell::sync::Lazy;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, info};

use crate::config::UpnpConfig;
use crate::gateway::{IgdClient, IgdNextClient, Protocol};
use crate::port::{InitState, PortManager, RetryPolicy};

/// Port manager plus host retry policy
pub struct PortForwarder<C: IgdClient> {
    manager: PortManager<C>,
    retry: RetryPolicy,
}

impl<C: IgdClient> PortForwarder<C> {
    pub fn new(client: C, config: &UpnpConfig) -> Self {
        Self {
            manager: PortManager::new(client, config),
            retry: config.retry_policy(),
        }
    }

    pub fn manager(&self) -> &PortManager<C> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut PortManager<C> {
        &mut self.manager
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Start discovery unless a session exists or is being set up
    ///
    /// # Returns
    /// true if the session is DONE afterwards
    pub fn init(&mut self, timeout_ms: u32) -> bool {
        if self.manager.init_state() == InitState::None {
            if let Err(e) = self
                .manager
                .initialize(Duration::from_millis(u64::from(timeout_ms)))
            {
                info!(error = %e, "UPnP initialization failed");
            }
        }
        self.manager.init_state() == InitState::Done
    }

    /// Remove our mappings, give borrowed ports back, release the session
    ///
    /// Does nothing unless the session is DONE. Each step runs even if the
    /// previous one failed; a transport failure leaves the later steps as
    /// no-ops.
    pub fn shutdown(&mut self) {
        if self.manager.init_state() != InitState::Done {
            return;
        }

        if let Err(e) = self.manager.clear() {
            error!(error = %e, "Shutdown - clear failed");
        }
        if let Err(e) = self.manager.restore() {
            error!(error = %e, "Shutdown - restore failed");
        }
        self.manager.terminate();
    }

    /// Add a mapping, retrying per the policy
    ///
    /// # Arguments
    /// * `protocol` - "TCP" or "UDP", case-insensitive
    /// * `description` - mapping description
    /// * `port` - external port
    /// * `internal_port` - LAN port, 0 means same as `port`
    pub fn add_mapping(
        &mut self,
        protocol: &str,
        description: &str,
        port: u16,
        internal_port: u16,
    ) -> bool {
        let protocol: Protocol = match protocol.parse() {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "Add rejected");
                return false;
            }
        };

        let manager = &mut self.manager;
        self.retry
            .run("Add", || manager.add(protocol, description, port, internal_port))
            .is_ok()
    }

    /// Remove a mapping, retrying per the policy
    pub fn remove_mapping(&mut self, protocol: &str, port: u16) -> bool {
        info!(protocol, port, "UPnP remove");

        let protocol: Protocol = match protocol.parse() {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "Remove rejected");
                return false;
            }
        };

        let manager = &mut self.manager;
        self.retry
            .run("Remove", || manager.remove(protocol, port))
            .is_ok()
    }
}

impl<C: IgdClient> Drop for PortForwarder<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

static GLOBAL_FORWARDER: Lazy<Mutex<Option<PortForwarder<IgdNextClient>>>> =
    Lazy::new(|| Mutex::new(None));

fn with_global<T>(f: impl FnOnce(&mut PortForwarder<IgdNextClient>) -> T) -> T {
    let mut guard = GLOBAL_FORWARDER.lock().unwrap_or_else(|e| e.into_inner());
    let forwarder = guard
        .get_or_insert_with(|| PortForwarder::new(IgdNextClient::new(), &UpnpConfig::default()));
    f(forwarder)
}

/// Replace the process-wide forwarder's configuration
///
/// Refused (returns false) while a session is set up.
pub fn configure(config: &UpnpConfig) -> bool {
    let mut guard = GLOBAL_FORWARDER.lock().unwrap_or_else(|e| e.into_inner());
    let busy = guard
        .as_ref()
        .map(|f| f.manager().init_state() != InitState::None)
        .unwrap_or(false);
    if busy {
        return false;
    }
    *guard = Some(PortForwarder::new(IgdNextClient::new(), config));
    true
}

/// Process-wide `PortForwarder::init`
pub fn upnp_init(timeout_ms: u32) -> bool {
    with_global(|f| f.init(timeout_ms))
}

/// Process-wide `PortForwarder::shutdown`
pub fn upnp_shutdown() {
    with_global(|f| f.shutdown())
}

/// Process-wide `PortForwarder::add_mapping`
pub fn upnp_add(protocol: &str, description: &str, port: u16, internal_port: u16) -> bool {
    with_global(|f| f.add_mapping(protocol, description, port, internal_port))
}

/// Process-wide `PortForwarder::remove_mapping`
pub fn upnp_remove(protocol: &str, port: u16) -> bool {
    with_global(|f| f.remove_mapping(protocol, port))
}

/// State of the process-wide session
pub fn upnp_init_state() -> InitState {
    with_global(|f| f.manager().init_state())
}
