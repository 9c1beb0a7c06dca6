/**
 * manager.rs
 * Port-mapping lifecycle on a UPnP Internet Gateway Device
 *
 * States:
 * - None: nothing acquired, every mapping operation is refused locally
 * - Busy: discovery in progress
 * - Done: gateway selected, LAN IP known, ledger loaded
 *
 * A transport-level failure (router unreachable) on any mapping call tears the
 * whole session down, so later calls fail fast as not-ready instead of waiting
 * on timeouts.
 *
 * Borrowing a foreign port:
 * - Add on a port someone else mapped deletes theirs, maps ours, and flags
 *   their record `taken`
 * - Restore deletes ours and replays their saved mapping
 */

use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::UpnpConfig;
use crate::errors::{Result, UpnpError};
use crate::gateway::{
    DiscoveredDevice, DiscoveryOptions, GatewayStatus, IgdClient, PortMappingEntry, Protocol,
};
use crate::port::ledger::{classify, is_ours, ForeignMapping, MappingLedger, OwnedMapping};
use crate::port::session::{GatewaySession, InitState, LeaseDuration};

/// Enumeration indices travel as at most five decimal digits
const MAX_TABLE_READS: u32 = 100_000;

/// Port Manager - owns the gateway session and the mapping ledger
pub struct PortManager<C: IgdClient> {
    client: C,
    state: InitState,
    session: Option<GatewaySession>,
    lease: LeaseDuration,
    default_lease: LeaseDuration,
    discovery: DiscoveryOptions,
    marker: String,
    vendor_prefix: String,
    ledger: MappingLedger,
}

impl<C: IgdClient> PortManager<C> {
    /// Create a port manager; nothing is acquired until `initialize`
    ///
    /// # Arguments
    /// * `client` - UPnP client used for every gateway call
    /// * `config` - discovery, marker and lease settings
    pub fn new(client: C, config: &UpnpConfig) -> Self {
        Self {
            client,
            state: InitState::None,
            session: None,
            lease: config.default_lease(),
            default_lease: config.default_lease(),
            discovery: config.discovery_options(),
            marker: config.mapping.marker.clone(),
            vendor_prefix: config.mapping.vendor_prefix.clone(),
            ledger: MappingLedger::new(),
        }
    }

    pub fn with_defaults(client: C) -> Self {
        Self::new(client, &UpnpConfig::default())
    }

    pub fn init_state(&self) -> InitState {
        self.state
    }

    /// LAN address used for our mappings, only while DONE
    pub fn lan_ip(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.lan_ip.as_str())
    }

    pub fn gateway_status(&self) -> Option<GatewayStatus> {
        self.session.as_ref().map(|s| s.status)
    }

    pub fn lease_duration(&self) -> LeaseDuration {
        self.lease
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn owned_mappings(&self) -> &VecDeque<OwnedMapping> {
        self.ledger.owned()
    }

    pub fn foreign_mappings(&self) -> &[ForeignMapping] {
        self.ledger.foreign()
    }

    /// Discover the gateway and load its mapping table
    ///
    /// # Returns
    /// Ok when the session is DONE (including when it already was)
    ///
    /// # Errors
    /// - `NotReady` if another initialization is in progress
    /// - `NoGateway` if no Internet Gateway Device answered
    /// - any collaborator error from description, LAN address or refresh
    pub fn initialize(&mut self, timeout: Duration) -> Result<()> {
        debug!(timeout_ms = timeout.as_millis() as u64, "PortManager::initialize");

        match self.state {
            InitState::Busy => {
                warn!("Initialization already in progress");
                return Err(UpnpError::NotReady(
                    "initialization already in progress".to_string(),
                ));
            }
            InitState::Done => {
                warn!("Already initialized");
                return Ok(());
            }
            InitState::None => {}
        }

        self.lease = self.default_lease;
        self.state = InitState::Busy;

        match self.open_session(timeout) {
            Ok(session) => {
                self.session = Some(session);
                self.state = InitState::Done;
                self.refresh_port_list()
            }
            Err(e) => {
                info!(error = %e, "upnpDiscover failed or no UPnP device detected");
                self.terminate();
                Err(e)
            }
        }
    }

    fn open_session(&mut self, timeout: Duration) -> Result<GatewaySession> {
        let options = DiscoveryOptions {
            timeout,
            ..self.discovery.clone()
        };

        let devices = self.client.discover(&options)?;
        for device in &devices {
            info!(
                desc = %device.description_url,
                st = %device.search_target,
                "Found UPnP device"
            );
        }

        let device: &DiscoveredDevice = devices
            .iter()
            .find(|d| d.is_internet_gateway())
            .ok_or_else(|| {
                UpnpError::NoGateway(format!(
                    "{} device(s) answered, none is an Internet Gateway Device",
                    devices.len()
                ))
            })?;
        info!(desc = %device.description_url, st = %device.search_target, "UPnP device selected");

        let control = self.client.describe(device)?;
        let valid = self.client.valid_gateway(&devices, &control)?;
        if valid.lan_address.is_empty() {
            return Err(UpnpError::NoGateway(
                "gateway did not report a LAN address".to_string(),
            ));
        }
        info!(lan_ip = %valid.lan_address, status = ?valid.status, "Detected LAN IP");

        match self.client.connection_type(&control) {
            Ok(connection_type) => info!(%connection_type, "Connection type"),
            Err(e) => warn!(error = %e, "GetConnectionTypeInfo failed"),
        }

        Ok(GatewaySession {
            control,
            lan_ip: valid.lan_address,
            status: valid.status,
        })
    }

    /// Release the session and forget both ledger collections
    ///
    /// Safe to call repeatedly and from shutdown paths; makes no gateway call.
    pub fn terminate(&mut self) {
        debug!("PortManager::terminate");

        self.client.release();
        self.session = None;
        self.ledger.clear();
        self.lease = self.default_lease;
        self.state = InitState::None;
    }

    fn require_session(&self, operation: &str) -> Result<GatewaySession> {
        match (self.state, &self.session) {
            (InitState::Done, Some(session)) => Ok(session.clone()),
            _ => {
                warn!(operation, "UPnP device not initialized yet");
                Err(UpnpError::NotReady(format!(
                    "{}: UPnP device not initialized",
                    operation
                )))
            }
        }
    }

    /// Tear the session down when the gateway looks unreachable
    fn escalate(&mut self, err: UpnpError) -> UpnpError {
        if err.is_transport() {
            warn!(error = %err, "Gateway unreachable, invalidating UPnP session");
            self.terminate();
        }
        err
    }

    /// Rebuild the ledger from the gateway's generic port-mapping table
    pub fn refresh_port_list(&mut self) -> Result<()> {
        info!("PortManager::refresh_port_list");
        let session = self.require_session("refresh_port_list")?;

        self.ledger.clear();
        for index in 0..MAX_TABLE_READS {
            match self.client.port_mapping_entry(&session.control, index) {
                Ok(entry) => {
                    let classified =
                        classify(entry, &session.lan_ip, &self.marker, &self.vendor_prefix);
                    self.ledger.record(classified);
                }
                Err(UpnpError::NoMoreEntries) => break,
                Err(e) if e.is_transport() => {
                    error!(index, error = %e, "GetGenericPortMappingEntry failed");
                    return Err(self.escalate(e));
                }
                Err(e) => {
                    warn!(index, error = %e, "GetGenericPortMappingEntry failed, stopping enumeration");
                    break;
                }
            }
        }

        debug!(
            owned = self.ledger.owned().len(),
            foreign = self.ledger.foreign().len(),
            "Port list refreshed"
        );
        Ok(())
    }

    /// Map `external_port` on the gateway to this machine
    ///
    /// # Arguments
    /// * `protocol` - TCP or UDP
    /// * `description` - mapping description, should contain the marker
    /// * `external_port` - gateway-facing port
    /// * `internal_port` - LAN port, 0 means same as `external_port`
    ///
    /// # Returns
    /// Ok if the mapping exists afterwards (already owned counts)
    pub fn add(
        &mut self,
        protocol: Protocol,
        description: &str,
        external_port: u16,
        internal_port: u16,
    ) -> Result<()> {
        let internal_port = if internal_port == 0 {
            external_port
        } else {
            internal_port
        };
        info!(%protocol, port = external_port, internal_port, "PortManager::add");

        let session = self.require_session("add")?;

        if self.ledger.owns(external_port, protocol) {
            debug!(%protocol, port = external_port, "Already mapped by this application");
            return Ok(());
        }

        // A dangling or foreign mapping on the port makes the add conflict
        let overridden = self.ledger.foreign_position(external_port, protocol);
        let mut removed_foreign = None;
        if let Some(index) = overridden {
            match self
                .client
                .delete_port_mapping(&session.control, external_port, protocol, "")
            {
                Ok(()) => removed_foreign = Some(index),
                Err(e) => {
                    debug!(%protocol, port = external_port, error = %e, "Pre-emptive DeletePortMapping failed");
                }
            }
        }

        let mut mapping = PortMappingEntry {
            external_port,
            protocol,
            internal_port,
            internal_client: session.lan_ip.clone(),
            description: description.to_string(),
            remote_host: String::new(),
            lease_duration: self.lease.as_secs(),
            enabled: true,
        };

        let mut result = self.client.add_port_mapping(&session.control, &mapping);
        if matches!(result, Err(UpnpError::LeaseUnsupported)) && !self.lease.is_permanent() {
            info!("Gateway only supports permanent leases, switching lease duration to 0");
            self.lease = LeaseDuration::PERMANENT;
            mapping.lease_duration = self.lease.as_secs();
            result = self.client.add_port_mapping(&session.control, &mapping);
        }

        if let Err(e) = result {
            error!(%protocol, port = external_port, code = ?e.code(), error = %e, "AddPortMapping failed");
            // Their mapping is already gone from the gateway; Restore owes it back
            if let Some(index) = removed_foreign {
                self.ledger.mark_taken(index, true);
            }
            return Err(self.escalate(e));
        }

        self.ledger
            .insert_owned(OwnedMapping::new(external_port, protocol));
        if let Some(index) = overridden {
            self.ledger.mark_taken(index, true);
        }
        Ok(())
    }

    /// Delete the mapping on the gateway and forget it locally
    ///
    /// A rejection other than a transport failure is logged and the local
    /// entry is still pruned.
    pub fn remove(&mut self, protocol: Protocol, external_port: u16) -> Result<()> {
        info!(%protocol, port = external_port, "PortManager::remove");

        let session = self.require_session("remove")?;

        if let Err(e) = self
            .client
            .delete_port_mapping(&session.control, external_port, protocol, "")
        {
            error!(%protocol, port = external_port, code = ?e.code(), error = %e, "DeletePortMapping failed");
            if e.is_transport() {
                return Err(self.escalate(e));
            }
        }

        self.ledger.prune_owned(external_port, protocol);
        Ok(())
    }

    /// Hand every borrowed foreign mapping back to its original owner
    ///
    /// Stops at the first transport failure; other failures are logged and the
    /// next record is attempted.
    pub fn restore(&mut self) -> Result<()> {
        debug!("PortManager::restore");

        let session = self.require_session("restore")?;

        for index in self.ledger.taken_positions() {
            let original = match self.ledger.foreign_at(index) {
                Some(foreign) => foreign.entry.clone(),
                None => continue,
            };
            let (port, protocol) = (original.external_port, original.protocol);

            if self.ledger.owns(port, protocol) {
                match self
                    .client
                    .delete_port_mapping(&session.control, port, protocol, "")
                {
                    Ok(()) => {
                        self.ledger.prune_owned(port, protocol);
                    }
                    Err(e) => {
                        error!(%protocol, port, error = %e, "Restore - DeletePortMapping failed");
                        if e.is_transport() {
                            return Err(self.escalate(e));
                        }
                    }
                }
            }

            match self.client.add_port_mapping(&session.control, &original) {
                Ok(()) => {
                    info!(%protocol, port, client = %original.internal_client, "Restored original port mapping");
                    self.ledger.mark_taken(index, false);
                }
                Err(e) => {
                    error!(%protocol, port, error = %e, "Restore - AddPortMapping failed");
                    if e.is_transport() {
                        return Err(self.escalate(e));
                    }
                }
            }
        }
        Ok(())
    }

    /// Delete every mapping on the gateway that belongs to this application
    /// on this LAN address, including ones left over from earlier sessions
    pub fn clear(&mut self) -> Result<()> {
        debug!("PortManager::clear");

        let session = self.require_session("clear")?;

        let mut index = 0u32;
        for _ in 0..MAX_TABLE_READS {
            let entry = match self.client.port_mapping_entry(&session.control, index) {
                Ok(entry) => entry,
                Err(UpnpError::NoMoreEntries) => break,
                Err(e) if e.is_transport() => {
                    error!(index, error = %e, "Clear - GetGenericPortMappingEntry failed");
                    return Err(self.escalate(e));
                }
                Err(e) => {
                    warn!(index, error = %e, "Clear - enumeration stopped");
                    break;
                }
            };

            if is_ours(&entry, &session.lan_ip, &self.marker) {
                match self.client.delete_port_mapping(
                    &session.control,
                    entry.external_port,
                    entry.protocol,
                    &entry.remote_host,
                ) {
                    Ok(()) => {
                        self.ledger.prune_owned(entry.external_port, entry.protocol);
                        // Later entries shifted down into this index
                        continue;
                    }
                    Err(e) => {
                        error!(
                            port = entry.external_port,
                            protocol = %entry.protocol,
                            error = %e,
                            "Clear - DeletePortMapping failed"
                        );
                        if e.is_transport() {
                            return Err(self.escalate(e));
                        }
                    }
                }
            }
            index += 1;
        }
        Ok(())
    }
}
