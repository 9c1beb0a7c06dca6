/**
 * memory.rs
 * Simulated Internet Gateway Device
 *
 * Keeps a port-mapping table in memory and answers the IgdClient calls the
 * way a miniupnpd-style router does:
 * - AddPortMapping on a port held by another client → 718
 * - AddPortMapping on a port held by the same client → overwrite
 * - DeletePortMapping on a missing entry → 714
 * - GetGenericPortMappingEntry past the end → 713
 *
 * Handles are cheap clones sharing one table, so a test can keep a handle
 * while the port manager owns another. Every call is recorded and faults can
 * be queued per action.
 */

use crate::errors::{Result, UpnpError, CONFLICT_IN_MAPPING_ENTRY, NO_SUCH_ENTRY_IN_ARRAY};
use crate::gateway::traits::{
    ControlPoint, DiscoveredDevice, DiscoveryOptions, GatewayStatus, IgdClient, PortMappingEntry,
    Protocol, ValidGateway,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

const SIMULATED_GATEWAY: &str = "192.168.1.1:5000";

/// Gateway actions that can be observed or faulted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayAction {
    Discover,
    Describe,
    ValidGateway,
    ConnectionType,
    AddPortMapping,
    DeletePortMapping,
    GetPortMappingEntry,
}

/// Failure injected into the next matching call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// HTTP / socket failure (router unreachable)
    Transport,
    /// Error 725
    LeaseUnsupported,
    /// Any other UPnP error code
    Protocol(i32),
}

impl Fault {
    fn into_error(self, action: GatewayAction) -> UpnpError {
        match self {
            Fault::Transport => UpnpError::Transport(format!("{:?}: connection timed out", action)),
            Fault::LeaseUnsupported => UpnpError::LeaseUnsupported,
            Fault::Protocol(code) => UpnpError::protocol(code, format!("{:?} rejected", action)),
        }
    }
}

/// A recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub action: GatewayAction,
    /// (port, protocol) for mapping calls, index for enumeration
    pub port: Option<u16>,
    pub protocol: Option<Protocol>,
    pub index: Option<u32>,
}

#[derive(Debug)]
struct GatewayState {
    devices: Vec<DiscoveredDevice>,
    table: Vec<PortMappingEntry>,
    lan_address: String,
    status: GatewayStatus,
    connection_type: Option<String>,
    permanent_leases_only: bool,
    description_prefix: Option<String>,
    faults: VecDeque<(GatewayAction, Fault)>,
    calls: Vec<GatewayCall>,
    releases: usize,
}

/// In-memory IGD implementing `IgdClient`
#[derive(Debug, Clone)]
pub struct InMemoryGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    /// A single IGD at 192.168.1.1 seen from 192.168.1.100
    pub fn new() -> Self {
        let gateway = Self::without_devices();
        gateway.add_device(
            &format!("http://{}/rootDesc.xml", SIMULATED_GATEWAY),
            "urn:schemas-upnp-org:device:InternetGatewayDevice:1",
        );
        gateway
    }

    /// A network where discovery finds nothing
    pub fn without_devices() -> Self {
        Self {
            state: Arc::new(Mutex::new(GatewayState {
                devices: Vec::new(),
                table: Vec::new(),
                lan_address: "192.168.1.100".to_string(),
                status: GatewayStatus::Connected,
                connection_type: Some("IP_Routed".to_string()),
                permanent_leases_only: false,
                description_prefix: None,
                faults: VecDeque::new(),
                calls: Vec::new(),
                releases: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GatewayState> {
        // A poisoned table is still a usable table for a simulation
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_device(&self, description_url: &str, search_target: &str) {
        self.lock().devices.push(DiscoveredDevice {
            description_url: description_url.to_string(),
            search_target: search_target.to_string(),
        });
    }

    pub fn set_lan_address(&self, lan_address: &str) {
        self.lock().lan_address = lan_address.to_string();
    }

    pub fn set_connection_type(&self, connection_type: Option<&str>) {
        self.lock().connection_type = connection_type.map(str::to_string);
    }

    /// Reject any AddPortMapping with a non-zero lease (error 725)
    pub fn set_permanent_leases_only(&self, enabled: bool) {
        self.lock().permanent_leases_only = enabled;
    }

    /// Prefix stored descriptions, as some routers do with "UPnP:"
    pub fn set_description_prefix(&self, prefix: Option<&str>) {
        self.lock().description_prefix = prefix.map(str::to_string);
    }

    /// Place an entry directly in the table
    pub fn insert_entry(&self, entry: PortMappingEntry) {
        self.lock().table.push(entry);
    }

    /// Fail the next call of `action` with `fault`
    pub fn fail_next(&self, action: GatewayAction, fault: Fault) {
        self.lock().faults.push_back((action, fault));
    }

    pub fn entries(&self) -> Vec<PortMappingEntry> {
        self.lock().table.clone()
    }

    pub fn entry(&self, external_port: u16, protocol: Protocol) -> Option<PortMappingEntry> {
        self.lock()
            .table
            .iter()
            .find(|e| e.external_port == external_port && e.protocol == protocol)
            .cloned()
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, action: GatewayAction) -> usize {
        self.lock().calls.iter().filter(|c| c.action == action).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn release_count(&self) -> usize {
        self.lock().releases
    }

    /// Record the call, then pop a queued fault for it if one exists
    fn enter(
        &self,
        action: GatewayAction,
        port: Option<u16>,
        protocol: Option<Protocol>,
        index: Option<u32>,
    ) -> Result<MutexGuard<'_, GatewayState>> {
        let mut state = self.lock();
        state.calls.push(GatewayCall {
            action,
            port,
            protocol,
            index,
        });

        if let Some(pos) = state.faults.iter().position(|(a, _)| *a == action) {
            if let Some((_, fault)) = state.faults.remove(pos) {
                return Err(fault.into_error(action));
            }
        }
        Ok(state)
    }
}

impl IgdClient for InMemoryGateway {
    fn discover(&mut self, _options: &DiscoveryOptions) -> Result<Vec<DiscoveredDevice>> {
        let state = self.enter(GatewayAction::Discover, None, None, None)?;
        if state.devices.is_empty() {
            return Err(UpnpError::NoGateway("no response within timeout".to_string()));
        }
        Ok(state.devices.clone())
    }

    fn describe(&mut self, device: &DiscoveredDevice) -> Result<ControlPoint> {
        let _state = self.enter(GatewayAction::Describe, None, None, None)?;
        let base_url = device
            .description_url
            .rsplit_once('/')
            .map(|(base, _)| base.to_string())
            .unwrap_or_else(|| device.description_url.clone());

        Ok(ControlPoint {
            control_url: format!("{}/ctl/IPConn", base_url),
            service_type: "urn:schemas-upnp-org:service:WANIPConnection:1".to_string(),
            base_url,
        })
    }

    fn valid_gateway(
        &mut self,
        _devices: &[DiscoveredDevice],
        _control: &ControlPoint,
    ) -> Result<ValidGateway> {
        let state = self.enter(GatewayAction::ValidGateway, None, None, None)?;
        Ok(ValidGateway {
            lan_address: state.lan_address.clone(),
            status: state.status,
        })
    }

    fn connection_type(&mut self, _control: &ControlPoint) -> Result<String> {
        let state = self.enter(GatewayAction::ConnectionType, None, None, None)?;
        state
            .connection_type
            .clone()
            .ok_or_else(|| UpnpError::Unsupported("GetConnectionTypeInfo".to_string()))
    }

    fn add_port_mapping(&mut self, _control: &ControlPoint, mapping: &PortMappingEntry) -> Result<()> {
        let mut state = self.enter(
            GatewayAction::AddPortMapping,
            Some(mapping.external_port),
            Some(mapping.protocol),
            None,
        )?;

        if state.permanent_leases_only && mapping.lease_duration != 0 {
            return Err(UpnpError::LeaseUnsupported);
        }

        let mut stored = mapping.clone();
        if let Some(prefix) = &state.description_prefix {
            stored.description = format!("{}{}", prefix, stored.description);
        }

        let existing = state
            .table
            .iter()
            .position(|e| e.external_port == mapping.external_port && e.protocol == mapping.protocol);
        match existing {
            Some(pos) if state.table[pos].internal_client != mapping.internal_client => Err(
                UpnpError::protocol(CONFLICT_IN_MAPPING_ENTRY, "ConflictInMappingEntry"),
            ),
            Some(pos) => {
                state.table[pos] = stored;
                Ok(())
            }
            None => {
                state.table.push(stored);
                Ok(())
            }
        }
    }

    fn delete_port_mapping(
        &mut self,
        _control: &ControlPoint,
        external_port: u16,
        protocol: Protocol,
        _remote_host: &str,
    ) -> Result<()> {
        let mut state = self.enter(
            GatewayAction::DeletePortMapping,
            Some(external_port),
            Some(protocol),
            None,
        )?;

        match state
            .table
            .iter()
            .position(|e| e.external_port == external_port && e.protocol == protocol)
        {
            Some(pos) => {
                state.table.remove(pos);
                Ok(())
            }
            None => Err(UpnpError::protocol(NO_SUCH_ENTRY_IN_ARRAY, "NoSuchEntryInArray")),
        }
    }

    fn port_mapping_entry(&mut self, _control: &ControlPoint, index: u32) -> Result<PortMappingEntry> {
        let state = self.enter(GatewayAction::GetPortMappingEntry, None, None, Some(index))?;
        state
            .table
            .get(index as usize)
            .cloned()
            .ok_or(UpnpError::NoMoreEntries)
    }

    fn release(&mut self) {
        self.lock().releases += 1;
    }
}
