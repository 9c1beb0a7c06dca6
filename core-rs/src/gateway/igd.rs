//! igd-next backed gateway client
//!
//! igd-next performs SSDP search, description fetch and control URL
//! resolution in a single `search_gateway` call, so `discover` keeps the
//! resolved gateway and `describe` hands out its control binding.

use crate::errors::{
    Result, UpnpError, ACTION_NOT_AUTHORIZED, CONFLICT_IN_MAPPING_ENTRY, NO_SUCH_ENTRY_IN_ARRAY,
    ONLY_PERMANENT_LEASES_SUPPORTED, SPECIFIED_ARRAY_INDEX_INVALID,
};
use crate::gateway::traits::{
    ControlPoint, DiscoveredDevice, DiscoveryOptions, GatewayStatus, IgdClient, PortMappingEntry,
    Protocol, ValidGateway,
};
use igd_next::{
    AddPortError, Gateway, GetGenericPortMappingEntryError, PortMappingProtocol, RemovePortError,
    RequestError, SearchOptions,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use tracing::debug;

const IGD_SEARCH_TARGET: &str = "urn:schemas-upnp-org:device:InternetGatewayDevice:1";
const WAN_IP_CONNECTION: &str = "urn:schemas-upnp-org:service:WANIPConnection:1";
const SSDP_PORT: u16 = 1900;

/// UPnP error 402
const INVALID_ARGS: i32 = 402;
/// UPnP error 501
const ACTION_FAILED: i32 = 501;
/// UPnP error 724
const SAME_PORT_VALUES_REQUIRED: i32 = 724;

/// Gateway client talking to a real router
#[derive(Default)]
pub struct IgdNextClient {
    discovered: Vec<(String, Gateway)>,
    active: Option<Gateway>,
}

impl IgdNextClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn active(&self) -> Result<&Gateway> {
        self.active
            .as_ref()
            .ok_or_else(|| UpnpError::NotReady("no gateway selected".to_string()))
    }
}

impl IgdClient for IgdNextClient {
    fn discover(&mut self, options: &DiscoveryOptions) -> Result<Vec<DiscoveredDevice>> {
        if options.ipv6 {
            return Err(UpnpError::Unsupported("IPv6 gateway discovery".to_string()));
        }
        if options.ttl != 2 {
            debug!(ttl = options.ttl, "Multicast TTL is fixed by the UPnP client");
        }

        // 1 is kept as an alias for the SSDP port
        let local_port = if options.local_port == 1 {
            SSDP_PORT
        } else {
            options.local_port
        };

        let search = SearchOptions {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), local_port),
            timeout: Some(options.timeout),
            ..Default::default()
        };

        let gateway = igd_next::search_gateway(search)
            .map_err(|e| UpnpError::NoGateway(e.to_string()))?;

        let description_url = format!("http://{}{}", gateway.addr, gateway.root_url);
        let device = DiscoveredDevice {
            description_url: description_url.clone(),
            search_target: IGD_SEARCH_TARGET.to_string(),
        };

        self.discovered.retain(|(url, _)| url != &description_url);
        self.discovered.push((description_url, gateway));

        Ok(vec![device])
    }

    fn describe(&mut self, device: &DiscoveredDevice) -> Result<ControlPoint> {
        let gateway = self
            .discovered
            .iter()
            .find(|(url, _)| url == &device.description_url)
            .map(|(_, gateway)| gateway.clone())
            .ok_or_else(|| {
                UpnpError::NoGateway(format!("unknown device {}", device.description_url))
            })?;

        let control = ControlPoint {
            control_url: format!("http://{}{}", gateway.addr, gateway.control_url),
            service_type: WAN_IP_CONNECTION.to_string(),
            base_url: format!("http://{}", gateway.addr),
        };
        self.active = Some(gateway);

        Ok(control)
    }

    fn valid_gateway(
        &mut self,
        _devices: &[DiscoveredDevice],
        _control: &ControlPoint,
    ) -> Result<ValidGateway> {
        let gateway = self.active()?;

        // Routing table lookup only; nothing is sent
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect(gateway.addr)?;
        let lan_address = socket.local_addr()?.ip().to_string();

        let status = match gateway.get_external_ip() {
            Ok(_) => GatewayStatus::Connected,
            Err(e) => {
                debug!(error = %e, "GetExternalIPAddress failed");
                GatewayStatus::NotConnected
            }
        };

        Ok(ValidGateway {
            lan_address,
            status,
        })
    }

    /// igd-next has no GetConnectionTypeInfo action, so this diagnostic is
    /// never available against a real router. Initialize logs the error and
    /// carries on.
    fn connection_type(&mut self, _control: &ControlPoint) -> Result<String> {
        Err(UpnpError::Unsupported("GetConnectionTypeInfo".to_string()))
    }

    fn add_port_mapping(&mut self, _control: &ControlPoint, mapping: &PortMappingEntry) -> Result<()> {
        // igd-next always sends an empty NewRemoteHost
        if !mapping.remote_host.is_empty() {
            return Err(UpnpError::Unsupported(format!(
                "AddPortMapping restricted to remote host {}",
                mapping.remote_host
            )));
        }

        let gateway = self.active()?;

        let ip: IpAddr = mapping.internal_client.parse().map_err(|_| {
            UpnpError::protocol(
                INVALID_ARGS,
                format!("invalid internal client '{}'", mapping.internal_client),
            )
        })?;

        gateway
            .add_port(
                to_igd_protocol(mapping.protocol),
                mapping.external_port,
                SocketAddr::new(ip, mapping.internal_port),
                mapping.lease_duration,
                &mapping.description,
            )
            .map_err(map_add_error)
    }

    fn delete_port_mapping(
        &mut self,
        _control: &ControlPoint,
        external_port: u16,
        protocol: Protocol,
        remote_host: &str,
    ) -> Result<()> {
        let gateway = self.active()?;

        if !remote_host.is_empty() {
            debug!(remote_host, port = external_port, "Deleting mapping without remote host");
        }

        gateway
            .remove_port(to_igd_protocol(protocol), external_port)
            .map_err(map_remove_error)
    }

    fn port_mapping_entry(&mut self, _control: &ControlPoint, index: u32) -> Result<PortMappingEntry> {
        let gateway = self.active()?;

        let entry = gateway
            .get_generic_port_mapping_entry(index)
            .map_err(map_entry_error)?;

        Ok(PortMappingEntry {
            external_port: entry.external_port,
            protocol: from_igd_protocol(entry.protocol),
            internal_port: entry.internal_port,
            internal_client: entry.internal_client,
            description: entry.port_mapping_description,
            remote_host: entry.remote_host,
            lease_duration: entry.lease_duration,
            enabled: entry.enabled,
        })
    }

    fn release(&mut self) {
        self.discovered.clear();
        self.active = None;
    }
}

fn to_igd_protocol(protocol: Protocol) -> PortMappingProtocol {
    match protocol {
        Protocol::Tcp => PortMappingProtocol::TCP,
        Protocol::Udp => PortMappingProtocol::UDP,
    }
}

fn from_igd_protocol(protocol: PortMappingProtocol) -> Protocol {
    match protocol {
        PortMappingProtocol::TCP => Protocol::Tcp,
        PortMappingProtocol::UDP => Protocol::Udp,
    }
}

fn map_request_error(err: RequestError) -> UpnpError {
    match err {
        RequestError::ErrorCode(code, message) => match i32::from(code) {
            ONLY_PERMANENT_LEASES_SUPPORTED => UpnpError::LeaseUnsupported,
            SPECIFIED_ARRAY_INDEX_INVALID => UpnpError::NoMoreEntries,
            code => UpnpError::protocol(code, message),
        },
        RequestError::InvalidResponse(message) => UpnpError::protocol(ACTION_FAILED, message),
        RequestError::UnsupportedAction(action) => UpnpError::Unsupported(action),
        other => UpnpError::Transport(other.to_string()),
    }
}

fn map_add_error(err: AddPortError) -> UpnpError {
    match err {
        AddPortError::OnlyPermanentLeasesSupported => UpnpError::LeaseUnsupported,
        AddPortError::ActionNotAuthorized => {
            UpnpError::protocol(ACTION_NOT_AUTHORIZED, "ActionNotAuthorized")
        }
        AddPortError::PortInUse => {
            UpnpError::protocol(CONFLICT_IN_MAPPING_ENTRY, "ConflictInMappingEntry")
        }
        AddPortError::SamePortValuesRequired => {
            UpnpError::protocol(SAME_PORT_VALUES_REQUIRED, "SamePortValuesRequired")
        }
        AddPortError::RequestError(e) => map_request_error(e),
        other => UpnpError::protocol(INVALID_ARGS, other.to_string()),
    }
}

fn map_remove_error(err: RemovePortError) -> UpnpError {
    match err {
        RemovePortError::ActionNotAuthorized => {
            UpnpError::protocol(ACTION_NOT_AUTHORIZED, "ActionNotAuthorized")
        }
        RemovePortError::NoSuchPortMapping => {
            UpnpError::protocol(NO_SUCH_ENTRY_IN_ARRAY, "NoSuchEntryInArray")
        }
        RemovePortError::RequestError(e) => map_request_error(e),
        #[allow(unreachable_patterns)]
        other => UpnpError::protocol(ACTION_FAILED, other.to_string()),
    }
}

fn map_entry_error(err: GetGenericPortMappingEntryError) -> UpnpError {
    match err {
        GetGenericPortMappingEntryError::SpecifiedArrayIndexInvalid => UpnpError::NoMoreEntries,
        GetGenericPortMappingEntryError::ActionNotAuthorized => {
            UpnpError::protocol(ACTION_NOT_AUTHORIZED, "ActionNotAuthorized")
        }
        GetGenericPortMappingEntryError::RequestError(e) => map_request_error(e),
        #[allow(unreachable_patterns)]
        other => UpnpError::protocol(ACTION_FAILED, other.to_string()),
    }
}
