//! Integration tests for the host-facing PortForwarder
//!
//! Covers the boolean entry points the emulator front-end calls:
//! - init / shutdown sequencing
//! - bounded retry around add and remove
//! - shutdown on drop restoring the router

use netplay_upnp::gateway::{Fault, GatewayAction};
use netplay_upnp::{
    InMemoryGateway, InitState, PortForwarder, PortMappingEntry, Protocol, UpnpConfig,
};

const LAN_IP: &str = "192.168.1.100";

fn fast_config() -> UpnpConfig {
    let mut config = UpnpConfig::default();
    config.retry.delay_ms = 0;
    config
}

fn console_entry(port: u16, protocol: Protocol) -> PortMappingEntry {
    PortMappingEntry {
        external_port: port,
        protocol,
        internal_port: port,
        internal_client: "192.168.1.50".to_string(),
        description: "Console".to_string(),
        remote_host: String::new(),
        lease_duration: 0,
        enabled: true,
    }
}

fn ready_forwarder(gateway: &InMemoryGateway) -> PortForwarder<InMemoryGateway> {
    let mut forwarder = PortForwarder::new(gateway.clone(), &fast_config());
    assert!(forwarder.init(2000));
    forwarder
}

/// Test: init fails cleanly with no gateway
#[test]
fn test_init_without_gateway() {
    let gateway = InMemoryGateway::without_devices();
    let mut forwarder = PortForwarder::new(gateway.clone(), &fast_config());

    assert!(!forwarder.init(2000));
    assert_eq!(forwarder.manager().init_state(), InitState::None);
}

/// Test: add_mapping accepts protocol names in any case
#[test]
fn test_add_mapping_protocol_case() {
    let gateway = InMemoryGateway::new();
    let mut forwarder = ready_forwarder(&gateway);

    assert!(forwarder.add_mapping("udp", "M64Plus-Netplay", 45000, 0));
    assert!(forwarder.add_mapping("Tcp", "M64Plus-Netplay", 45001, 0));

    assert!(gateway.entry(45000, Protocol::Udp).is_some());
    assert!(gateway.entry(45001, Protocol::Tcp).is_some());
}

/// Test: Transient rejections are retried until one succeeds
#[test]
fn test_add_mapping_retries_until_success() {
    let gateway = InMemoryGateway::new();
    let mut forwarder = ready_forwarder(&gateway);
    gateway.clear_calls();
    gateway.fail_next(GatewayAction::AddPortMapping, Fault::Protocol(501));
    gateway.fail_next(GatewayAction::AddPortMapping, Fault::Protocol(501));

    assert!(forwarder.add_mapping("TCP", "M64Plus-Netplay", 6000, 0));
    assert_eq!(gateway.count_calls(GatewayAction::AddPortMapping), 3);
}

/// Test: Retry gives up after five attempts
#[test]
fn test_add_mapping_gives_up_after_five_attempts() {
    let gateway = InMemoryGateway::new();
    let mut forwarder = ready_forwarder(&gateway);
    gateway.clear_calls();
    for _ in 0..6 {
        gateway.fail_next(GatewayAction::AddPortMapping, Fault::Protocol(606));
    }

    assert!(!forwarder.add_mapping("TCP", "M64Plus-Netplay", 6000, 0));
    assert_eq!(gateway.count_calls(GatewayAction::AddPortMapping), 5);
    assert!(forwarder.manager().owned_mappings().is_empty());
    assert_eq!(forwarder.manager().init_state(), InitState::Done);
}

/// Test: Configured attempt count is honoured
#[test]
fn test_add_mapping_uses_configured_attempts() {
    let gateway = InMemoryGateway::new();
    let mut config = fast_config();
    config.retry.max_attempts = 2;
    let mut forwarder = PortForwarder::new(gateway.clone(), &config);
    assert!(forwarder.init(2000));
    gateway.clear_calls();
    for _ in 0..3 {
        gateway.fail_next(GatewayAction::AddPortMapping, Fault::Protocol(606));
    }

    assert!(!forwarder.add_mapping("UDP", "M64Plus-Netplay", 45000, 0));
    assert_eq!(gateway.count_calls(GatewayAction::AddPortMapping), 2);
}

/// Test: After a transport failure the remaining attempts fail locally
#[test]
fn test_add_mapping_transport_failure_stops_gateway_calls() {
    let gateway = InMemoryGateway::new();
    let mut forwarder = ready_forwarder(&gateway);
    gateway.clear_calls();
    gateway.fail_next(GatewayAction::AddPortMapping, Fault::Transport);

    assert!(!forwarder.add_mapping("TCP", "M64Plus-Netplay", 6000, 0));
    assert_eq!(gateway.count_calls(GatewayAction::AddPortMapping), 1);
    assert_eq!(forwarder.manager().init_state(), InitState::None);
}

/// Test: remove_mapping deletes the gateway entry
#[test]
fn test_remove_mapping() {
    let gateway = InMemoryGateway::new();
    let mut forwarder = ready_forwarder(&gateway);
    assert!(forwarder.add_mapping("UDP", "M64Plus-Netplay", 45000, 0));

    assert!(forwarder.remove_mapping("UDP", 45000));
    assert!(gateway.entry(45000, Protocol::Udp).is_none());
    assert!(forwarder.manager().owned_mappings().is_empty());
}

/// Test: remove_mapping before init makes no gateway call
#[test]
fn test_remove_mapping_before_init() {
    let gateway = InMemoryGateway::new();
    let mut forwarder = PortForwarder::new(gateway.clone(), &fast_config());

    assert!(!forwarder.remove_mapping("UDP", 45000));
    assert!(gateway.calls().is_empty());
}

/// Test: shutdown deletes ours and gives borrowed ports back
#[test]
fn test_shutdown_restores_router() {
    let gateway = InMemoryGateway::new();
    let console = console_entry(6000, Protocol::Tcp);
    gateway.insert_entry(console.clone());
    let mut forwarder = ready_forwarder(&gateway);

    assert!(forwarder.add_mapping("TCP", "M64Plus-Netplay", 6000, 0));
    assert!(forwarder.add_mapping("UDP", "M64Plus-Netplay", 6001, 0));
    assert_eq!(
        gateway.entry(6000, Protocol::Tcp).unwrap().internal_client,
        LAN_IP
    );

    forwarder.shutdown();

    assert_eq!(gateway.entries(), vec![console]);
    assert_eq!(forwarder.manager().init_state(), InitState::None);
    assert_eq!(gateway.release_count(), 1);
}

/// Test: shutdown is idempotent
#[test]
fn test_shutdown_twice() {
    let gateway = InMemoryGateway::new();
    let mut forwarder = ready_forwarder(&gateway);
    assert!(forwarder.add_mapping("UDP", "M64Plus-Netplay", 45000, 0));

    forwarder.shutdown();
    gateway.clear_calls();
    forwarder.shutdown();

    assert!(gateway.calls().is_empty());
    assert_eq!(gateway.release_count(), 1);
}

/// Test: Dropping the forwarder runs the shutdown sequence
#[test]
fn test_drop_runs_shutdown() {
    let gateway = InMemoryGateway::new();
    let console = console_entry(7000, Protocol::Udp);
    gateway.insert_entry(console.clone());

    {
        let mut forwarder = ready_forwarder(&gateway);
        assert!(forwarder.add_mapping("UDP", "M64Plus-Netplay", 7000, 0));
        assert!(forwarder.add_mapping("UDP", "M64Plus-Netplay", 45000, 0));
    }

    assert_eq!(gateway.entries(), vec![console]);
    assert_eq!(gateway.release_count(), 1);
}

/// Test: Session can be re-established after shutdown
#[test]
fn test_init_after_shutdown() {
    let gateway = InMemoryGateway::new();
    let mut forwarder = ready_forwarder(&gateway);
    forwarder.shutdown();

    assert!(forwarder.init(2000));
    assert!(forwarder.add_mapping("UDP", "M64Plus-Netplay", 45000, 0));
    assert_eq!(gateway.count_calls(GatewayAction::Discover), 2);
}
