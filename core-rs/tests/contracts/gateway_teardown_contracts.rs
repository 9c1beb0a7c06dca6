// Gateway Teardown Contract Tests
//
// Invariants of the session state machine. These pin down when gateway
// resources are held, when they are released, and that no mapping call is
// ever made without a live session.

use netplay_upnp::gateway::{Fault, GatewayAction};
use netplay_upnp::{InMemoryGateway, InitState, PortManager, Protocol, UpnpError};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_millis(2000);

fn ready_manager(gateway: &InMemoryGateway) -> PortManager<InMemoryGateway> {
    let mut manager = PortManager::with_defaults(gateway.clone());
    manager.initialize(TIMEOUT).unwrap();
    manager
}

/// INVARIANT: Construction acquires nothing
/// BREAKS: Creating a manager would block on SSDP before the host asked
#[test]
fn construction_makes_no_gateway_call() {
    let gateway = InMemoryGateway::new();
    let manager = PortManager::with_defaults(gateway.clone());

    assert_eq!(manager.init_state(), InitState::None);
    assert!(gateway.calls().is_empty());
    assert_eq!(gateway.release_count(), 0);
}

/// INVARIANT: Every mapping operation outside DONE is refused locally
/// BREAKS: Calls go out against a control URL that no longer exists
#[test]
fn mapping_calls_require_done() {
    let gateway = InMemoryGateway::new();
    let mut manager = PortManager::with_defaults(gateway.clone());

    let results = vec![
        manager.add(Protocol::Udp, "M64Plus-Netplay", 45000, 0),
        manager.remove(Protocol::Udp, 45000),
        manager.restore(),
        manager.clear(),
        manager.refresh_port_list(),
    ];

    for result in results {
        assert!(matches!(result, Err(UpnpError::NotReady(_))));
    }
    assert!(gateway.calls().is_empty());
}

type Operation = fn(&mut PortManager<InMemoryGateway>) -> Result<(), UpnpError>;

fn add_6000(m: &mut PortManager<InMemoryGateway>) -> Result<(), UpnpError> {
    m.add(Protocol::Tcp, "M64Plus-Netplay", 6000, 0)
}

fn remove_6000(m: &mut PortManager<InMemoryGateway>) -> Result<(), UpnpError> {
    m.remove(Protocol::Tcp, 6000)
}

fn clear(m: &mut PortManager<InMemoryGateway>) -> Result<(), UpnpError> {
    m.clear()
}

fn refresh(m: &mut PortManager<InMemoryGateway>) -> Result<(), UpnpError> {
    m.refresh_port_list()
}

/// INVARIANT: Any transport failure during a mapping operation ends in NONE
/// BREAKS: Every later call waits out an HTTP timeout on a dead router
#[test]
fn transport_failure_always_ends_in_none() {
    let cases: [(GatewayAction, Operation); 4] = [
        (GatewayAction::AddPortMapping, add_6000),
        (GatewayAction::DeletePortMapping, remove_6000),
        (GatewayAction::GetPortMappingEntry, clear),
        (GatewayAction::GetPortMappingEntry, refresh),
    ];

    for (action, op) in cases {
        let gateway = InMemoryGateway::new();
        let mut manager = ready_manager(&gateway);
        gateway.fail_next(action, Fault::Transport);

        let result = op(&mut manager);

        assert!(
            matches!(result, Err(UpnpError::Transport(_))),
            "{:?} should surface the transport error",
            action
        );
        assert_eq!(manager.init_state(), InitState::None, "{:?}", action);
        assert_eq!(manager.lan_ip(), None);
        assert!(manager.owned_mappings().is_empty());
        assert!(manager.foreign_mappings().is_empty());
        assert_eq!(gateway.release_count(), 1);
    }
}

/// INVARIANT: A non-transport rejection leaves the session DONE
#[test]
fn protocol_rejection_keeps_session() {
    let gateway = InMemoryGateway::new();
    let mut manager = ready_manager(&gateway);
    gateway.fail_next(GatewayAction::AddPortMapping, Fault::Protocol(718));

    assert!(manager.add(Protocol::Tcp, "M64Plus-Netplay", 6000, 0).is_err());
    assert_eq!(manager.init_state(), InitState::Done);
    assert!(manager.add(Protocol::Tcp, "M64Plus-Netplay", 6000, 0).is_ok());
}

/// INVARIANT: Failed Initialize releases whatever it acquired
/// BREAKS: Leaked discovery state between retries
#[test]
fn failed_initialize_releases() {
    for action in [
        GatewayAction::Discover,
        GatewayAction::Describe,
        GatewayAction::ValidGateway,
    ] {
        let gateway = InMemoryGateway::new();
        gateway.fail_next(action, Fault::Transport);
        let mut manager = PortManager::with_defaults(gateway.clone());

        assert!(manager.initialize(TIMEOUT).is_err(), "{:?}", action);
        assert_eq!(manager.init_state(), InitState::None);
        assert_eq!(gateway.release_count(), 1);
    }
}

/// INVARIANT: Terminate is safe to repeat and makes no mapping call
#[test]
fn terminate_is_idempotent() {
    let gateway = InMemoryGateway::new();
    let mut manager = ready_manager(&gateway);
    gateway.clear_calls();

    manager.terminate();
    manager.terminate();

    assert!(gateway.calls().is_empty());
    assert_eq!(manager.init_state(), InitState::None);
}

/// INVARIANT: A torn-down session can be re-established
#[test]
fn reinitialize_after_teardown() {
    let gateway = InMemoryGateway::new();
    let mut manager = ready_manager(&gateway);
    gateway.fail_next(GatewayAction::AddPortMapping, Fault::Transport);
    assert!(manager.add(Protocol::Tcp, "M64Plus-Netplay", 6000, 0).is_err());

    manager.initialize(TIMEOUT).unwrap();
    assert!(manager.add(Protocol::Tcp, "M64Plus-Netplay", 6000, 0).is_ok());
    assert_eq!(manager.owned_mappings().len(), 1);
}
