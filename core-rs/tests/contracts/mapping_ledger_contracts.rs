// Mapping Ledger Contract Tests
//
// Invariants of the owned / foreign bookkeeping that must hold for any
// gateway behaviour. A failure here means someone else's router entries can
// be lost or ours can leak.

use netplay_upnp::port::ledger::{classify, is_ours, Classification};
use netplay_upnp::{
    ControlPoint, IgdClient, InMemoryGateway, MappingLedger, OwnedMapping, PortManager,
    PortMappingEntry, Protocol,
};
use std::collections::HashSet;
use std::time::Duration;

const LAN_IP: &str = "192.168.1.100";

fn entry(port: u16, protocol: Protocol, client: &str, description: &str) -> PortMappingEntry {
    PortMappingEntry {
        external_port: port,
        protocol,
        internal_port: port,
        internal_client: client.to_string(),
        description: description.to_string(),
        remote_host: String::new(),
        lease_duration: 0,
        enabled: true,
    }
}

/// INVARIANT: Ownership needs BOTH our LAN address AND the marker
/// BREAKS: Clear would delete another machine's netplay mapping, or an
///         unrelated program's mapping on this machine
#[test]
fn ownership_requires_address_and_marker() {
    assert!(is_ours(&entry(1, Protocol::Tcp, LAN_IP, "M64Plus-Netplay"), LAN_IP, "M64Plus"));
    assert!(!is_ours(&entry(1, Protocol::Tcp, "192.168.1.101", "M64Plus-Netplay"), LAN_IP, "M64Plus"));
    assert!(!is_ours(&entry(1, Protocol::Tcp, LAN_IP, "Torrent"), LAN_IP, "M64Plus"));

    // Marker is a substring match, case-sensitive
    assert!(is_ours(&entry(1, Protocol::Tcp, LAN_IP, "Game (M64Plus) 2"), LAN_IP, "M64Plus"));
    assert!(!is_ours(&entry(1, Protocol::Tcp, LAN_IP, "m64plus"), LAN_IP, "M64Plus"));
}

/// INVARIANT: Vendor prefix is stripped only when it is a true prefix
/// BREAKS: Restored foreign descriptions drift on every session
#[test]
fn vendor_prefix_only_stripped_at_start() {
    let stripped = classify(
        entry(1, Protocol::Udp, "192.168.1.50", "UPnP:Console"),
        LAN_IP,
        "M64Plus",
        "UPnP:",
    );
    let kept = classify(
        entry(2, Protocol::Udp, "192.168.1.50", "Console UPnP:"),
        LAN_IP,
        "M64Plus",
        "UPnP:",
    );

    match (stripped, kept) {
        (Classification::Foreign(a), Classification::Foreign(b)) => {
            assert_eq!(a.entry.description, "Console");
            assert_eq!(b.entry.description, "Console UPnP:");
        }
        other => panic!("Expected two foreign records, got {:?}", other),
    }
}

/// INVARIANT: A prefixed description of ours is still ours
#[test]
fn vendor_prefix_does_not_hide_ownership() {
    let classified = classify(
        entry(6000, Protocol::Tcp, LAN_IP, "UPnP:M64Plus-Netplay"),
        LAN_IP,
        "M64Plus",
        "UPnP:",
    );
    assert_eq!(
        classified,
        Classification::Owned(OwnedMapping::new(6000, Protocol::Tcp))
    );
}

/// INVARIANT: (port, protocol) appears at most once in the owned list
/// BREAKS: Remove prunes one copy and Clear leaves a ghost entry behind
#[test]
fn owned_pairs_are_unique() {
    let gateway = InMemoryGateway::new();
    gateway.insert_entry(entry(6000, Protocol::Tcp, LAN_IP, "M64Plus-Netplay"));
    let mut manager = PortManager::with_defaults(gateway.clone());
    manager.initialize(Duration::from_millis(2000)).unwrap();

    manager.add(Protocol::Tcp, "M64Plus-Netplay", 6000, 0).unwrap();
    manager.add(Protocol::Udp, "M64Plus-Netplay", 6000, 0).unwrap();
    manager.add(Protocol::Udp, "M64Plus-Netplay", 6000, 0).unwrap();
    manager.refresh_port_list().unwrap();

    let owned: Vec<OwnedMapping> = manager.owned_mappings().iter().copied().collect();
    let unique: HashSet<OwnedMapping> = owned.iter().copied().collect();
    assert_eq!(owned.len(), unique.len());
    assert_eq!(owned.len(), 2);
}

/// INVARIANT: Ledger-level insert never duplicates either
#[test]
fn ledger_insert_owned_is_deduplicated() {
    let mut ledger = MappingLedger::new();
    ledger.insert_owned(OwnedMapping::new(6000, Protocol::Tcp));
    ledger.insert_owned(OwnedMapping::new(6000, Protocol::Tcp));
    ledger.insert_owned(OwnedMapping::new(6000, Protocol::Udp));

    assert_eq!(ledger.owned().len(), 2);
    assert_eq!(ledger.prune_owned(6000, Protocol::Tcp), 1);
    assert!(!ledger.owns(6000, Protocol::Tcp));
    assert!(ledger.owns(6000, Protocol::Udp));
}

/// INVARIANT: taken=true only after we overrode that exact (port, protocol)
/// BREAKS: Restore replays mappings we never removed, or skips ones we did
#[test]
fn taken_only_for_overridden_port() {
    let gateway = InMemoryGateway::new();
    gateway.insert_entry(entry(6000, Protocol::Tcp, "192.168.1.50", "Console"));
    gateway.insert_entry(entry(6000, Protocol::Udp, "192.168.1.50", "Console"));
    gateway.insert_entry(entry(7000, Protocol::Tcp, "192.168.1.50", "Console"));
    let mut manager = PortManager::with_defaults(gateway.clone());
    manager.initialize(Duration::from_millis(2000)).unwrap();

    manager.add(Protocol::Tcp, "M64Plus-Netplay", 6000, 0).unwrap();

    let taken: Vec<(u16, Protocol)> = manager
        .foreign_mappings()
        .iter()
        .filter(|f| f.taken)
        .map(|f| (f.entry.external_port, f.entry.protocol))
        .collect();
    assert_eq!(taken, vec![(6000, Protocol::Tcp)]);
}

/// INVARIANT: Restore is a left-inverse of borrowing Add
/// BREAKS: The other device on the LAN loses its forwarding for good
#[test]
fn restore_undoes_borrowing_add() {
    let gateway = InMemoryGateway::new();
    let before = vec![
        entry(6000, Protocol::Tcp, "192.168.1.50", "Console"),
        entry(6001, Protocol::Udp, "192.168.1.51", "Media server"),
    ];
    for e in &before {
        gateway.insert_entry(e.clone());
    }
    let mut manager = PortManager::with_defaults(gateway.clone());
    manager.initialize(Duration::from_millis(2000)).unwrap();

    manager.add(Protocol::Tcp, "M64Plus-Netplay", 6000, 0).unwrap();
    manager.add(Protocol::Udp, "M64Plus-Netplay", 6001, 0).unwrap();
    manager.restore().unwrap();

    let mut after = gateway.entries();
    after.sort_by_key(|e| e.external_port);
    assert_eq!(after, before);
}

/// INVARIANT: After Remove the pair is gone from the owned list, whatever
///            the gateway answered (short of a transport failure)
#[test]
fn remove_always_prunes() {
    let gateway = InMemoryGateway::new();
    let mut manager = PortManager::with_defaults(gateway.clone());
    manager.initialize(Duration::from_millis(2000)).unwrap();
    manager.add(Protocol::Tcp, "M64Plus-Netplay", 6000, 0).unwrap();

    // Router already forgot it, so the delete gets 714
    let control = ControlPoint {
        control_url: String::new(),
        service_type: String::new(),
        base_url: String::new(),
    };
    gateway
        .clone()
        .delete_port_mapping(&control, 6000, Protocol::Tcp, "")
        .unwrap();

    assert!(manager.remove(Protocol::Tcp, 6000).is_ok());
    assert!(!manager.owned_mappings().iter().any(|m| m.matches(6000, Protocol::Tcp)));
}
