/**
 * ledger.rs
 * Owned vs. foreign port-mapping bookkeeping
 *
 * Two collections rebuilt from the gateway on every refresh:
 * - owned: (port, protocol) pairs this application created and must delete
 * - foreign: full records of everyone else's mappings, flagged `taken` while
 *   one of ours sits on top of them and a restoration is owed
 *
 * Ownership is decided from the gateway's own data: a mapping is ours when it
 * points at our LAN address and its description carries the marker.
 */

use serde::Serialize;
use std::collections::VecDeque;

use crate::gateway::{PortMappingEntry, Protocol};
use crate::port::fields::{
    bounded, strip_vendor_prefix, DESCRIPTION_CAPACITY, INTERNAL_CLIENT_CAPACITY,
    REMOTE_HOST_CAPACITY,
};

/// A mapping this application created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedMapping {
    pub external_port: u16,
    pub protocol: Protocol,
}

impl OwnedMapping {
    pub fn new(external_port: u16, protocol: Protocol) -> Self {
        Self {
            external_port,
            protocol,
        }
    }

    pub fn matches(&self, external_port: u16, protocol: Protocol) -> bool {
        self.external_port == external_port && self.protocol == protocol
    }
}

/// A mapping found on the gateway that belongs to someone else
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignMapping {
    /// Overridden by one of ours, restoration pending
    pub taken: bool,
    #[serde(flatten)]
    pub entry: PortMappingEntry,
}

impl ForeignMapping {
    pub fn matches(&self, external_port: u16, protocol: Protocol) -> bool {
        self.entry.external_port == external_port && self.entry.protocol == protocol
    }
}

/// Outcome of classifying one gateway entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Owned(OwnedMapping),
    Foreign(ForeignMapping),
}

/// True when the entry was created by this application for `lan_ip`
pub fn is_ours(entry: &PortMappingEntry, lan_ip: &str, marker: &str) -> bool {
    entry.internal_client == lan_ip && entry.description.contains(marker)
}

/// Classify a raw gateway entry
///
/// The vendor prefix is removed first so a restored foreign mapping does not
/// collect one more prefix per round trip. Fields are held to wire capacity.
pub fn classify(
    mut entry: PortMappingEntry,
    lan_ip: &str,
    marker: &str,
    vendor_prefix: &str,
) -> Classification {
    entry.description = bounded(
        strip_vendor_prefix(&entry.description, vendor_prefix),
        DESCRIPTION_CAPACITY,
    );
    entry.internal_client = bounded(&entry.internal_client, INTERNAL_CLIENT_CAPACITY);
    entry.remote_host = bounded(&entry.remote_host, REMOTE_HOST_CAPACITY);

    if is_ours(&entry, lan_ip, marker) {
        Classification::Owned(OwnedMapping::new(entry.external_port, entry.protocol))
    } else {
        Classification::Foreign(ForeignMapping {
            taken: false,
            entry,
        })
    }
}

/// The two mapping collections
#[derive(Debug, Default, Clone)]
pub struct MappingLedger {
    owned: VecDeque<OwnedMapping>,
    foreign: Vec<ForeignMapping>,
}

impl MappingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.owned.clear();
        self.owned.shrink_to_fit();
        self.foreign.clear();
        self.foreign.shrink_to_fit();
    }

    /// Append a classified entry in enumeration order
    pub fn record(&mut self, classification: Classification) {
        match classification {
            Classification::Owned(owned) => {
                if !self.owns(owned.external_port, owned.protocol) {
                    self.owned.push_back(owned);
                }
            }
            Classification::Foreign(foreign) => self.foreign.push(foreign),
        }
    }

    pub fn owns(&self, external_port: u16, protocol: Protocol) -> bool {
        self.owned.iter().any(|m| m.matches(external_port, protocol))
    }

    /// Insert a freshly created mapping at the front
    ///
    /// Callers check `owns` first; the list never holds a pair twice.
    pub fn insert_owned(&mut self, mapping: OwnedMapping) {
        if !self.owns(mapping.external_port, mapping.protocol) {
            self.owned.push_front(mapping);
        }
    }

    /// Drop every owned entry for the pair, returns how many were removed
    pub fn prune_owned(&mut self, external_port: u16, protocol: Protocol) -> usize {
        let before = self.owned.len();
        self.owned.retain(|m| !m.matches(external_port, protocol));
        before - self.owned.len()
    }

    pub fn foreign_position(&self, external_port: u16, protocol: Protocol) -> Option<usize> {
        self.foreign
            .iter()
            .position(|f| f.matches(external_port, protocol))
    }

    pub fn mark_taken(&mut self, index: usize, taken: bool) {
        if let Some(foreign) = self.foreign.get_mut(index) {
            foreign.taken = taken;
        }
    }

    /// Positions of every foreign record awaiting restoration
    pub fn taken_positions(&self) -> Vec<usize> {
        self.foreign
            .iter()
            .enumerate()
            .filter(|(_, f)| f.taken)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn foreign_at(&self, index: usize) -> Option<&ForeignMapping> {
        self.foreign.get(index)
    }

    pub fn owned(&self) -> &VecDeque<OwnedMapping> {
        &self.owned
    }

    pub fn foreign(&self) -> &[ForeignMapping] {
        &self.foreign
    }
}
