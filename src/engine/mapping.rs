//! Mapping Index
//!
//! The table from logical port id to the physical switch port it was last
//! successfully converged on. Written by the hook call path, read by the
//! status poller; every access goes through the index's own lock.

use crate::domain::topology::PortRef;
use crate::domain::vlan::VlanId;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{btree_map, BTreeMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// =============================================================================
// Mapping Entry
// =============================================================================

/// Physical target a logical port is configured on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub switch_id: String,
    pub port_id: PortRef,
    pub vlan_id: VlanId,
    pub configured_at: DateTime<Utc>,
}

impl MappingEntry {
    pub fn new(switch_id: impl Into<String>, port_id: PortRef, vlan_id: VlanId) -> Self {
        Self {
            switch_id: switch_id.into(),
            port_id,
            vlan_id,
            configured_at: Utc::now(),
        }
    }

    /// Same physical port, regardless of VLAN or timestamp
    pub fn same_target(&self, other: &MappingEntry) -> bool {
        crate::domain::topology::same_switch(&self.switch_id, &other.switch_id)
            && self.port_id == other.port_id
    }
}

// =============================================================================
// Mapping Index
// =============================================================================

/// Point-in-time counters for the index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingStats {
    pub entries: usize,
    pub puts: u64,
    pub removals: u64,
}

/// Concurrent store of logical port → physical target
#[derive(Debug, Default)]
pub struct MappingIndex {
    entries: RwLock<BTreeMap<String, MappingEntry>>,
    puts: AtomicU64,
    removals: AtomicU64,
}

impl MappingIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert or wholesale replace the entry for a port, returning the old one.
    ///
    /// Re-recording the same target and VLAN keeps the stored entry, so
    /// `configured_at` is the time the port was first converged that way.
    pub fn put(&self, port_id: impl Into<String>, entry: MappingEntry) -> Option<MappingEntry> {
        let mut entries = self.entries.write();
        self.puts.fetch_add(1, Ordering::Relaxed);
        match entries.entry(port_id.into()) {
            btree_map::Entry::Occupied(mut slot) => {
                let current = slot.get();
                if current.same_target(&entry) && current.vlan_id == entry.vlan_id {
                    return Some(current.clone());
                }
                Some(slot.insert(entry))
            }
            btree_map::Entry::Vacant(slot) => {
                slot.insert(entry);
                None
            }
        }
    }

    pub fn get(&self, port_id: &str) -> Option<MappingEntry> {
        self.entries.read().get(port_id).cloned()
    }

    pub fn remove(&self, port_id: &str) -> Option<MappingEntry> {
        let removed = self.entries.write().remove(port_id);
        if removed.is_some() {
            self.removals.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Put back whatever was there before, or clear the key if nothing was
    pub fn restore(&self, port_id: &str, previous: Option<MappingEntry>) {
        let mut entries = self.entries.write();
        match previous {
            Some(entry) => {
                entries.insert(port_id.to_string(), entry);
            }
            None => {
                entries.remove(port_id);
            }
        }
    }

    /// Ordered copy of every entry; the lock is released before returning
    pub fn snapshot(&self) -> Vec<(String, MappingEntry)> {
        self.entries
            .read()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> MappingStats {
        MappingStats {
            entries: self.len(),
            puts: self.puts.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
        }
    }
}
