//! Switch Directory
//!
//! Resolves (switch hardware address, port index or name) pairs against a
//! snapshot of the controller's device inventory. Snapshots may be reused
//! for a short, configurable window; with a zero window every lookup sees a
//! fresh inventory.

use crate::domain::controller::{Device, PortTableEntry};
use crate::domain::ports::ControllerRef;
use crate::domain::topology::{same_switch, PortRef};
use crate::error::{ResolutionError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

// =============================================================================
// Resolved Target
// =============================================================================

/// A concrete, addressable switch port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicalPortRef {
    /// Hardware address as the controller reports it
    pub switch_id: String,
    /// Controller-internal device id
    pub device_id: String,
    pub port_idx: u32,
}

impl std::fmt::Display for PhysicalPortRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.switch_id, self.port_idx)
    }
}

// =============================================================================
// Inventory Snapshot
// =============================================================================

/// Device inventory as fetched at one point in time
#[derive(Debug, Clone)]
pub struct InventorySnapshot {
    devices: Vec<Device>,
    fetched_at: Instant,
}

impl InventorySnapshot {
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices,
            fetched_at: Instant::now(),
        }
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// The switch with this hardware address; other device types never match
    pub fn find_switch(&self, switch_id: &str) -> Option<&Device> {
        self.devices
            .iter()
            .find(|d| d.is_switch() && same_switch(&d.mac, switch_id))
    }

    pub fn is_switch_supported(&self, switch_id: &str) -> bool {
        self.find_switch(switch_id).is_some()
    }

    /// Resolve a port reference to a numeric index on a known switch.
    ///
    /// Numeric references are checked against the port table but never
    /// matched by name.
    pub fn resolve(
        &self,
        switch_id: &str,
        port: &PortRef,
    ) -> std::result::Result<PhysicalPortRef, ResolutionError> {
        let device = self
            .find_switch(switch_id)
            .ok_or_else(|| ResolutionError::SwitchNotFound {
                switch_id: switch_id.to_string(),
            })?;

        let entry = match port {
            PortRef::Index(idx) => device.port(*idx),
            PortRef::Name(name) => device.port_named(name),
        }
        .ok_or_else(|| ResolutionError::PortNotFound {
            switch_id: switch_id.to_string(),
            port: port.clone(),
        })?;

        Ok(PhysicalPortRef {
            switch_id: device.mac.clone(),
            device_id: device.id.clone(),
            port_idx: entry.port_idx,
        })
    }

    /// Port table entry for a resolved target, if it is still present
    pub fn port_entry(&self, target: &PhysicalPortRef) -> Option<&PortTableEntry> {
        self.find_switch(&target.switch_id)
            .and_then(|device| device.port(target.port_idx))
    }
}

// =============================================================================
// Switch Directory
// =============================================================================

/// Inventory-backed resolver with an optional short-lived cache
pub struct SwitchDirectory {
    controller: ControllerRef,
    cache_ttl: Duration,
    cached: Mutex<Option<Arc<InventorySnapshot>>>,
}

impl SwitchDirectory {
    pub fn new(controller: ControllerRef, cache_ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            controller,
            cache_ttl,
            cached: Mutex::new(None),
        })
    }

    /// Current snapshot, reusing the cached one while it is younger than the TTL
    pub async fn snapshot(&self) -> Result<Arc<InventorySnapshot>> {
        if !self.cache_ttl.is_zero() {
            let cached = self.cached.lock().clone();
            if let Some(snapshot) = cached {
                if snapshot.age() < self.cache_ttl {
                    return Ok(snapshot);
                }
            }
        }
        self.refresh().await
    }

    /// Fetch a fresh snapshot unconditionally
    pub async fn refresh(&self) -> Result<Arc<InventorySnapshot>> {
        let devices = self.controller.list_devices().await?;
        let snapshot = Arc::new(InventorySnapshot::new(devices));
        debug!(
            "Fetched controller inventory: {} device(s)",
            snapshot.devices().len()
        );

        if !self.cache_ttl.is_zero() {
            *self.cached.lock() = Some(snapshot.clone());
        }
        Ok(snapshot)
    }

    /// Drop any cached snapshot
    pub fn invalidate(&self) {
        self.cached.lock().take();
    }

    pub async fn resolve(&self, switch_id: &str, port: &PortRef) -> Result<PhysicalPortRef> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.resolve(switch_id, port)?)
    }

    pub async fn is_switch_supported(&self, switch_id: &str) -> Result<bool> {
        Ok(self.snapshot().await?.is_switch_supported(switch_id))
    }
}
