//! In-memory switch controller
//!
//! Holds devices, VLAN networks and DNS records in process memory and keeps
//! every port configuration it accepts. Failures can be injected per call
//! family so callers' retry and rollback paths can be exercised.

use crate::domain::controller::{
    Device, DnsRecord, DnsRecordSpec, NetworkSpec, PortConfigRequest, PortTableEntry, VlanNetwork,
    SWITCH_DEVICE_TYPE,
};
use crate::domain::ports::SwitchController;
use crate::domain::topology::same_switch;
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

const ENDPOINT: &str = "memory://controller";

#[derive(Debug, Default)]
struct ControllerState {
    devices: Vec<Device>,
    networks: BTreeMap<String, VlanNetwork>,
    dns_records: BTreeMap<String, DnsRecord>,
    submitted: Vec<PortConfigRequest>,
    next_id: u64,
}

impl ControllerState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:06}", prefix, self.next_id)
    }
}

/// Controller that lives entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryController {
    state: Mutex<ControllerState>,
    inventory_fetches: AtomicUsize,
    submission_attempts: AtomicUsize,
    fail_next_submissions: AtomicU32,
    fail_submissions: AtomicBool,
    reject_submissions: AtomicBool,
    fail_inventory: AtomicBool,
    fail_networks: AtomicBool,
    fail_dns: AtomicBool,
}

fn injected(operation: &str) -> Error {
    Error::ControllerUnreachable {
        endpoint: ENDPOINT.to_string(),
        reason: format!("injected {} failure", operation),
    }
}

impl InMemoryController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // =========================================================================
    // Inventory
    // =========================================================================

    pub fn add_device(&self, device: Device) {
        self.state.lock().devices.push(device);
    }

    /// Add a switch with ports `1..=port_count`, all named `Port {n}` and up
    pub fn add_switch(&self, mac: &str, port_count: u32) -> Device {
        let device = Device {
            id: format!("usw-{}", mac.replace(':', "")),
            mac: mac.to_string(),
            device_type: SWITCH_DEVICE_TYPE.to_string(),
            name: None,
            model: None,
            port_table: (1..=port_count)
                .map(|idx| PortTableEntry {
                    port_idx: idx,
                    name: format!("Port {}", idx),
                    up: true,
                })
                .collect(),
        };
        self.add_device(device.clone());
        device
    }

    /// Change the link state of one port; returns false if it does not exist
    pub fn set_link_state(&self, mac: &str, port_idx: u32, up: bool) -> bool {
        let mut state = self.state.lock();
        let port = state
            .devices
            .iter_mut()
            .filter(|d| same_switch(&d.mac, mac))
            .flat_map(|d| d.port_table.iter_mut())
            .find(|p| p.port_idx == port_idx);

        match port {
            Some(port) => {
                port.up = up;
                true
            }
            None => false,
        }
    }

    pub fn inventory_fetches(&self) -> usize {
        self.inventory_fetches.load(Ordering::Relaxed)
    }

    // =========================================================================
    // Recorded State
    // =========================================================================

    /// Port configurations the controller accepted, in order
    pub fn submitted(&self) -> Vec<PortConfigRequest> {
        self.state.lock().submitted.clone()
    }

    /// Every `set_port_config` call, failed or not
    pub fn submission_attempts(&self) -> usize {
        self.submission_attempts.load(Ordering::Relaxed)
    }

    pub fn networks(&self) -> Vec<VlanNetwork> {
        self.state.lock().networks.values().cloned().collect()
    }

    pub fn add_network(&self, network: VlanNetwork) {
        self.state.lock().networks.insert(network.id.clone(), network);
    }

    pub fn dns_records(&self) -> Vec<DnsRecord> {
        self.state.lock().dns_records.values().cloned().collect()
    }

    // =========================================================================
    // Failure Injection
    // =========================================================================

    /// Fail the next `count` submissions with a transient error
    pub fn fail_next_submissions(&self, count: u32) {
        self.fail_next_submissions.store(count, Ordering::Relaxed);
    }

    /// Fail every submission with a transient error
    pub fn fail_submissions(&self, fail: bool) {
        self.fail_submissions.store(fail, Ordering::Relaxed);
    }

    /// Reject every submission with a non-retryable error
    pub fn reject_submissions(&self, reject: bool) {
        self.reject_submissions.store(reject, Ordering::Relaxed);
    }

    pub fn fail_inventory(&self, fail: bool) {
        self.fail_inventory.store(fail, Ordering::Relaxed);
    }

    pub fn fail_networks(&self, fail: bool) {
        self.fail_networks.store(fail, Ordering::Relaxed);
    }

    pub fn fail_dns(&self, fail: bool) {
        self.fail_dns.store(fail, Ordering::Relaxed);
    }

    fn check_networks(&self) -> Result<()> {
        if self.fail_networks.load(Ordering::Relaxed) {
            return Err(injected("network"));
        }
        Ok(())
    }

    fn check_dns(&self) -> Result<()> {
        if self.fail_dns.load(Ordering::Relaxed) {
            return Err(injected("dns"));
        }
        Ok(())
    }
}

#[async_trait]
impl SwitchController for InMemoryController {
    async fn list_devices(&self) -> Result<Vec<Device>> {
        self.inventory_fetches.fetch_add(1, Ordering::Relaxed);
        if self.fail_inventory.load(Ordering::Relaxed) {
            return Err(injected("inventory"));
        }
        Ok(self.state.lock().devices.clone())
    }

    async fn set_port_config(&self, request: &PortConfigRequest) -> Result<()> {
        self.submission_attempts.fetch_add(1, Ordering::Relaxed);

        if self.reject_submissions.load(Ordering::Relaxed) {
            return Err(Error::ControllerRejected {
                operation: "set_port_config".into(),
                status: 400,
                message: "api.err.InvalidPayload".into(),
            });
        }
        if self.fail_submissions.load(Ordering::Relaxed) {
            return Err(injected("submission"));
        }
        let pending = self.fail_next_submissions.load(Ordering::Relaxed);
        if pending > 0 {
            self.fail_next_submissions.store(pending - 1, Ordering::Relaxed);
            return Err(injected("submission"));
        }

        let mut state = self.state.lock();
        let known = state
            .devices
            .iter()
            .any(|d| same_switch(&d.mac, &request.mac) && d.port(request.port_idx).is_some());
        if !known {
            return Err(Error::ControllerRejected {
                operation: "set_port_config".into(),
                status: 404,
                message: format!("no port {} on {}", request.port_idx, request.mac),
            });
        }

        debug!("Accepted port config for {}#{}", request.mac, request.port_idx);
        state.submitted.push(request.clone());
        Ok(())
    }

    async fn list_networks(&self) -> Result<Vec<VlanNetwork>> {
        self.check_networks()?;
        Ok(self.networks())
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<VlanNetwork> {
        self.check_networks()?;
        let mut state = self.state.lock();
        let network = VlanNetwork {
            id: state.next_id("net"),
            name: spec.name.clone(),
            purpose: spec.purpose.clone(),
            vlan: Some(spec.vlan),
            enabled: spec.enabled,
        };
        state.networks.insert(network.id.clone(), network.clone());
        Ok(network)
    }

    async fn delete_network(&self, network_id: &str) -> Result<()> {
        self.check_networks()?;
        self.state
            .lock()
            .networks
            .remove(network_id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound {
                kind: "network".into(),
                id: network_id.to_string(),
            })
    }

    async fn list_dns_records(&self) -> Result<Vec<DnsRecord>> {
        self.check_dns()?;
        Ok(self.dns_records())
    }

    async fn create_dns_record(&self, spec: &DnsRecordSpec) -> Result<DnsRecord> {
        self.check_dns()?;
        let mut state = self.state.lock();
        let record = DnsRecord {
            id: state.next_id("dns"),
            name: spec.name.clone(),
            content: spec.content.clone(),
            record_type: spec.record_type,
            ttl: spec.ttl,
        };
        state.dns_records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update_dns_record(&self, record: &DnsRecord) -> Result<()> {
        self.check_dns()?;
        let mut state = self.state.lock();
        match state.dns_records.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(Error::NotFound {
                kind: "dns_record".into(),
                id: record.id.clone(),
            }),
        }
    }

    async fn delete_dns_record(&self, record_id: &str) -> Result<()> {
        self.check_dns()?;
        self.state
            .lock()
            .dns_records
            .remove(record_id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound {
                kind: "dns_record".into(),
                id: record_id.to_string(),
            })
    }
}
