//! Domain Ports - Core trait definitions for the reconciler
//!
//! These traits define the boundaries between the reconciliation engine and
//! the systems around it: the switch controller below, and the host
//! orchestration framework above. Adapters implement these traits to
//! provide concrete functionality.

use super::controller::{
    Device, DnsRecord, DnsRecordSpec, NetworkSpec, PortConfigRequest, VlanNetwork,
};
use super::topology::{Network, PortStatus, Subport};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

// =============================================================================
// Switch Controller
// =============================================================================

/// Management API of the controller that owns the switches.
///
/// Each call is independent: an implementation must not rely on state left
/// behind by a previous call, and callers may retry any call.
#[async_trait]
pub trait SwitchController: Send + Sync {
    /// All devices adopted by the controller, switches or not
    async fn list_devices(&self) -> Result<Vec<Device>>;

    /// Apply a port configuration to one switch port
    async fn set_port_config(&self, request: &PortConfigRequest) -> Result<()>;

    async fn list_networks(&self) -> Result<Vec<VlanNetwork>>;

    async fn create_network(&self, spec: &NetworkSpec) -> Result<VlanNetwork>;

    async fn delete_network(&self, network_id: &str) -> Result<()>;

    async fn list_dns_records(&self) -> Result<Vec<DnsRecord>>;

    async fn create_dns_record(&self, spec: &DnsRecordSpec) -> Result<DnsRecord>;

    async fn update_dns_record(&self, record: &DnsRecord) -> Result<()>;

    async fn delete_dns_record(&self, record_id: &str) -> Result<()>;
}

// =============================================================================
// Host Framework
// =============================================================================

/// Upward sink for port status transitions
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Record a changed status for a logical port
    async fn report_port_status_changed(&self, port_id: &str, status: PortStatus) -> Result<()>;

    /// Status the host currently holds for a logical port, if any
    async fn current_status(&self, port_id: &str) -> Result<Option<PortStatus>>;
}

/// Read access to host-side topology the hooks don't carry
#[async_trait]
pub trait TopologySource: Send + Sync {
    /// Authoritative subport set of a trunk, keyed by its parent port
    async fn get_subports_for_trunk(&self, parent_port_id: &str) -> Result<Vec<Subport>>;

    async fn get_network(&self, network_id: &str) -> Result<Network>;

    async fn list_networks(&self) -> Result<Vec<Network>>;
}

pub type ControllerRef = Arc<dyn SwitchController>;
pub type StatusSinkRef = Arc<dyn StatusSink>;
pub type TopologySourceRef = Arc<dyn TopologySource>;

impl std::fmt::Debug for dyn SwitchController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn SwitchController")
    }
}

impl std::fmt::Debug for dyn StatusSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn StatusSink")
    }
}

impl std::fmt::Debug for dyn TopologySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn TopologySource")
    }
}
