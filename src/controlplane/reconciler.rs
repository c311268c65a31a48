//! Reconciler
//!
//! Entry point for the host framework's lifecycle hooks. Owns the engine
//! components and wires them together:
//! - Network events keep the controller's VLAN networks in step
//! - Port events converge access ports and maintain the mapping index
//! - Subport events recompute trunk configurations
//! - The status poller reports physical link state back to the host

use crate::config::EngineConfig;
use crate::domain::controller::NetworkSpec;
use crate::domain::ports::{ControllerRef, StatusSinkRef, TopologySourceRef};
use crate::domain::topology::{
    BindingLink, LogicalPort, Network, PortBinding, PortStatus, Segment, Subport,
};
use crate::domain::vlan::VlanId;
use crate::engine::{
    build_access_config, build_unconfigure_config, format_port_name, ConvergencePusher,
    CycleReport, DnsSync, MappingEntry, MappingIndex, MappingStats, PollerState, RetryPolicy,
    StatusPoller, SwitchDirectory, TrunkReconciler, TrunkState,
};
use crate::error::Result;
use crate::metrics::EngineMetrics;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// VIF type reported for ports bound to a physical switch
pub const VIF_TYPE_OTHER: &str = "other";

/// VLAN a network contributes to the controller, if it is one we manage
fn managed_vlan(network: &Network) -> Option<VlanId> {
    if network.router_external {
        return None;
    }
    network.vlan()
}

// =============================================================================
// Reconciler
// =============================================================================

pub struct Reconciler {
    config: EngineConfig,
    controller: ControllerRef,
    topology: TopologySourceRef,
    directory: Arc<SwitchDirectory>,
    pusher: Arc<ConvergencePusher>,
    mapping: Arc<MappingIndex>,
    trunks: TrunkReconciler,
    poller: Arc<StatusPoller>,
    dns: DnsSync,
    metrics: Arc<EngineMetrics>,
    /// Startup connectivity check passed
    controller_reachable: AtomicBool,
}

impl Reconciler {
    pub fn new(
        config: EngineConfig,
        controller: ControllerRef,
        topology: TopologySourceRef,
        sink: StatusSinkRef,
        metrics: Arc<EngineMetrics>,
    ) -> Arc<Self> {
        let directory = SwitchDirectory::new(
            controller.clone(),
            config.convergence.inventory_cache_ttl(),
        );
        let policy = RetryPolicy::new(
            config.convergence.port_setup_retry_count,
            config.convergence.retry_interval(),
        );
        let pusher = ConvergencePusher::new(
            directory.clone(),
            controller.clone(),
            policy,
            metrics.clone(),
        );
        let mapping = MappingIndex::new();
        let trunks = TrunkReconciler::new(
            topology.clone(),
            pusher.clone(),
            mapping.clone(),
            config.naming.clone(),
            config.features.clone(),
        );
        let poller = StatusPoller::new(
            directory.clone(),
            mapping.clone(),
            sink,
            metrics.clone(),
            config.monitor.interval(),
        );
        let dns = DnsSync::new(controller.clone(), config.dns.clone());

        Arc::new(Self {
            config,
            controller,
            topology,
            directory,
            pusher,
            mapping,
            trunks,
            poller,
            dns,
            metrics,
            controller_reachable: AtomicBool::new(false),
        })
    }

    /// Check connectivity, sync networks and start the poller.
    ///
    /// Nothing here is fatal: an unreachable controller is recorded in
    /// [`status`](Self::status) and every hook retries on its own.
    pub async fn initialize(&self) {
        info!("Initializing reconciler");

        match self.directory.refresh().await {
            Ok(snapshot) => {
                self.controller_reachable.store(true, Ordering::Relaxed);
                info!(
                    "Connected to switch controller ({} devices)",
                    snapshot.devices().len()
                );
            }
            Err(e) => {
                error!("Switch controller connectivity check failed: {}", e);
            }
        }

        if self.config.features.sync_startup {
            match self.sync_networks().await {
                Ok(created) => info!("Startup network sync created {} network(s)", created),
                Err(e) => error!("Startup network sync failed: {}", e),
            }
        }

        if self.config.monitor.monitor_port_state {
            self.poller.start();
        }

        info!("Reconciler initialized");
    }

    pub fn mapping(&self) -> &Arc<MappingIndex> {
        &self.mapping
    }

    pub fn poller(&self) -> &Arc<StatusPoller> {
        &self.poller
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn update_mapped_gauge(&self) {
        self.metrics.mapped_ports.set(self.mapping.len() as i64);
    }

    // =========================================================================
    // Networks
    // =========================================================================

    fn controller_network_name(&self, network: &Network, vlan: VlanId) -> String {
        self.config
            .naming
            .network_name_format
            .replace("{network_id}", &network.id)
            .replace("{segmentation_id}", &vlan.to_string())
    }

    /// Create the controller network for `vlan` unless one already carries it
    async fn ensure_network(&self, network: &Network, vlan: VlanId) -> Result<bool> {
        let existing = self.controller.list_networks().await?;
        if existing.iter().any(|n| n.vlan == Some(vlan)) {
            debug!("Controller already has a network for VLAN {}", vlan);
            return Ok(false);
        }

        let spec = NetworkSpec::corporate(self.controller_network_name(network, vlan), vlan);
        let created = self.controller.create_network(&spec).await?;
        info!(
            "Created controller network {} ({}) for network {} on VLAN {}",
            created.name, created.id, network.id, vlan
        );
        Ok(true)
    }

    pub async fn on_network_created(&self, network: &Network) -> Result<()> {
        let Some(vlan) = managed_vlan(network) else {
            debug!("Network {} is not a managed VLAN network, skipping", network.id);
            return Ok(());
        };
        self.ensure_network(network, vlan).await?;
        Ok(())
    }

    /// Move the controller network when the segmentation id changes
    pub async fn on_network_updated(&self, current: &Network, original: &Network) -> Result<()> {
        if !current.is_vlan() || !original.is_vlan() {
            return Ok(());
        }
        if current.segmentation_id == original.segmentation_id {
            debug!("Network {} VLAN unchanged, nothing to do", current.id);
            return Ok(());
        }

        if let Some(old_vlan) = original.segmentation_id {
            let networks = self.controller.list_networks().await?;
            if let Some(old) = networks.iter().find(|n| n.vlan == Some(old_vlan)) {
                self.controller.delete_network(&old.id).await?;
                info!("Deleted controller network {} for VLAN {}", old.id, old_vlan);
            }
        }

        if let Some(new_vlan) = current.segmentation_id {
            self.ensure_network(current, new_vlan).await?;
        }
        info!(
            "Network {} moved from VLAN {:?} to VLAN {:?}",
            current.id,
            original.segmentation_id.map(u16::from),
            current.segmentation_id.map(u16::from)
        );
        Ok(())
    }

    /// Best-effort removal of the controller network carrying the VLAN
    pub async fn on_network_deleted(&self, network: &Network) {
        let Some(vlan) = network.vlan() else {
            return;
        };

        let result: Result<Option<String>> = async {
            let networks = self.controller.list_networks().await?;
            match networks.iter().find(|n| n.vlan == Some(vlan)) {
                Some(existing) => {
                    self.controller.delete_network(&existing.id).await?;
                    Ok(Some(existing.id.clone()))
                }
                None => Ok(None),
            }
        }
        .await;

        match result {
            Ok(Some(id)) => info!("Deleted controller network {} for VLAN {}", id, vlan),
            Ok(None) => debug!("No controller network carries VLAN {}", vlan),
            Err(e) => error!(
                "Failed to delete controller network for network {} (VLAN {}): {}",
                network.id, vlan, e
            ),
        }
    }

    /// Ensure every VLAN network known to the host exists on the controller.
    /// Returns how many were created.
    pub async fn sync_networks(&self) -> Result<usize> {
        let networks = self.topology.list_networks().await?;
        let mut present: HashSet<VlanId> = self
            .controller
            .list_networks()
            .await?
            .into_iter()
            .filter_map(|n| n.vlan)
            .collect();

        let mut created = 0;
        for network in &networks {
            let Some(vlan) = managed_vlan(network) else {
                continue;
            };
            if present.contains(&vlan) {
                continue;
            }

            let spec = NetworkSpec::corporate(self.controller_network_name(network, vlan), vlan);
            match self.controller.create_network(&spec).await {
                Ok(_) => {
                    present.insert(vlan);
                    created += 1;
                }
                Err(e) => error!(
                    "Failed to sync network {} (VLAN {}): {}",
                    network.id, vlan, e
                ),
            }
        }
        Ok(created)
    }

    // =========================================================================
    // Ports
    // =========================================================================

    /// Converge every binding link to an access port and record the mapping
    async fn converge_access(&self, port: &LogicalPort, network: &Network, vlan: VlanId) -> Result<()> {
        let name = format_port_name(
            &self.config.naming.port_name_format,
            &port.id,
            &network.id,
            vlan,
        );
        let desired = build_access_config(vlan, name, &self.config.features);

        for link in port.links() {
            let target = self
                .pusher
                .push(&link.switch_id, &link.port_id, &desired)
                .await?;
            self.mapping.put(
                port.id.clone(),
                MappingEntry::new(link.switch_id.clone(), link.port_id.clone(), vlan),
            );
            info!("Configured port {} on {} with VLAN {}", port.id, target, vlan);
        }
        Ok(())
    }

    async fn unconfigure(&self, port_id: &str, entry: &MappingEntry) {
        let desired = build_unconfigure_config();
        match self
            .pusher
            .push(&entry.switch_id, &entry.port_id, &desired)
            .await
        {
            Ok(target) => info!("Unconfigured {} previously used by port {}", target, port_id),
            Err(e) => error!(
                "Failed to unconfigure port {} on switch {} for {}: {}",
                entry.port_id, entry.switch_id, port_id, e
            ),
        }
    }

    pub async fn on_port_created(&self, port: &LogicalPort, network: &Network) -> Result<()> {
        if port.dns_name().is_some() {
            if let Err(e) = self.dns.create_port_records(port, network).await {
                error!("Failed to create DNS records for port {}: {}", port.id, e);
            }
        }

        if !port.has_binding() {
            debug!("Port {} has no binding, skipping", port.id);
            return Ok(());
        }
        let Some(vlan) = network.vlan() else {
            debug!("Port {} is not on a VLAN network, skipping", port.id);
            return Ok(());
        };

        let previous = self.mapping.get(&port.id);
        let result = self.converge_access(port, network, vlan).await;
        if result.is_err() {
            self.mapping.restore(&port.id, previous);
        }
        self.update_mapped_gauge();
        result
    }

    /// Reconverge when the network or binding changed; a previous target
    /// that is no longer bound is returned to its default state.
    pub async fn on_port_updated(
        &self,
        port: &LogicalPort,
        original: &LogicalPort,
        network: &Network,
    ) -> Result<()> {
        if port.dns_name().is_some() || original.dns_name().is_some() {
            if let Err(e) = self
                .dns
                .update_port_records(port, Some(original), network)
                .await
            {
                error!("Failed to update DNS records for port {}: {}", port.id, e);
            }
        }

        let Some(vlan) = network.vlan().filter(|_| port.has_binding()) else {
            // Binding reset, or the port left VLAN networks
            self.release(&port.id).await;
            return Ok(());
        };
        if port.network_id == original.network_id
            && port.links().eq(original.links())
        {
            debug!("Port {} binding and network unchanged", port.id);
            return Ok(());
        }

        let previous = self.mapping.get(&port.id);
        if let Err(e) = self.converge_access(port, network, vlan).await {
            self.mapping.restore(&port.id, previous);
            self.update_mapped_gauge();
            return Err(e);
        }

        if let Some(old) = previous {
            let still_bound = port
                .links()
                .any(|link: &BindingLink| link.targets(&old.switch_id, &old.port_id));
            if !still_bound {
                self.unconfigure(&port.id, &old).await;
            }
        }
        self.update_mapped_gauge();
        Ok(())
    }

    /// Best-effort teardown; the mapping entry is always dropped
    pub async fn on_port_deleted(&self, port: &LogicalPort, network: &Network) {
        if port.dns_name().is_some() {
            if let Err(e) = self.dns.delete_port_records(port, network).await {
                error!("Failed to delete DNS records for port {}: {}", port.id, e);
            }
        }

        self.release(&port.id).await;
    }

    /// Unconfigure the mapped target best-effort and drop the entry
    async fn release(&self, port_id: &str) {
        let Some(entry) = self.mapping.get(port_id) else {
            debug!("Port {} has no mapping, nothing to unconfigure", port_id);
            return;
        };

        self.unconfigure(port_id, &entry).await;
        self.mapping.remove(port_id);
        self.update_mapped_gauge();
    }

    // =========================================================================
    // Trunks
    // =========================================================================

    pub async fn on_subports_added(
        &self,
        parent: &LogicalPort,
        subports: &[Subport],
    ) -> Result<TrunkState> {
        let state = self.trunks.add_subports(parent, subports).await;
        self.update_mapped_gauge();
        state
    }

    pub async fn on_subports_removed(
        &self,
        parent: &LogicalPort,
        subports: &[Subport],
    ) -> Result<TrunkState> {
        let state = self.trunks.remove_subports(parent, subports).await;
        self.update_mapped_gauge();
        state
    }

    // =========================================================================
    // Binding
    // =========================================================================

    /// Bind to the first VLAN segment when any link names a managed switch
    pub async fn bind_port(&self, port: &LogicalPort, segments: &[Segment]) -> Option<PortBinding> {
        if !port.has_binding() {
            return None;
        }
        if segments.is_empty() {
            debug!("No segments to bind for port {}", port.id);
            return None;
        }

        let snapshot = match self.directory.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Cannot bind port {}: inventory unavailable: {}", port.id, e);
                return None;
            }
        };

        let segment = segments.iter().find(|s| s.is_vlan())?;
        let link = port
            .links()
            .find(|link| snapshot.is_switch_supported(&link.switch_id))?;

        debug!(
            "Bound port {} to segment {} on switch {}, port {}",
            port.id, segment.id, link.switch_id, link.port_id
        );
        Some(PortBinding {
            segment_id: segment.id.clone(),
            vif_type: VIF_TYPE_OTHER.to_string(),
            status: PortStatus::Active,
        })
    }

    // =========================================================================
    // Status
    // =========================================================================

    pub fn status(&self) -> ReconcilerStatus {
        ReconcilerStatus {
            controller_reachable: self.controller_reachable.load(Ordering::Relaxed),
            mapped_ports: self.mapping.len(),
            mapping: self.mapping.stats(),
            poller: self.poller.state(),
            last_poll: self.poller.last_cycle(),
            push_policy_attempts: self.pusher.policy().attempts,
            dns_enabled: self.dns.enabled(),
        }
    }
}

/// Reconciler status summary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcilerStatus {
    pub controller_reachable: bool,
    pub mapped_ports: usize,
    pub mapping: MappingStats,
    pub poller: PollerState,
    pub last_poll: Option<CycleReport>,
    pub push_policy_attempts: u32,
    pub dns_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ControllerKind, EngineConfig};
    use crate::controlplane::controller::InMemoryController;
    use crate::controlplane::host::InMemoryHost;
    use crate::domain::controller::VlanNetwork;
    use crate::domain::topology::PortRef;
    use crate::error::{ConvergenceError, Error};
    use assert_matches::assert_matches;

    const SWITCH: &str = "aa:bb:cc:dd:ee:ff";

    struct Fixture {
        controller: Arc<InMemoryController>,
        host: Arc<InMemoryHost>,
        reconciler: Arc<Reconciler>,
    }

    fn fixture() -> Fixture {
        let mut config = EngineConfig::default();
        config.controller.kind = ControllerKind::Memory;
        config.convergence.port_setup_retry_interval_secs = 0;
        config.monitor.monitor_port_state = false;

        let controller = InMemoryController::new();
        controller.add_switch(SWITCH, 8);
        let host = InMemoryHost::new();
        let reconciler = Reconciler::new(
            config,
            controller.clone(),
            host.clone(),
            host.clone(),
            EngineMetrics::new().unwrap(),
        );
        Fixture {
            controller,
            host,
            reconciler,
        }
    }

    fn vlan_network(id: &str, vlan: u16) -> Network {
        Network {
            id: id.into(),
            name: None,
            network_type: "vlan".into(),
            segmentation_id: Some(VlanId::new(vlan).unwrap()),
            router_external: false,
            dns_domain: None,
        }
    }

    #[tokio::test]
    async fn test_network_created_once() {
        let f = fixture();
        let network = vlan_network("net-1", 100);

        f.reconciler.on_network_created(&network).await.unwrap();
        f.reconciler.on_network_created(&network).await.unwrap();

        let networks = f.controller.networks();
        assert_eq!(networks.len(), 1);
        assert_eq!(networks[0].name, "OpenStack-net-1-VLAN100");
    }

    #[tokio::test]
    async fn test_external_and_flat_networks_skipped() {
        let f = fixture();
        let mut external = vlan_network("ext", 200);
        external.router_external = true;
        let flat = Network {
            network_type: "flat".into(),
            segmentation_id: None,
            ..vlan_network("flat", 1)
        };

        f.reconciler.on_network_created(&external).await.unwrap();
        f.reconciler.on_network_created(&flat).await.unwrap();
        assert!(f.controller.networks().is_empty());
    }

    #[tokio::test]
    async fn test_network_update_moves_vlan() {
        let f = fixture();
        let original = vlan_network("net-1", 100);
        f.reconciler.on_network_created(&original).await.unwrap();

        let current = vlan_network("net-1", 200);
        f.reconciler
            .on_network_updated(&current, &original)
            .await
            .unwrap();

        let vlans: Vec<_> = f
            .controller
            .networks()
            .iter()
            .filter_map(|n| n.vlan.map(u16::from))
            .collect();
        assert_eq!(vlans, vec![200]);
    }

    #[tokio::test]
    async fn test_network_update_same_vlan_makes_no_calls() {
        let f = fixture();
        f.controller.fail_networks(true);
        let network = vlan_network("net-1", 100);
        f.reconciler
            .on_network_updated(&network, &network)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_network_delete_failure_swallowed() {
        let f = fixture();
        f.controller.add_network(VlanNetwork {
            id: "n1".into(),
            name: "OpenStack-net-1-VLAN100".into(),
            purpose: "corporate".into(),
            vlan: Some(VlanId::new(100).unwrap()),
            enabled: true,
        });
        f.controller.fail_networks(true);
        f.reconciler.on_network_deleted(&vlan_network("net-1", 100)).await;

        f.controller.fail_networks(false);
        f.reconciler.on_network_deleted(&vlan_network("net-1", 100)).await;
        assert!(f.controller.networks().is_empty());
    }

    #[tokio::test]
    async fn test_port_create_records_mapping() {
        let f = fixture();
        let network = vlan_network("net-1", 100);
        let port = LogicalPort::new("p1", "net-1").with_link(SWITCH, "3");

        f.reconciler.on_port_created(&port, &network).await.unwrap();

        let submitted = f.controller.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].port_idx, 3);
        assert_eq!(submitted[0].port_vlan, Some(100));
        assert_eq!(submitted[0].name, "openstack-port-p1");

        let entry = f.reconciler.mapping().get("p1").unwrap();
        assert_eq!(entry.port_id, PortRef::Index(3));
        assert_eq!(entry.vlan_id.as_u16(), 100);
        assert_eq!(f.reconciler.status().mapped_ports, 1);
    }

    #[tokio::test]
    async fn test_failed_create_leaves_no_mapping() {
        let f = fixture();
        f.controller.fail_submissions(true);
        let port = LogicalPort::new("p1", "net-1").with_link(SWITCH, "3");

        let err = f
            .reconciler
            .on_port_created(&port, &vlan_network("net-1", 100))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Convergence(ConvergenceError::ApplyFailed { attempts: 3, .. }));
        assert!(f.reconciler.mapping().get("p1").is_none());
    }

    #[tokio::test]
    async fn test_unbound_port_skipped() {
        let f = fixture();
        let port = LogicalPort::new("p1", "net-1");
        f.reconciler
            .on_port_created(&port, &vlan_network("net-1", 100))
            .await
            .unwrap();
        assert!(f.controller.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_port_update_moves_target() {
        let f = fixture();
        let network = vlan_network("net-1", 100);
        let original = LogicalPort::new("p1", "net-1").with_link(SWITCH, "3");
        f.reconciler.on_port_created(&original, &network).await.unwrap();

        let moved = LogicalPort::new("p1", "net-1").with_link(SWITCH, "5");
        f.reconciler
            .on_port_updated(&moved, &original, &network)
            .await
            .unwrap();

        let submitted = f.controller.submitted();
        assert_eq!(submitted.len(), 3);
        // New target first, then the old one is reset
        assert_eq!(submitted[1].port_idx, 5);
        assert_eq!(submitted[2].port_idx, 3);
        assert!(!submitted[2].port_vlan_enabled);
        assert_eq!(f.reconciler.mapping().get("p1").unwrap().port_id, PortRef::Index(5));
    }

    #[tokio::test]
    async fn test_port_update_binding_reset_releases_port() {
        let f = fixture();
        let network = vlan_network("net-1", 100);
        let original = LogicalPort::new("p1", "net-1").with_link(SWITCH, "3");
        f.reconciler.on_port_created(&original, &network).await.unwrap();

        let unbound = LogicalPort::new("p1", "net-1");
        f.reconciler
            .on_port_updated(&unbound, &original, &network)
            .await
            .unwrap();

        let submitted = f.controller.submitted();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[1].port_idx, 3);
        assert!(!submitted[1].port_vlan_enabled);
        assert!(f.reconciler.mapping().get("p1").is_none());
        assert_eq!(f.reconciler.status().mapped_ports, 0);
    }

    #[tokio::test]
    async fn test_port_update_off_vlan_network_releases_port() {
        let f = fixture();
        let original = LogicalPort::new("p1", "net-1").with_link(SWITCH, "3");
        f.reconciler
            .on_port_created(&original, &vlan_network("net-1", 100))
            .await
            .unwrap();

        let flat = Network {
            network_type: "flat".into(),
            segmentation_id: None,
            ..vlan_network("net-2", 1)
        };
        let moved = LogicalPort::new("p1", "net-2").with_link(SWITCH, "3");
        f.reconciler
            .on_port_updated(&moved, &original, &flat)
            .await
            .unwrap();

        assert_eq!(f.controller.submitted().len(), 2);
        assert!(f.reconciler.mapping().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_create_keeps_same_entry() {
        let f = fixture();
        let network = vlan_network("net-1", 100);
        let port = LogicalPort::new("p1", "net-1").with_link(SWITCH, "3");

        f.reconciler.on_port_created(&port, &network).await.unwrap();
        let first = f.reconciler.mapping().get("p1").unwrap();
        f.reconciler.on_port_created(&port, &network).await.unwrap();
        let second = f.reconciler.mapping().get("p1").unwrap();

        assert_eq!(first, second);
        let submitted = f.controller.submitted();
        assert_eq!(submitted[0], submitted[1]);
    }

    #[tokio::test]
    async fn test_failed_update_keeps_previous_mapping() {
        let f = fixture();
        let network = vlan_network("net-1", 100);
        let original = LogicalPort::new("p1", "net-1").with_link(SWITCH, "3");
        f.reconciler.on_port_created(&original, &network).await.unwrap();
        let before = f.reconciler.mapping().get("p1").unwrap();

        f.controller.reject_submissions(true);
        let moved = LogicalPort::new("p1", "net-1").with_link(SWITCH, "5");
        assert!(f
            .reconciler
            .on_port_updated(&moved, &original, &network)
            .await
            .is_err());

        assert_eq!(f.reconciler.mapping().get("p1").unwrap(), before);
    }

    #[tokio::test]
    async fn test_unchanged_update_is_noop() {
        let f = fixture();
        let network = vlan_network("net-1", 100);
        let port = LogicalPort::new("p1", "net-1").with_link(SWITCH, "3");
        f.reconciler.on_port_created(&port, &network).await.unwrap();

        f.reconciler
            .on_port_updated(&port, &port, &network)
            .await
            .unwrap();
        assert_eq!(f.controller.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_mapping_even_on_failure() {
        let f = fixture();
        let network = vlan_network("net-1", 100);
        let port = LogicalPort::new("p1", "net-1").with_link(SWITCH, "3");
        f.reconciler.on_port_created(&port, &network).await.unwrap();

        f.controller.fail_submissions(true);
        f.reconciler.on_port_deleted(&port, &network).await;
        assert!(f.reconciler.mapping().get("p1").is_none());
    }

    #[tokio::test]
    async fn test_bind_port() {
        let f = fixture();
        let segments = vec![
            Segment {
                id: "seg-vx".into(),
                network_type: "vxlan".into(),
                segmentation_id: None,
            },
            Segment {
                id: "seg-100".into(),
                network_type: "vlan".into(),
                segmentation_id: Some(VlanId::new(100).unwrap()),
            },
        ];

        let bound = LogicalPort::new("p1", "net-1").with_link("AA:BB:CC:DD:EE:FF", "3");
        let binding = f.reconciler.bind_port(&bound, &segments).await.unwrap();
        assert_eq!(binding.segment_id, "seg-100");
        assert_eq!(binding.vif_type, VIF_TYPE_OTHER);
        assert_eq!(binding.status, PortStatus::Active);

        let unknown = LogicalPort::new("p2", "net-1").with_link("00:00:00:00:00:01", "3");
        assert!(f.reconciler.bind_port(&unknown, &segments).await.is_none());
    }

    #[tokio::test]
    async fn test_sync_networks_and_initialize() {
        let f = fixture();
        f.host.add_network(vlan_network("net-1", 100));
        f.host.add_network(vlan_network("net-2", 200));
        let mut external = vlan_network("ext", 300);
        external.router_external = true;
        f.host.add_network(external);

        f.reconciler.initialize().await;

        assert_eq!(f.controller.networks().len(), 2);
        let status = f.reconciler.status();
        assert!(status.controller_reachable);
        assert_eq!(status.poller, PollerState::Stopped);

        assert_eq!(f.reconciler.sync_networks().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_initialize_records_unreachable_controller() {
        let f = fixture();
        f.controller.fail_inventory(true);
        f.reconciler.initialize().await;
        assert!(!f.reconciler.status().controller_reachable);
    }
}
