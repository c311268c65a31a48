//! In-memory host framework
//!
//! Stands in for the orchestration framework in standalone mode and tests:
//! networks, trunk memberships and port statuses live in process memory and
//! every status report is recorded.

use crate::domain::ports::{StatusSink, TopologySource};
use crate::domain::topology::{Network, PortStatus, Subport};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct HostState {
    networks: BTreeMap<String, Network>,
    trunks: BTreeMap<String, Vec<Subport>>,
    statuses: BTreeMap<String, PortStatus>,
    reports: Vec<(String, PortStatus)>,
}

#[derive(Debug, Default)]
pub struct InMemoryHost {
    state: Mutex<HostState>,
    fail_topology: AtomicBool,
    fail_reports: AtomicBool,
}

impl InMemoryHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_network(&self, network: Network) {
        self.state.lock().networks.insert(network.id.clone(), network);
    }

    pub fn remove_network(&self, network_id: &str) -> Option<Network> {
        self.state.lock().networks.remove(network_id)
    }

    /// Replace the membership of a trunk
    pub fn set_subports(&self, parent_port_id: &str, subports: Vec<Subport>) {
        self.state
            .lock()
            .trunks
            .insert(parent_port_id.to_string(), subports);
    }

    /// Set the stored status without recording a report
    pub fn set_status(&self, port_id: &str, status: PortStatus) {
        self.state
            .lock()
            .statuses
            .insert(port_id.to_string(), status);
    }

    pub fn status(&self, port_id: &str) -> Option<PortStatus> {
        self.state.lock().statuses.get(port_id).copied()
    }

    /// Every accepted status report, in order
    pub fn reports(&self) -> Vec<(String, PortStatus)> {
        self.state.lock().reports.clone()
    }

    pub fn fail_topology(&self, fail: bool) {
        self.fail_topology.store(fail, Ordering::Relaxed);
    }

    pub fn fail_reports(&self, fail: bool) {
        self.fail_reports.store(fail, Ordering::Relaxed);
    }

    fn check_topology(&self, operation: &str) -> Result<()> {
        if self.fail_topology.load(Ordering::Relaxed) {
            return Err(Error::HostApi {
                operation: operation.to_string(),
                reason: "injected failure".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StatusSink for InMemoryHost {
    async fn report_port_status_changed(&self, port_id: &str, status: PortStatus) -> Result<()> {
        if self.fail_reports.load(Ordering::Relaxed) {
            return Err(Error::HostApi {
                operation: "report_port_status".into(),
                reason: "injected failure".into(),
            });
        }
        let mut state = self.state.lock();
        state.statuses.insert(port_id.to_string(), status);
        state.reports.push((port_id.to_string(), status));
        Ok(())
    }

    async fn current_status(&self, port_id: &str) -> Result<Option<PortStatus>> {
        Ok(self.status(port_id))
    }
}

#[async_trait]
impl TopologySource for InMemoryHost {
    async fn get_subports_for_trunk(&self, parent_port_id: &str) -> Result<Vec<Subport>> {
        self.check_topology("get_subports_for_trunk")?;
        Ok(self
            .state
            .lock()
            .trunks
            .get(parent_port_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_network(&self, network_id: &str) -> Result<Network> {
        self.check_topology("get_network")?;
        self.state
            .lock()
            .networks
            .get(network_id)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "network".into(),
                id: network_id.to_string(),
            })
    }

    async fn list_networks(&self) -> Result<Vec<Network>> {
        self.check_topology("list_networks")?;
        Ok(self.state.lock().networks.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_reports_update_status() {
        let host = InMemoryHost::new();
        assert_eq!(host.current_status("p1").await.unwrap(), None);

        host.report_port_status_changed("p1", PortStatus::Down).await.unwrap();
        assert_eq!(host.current_status("p1").await.unwrap(), Some(PortStatus::Down));
        assert_eq!(host.reports(), vec![("p1".to_string(), PortStatus::Down)]);

        host.set_status("p1", PortStatus::Active);
        assert_eq!(host.reports().len(), 1);
    }

    #[tokio::test]
    async fn test_topology_failure_injection() {
        let host = InMemoryHost::new();
        assert!(host.get_subports_for_trunk("parent").await.unwrap().is_empty());

        host.fail_topology(true);
        assert_matches!(
            host.get_subports_for_trunk("parent").await,
            Err(Error::HostApi { .. })
        );
        assert_matches!(host.get_network("net-1").await, Err(Error::HostApi { .. }));
    }

    #[tokio::test]
    async fn test_unknown_network() {
        let host = InMemoryHost::new();
        assert_matches!(host.get_network("net-1").await, Err(Error::NotFound { .. }));
    }
}
