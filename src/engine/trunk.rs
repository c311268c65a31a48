//! Trunk Reconciler
//!
//! Recomputes the complete trunk configuration of a parent port whenever
//! subports are attached or detached. The subport set always comes from the
//! host's authoritative membership; if that cannot be read, nothing is
//! pushed.

use super::builder::{build_trunk_config, format_port_name};
use super::convergence::ConvergencePusher;
use super::mapping::{MappingEntry, MappingIndex};
use crate::config::{FeatureFlags, NamingConfig};
use crate::domain::ports::TopologySourceRef;
use crate::domain::topology::{LogicalPort, Subport};
use crate::domain::vlan::VlanId;
use crate::error::{Error, LinkFailure, Result};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Trunk parent with the subport set it was converged with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrunkState {
    pub parent_port_id: String,
    pub native_vlan: VlanId,
    pub subports: Vec<Subport>,
}

impl TrunkState {
    pub fn subport_vlans(&self) -> Vec<VlanId> {
        self.subports.iter().map(|s| s.segmentation_id).collect()
    }
}

/// Append `additions` to `current`, skipping ids already present
fn merge_subports(current: Vec<Subport>, additions: &[Subport]) -> Vec<Subport> {
    let mut seen = HashSet::new();
    current
        .into_iter()
        .chain(additions.iter().cloned())
        .filter(|s| seen.insert(s.port_id.clone()))
        .collect()
}

fn subtract_subports(current: Vec<Subport>, removed: &[Subport]) -> Vec<Subport> {
    let removed: HashSet<&str> = removed.iter().map(|s| s.port_id.as_str()).collect();
    current
        .into_iter()
        .filter(|s| !removed.contains(s.port_id.as_str()))
        .collect()
}

pub struct TrunkReconciler {
    topology: TopologySourceRef,
    pusher: Arc<ConvergencePusher>,
    mapping: Arc<MappingIndex>,
    naming: NamingConfig,
    flags: FeatureFlags,
}

impl TrunkReconciler {
    pub fn new(
        topology: TopologySourceRef,
        pusher: Arc<ConvergencePusher>,
        mapping: Arc<MappingIndex>,
        naming: NamingConfig,
        flags: FeatureFlags,
    ) -> Self {
        Self {
            topology,
            pusher,
            mapping,
            naming,
            flags,
        }
    }

    /// Attach subports; repeating the call with the same set changes nothing
    pub async fn add_subports(
        &self,
        parent: &LogicalPort,
        new_subports: &[Subport],
    ) -> Result<TrunkState> {
        let current = self.membership(&parent.id).await?;
        let subports = merge_subports(current, new_subports);
        self.reconcile(parent, subports).await
    }

    /// Detach subports and reconverge with whatever remains
    pub async fn remove_subports(
        &self,
        parent: &LogicalPort,
        removed: &[Subport],
    ) -> Result<TrunkState> {
        let current = self.membership(&parent.id).await?;
        let subports = subtract_subports(current, removed);
        self.reconcile(parent, subports).await
    }

    async fn membership(&self, parent_port_id: &str) -> Result<Vec<Subport>> {
        self.topology
            .get_subports_for_trunk(parent_port_id)
            .await
            .map_err(|e| Error::TrunkMembershipUnavailable {
                parent_port_id: parent_port_id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn native_vlan(&self, parent: &LogicalPort) -> Result<VlanId> {
        let network = self.topology.get_network(&parent.network_id).await?;
        network.segmentation_id.ok_or_else(|| Error::TrunkConfig {
            port_id: parent.id.clone(),
            reason: format!("network {} has no segmentation id", network.id),
        })
    }

    async fn reconcile(&self, parent: &LogicalPort, subports: Vec<Subport>) -> Result<TrunkState> {
        let native_vlan = self.native_vlan(parent).await?;
        let state = TrunkState {
            parent_port_id: parent.id.clone(),
            native_vlan,
            subports,
        };

        let links: Vec<_> = parent.links().collect();
        if links.is_empty() {
            debug!("Trunk parent {} has no binding, nothing to push", parent.id);
            return Ok(state);
        }

        let name = format_port_name(
            &self.naming.port_name_format,
            &parent.id,
            &parent.network_id,
            native_vlan,
        );
        let desired = build_trunk_config(
            native_vlan,
            &state.subport_vlans(),
            self.flags.use_all_networks_for_trunk,
            name,
            &self.flags,
        );

        let outcomes = join_all(
            links
                .iter()
                .map(|link| self.pusher.push(&link.switch_id, &link.port_id, &desired)),
        )
        .await;

        let mut failures = Vec::new();
        for (link, outcome) in links.iter().zip(outcomes) {
            match outcome {
                Ok(_) => {
                    self.mapping.put(
                        parent.id.clone(),
                        MappingEntry::new(link.switch_id.clone(), link.port_id.clone(), native_vlan),
                    );
                }
                Err(e) => {
                    error!(
                        "Failed to configure trunk {} on {}/{}: {}",
                        parent.id, link.switch_id, link.port_id, e
                    );
                    failures.push(LinkFailure {
                        switch_id: link.switch_id.clone(),
                        port: link.port_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(Error::LinkFailures {
                port_id: parent.id.clone(),
                attempted: links.len(),
                failures,
            });
        }

        info!(
            "Configured trunk {} with native VLAN {} and {} subport(s)",
            parent.id,
            native_vlan,
            state.subports.len()
        );
        Ok(state)
    }
}
