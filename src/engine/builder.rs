//! Port Configuration Builder
//!
//! Pure functions that turn logical inputs into a [`DesiredPortConfig`],
//! and the renderer that turns a descriptor plus a resolved target into the
//! controller's port configuration request. Nothing here performs I/O.

use super::directory::PhysicalPortRef;
use crate::config::FeatureFlags;
use crate::domain::controller::PortConfigRequest;
use crate::domain::vlan::VlanId;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// 802.1X control mode applied with port security
pub const DOT1X_FORCE_AUTHORIZED: &str = "force_authorized";

// =============================================================================
// Descriptor Types
// =============================================================================

/// How the port carries VLANs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VlanMode {
    /// Untagged traffic on a single VLAN
    Access,
    /// Native VLAN plus every network the controller knows
    TrunkAll,
    /// Native VLAN plus an explicit tagged set
    TrunkTagged,
}

impl VlanMode {
    /// Value of the controller's `vlan_mode` field, if the mode sets one
    pub fn wire_value(&self) -> Option<&'static str> {
        match self {
            VlanMode::Access => None,
            VlanMode::TrunkAll => Some("all"),
            VlanMode::TrunkTagged => Some("tagged"),
        }
    }
}

impl std::fmt::Display for VlanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VlanMode::Access => write!(f, "access"),
            VlanMode::TrunkAll => write!(f, "trunk-all"),
            VlanMode::TrunkTagged => write!(f, "trunk-tagged"),
        }
    }
}

/// Display name written to the switch port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortName {
    Custom(String),
    /// `Port {index}`, filled in once the physical index is known
    DefaultForIndex,
}

impl PortName {
    pub fn render(&self, port_idx: u32) -> String {
        match self {
            PortName::Custom(name) => name.clone(),
            PortName::DefaultForIndex => format!("Port {}", port_idx),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateLimit {
    pub kbps: u32,
}

/// Per traffic class thresholds; a class is present only when limited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StormControl {
    pub broadcast: Option<u32>,
    pub multicast: Option<u32>,
    pub unknown_unicast: Option<u32>,
}

impl StormControl {
    /// Thresholds above zero, or `None` when no class is limited
    pub fn from_thresholds(broadcast: u32, multicast: u32, unknown_unicast: u32) -> Option<Self> {
        let positive = |rate: u32| (rate > 0).then_some(rate);
        let block = Self {
            broadcast: positive(broadcast),
            multicast: positive(multicast),
            unknown_unicast: positive(unknown_unicast),
        };

        if block.broadcast.is_none() && block.multicast.is_none() && block.unknown_unicast.is_none()
        {
            None
        } else {
            Some(block)
        }
    }
}

/// Edge-port protections applied to access ports
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortSecurity {
    pub dot1x_ctrl: String,
    pub stp_port_fast: bool,
    pub stp_bpdu_guard: bool,
    pub stp_loop_guard: bool,
}

impl Default for PortSecurity {
    fn default() -> Self {
        Self {
            dot1x_ctrl: DOT1X_FORCE_AUTHORIZED.to_string(),
            stp_port_fast: true,
            stp_bpdu_guard: true,
            stp_loop_guard: true,
        }
    }
}

/// Desired physical port configuration.
///
/// Built fresh for every reconciliation. `TrunkTagged` always carries a
/// non-empty tagged set; `Access` carries none, or an explicit empty set
/// when tagged VLANs must be cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredPortConfig {
    pub name: PortName,
    pub port_vlan_enabled: bool,
    pub vlan_mode: VlanMode,
    pub native_vlan: Option<VlanId>,
    pub tagged_vlans: Option<Vec<VlanId>>,
    pub rate_limit: Option<RateLimit>,
    pub storm_control: Option<StormControl>,
    pub port_security: Option<PortSecurity>,
}

// =============================================================================
// Builders
// =============================================================================

fn rate_limit(flags: &FeatureFlags) -> Option<RateLimit> {
    flags.enable_qos.then(|| RateLimit {
        kbps: flags.default_bandwidth_limit,
    })
}

fn storm_control(flags: &FeatureFlags) -> Option<StormControl> {
    if !flags.enable_storm_control {
        return None;
    }
    StormControl::from_thresholds(
        flags.storm_control_broadcasting,
        flags.storm_control_multicasting,
        flags.storm_control_unknown_unicast,
    )
}

/// Single untagged VLAN with the enabled feature blocks
pub fn build_access_config(
    native_vlan: VlanId,
    name: impl Into<String>,
    flags: &FeatureFlags,
) -> DesiredPortConfig {
    DesiredPortConfig {
        name: PortName::Custom(name.into()),
        port_vlan_enabled: true,
        vlan_mode: VlanMode::Access,
        native_vlan: Some(native_vlan),
        tagged_vlans: None,
        rate_limit: rate_limit(flags),
        storm_control: storm_control(flags),
        port_security: flags.enable_port_security.then(PortSecurity::default),
    }
}

/// Return a port to its factory state
pub fn build_unconfigure_config() -> DesiredPortConfig {
    DesiredPortConfig {
        name: PortName::DefaultForIndex,
        port_vlan_enabled: false,
        vlan_mode: VlanMode::Access,
        native_vlan: None,
        tagged_vlans: Some(Vec::new()),
        rate_limit: None,
        storm_control: None,
        port_security: None,
    }
}

/// Trunk carrying the native VLAN plus either every network or the
/// de-duplicated subport VLANs, in first-seen order.
///
/// Without `use_all_networks` and with no subports there is nothing to tag,
/// so the port falls back to access mode on the native VLAN. Port security
/// is never applied to trunks.
pub fn build_trunk_config(
    native_vlan: VlanId,
    subport_vlans: &[VlanId],
    use_all_networks: bool,
    name: impl Into<String>,
    flags: &FeatureFlags,
) -> DesiredPortConfig {
    let (vlan_mode, tagged_vlans) = if use_all_networks {
        (VlanMode::TrunkAll, None)
    } else {
        let tagged: IndexSet<VlanId> = subport_vlans.iter().copied().collect();
        if tagged.is_empty() {
            (VlanMode::Access, None)
        } else {
            (VlanMode::TrunkTagged, Some(tagged.into_iter().collect()))
        }
    };

    DesiredPortConfig {
        name: PortName::Custom(name.into()),
        port_vlan_enabled: true,
        vlan_mode,
        native_vlan: Some(native_vlan),
        tagged_vlans,
        rate_limit: rate_limit(flags),
        storm_control: storm_control(flags),
        port_security: None,
    }
}

/// Expand `{port_id}`, `{network_id}` and `{segmentation_id}` in a name format
pub fn format_port_name(
    format: &str,
    port_id: &str,
    network_id: &str,
    segmentation_id: VlanId,
) -> String {
    format
        .replace("{port_id}", port_id)
        .replace("{network_id}", network_id)
        .replace("{segmentation_id}", &segmentation_id.to_string())
}

// =============================================================================
// Rendering
// =============================================================================

impl DesiredPortConfig {
    /// Controller request for this descriptor on a resolved port
    pub fn render(&self, target: &PhysicalPortRef) -> PortConfigRequest {
        let storm = self.storm_control.unwrap_or_default();
        let security = self.port_security.as_ref();

        PortConfigRequest {
            mac: target.switch_id.clone(),
            device_id: target.device_id.clone(),
            port_idx: target.port_idx,
            name: self.name.render(target.port_idx),
            port_vlan_enabled: self.port_vlan_enabled,
            port_vlan: self.native_vlan.map(u16::from),
            vlan_mode: self.vlan_mode.wire_value().map(str::to_string),
            tagged_vlan: self
                .tagged_vlans
                .as_ref()
                .map(|vlans| vlans.iter().map(|v| v.as_u16()).collect()),

            tx_rate_limit_enabled: self.rate_limit.map(|_| true),
            tx_rate_limit_kbps_cfg: self.rate_limit.map(|r| r.kbps),

            stormctrl_bcast_enabled: storm.broadcast.map(|_| true),
            stormctrl_bcast_rate: storm.broadcast,
            stormctrl_mcast_enabled: storm.multicast.map(|_| true),
            stormctrl_mcast_rate: storm.multicast,
            stormctrl_ucast_enabled: storm.unknown_unicast.map(|_| true),
            stormctrl_ucast_rate: storm.unknown_unicast,

            dot1x_ctrl: security.map(|s| s.dot1x_ctrl.clone()),
            stp_port_fast: security.map(|s| s.stp_port_fast),
            stp_bpdu_guard: security.map(|s| s.stp_bpdu_guard),
            stp_loop_guard: security.map(|s| s.stp_loop_guard),
        }
    }
}
