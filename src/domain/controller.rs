//! Controller-side inventory and request types
//!
//! The shapes the switch controller returns for devices, VLAN networks and
//! DNS records, plus the port configuration request the engine submits.

use super::vlan::VlanId;
use serde::{Deserialize, Serialize};

/// Device type reported by the controller for managed switches
pub const SWITCH_DEVICE_TYPE: &str = "usw";

// =============================================================================
// Device Inventory
// =============================================================================

/// Entry of a device's port table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortTableEntry {
    pub port_idx: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub up: bool,
}

/// Device known to the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "_id")]
    pub id: String,
    pub mac: String,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub port_table: Vec<PortTableEntry>,
}

impl Device {
    pub fn is_switch(&self) -> bool {
        self.device_type == SWITCH_DEVICE_TYPE
    }

    pub fn port(&self, port_idx: u32) -> Option<&PortTableEntry> {
        self.port_table.iter().find(|p| p.port_idx == port_idx)
    }

    pub fn port_named(&self, name: &str) -> Option<&PortTableEntry> {
        self.port_table.iter().find(|p| p.name == name)
    }
}

// =============================================================================
// Port Configuration Request
// =============================================================================

/// Port configuration submitted for one switch port.
///
/// Field names follow the controller's port override schema. Optional
/// fields are omitted from the serialized form when unset so that the
/// controller leaves those settings untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfigRequest {
    pub mac: String,
    /// Controller-internal id of the resolved device; never sent as an override field
    #[serde(skip)]
    pub device_id: String,
    pub port_idx: u32,
    pub name: String,
    pub port_vlan_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_vlan: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagged_vlan: Option<Vec<u16>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_rate_limit_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_rate_limit_kbps_cfg: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stormctrl_bcast_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stormctrl_bcast_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stormctrl_mcast_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stormctrl_mcast_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stormctrl_ucast_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stormctrl_ucast_rate: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dot1x_ctrl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stp_port_fast: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stp_bpdu_guard: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stp_loop_guard: Option<bool>,
}

// =============================================================================
// VLAN Networks
// =============================================================================

/// VLAN network defined on the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanNetwork {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub vlan: Option<VlanId>,
    #[serde(default)]
    pub enabled: bool,
}

/// Request to create a VLAN network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    pub purpose: String,
    pub vlan: VlanId,
    pub enabled: bool,
}

impl NetworkSpec {
    pub const PURPOSE_CORPORATE: &'static str = "corporate";

    pub fn corporate(name: impl Into<String>, vlan: VlanId) -> Self {
        Self {
            name: name.into(),
            purpose: Self::PURPOSE_CORPORATE.to_string(),
            vlan,
            enabled: true,
        }
    }
}

// =============================================================================
// DNS Records
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DnsRecordType {
    A,
    AAAA,
}

impl DnsRecordType {
    /// Record type for an address literal
    pub fn for_address(address: &str) -> Self {
        if address.contains(':') {
            DnsRecordType::AAAA
        } else {
            DnsRecordType::A
        }
    }
}

impl std::fmt::Display for DnsRecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DnsRecordType::A => write!(f, "A"),
            DnsRecordType::AAAA => write!(f, "AAAA"),
        }
    }
}

/// DNS record held by the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub id: String,
    pub name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub record_type: DnsRecordType,
    pub ttl: u32,
}

/// Request to create a DNS record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecordSpec {
    pub name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub record_type: DnsRecordType,
    pub ttl: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_classification() {
        let device: Device = serde_json::from_value(serde_json::json!({
            "_id": "5f0c",
            "mac": "aa:bb:cc:dd:ee:ff",
            "type": "usw",
            "port_table": [{"port_idx": 1, "name": "Port 1", "up": true}]
        }))
        .unwrap();

        assert!(device.is_switch());
        assert!(device.port(1).map(|p| p.up).unwrap_or(false));
        assert!(device.port(2).is_none());

        let ap = Device {
            device_type: "uap".into(),
            ..device
        };
        assert!(!ap.is_switch());
    }

    #[test]
    fn test_port_config_request_omits_unset_fields() {
        let request = PortConfigRequest {
            mac: "aa:bb:cc:dd:ee:ff".into(),
            device_id: "dev1".into(),
            port_idx: 3,
            name: "Port 3".into(),
            port_vlan_enabled: false,
            port_vlan: None,
            vlan_mode: None,
            tagged_vlan: Some(vec![]),
            tx_rate_limit_enabled: None,
            tx_rate_limit_kbps_cfg: None,
            stormctrl_bcast_enabled: None,
            stormctrl_bcast_rate: None,
            stormctrl_mcast_enabled: None,
            stormctrl_mcast_rate: None,
            stormctrl_ucast_enabled: None,
            stormctrl_ucast_rate: None,
            dot1x_ctrl: None,
            stp_port_fast: None,
            stp_bpdu_guard: None,
            stp_loop_guard: None,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "mac": "aa:bb:cc:dd:ee:ff",
                "port_idx": 3,
                "name": "Port 3",
                "port_vlan_enabled": false,
                "tagged_vlan": []
            })
        );
    }

    #[test]
    fn test_dns_record_type_for_address() {
        assert_eq!(DnsRecordType::for_address("10.0.0.5"), DnsRecordType::A);
        assert_eq!(DnsRecordType::for_address("fd00::5"), DnsRecordType::AAAA);
    }
}
