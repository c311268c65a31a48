//! Logical topology objects delivered by the host framework
//!
//! Networks, logical ports, binding locators and trunk subports as the host
//! describes them. The engine only reads these; the one piece of feedback
//! flowing the other way is [`PortStatus`].

use super::vlan::VlanId;
use serde::{Deserialize, Serialize};

/// Network type carried by networks the engine configures
pub const VLAN_NETWORK_TYPE: &str = "vlan";

// =============================================================================
// Physical Port Reference
// =============================================================================

/// Physical port identifier as supplied in a binding locator.
///
/// Anything that parses as an unsigned integer is an index and is never
/// looked up by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawPortRef", into = "RawPortRef")]
pub enum PortRef {
    Index(u32),
    Name(String),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawPortRef {
    Index(u32),
    Name(String),
}

impl PortRef {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<u32>() {
            Ok(idx) => PortRef::Index(idx),
            Err(_) => PortRef::Name(raw.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, PortRef::Name(name) if name.trim().is_empty())
    }
}

impl From<RawPortRef> for PortRef {
    fn from(raw: RawPortRef) -> Self {
        match raw {
            RawPortRef::Index(idx) => PortRef::Index(idx),
            RawPortRef::Name(name) => PortRef::parse(&name),
        }
    }
}

impl From<PortRef> for RawPortRef {
    fn from(port: PortRef) -> Self {
        match port {
            PortRef::Index(idx) => RawPortRef::Index(idx),
            PortRef::Name(name) => RawPortRef::Name(name),
        }
    }
}

impl From<&str> for PortRef {
    fn from(raw: &str) -> Self {
        PortRef::parse(raw)
    }
}

impl From<u32> for PortRef {
    fn from(idx: u32) -> Self {
        PortRef::Index(idx)
    }
}

impl std::fmt::Display for PortRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortRef::Index(idx) => write!(f, "{}", idx),
            PortRef::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Hardware addresses are compared without regard to case
pub fn same_switch(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

// =============================================================================
// Networks and Segments
// =============================================================================

/// Logical network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(alias = "provider:network_type")]
    pub network_type: String,
    #[serde(default, alias = "provider:segmentation_id")]
    pub segmentation_id: Option<VlanId>,
    #[serde(default, alias = "router:external")]
    pub router_external: bool,
    #[serde(default)]
    pub dns_domain: Option<String>,
}

impl Network {
    pub fn is_vlan(&self) -> bool {
        self.network_type.eq_ignore_ascii_case(VLAN_NETWORK_TYPE)
    }

    /// VLAN carried by this network, if it is a VLAN network with a segment
    pub fn vlan(&self) -> Option<VlanId> {
        if self.is_vlan() {
            self.segmentation_id
        } else {
            None
        }
    }
}

/// Candidate segment offered to [`bind_port`](crate::Reconciler::bind_port)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub network_type: String,
    #[serde(default)]
    pub segmentation_id: Option<VlanId>,
}

impl Segment {
    pub fn is_vlan(&self) -> bool {
        self.network_type.eq_ignore_ascii_case(VLAN_NETWORK_TYPE)
    }
}

// =============================================================================
// Logical Ports
// =============================================================================

/// Role of a logical port in a trunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrunkRole {
    #[default]
    Standalone,
    TrunkParent,
    TrunkSubport,
}

/// One (switch, physical port) pair from a port's binding locator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingLink {
    /// Switch hardware address
    pub switch_id: String,
    /// Physical port index or name
    pub port_id: PortRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_info: Option<String>,
}

impl BindingLink {
    pub fn new(switch_id: impl Into<String>, port_id: impl Into<PortRef>) -> Self {
        Self {
            switch_id: switch_id.into(),
            port_id: port_id.into(),
            switch_info: None,
        }
    }

    /// Links missing either half of the locator are ignored
    pub fn is_complete(&self) -> bool {
        !self.switch_id.trim().is_empty() && !self.port_id.is_empty()
    }

    pub fn targets(&self, switch_id: &str, port_id: &PortRef) -> bool {
        same_switch(&self.switch_id, switch_id) && &self.port_id == port_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedIp {
    pub ip_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
}

/// Logical port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalPort {
    pub id: String,
    pub network_id: String,
    #[serde(default)]
    pub trunk_role: TrunkRole,
    #[serde(default)]
    pub binding: Vec<BindingLink>,
    #[serde(default)]
    pub dns_name: Option<String>,
    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,
    #[serde(default)]
    pub status: Option<PortStatus>,
}

impl LogicalPort {
    pub fn new(id: impl Into<String>, network_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            network_id: network_id.into(),
            trunk_role: TrunkRole::Standalone,
            binding: Vec::new(),
            dns_name: None,
            fixed_ips: Vec::new(),
            status: None,
        }
    }

    pub fn with_link(mut self, switch_id: &str, port_id: impl Into<PortRef>) -> Self {
        self.binding.push(BindingLink::new(switch_id, port_id));
        self
    }

    /// Binding links that carry both a switch and a port
    pub fn links(&self) -> impl Iterator<Item = &BindingLink> {
        self.binding.iter().filter(|link| link.is_complete())
    }

    pub fn has_binding(&self) -> bool {
        self.links().next().is_some()
    }

    pub fn dns_name(&self) -> Option<&str> {
        self.dns_name.as_deref().filter(|name| !name.is_empty())
    }
}

/// Subport multiplexed onto a trunk parent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subport {
    pub port_id: String,
    pub segmentation_id: VlanId,
}

// =============================================================================
// Port Status and Binding
// =============================================================================

/// Logical port status derived from physical link state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PortStatus {
    Active,
    Down,
}

impl PortStatus {
    pub fn from_link_up(up: bool) -> Self {
        if up {
            PortStatus::Active
        } else {
            PortStatus::Down
        }
    }
}

impl std::fmt::Display for PortStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortStatus::Active => write!(f, "ACTIVE"),
            PortStatus::Down => write!(f, "DOWN"),
        }
    }
}

/// Result of a successful port binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    pub segment_id: String,
    pub vif_type: String,
    pub status: PortStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_ref_parse() {
        assert_eq!(PortRef::parse("3"), PortRef::Index(3));
        assert_eq!(PortRef::parse(" 12 "), PortRef::Index(12));
        assert_eq!(PortRef::parse("Port 3"), PortRef::Name("Port 3".into()));
        assert_eq!(PortRef::parse("-1"), PortRef::Name("-1".into()));
    }

    #[test]
    fn test_port_ref_serde() {
        let from_str: PortRef = serde_json::from_str("\"7\"").unwrap();
        let from_int: PortRef = serde_json::from_str("7").unwrap();
        assert_eq!(from_str, from_int);

        let named: PortRef = serde_json::from_str("\"uplink\"").unwrap();
        assert_eq!(serde_json::to_string(&named).unwrap(), "\"uplink\"");
        assert_eq!(serde_json::to_string(&from_int).unwrap(), "7");
    }

    #[test]
    fn test_network_aliases() {
        let network: Network = serde_json::from_value(serde_json::json!({
            "id": "net-1",
            "provider:network_type": "vlan",
            "provider:segmentation_id": 100,
            "router:external": false
        }))
        .unwrap();

        assert_eq!(network.vlan(), VlanId::new(100).ok());

        let vxlan = Network {
            network_type: "vxlan".into(),
            ..network
        };
        assert_eq!(vxlan.vlan(), None);
    }

    #[test]
    fn test_incomplete_links_ignored() {
        let mut port = LogicalPort::new("port-1", "net-1").with_link("aa:bb:cc:dd:ee:ff", 3u32);
        port.binding.push(BindingLink::new("", 4u32));
        port.binding.push(BindingLink::new("aa:bb:cc:dd:ee:ff", ""));

        assert_eq!(port.links().count(), 1);
        assert!(port.has_binding());
        assert!(!LogicalPort::new("port-2", "net-1").has_binding());
    }

    #[test]
    fn test_link_targets_case_insensitive() {
        let link = BindingLink::new("AA:BB:CC:DD:EE:FF", "3");
        assert!(link.targets("aa:bb:cc:dd:ee:ff", &PortRef::Index(3)));
        assert!(!link.targets("aa:bb:cc:dd:ee:ff", &PortRef::Index(4)));
    }

    #[test]
    fn test_port_status_wire_format() {
        assert_eq!(serde_json::to_string(&PortStatus::Down).unwrap(), "\"DOWN\"");
        assert_eq!(PortStatus::from_link_up(true), PortStatus::Active);
    }
}
