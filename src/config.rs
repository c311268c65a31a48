//! Engine configuration
//!
//! All settings are grouped by concern and default to the values a fresh
//! deployment expects, so a YAML file only needs to name what it changes.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

// =============================================================================
// Controller Connection
// =============================================================================

/// Which switch controller adapter to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerKind {
    #[default]
    Unifi,
    Memory,
}

/// Connection settings for the switch controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub kind: ControllerKind,
    /// Base URL, e.g. `https://unifi.example.net:8443`
    pub url: String,
    pub username: String,
    pub password: String,
    pub site: String,
    pub verify_ssl: bool,
    /// PEM bundle trusted in addition to the system roots
    pub cafile: Option<PathBuf>,
    /// Controller runs on a UniFi OS console
    pub unifi_os: bool,
    pub request_timeout_secs: u64,
    /// Attempts for idempotent read calls
    pub api_retry_count: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            kind: ControllerKind::Unifi,
            url: String::new(),
            username: String::new(),
            password: String::new(),
            site: "default".to_string(),
            verify_ssl: true,
            cafile: None,
            unifi_os: false,
            request_timeout_secs: 10,
            api_retry_count: 3,
        }
    }
}

impl ControllerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Naming
// =============================================================================

/// Format strings for names written to the controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Port display name; `{port_id}`, `{network_id}`, `{segmentation_id}`
    pub port_name_format: String,
    /// Controller network name; `{network_id}`, `{segmentation_id}`
    pub network_name_format: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            port_name_format: "openstack-port-{port_id}".to_string(),
            network_name_format: "OpenStack-{network_id}-VLAN{segmentation_id}".to_string(),
        }
    }
}

// =============================================================================
// Convergence
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceConfig {
    pub port_setup_retry_count: u32,
    pub port_setup_retry_interval_secs: u64,
    /// How long an inventory snapshot may be reused; 0 fetches every time
    pub inventory_cache_ttl_ms: u64,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            port_setup_retry_count: 3,
            port_setup_retry_interval_secs: 1,
            inventory_cache_ttl_ms: 0,
        }
    }
}

impl ConvergenceConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.port_setup_retry_interval_secs)
    }

    pub fn inventory_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.inventory_cache_ttl_ms)
    }
}

// =============================================================================
// Feature Flags
// =============================================================================

/// Optional behaviors applied to built port configurations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub sync_startup: bool,
    pub use_all_networks_for_trunk: bool,
    pub enable_port_security: bool,
    pub enable_qos: bool,
    /// Egress limit in kbps when QoS is enabled
    pub default_bandwidth_limit: u32,
    pub enable_storm_control: bool,
    pub storm_control_broadcasting: u32,
    pub storm_control_multicasting: u32,
    pub storm_control_unknown_unicast: u32,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            sync_startup: true,
            use_all_networks_for_trunk: true,
            enable_port_security: true,
            enable_qos: false,
            default_bandwidth_limit: 0,
            enable_storm_control: false,
            storm_control_broadcasting: 0,
            storm_control_multicasting: 0,
            storm_control_unknown_unicast: 0,
        }
    }
}

// =============================================================================
// Monitoring
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub monitor_port_state: bool,
    pub monitor_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            monitor_port_state: true,
            monitor_interval_secs: 60,
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
}

// =============================================================================
// DNS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    pub dns_integration_enabled: bool,
    pub dns_domain: Option<String>,
    /// `{dns_name}`, `{dns_domain}`, `{port_id}`, `{network_id}`
    pub dns_domain_format: String,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            dns_integration_enabled: false,
            dns_domain: None,
            dns_domain_format: "{dns_name}.{dns_domain}".to_string(),
        }
    }
}

// =============================================================================
// Host Framework
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostKind {
    Http,
    #[default]
    Memory,
}

/// Where status reports and topology lookups go
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub kind: HostKind,
    pub url: Option<String>,
    pub token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            kind: HostKind::Memory,
            url: None,
            token: None,
            request_timeout_secs: 10,
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Complete reconciler configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub controller: ControllerConfig,
    pub naming: NamingConfig,
    pub convergence: ConvergenceConfig,
    pub features: FeatureFlags,
    pub monitor: MonitorConfig,
    pub dns: DnsConfig,
    pub host: HostConfig,
}

impl EngineConfig {
    /// Load from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let mut config: EngineConfig = serde_yaml::from_str(raw)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Disable DNS integration when it has nowhere to write
    pub fn normalize(&mut self) {
        let has_domain = self
            .dns
            .dns_domain
            .as_deref()
            .map(|d| !d.trim().is_empty())
            .unwrap_or(false);

        if self.dns.dns_integration_enabled && !has_domain {
            warn!("DNS integration is enabled but no domain is configured, disabling it");
            self.dns.dns_integration_enabled = false;
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.controller.kind == ControllerKind::Unifi {
            if self.controller.url.trim().is_empty() {
                return Err(Error::Configuration("controller.url is required".into()));
            }
            if self.controller.username.is_empty() || self.controller.password.is_empty() {
                return Err(Error::Configuration(
                    "controller.username and controller.password are required".into(),
                ));
            }
        }

        if self.controller.api_retry_count == 0 {
            return Err(Error::Configuration(
                "controller.api_retry_count must be at least 1".into(),
            ));
        }

        if self.convergence.port_setup_retry_count == 0 {
            return Err(Error::Configuration(
                "convergence.port_setup_retry_count must be at least 1".into(),
            ));
        }

        if self.monitor.monitor_port_state && self.monitor.monitor_interval_secs == 0 {
            return Err(Error::Configuration(
                "monitor.monitor_interval_secs must be positive when monitoring is enabled".into(),
            ));
        }

        if self.host.kind == HostKind::Http && self.host.url.is_none() {
            return Err(Error::Configuration("host.url is required for kind http".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    const MINIMAL: &str = r#"
controller:
  url: https://unifi.local:8443
  username: admin
  password: secret
"#;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_yaml_str(MINIMAL).unwrap();

        assert_eq!(config.controller.site, "default");
        assert!(config.controller.verify_ssl);
        assert_eq!(config.controller.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.naming.port_name_format, "openstack-port-{port_id}");
        assert_eq!(config.convergence.port_setup_retry_count, 3);
        assert_eq!(config.convergence.retry_interval(), Duration::from_secs(1));
        assert!(config.features.use_all_networks_for_trunk);
        assert!(config.features.enable_port_security);
        assert!(!config.features.enable_qos);
        assert_eq!(config.monitor.interval(), Duration::from_secs(60));
        assert_eq!(config.dns.dns_domain_format, "{dns_name}.{dns_domain}");
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let err = EngineConfig::from_yaml_str("controller:\n  url: https://unifi.local\n")
            .unwrap_err();
        assert_matches!(err, Error::Configuration(_));
    }

    #[test]
    fn test_memory_controller_needs_no_credentials() {
        let config = EngineConfig::from_yaml_str("controller:\n  kind: memory\n").unwrap();
        assert_eq!(config.controller.kind, ControllerKind::Memory);
    }

    #[test]
    fn test_zero_retry_count_rejected() {
        let raw = format!("{}convergence:\n  port_setup_retry_count: 0\n", MINIMAL);
        assert_matches!(EngineConfig::from_yaml_str(&raw), Err(Error::Configuration(_)));
    }

    #[test]
    fn test_dns_without_domain_disabled() {
        let raw = format!("{}dns:\n  dns_integration_enabled: true\n", MINIMAL);
        let config = EngineConfig::from_yaml_str(&raw).unwrap();
        assert!(!config.dns.dns_integration_enabled);
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", MINIMAL).unwrap();
        writeln!(file, "features:\n  enable_qos: true\n  default_bandwidth_limit: 5000").unwrap();

        let config = EngineConfig::from_yaml_file(file.path()).unwrap();
        assert!(config.features.enable_qos);
        assert_eq!(config.features.default_bandwidth_limit, 5000);
        // Untouched flags keep their defaults
        assert!(config.features.sync_startup);
    }
}
