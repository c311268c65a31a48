//! DNS record synchronization
//!
//! Keeps at most one A and one AAAA record per named logical port in the
//! controller's static DNS table. Records are keyed by (name, type): fixed
//! IPs are applied in order, so with several addresses of one family the
//! last one wins. Shares no state with the rest of the engine; callers
//! treat every failure here as non-fatal.

use crate::config::DnsConfig;
use crate::domain::controller::{DnsRecord, DnsRecordSpec, DnsRecordType};
use crate::domain::ports::ControllerRef;
use crate::domain::topology::{LogicalPort, Network};
use crate::error::Result;
use tracing::{debug, info};

/// TTL written on every record
pub const DNS_RECORD_TTL: u32 = 300;

pub struct DnsSync {
    controller: ControllerRef,
    config: DnsConfig,
}

impl DnsSync {
    pub fn new(controller: ControllerRef, config: DnsConfig) -> Self {
        Self { controller, config }
    }

    pub fn enabled(&self) -> bool {
        self.config.dns_integration_enabled
    }

    /// Fully qualified record name for a port, if it has a DNS name and a
    /// domain is known. The network's own domain wins over the configured one.
    pub fn build_dns_name(&self, port: &LogicalPort, network: &Network) -> Option<String> {
        let dns_name = port.dns_name()?;
        let domain = network
            .dns_domain
            .as_deref()
            .filter(|d| !d.is_empty())
            .or(self.config.dns_domain.as_deref())
            .filter(|d| !d.is_empty())?;

        let name = self
            .config
            .dns_domain_format
            .replace("{port_id}", &port.id)
            .replace("{network_id}", &port.network_id)
            .replace("{dns_name}", dns_name)
            .replace("{dns_domain}", domain);

        Some(name.trim_end_matches('.').to_string())
    }

    /// Create or refresh one record per fixed IP
    pub async fn create_port_records(&self, port: &LogicalPort, network: &Network) -> Result<()> {
        if !self.enabled() {
            return Ok(());
        }
        let Some(name) = self.build_dns_name(port, network) else {
            return Ok(());
        };

        for fixed_ip in port.fixed_ips.iter().filter(|ip| !ip.ip_address.is_empty()) {
            self.upsert(&name, &fixed_ip.ip_address).await?;
            info!(
                "Created DNS record for port {}: {} -> {}",
                port.id, name, fixed_ip.ip_address
            );
        }
        Ok(())
    }

    /// Drop the old records when the DNS name changed, then write the new ones
    pub async fn update_port_records(
        &self,
        port: &LogicalPort,
        original: Option<&LogicalPort>,
        network: &Network,
    ) -> Result<()> {
        if !self.enabled() {
            return Ok(());
        }
        if let Some(original) = original {
            if original.dns_name() != port.dns_name() {
                self.delete_port_records(original, network).await?;
            }
        }
        self.create_port_records(port, network).await
    }

    /// Remove every record carrying the port's name
    pub async fn delete_port_records(&self, port: &LogicalPort, network: &Network) -> Result<()> {
        if !self.enabled() {
            return Ok(());
        }
        let Some(name) = self.build_dns_name(port, network) else {
            return Ok(());
        };

        let records = self.controller.list_dns_records().await?;
        for record in records.iter().filter(|r| r.name == name) {
            debug!("Deleting DNS record {} (id: {})", name, record.id);
            self.controller.delete_dns_record(&record.id).await?;
        }
        info!("Deleted DNS records for port {} with name {}", port.id, name);
        Ok(())
    }

    async fn upsert(&self, name: &str, address: &str) -> Result<()> {
        let record_type = DnsRecordType::for_address(address);
        let records = self.controller.list_dns_records().await?;
        let existing = records
            .into_iter()
            .find(|r| r.name == name && r.record_type == record_type);

        match existing {
            Some(record) if record.content == address => {
                debug!("DNS record {} -> {} already current", name, address);
                Ok(())
            }
            Some(record) => {
                debug!("Updating DNS record {} -> {}", name, address);
                self.controller
                    .update_dns_record(&DnsRecord {
                        content: address.to_string(),
                        ttl: DNS_RECORD_TTL,
                        ..record
                    })
                    .await
            }
            None => {
                debug!("Creating DNS record {} -> {}", name, address);
                self.controller
                    .create_dns_record(&DnsRecordSpec {
                        name: name.to_string(),
                        content: address.to_string(),
                        record_type,
                        ttl: DNS_RECORD_TTL,
                    })
                    .await
                    .map(|_| ())
            }
        }
    }
}
