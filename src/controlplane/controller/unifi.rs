//! UniFi Network controller adapter
//!
//! Speaks the UniFi Network application's HTTP API. Every operation opens
//! its own session: a fresh client with an empty cookie jar logs in, makes
//! the call and is dropped. Classic controllers serve the API from the root;
//! UniFi OS consoles serve it under `/proxy/network` and log in through
//! `/api/auth/login`.

use crate::config::ControllerConfig;
use crate::domain::controller::{
    Device, DnsRecord, DnsRecordSpec, DnsRecordType, NetworkSpec, PortConfigRequest, VlanNetwork,
};
use crate::domain::ports::SwitchController;
use crate::domain::topology::same_switch;
use crate::domain::vlan::VlanId;
use crate::engine::retry::RetryPolicy;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Pause between attempts of a retried read call
const READ_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Override keys owned by the engine; anything else on a port is left alone
const MANAGED_OVERRIDE_KEYS: &[&str] = &[
    "name",
    "port_vlan_enabled",
    "port_vlan",
    "vlan_mode",
    "tagged_vlan",
    "tx_rate_limit_enabled",
    "tx_rate_limit_kbps_cfg",
    "stormctrl_bcast_enabled",
    "stormctrl_bcast_rate",
    "stormctrl_mcast_enabled",
    "stormctrl_mcast_rate",
    "stormctrl_ucast_enabled",
    "stormctrl_ucast_rate",
    "dot1x_ctrl",
    "stp_port_fast",
    "stp_bpdu_guard",
    "stp_loop_guard",
];

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct Meta {
    rc: String,
    #[serde(default)]
    msg: Option<String>,
}

/// Standard `{meta, data}` response envelope of the classic API
#[derive(Debug, Deserialize)]
struct Envelope {
    meta: Meta,
    #[serde(default)]
    data: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StaticDnsRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    id: String,
    key: String,
    value: String,
    record_type: DnsRecordType,
    ttl: u32,
    #[serde(default = "enabled")]
    enabled: bool,
}

fn enabled() -> bool {
    true
}

impl From<StaticDnsRecord> for DnsRecord {
    fn from(raw: StaticDnsRecord) -> Self {
        DnsRecord {
            id: raw.id,
            name: raw.key,
            content: raw.value,
            record_type: raw.record_type,
            ttl: raw.ttl,
        }
    }
}

/// VLAN id as a number or numeric string, anything else is no VLAN
fn vlan_field(value: Option<&Value>) -> Option<VlanId> {
    let raw = match value? {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    u16::try_from(raw).ok().and_then(|id| VlanId::new(id).ok())
}

fn network_from_value(value: &Value) -> Option<VlanNetwork> {
    Some(VlanNetwork {
        id: value.get("_id")?.as_str()?.to_string(),
        name: value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        purpose: value
            .get("purpose")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        vlan: vlan_field(value.get("vlan")),
        enabled: value.get("enabled").and_then(Value::as_bool).unwrap_or(true),
    })
}

/// Fold a port configuration into a device's `port_overrides` list
fn merge_port_override(overrides: &mut Vec<Value>, request: &PortConfigRequest) -> Result<()> {
    let mut update = match serde_json::to_value(request)? {
        Value::Object(map) => map,
        _ => return Err(Error::Internal("port config did not serialize to an object".into())),
    };
    update.remove("mac");

    let port_idx = u64::from(request.port_idx);
    let existing = overrides
        .iter_mut()
        .find(|o| o.get("port_idx").and_then(Value::as_u64) == Some(port_idx));

    match existing {
        Some(Value::Object(current)) => {
            for key in MANAGED_OVERRIDE_KEYS {
                if !update.contains_key(*key) {
                    current.remove(*key);
                }
            }
            current.extend(update);
        }
        _ => overrides.push(Value::Object(update)),
    }
    Ok(())
}

// =============================================================================
// UniFi Adapter
// =============================================================================

pub struct UnifiController {
    config: ControllerConfig,
    root_certificate: Option<reqwest::Certificate>,
    read_policy: RetryPolicy,
}

impl UnifiController {
    pub fn new(config: ControllerConfig) -> Result<Self> {
        let root_certificate = match &config.cafile {
            Some(path) => {
                let pem = std::fs::read(path)?;
                let certificate = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                    Error::Configuration(format!("invalid CA file {}: {}", path.display(), e))
                })?;
                Some(certificate)
            }
            None => None,
        };

        let read_policy = RetryPolicy::new(config.api_retry_count, READ_RETRY_INTERVAL);
        Ok(Self {
            config,
            root_certificate,
            read_policy,
        })
    }

    // =========================================================================
    // URLs
    // =========================================================================

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn api_root(&self) -> String {
        if self.config.unifi_os {
            format!("{}/proxy/network", self.base_url())
        } else {
            self.base_url().to_string()
        }
    }

    fn login_url(&self) -> String {
        if self.config.unifi_os {
            format!("{}/api/auth/login", self.base_url())
        } else {
            format!("{}/api/login", self.base_url())
        }
    }

    fn site_url(&self, path: &str) -> String {
        format!(
            "{}/api/s/{}/{}",
            self.api_root(),
            urlencoding::encode(&self.config.site),
            path
        )
    }

    fn dns_url(&self, record_id: Option<&str>) -> String {
        let base = format!(
            "{}/v2/api/site/{}/static-dns",
            self.api_root(),
            urlencoding::encode(&self.config.site)
        );
        match record_id {
            Some(id) => format!("{}/{}", base, urlencoding::encode(id)),
            None => base,
        }
    }

    // =========================================================================
    // Transport
    // =========================================================================

    fn map_transport_error(&self, operation: &str, url: &str, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::ControllerTimeout {
                operation: operation.to_string(),
                after: self.config.request_timeout(),
            }
        } else {
            Error::ControllerUnreachable {
                endpoint: url.to_string(),
                reason: e.to_string(),
            }
        }
    }

    fn build_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(self.config.request_timeout());

        if !self.config.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(certificate) = &self.root_certificate {
            builder = builder.add_root_certificate(certificate.clone());
        }

        builder
            .build()
            .map_err(|e| Error::Configuration(format!("controller HTTP client: {}", e)))
    }

    /// Fresh client, logged in
    async fn session(&self) -> Result<reqwest::Client> {
        let client = self.build_client()?;
        let url = self.login_url();

        let response = client
            .post(&url)
            .json(&json!({
                "username": self.config.username,
                "password": self.config.password,
                "remember": false,
            }))
            .send()
            .await
            .map_err(|e| self.map_transport_error("login", &url, e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
            || status == StatusCode::BAD_REQUEST
        {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ControllerAuthentication {
                reason: format!("login rejected with status {}: {}", status.as_u16(), body),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ControllerUnreachable {
                endpoint: url,
                reason: format!("login returned status {}: {}", status.as_u16(), body),
            });
        }

        debug!("Logged in to UniFi controller at {}", self.base_url());
        Ok(client)
    }

    /// One authenticated call; returns the response body as JSON
    async fn call(
        &self,
        operation: &str,
        method: Method,
        url: String,
        body: Option<Value>,
    ) -> Result<Value> {
        let client = self.session().await?;

        let mut request = client.request(method, &url);
        if let Some(body) = &body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| self.map_transport_error(operation, &url, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(operation, &url, e))?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::ControllerAuthentication {
                reason: format!("{} returned status {}", operation, status.as_u16()),
            });
        }
        if !status.is_success() {
            return Err(Error::ControllerRejected {
                operation: operation.to_string(),
                status: status.as_u16(),
                message: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            Error::ControllerResponse(format!("{}: {}", operation, e))
        })
    }

    /// Call a classic endpoint and unwrap its `{meta, data}` envelope
    async fn call_site(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Vec<Value>> {
        let value = self
            .call(operation, method, self.site_url(path), body)
            .await?;
        unwrap_envelope(operation, value)
    }

    /// Retry an idempotent read with the configured attempt count
    async fn read<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        backoff::future::retry_notify(
            self.read_policy.backoff(),
            || {
                let attempt = f();
                async move {
                    attempt.await.map_err(|e| {
                        if e.is_retryable() {
                            backoff::Error::transient(e)
                        } else {
                            backoff::Error::permanent(e)
                        }
                    })
                }
            },
            |e: Error, wait: Duration| {
                warn!("{} failed, retrying in {:?}: {}", operation, wait, e);
            },
        )
        .await
    }

    async fn fetch_devices(&self) -> Result<Vec<Value>> {
        self.read("list_devices", || {
            self.call_site("list_devices", Method::GET, "stat/device", None)
        })
        .await
    }
}

fn unwrap_envelope(operation: &str, value: Value) -> Result<Vec<Value>> {
    let envelope: Envelope = serde_json::from_value(value)
        .map_err(|e| Error::ControllerResponse(format!("{}: {}", operation, e)))?;

    if envelope.meta.rc == "ok" {
        return Ok(envelope.data);
    }

    let message = envelope.meta.msg.unwrap_or_else(|| envelope.meta.rc.clone());
    if message == "api.err.LoginRequired" {
        return Err(Error::ControllerAuthentication { reason: message });
    }
    Err(Error::ControllerRejected {
        operation: operation.to_string(),
        status: 200,
        message,
    })
}

#[async_trait]
impl SwitchController for UnifiController {
    async fn list_devices(&self) -> Result<Vec<Device>> {
        let raw = self.fetch_devices().await?;
        // Devices the model cannot represent are not switches we manage
        Ok(raw
            .into_iter()
            .filter_map(|value| serde_json::from_value::<Device>(value).ok())
            .collect())
    }

    async fn set_port_config(&self, request: &PortConfigRequest) -> Result<()> {
        // One attempt only: the caller owns retries for the whole submission
        let path = format!(
            "stat/device/{}",
            urlencoding::encode(&request.mac.to_ascii_lowercase())
        );
        let devices = self
            .call_site("set_port_config", Method::GET, &path, None)
            .await?;
        let device = devices
            .iter()
            .find(|d| {
                d.get("mac")
                    .and_then(Value::as_str)
                    .map(|mac| same_switch(mac, &request.mac))
                    .unwrap_or(false)
            })
            .ok_or_else(|| Error::ControllerRejected {
                operation: "set_port_config".into(),
                status: 404,
                message: format!("device {} not found", request.mac),
            })?;

        let device_id = match device.get("_id").and_then(Value::as_str) {
            Some(id) => id,
            None if !request.device_id.is_empty() => request.device_id.as_str(),
            None => {
                return Err(Error::ControllerResponse(format!(
                    "device {} has no _id",
                    request.mac
                )))
            }
        };

        let mut overrides = device
            .get("port_overrides")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        merge_port_override(&mut overrides, request)?;

        let path = format!("rest/device/{}", urlencoding::encode(device_id));
        self.call_site(
            "set_port_config",
            Method::PUT,
            &path,
            Some(json!({ "port_overrides": overrides })),
        )
        .await?;
        Ok(())
    }

    async fn list_networks(&self) -> Result<Vec<VlanNetwork>> {
        let raw = self
            .read("list_networks", || {
                self.call_site("list_networks", Method::GET, "rest/networkconf", None)
            })
            .await?;
        Ok(raw.iter().filter_map(network_from_value).collect())
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<VlanNetwork> {
        let body = json!({
            "name": spec.name,
            "purpose": spec.purpose,
            "vlan": spec.vlan.as_u16(),
            "vlan_enabled": true,
            "enabled": spec.enabled,
        });
        let created = self
            .call_site("create_network", Method::POST, "rest/networkconf", Some(body))
            .await?;

        created
            .first()
            .and_then(network_from_value)
            .ok_or_else(|| Error::ControllerResponse("create_network returned no network".into()))
    }

    async fn delete_network(&self, network_id: &str) -> Result<()> {
        let path = format!("rest/networkconf/{}", urlencoding::encode(network_id));
        self.call_site("delete_network", Method::DELETE, &path, None)
            .await?;
        Ok(())
    }

    async fn list_dns_records(&self) -> Result<Vec<DnsRecord>> {
        let value = self
            .read("list_dns_records", || {
                self.call("list_dns_records", Method::GET, self.dns_url(None), None)
            })
            .await?;
        let records: Vec<StaticDnsRecord> = serde_json::from_value(value)
            .map_err(|e| Error::ControllerResponse(format!("list_dns_records: {}", e)))?;
        Ok(records.into_iter().map(DnsRecord::from).collect())
    }

    async fn create_dns_record(&self, spec: &DnsRecordSpec) -> Result<DnsRecord> {
        let body = StaticDnsRecord {
            id: String::new(),
            key: spec.name.clone(),
            value: spec.content.clone(),
            record_type: spec.record_type,
            ttl: spec.ttl,
            enabled: true,
        };
        let value = self
            .call(
                "create_dns_record",
                Method::POST,
                self.dns_url(None),
                Some(serde_json::to_value(&body)?),
            )
            .await?;
        let created: StaticDnsRecord = serde_json::from_value(value)
            .map_err(|e| Error::ControllerResponse(format!("create_dns_record: {}", e)))?;
        Ok(created.into())
    }

    async fn update_dns_record(&self, record: &DnsRecord) -> Result<()> {
        let body = StaticDnsRecord {
            id: record.id.clone(),
            key: record.name.clone(),
            value: record.content.clone(),
            record_type: record.record_type,
            ttl: record.ttl,
            enabled: true,
        };
        self.call(
            "update_dns_record",
            Method::PUT,
            self.dns_url(Some(&record.id)),
            Some(serde_json::to_value(&body)?),
        )
        .await?;
        Ok(())
    }

    async fn delete_dns_record(&self, record_id: &str) -> Result<()> {
        self.call(
            "delete_dns_record",
            Method::DELETE,
            self.dns_url(Some(record_id)),
            None,
        )
        .await?;
        Ok(())
    }
}
