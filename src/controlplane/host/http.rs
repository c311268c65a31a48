//! HTTP host adapter
//!
//! Talks to the host framework's REST API for topology lookups and status
//! reports. All calls share one `reqwest::Client` with the configured
//! timeout; an optional bearer token is sent on every request.

use crate::config::HostConfig;
use crate::domain::ports::{StatusSink, TopologySource};
use crate::domain::topology::{Network, PortStatus, Subport};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Port as returned by `GET /v1/ports/{id}`; only the status is read
#[derive(Debug, Deserialize)]
struct PortView {
    #[serde(default)]
    status: Option<PortStatus>,
}

#[derive(Debug, Serialize)]
struct StatusUpdate {
    status: PortStatus,
}

pub struct HttpHost {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpHost {
    pub fn new(config: &HostConfig) -> Result<Self> {
        let base_url = config
            .url
            .clone()
            .ok_or_else(|| Error::Configuration("host.url is required for kind http".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("host HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> String {
        let path: Vec<String> = segments
            .iter()
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        format!("{}/v1/{}", self.base_url, path.join("/"))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| Error::HostApi {
                operation: operation.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::HostApi {
            operation: operation.to_string(),
            reason: format!("status {}: {}", status.as_u16(), body),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        kind: &str,
        id: &str,
        url: String,
    ) -> Result<T> {
        debug!("GET {}", url);
        let response = self.send(operation, self.client.get(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound {
                kind: kind.to_string(),
                id: id.to_string(),
            });
        }
        response.json().await.map_err(|e| Error::HostApi {
            operation: operation.to_string(),
            reason: format!("invalid response body: {}", e),
        })
    }
}

#[async_trait]
impl StatusSink for HttpHost {
    async fn report_port_status_changed(&self, port_id: &str, status: PortStatus) -> Result<()> {
        let url = self.url(&["ports", port_id, "status"]);
        let response = self
            .send(
                "report_port_status",
                self.client.put(&url).json(&StatusUpdate { status }),
            )
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound {
                kind: "port".into(),
                id: port_id.to_string(),
            });
        }
        Ok(())
    }

    async fn current_status(&self, port_id: &str) -> Result<Option<PortStatus>> {
        let url = self.url(&["ports", port_id]);
        match self.get_json::<PortView>("get_port", "port", port_id, url).await {
            Ok(view) => Ok(view.status),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl TopologySource for HttpHost {
    async fn get_subports_for_trunk(&self, parent_port_id: &str) -> Result<Vec<Subport>> {
        let url = self.url(&["trunks", parent_port_id, "subports"]);
        self.get_json("get_subports_for_trunk", "trunk", parent_port_id, url)
            .await
    }

    async fn get_network(&self, network_id: &str) -> Result<Network> {
        let url = self.url(&["networks", network_id]);
        self.get_json("get_network", "network", network_id, url).await
    }

    async fn list_networks(&self) -> Result<Vec<Network>> {
        let url = self.url(&["networks"]);
        self.get_json("list_networks", "networks", "", url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::extract::Path;
    use axum::http::HeaderMap;
    use axum::routing::{get, put};
    use axum::{Json, Router};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn host(url: String) -> HttpHost {
        HttpHost::new(&HostConfig {
            kind: crate::config::HostKind::Http,
            url: Some(url),
            token: Some("secret".into()),
            request_timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_url_encodes_segments() {
        let host = host("http://host.local/".into());
        assert_eq!(
            host.url(&["ports", "a/b", "status"]),
            "http://host.local/v1/ports/a%2Fb/status"
        );
    }

    #[tokio::test]
    async fn test_topology_calls() {
        let router = Router::new()
            .route(
                "/v1/trunks/:id/subports",
                get(|Path(id): Path<String>| async move {
                    assert_eq!(id, "parent-1");
                    Json(serde_json::json!([{"port_id": "sp-1", "segmentation_id": 200}]))
                }),
            )
            .route(
                "/v1/networks/:id",
                get(|Path(id): Path<String>| async move {
                    if id == "net-1" {
                        Ok(Json(serde_json::json!({
                            "id": "net-1",
                            "provider:network_type": "vlan",
                            "provider:segmentation_id": 100
                        })))
                    } else {
                        Err(axum::http::StatusCode::NOT_FOUND)
                    }
                }),
            );
        let host = host(serve(router).await);

        let subports = host.get_subports_for_trunk("parent-1").await.unwrap();
        assert_eq!(subports.len(), 1);
        assert_eq!(subports[0].segmentation_id.as_u16(), 200);

        let network = host.get_network("net-1").await.unwrap();
        assert_eq!(network.vlan().map(|v| v.as_u16()), Some(100));

        assert_matches!(host.get_network("net-2").await, Err(Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_status_report_sends_token() {
        let seen: Arc<Mutex<Vec<(String, String, serde_json::Value)>>> = Arc::default();
        let recorder = seen.clone();
        let router = Router::new()
            .route(
                "/v1/ports/:id/status",
                put(
                    move |Path(id): Path<String>,
                          headers: HeaderMap,
                          Json(body): Json<serde_json::Value>| {
                        let recorder = recorder.clone();
                        async move {
                            let auth = headers
                                .get("authorization")
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or_default()
                                .to_string();
                            recorder.lock().await.push((id, auth, body));
                            axum::http::StatusCode::NO_CONTENT
                        }
                    },
                ),
            )
            .route(
                "/v1/ports/:id",
                get(|| async { Json(serde_json::json!({"id": "p1", "status": "ACTIVE"})) }),
            );
        let host = host(serve(router).await);

        host.report_port_status_changed("p1", PortStatus::Down)
            .await
            .unwrap();
        assert_eq!(
            host.current_status("p1").await.unwrap(),
            Some(PortStatus::Active)
        );

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "p1");
        assert_eq!(seen[0].1, "Bearer secret");
        assert_eq!(seen[0].2, serde_json::json!({"status": "DOWN"}));
    }

    #[tokio::test]
    async fn test_server_error_is_host_api_error() {
        let router = Router::new().route(
            "/v1/networks",
            get(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let host = host(serve(router).await);

        let err = host.list_networks().await.unwrap_err();
        assert_matches!(err, Error::HostApi { ref reason, .. } if reason.contains("503"));
        assert!(err.is_retryable());
    }
}
