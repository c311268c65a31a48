//! Hook API Server
//!
//! Serves the REST hook surface until a shutdown signal arrives.

use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

use super::rest::RestRouter;
use crate::controlplane::Reconciler;

// =============================================================================
// Server Configuration
// =============================================================================

/// Listen settings for the hook API
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// REST API bind address
    pub rest_addr: SocketAddr,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            rest_addr: SocketAddr::from(([0, 0, 0, 0], 8090)),
        }
    }
}

// =============================================================================
// API Server
// =============================================================================

pub struct ApiServer {
    config: ApiServerConfig,
    reconciler: Arc<Reconciler>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, reconciler: Arc<Reconciler>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            reconciler,
            shutdown_tx,
        }
    }

    /// Run until [`shutdown`](Self::shutdown) is called or the server fails
    pub async fn run(&self) -> Result<()> {
        info!("Starting hook API server on {}", self.config.rest_addr);

        match self.spawn_hook_api().await {
            Ok(result) => result,
            Err(e) => {
                error!("Hook API task failed: {:?}", e);
                Err(Error::Internal(format!("hook API task failed: {}", e)))
            }
        }
    }

    fn spawn_hook_api(&self) -> tokio::task::JoinHandle<Result<()>> {
        let addr = self.config.rest_addr;
        let reconciler = self.reconciler.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move { run_rest_server(addr, reconciler, shutdown_rx).await })
    }

    /// Stop accepting connections and let in-flight hooks finish
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn run_rest_server(
    addr: SocketAddr,
    reconciler: Arc<Reconciler>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let app = RestRouter::new(reconciler).build();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("failed to bind hook API on {}: {}", addr, e)))?;
    info!("Hook API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Hook API draining connections");
        })
        .await
        .map_err(|e| Error::Internal(format!("hook API server error: {}", e)))?;

    Ok(())
}
