//! Switchport Reconciler
//!
//! Service binary: loads the configuration, builds the controller and host
//! adapters, starts the reconciler and serves the hook API alongside the
//! health and Prometheus endpoints.

use anyhow::{bail, Context};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use switchport_reconciler::{
    ApiServer, ApiServerConfig, ControllerFactory, ControllerKind, EngineConfig, EngineMetrics,
    HostFactory, HostKind, Reconciler,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Switchport Reconciler - converges logical ports onto UniFi switch ports
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "SWITCHPORT_CONFIG")]
    config: Option<PathBuf>,

    /// REST hook API bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8090")]
    api_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Run against in-memory controller and host adapters
    #[arg(long, env = "STANDALONE")]
    standalone: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting Switchport Reconciler");
    info!("  Version: {}", switchport_reconciler::VERSION);
    info!("  Hook API: {}", args.api_addr);
    info!("  Standalone mode: {}", args.standalone);

    let config = load_config(&args)?;
    info!(
        "  Controller: {:?} {} (site {})",
        config.controller.kind, config.controller.url, config.controller.site
    );

    let metrics = EngineMetrics::new().context("creating metrics")?;
    metrics
        .register(prometheus::default_registry())
        .context("registering metrics")?;

    let controller =
        ControllerFactory::create(&config.controller).context("creating controller adapter")?;
    let host = HostFactory::create(&config.host).context("creating host adapter")?;

    let reconciler = Reconciler::new(config, controller, host.topology, host.sink, metrics);
    reconciler.initialize().await;

    // Start health server
    let health_addr = parse_addr(&args.health_addr, "health")?;
    let health_reconciler = reconciler.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(health_addr, health_reconciler).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = parse_addr(&args.metrics_addr, "metrics")?;
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(metrics_addr).await {
            error!("Metrics server error: {}", e);
        }
    });

    let api_server = Arc::new(ApiServer::new(
        ApiServerConfig {
            rest_addr: parse_addr(&args.api_addr, "REST API")?,
        },
        reconciler,
    ));

    let signal_server = api_server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, shutting down");
            signal_server.shutdown();
        }
    });

    api_server.run().await.context("hook API server")?;

    info!("Reconciler shutdown complete");
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_yaml_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None if args.standalone => EngineConfig::default(),
        None => bail!("--config is required unless running with --standalone"),
    };

    if args.standalone {
        config.controller.kind = ControllerKind::Memory;
        config.host.kind = HostKind::Memory;
        config.normalize();
        config.validate().context("validating configuration")?;
    }
    Ok(config)
}

fn parse_addr(raw: &str, what: &str) -> anyhow::Result<SocketAddr> {
    raw.parse()
        .with_context(|| format!("invalid {} address: {}", what, raw))
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for noisy in ["hyper=warn", "tower=warn", "reqwest=info", "axum=info"] {
        if let Ok(directive) = noisy.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

fn text_response(
    status: hyper::StatusCode,
    body: impl Into<hyper::Body>,
) -> hyper::Response<hyper::Body> {
    let mut response = hyper::Response::new(body.into());
    *response.status_mut() = status;
    response
}

async fn run_health_server(addr: SocketAddr, reconciler: Arc<Reconciler>) -> anyhow::Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let reconciler = reconciler.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let reconciler = reconciler.clone();
                async move {
                    let response = match req.uri().path() {
                        "/healthz" | "/livez" => text_response(StatusCode::OK, "ok"),
                        "/readyz" if reconciler.status().controller_reachable => {
                            text_response(StatusCode::OK, "ok")
                        }
                        "/readyz" => {
                            text_response(StatusCode::SERVICE_UNAVAILABLE, "controller unreachable")
                        }
                        _ => text_response(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .context("health server")?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: SocketAddr) -> anyhow::Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};
    use prometheus::{Encoder, TextEncoder};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let mut buffer = Vec::new();
                    match encoder.encode(&prometheus::gather(), &mut buffer) {
                        Ok(()) => {
                            let mut response = text_response(StatusCode::OK, buffer);
                            if let Ok(content_type) =
                                encoder.format_type().parse::<hyper::header::HeaderValue>()
                            {
                                response
                                    .headers_mut()
                                    .insert(hyper::header::CONTENT_TYPE, content_type);
                            }
                            response
                        }
                        Err(e) => text_response(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            format!("encoding metrics: {}", e),
                        ),
                    }
                }
                _ => text_response(StatusCode::NOT_FOUND, "not found"),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .context("metrics server")?;

    Ok(())
}
