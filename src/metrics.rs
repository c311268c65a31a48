//! Engine Metrics
//!
//! Prometheus collectors for convergence and polling. Collectors are created
//! unregistered so every engine instance (and every test) owns its own set;
//! the binary registers one set into the default registry.

use crate::error::{Error, Result};
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Prefix shared by every collector
pub const METRIC_NAMESPACE: &str = "switchport_reconciler";

#[derive(Clone)]
pub struct EngineMetrics {
    /// Convergence pushes by outcome (`success`, `failure`)
    pub pushes: IntCounterVec,
    /// Individual submissions to the controller, retries included
    pub push_attempts: IntCounter,
    /// Entries currently held by the mapping index
    pub mapped_ports: IntGauge,
    /// Status transitions reported upward, by status
    pub status_reports: IntCounterVec,
    /// Poller cycles by outcome (`ok`, `error`)
    pub poll_cycles: IntCounterVec,
}

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help).namespace(METRIC_NAMESPACE)
}

fn metric_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}

impl EngineMetrics {
    pub fn new() -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            pushes: IntCounterVec::new(
                opts("pushes_total", "Port configuration pushes by result"),
                &["result"],
            )
            .map_err(metric_error)?,
            push_attempts: IntCounter::with_opts(opts(
                "push_attempts_total",
                "Port configuration submissions including retries",
            ))
            .map_err(metric_error)?,
            mapped_ports: IntGauge::with_opts(opts(
                "mapped_ports",
                "Logical ports with a recorded physical target",
            ))
            .map_err(metric_error)?,
            status_reports: IntCounterVec::new(
                opts("status_reports_total", "Port status changes reported by status"),
                &["status"],
            )
            .map_err(metric_error)?,
            poll_cycles: IntCounterVec::new(
                opts("poll_cycles_total", "Status poller cycles by result"),
                &["result"],
            )
            .map_err(metric_error)?,
        }))
    }

    /// Register every collector into `registry`
    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry
            .register(Box::new(self.pushes.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(self.push_attempts.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(self.mapped_ports.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(self.status_reports.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(self.poll_cycles.clone()))
            .map_err(metric_error)?;
        Ok(())
    }

    pub fn record_push(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.pushes.with_label_values(&[result]).inc();
    }

    pub fn record_poll_cycle(&self, ok: bool) {
        let result = if ok { "ok" } else { "error" };
        self.poll_cycles.with_label_values(&[result]).inc();
    }
}

impl std::fmt::Debug for EngineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineMetrics")
            .field("push_attempts", &self.push_attempts.get())
            .field("mapped_ports", &self.mapped_ports.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_gather() {
        let metrics = EngineMetrics::new().unwrap();
        let registry = Registry::new();
        metrics.register(&registry).unwrap();

        metrics.record_push(true);
        metrics.record_push(false);
        metrics.record_push(true);
        metrics.mapped_ports.set(4);

        assert_eq!(metrics.pushes.with_label_values(&["success"]).get(), 2);
        assert_eq!(metrics.pushes.with_label_values(&["failure"]).get(), 1);

        let names: Vec<_> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"switchport_reconciler_pushes_total".to_string()));
        assert!(names.contains(&"switchport_reconciler_mapped_ports".to_string()));
    }

    #[test]
    fn test_double_registration_fails() {
        let metrics = EngineMetrics::new().unwrap();
        let registry = Registry::new();
        metrics.register(&registry).unwrap();
        assert!(metrics.register(&registry).is_err());
    }
}
