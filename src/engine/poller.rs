//! Status Poller
//!
//! Background loop that reads physical link state for every mapped port and
//! forwards status transitions to the host. Errors are logged and the loop
//! carries on with the next cycle; once started it runs for the life of the
//! process.

use super::directory::SwitchDirectory;
use super::mapping::MappingIndex;
use crate::domain::ports::StatusSinkRef;
use crate::domain::topology::PortStatus;
use crate::error::Result;
use crate::metrics::EngineMetrics;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

// =============================================================================
// Poller State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollerState {
    Stopped,
    Running,
}

impl std::fmt::Display for PollerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollerState::Stopped => write!(f, "stopped"),
            PollerState::Running => write!(f, "running"),
        }
    }
}

/// Outcome of one polling cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    /// Mapping entries examined
    pub checked: usize,
    /// Transitions reported to the sink
    pub reported: usize,
    pub unchanged: usize,
    /// Entries whose switch or port could not be resolved
    pub skipped: usize,
    pub report_failures: usize,
    pub completed_at: DateTime<Utc>,
}

impl CycleReport {
    fn new(checked: usize) -> Self {
        Self {
            checked,
            reported: 0,
            unchanged: 0,
            skipped: 0,
            report_failures: 0,
            completed_at: Utc::now(),
        }
    }
}

// =============================================================================
// Status Poller
// =============================================================================

pub struct StatusPoller {
    directory: Arc<SwitchDirectory>,
    mapping: Arc<MappingIndex>,
    sink: StatusSinkRef,
    metrics: Arc<EngineMetrics>,
    interval: Duration,
    state: Mutex<PollerState>,
    /// Status the sink last accepted, per logical port
    last_reported: DashMap<String, PortStatus>,
    last_cycle: Mutex<Option<CycleReport>>,
}

impl StatusPoller {
    pub fn new(
        directory: Arc<SwitchDirectory>,
        mapping: Arc<MappingIndex>,
        sink: StatusSinkRef,
        metrics: Arc<EngineMetrics>,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            directory,
            mapping,
            sink,
            metrics,
            interval,
            state: Mutex::new(PollerState::Stopped),
            last_reported: DashMap::new(),
            last_cycle: Mutex::new(None),
        })
    }

    pub fn state(&self) -> PollerState {
        *self.state.lock()
    }

    pub fn last_cycle(&self) -> Option<CycleReport> {
        self.last_cycle.lock().clone()
    }

    /// Spawn the polling loop. Returns false if it was already running.
    pub fn start(self: &Arc<Self>) -> bool {
        {
            let mut state = self.state.lock();
            if *state == PollerState::Running {
                return false;
            }
            *state = PollerState::Running;
        }

        info!("Starting port status poller (interval {:?})", self.interval);
        let poller = Arc::clone(self);
        tokio::spawn(async move { poller.run().await });
        true
    }

    async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = self.run_cycle().await {
                error!("Port status poll failed: {}", e);
            }
        }
    }

    /// Poll every mapped port once
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let entries = self.mapping.snapshot();
        self.metrics.mapped_ports.set(entries.len() as i64);

        let mapped: HashSet<&str> = entries.iter().map(|(id, _)| id.as_str()).collect();
        self.last_reported.retain(|port_id, _| mapped.contains(port_id.as_str()));

        let mut report = CycleReport::new(entries.len());
        if entries.is_empty() {
            *self.last_cycle.lock() = Some(report.clone());
            self.metrics.record_poll_cycle(true);
            return Ok(report);
        }

        let inventory = match self.directory.refresh().await {
            Ok(inventory) => inventory,
            Err(e) => {
                self.metrics.record_poll_cycle(false);
                return Err(e);
            }
        };

        for (port_id, entry) in &entries {
            let up = match inventory.resolve(&entry.switch_id, &entry.port_id) {
                Ok(target) => inventory.port_entry(&target).map(|p| p.up),
                Err(e) => {
                    warn!("Skipping status of port {}: {}", port_id, e);
                    report.skipped += 1;
                    continue;
                }
            };
            let Some(up) = up else {
                report.skipped += 1;
                continue;
            };
            let status = PortStatus::from_link_up(up);

            if self.previous_status(port_id).await == Some(status) {
                report.unchanged += 1;
                continue;
            }

            match self.sink.report_port_status_changed(port_id, status).await {
                Ok(()) => {
                    info!("Port {} is now {}", port_id, status);
                    self.last_reported.insert(port_id.clone(), status);
                    self.metrics
                        .status_reports
                        .with_label_values(&[status.to_string().as_str()])
                        .inc();
                    report.reported += 1;
                }
                Err(e) => {
                    warn!("Failed to report status of port {}: {}", port_id, e);
                    report.report_failures += 1;
                }
            }
        }

        debug!(
            "Status poll: {} checked, {} reported, {} skipped",
            report.checked, report.reported, report.skipped
        );
        report.completed_at = Utc::now();
        *self.last_cycle.lock() = Some(report.clone());
        self.metrics.record_poll_cycle(true);
        Ok(report)
    }

    /// Last accepted status, seeded from the sink the first time a port is seen
    async fn previous_status(&self, port_id: &str) -> Option<PortStatus> {
        let known = self.last_reported.get(port_id).map(|status| *status);
        if known.is_some() {
            return known;
        }

        match self.sink.current_status(port_id).await {
            Ok(Some(status)) => {
                self.last_reported.insert(port_id.to_string(), status);
                Some(status)
            }
            Ok(None) => None,
            Err(e) => {
                debug!("No current status for port {}: {}", port_id, e);
                None
            }
        }
    }
}
