//! Convergence Pusher
//!
//! Applies a [`DesiredPortConfig`] to one switch port: resolve the target,
//! render the request, submit it with bounded fixed-interval retries. The
//! pusher never touches the mapping index; callers record the outcome.

use super::builder::DesiredPortConfig;
use super::directory::{PhysicalPortRef, SwitchDirectory};
use super::retry::RetryPolicy;
use crate::domain::ports::ControllerRef;
use crate::domain::topology::PortRef;
use crate::error::{ConvergenceError, Error};
use crate::metrics::EngineMetrics;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct ConvergencePusher {
    directory: Arc<SwitchDirectory>,
    controller: ControllerRef,
    policy: RetryPolicy,
    metrics: Arc<EngineMetrics>,
}

impl ConvergencePusher {
    pub fn new(
        directory: Arc<SwitchDirectory>,
        controller: ControllerRef,
        policy: RetryPolicy,
        metrics: Arc<EngineMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            directory,
            controller,
            policy,
            metrics,
        })
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Converge one port and return the resolved target it was applied to
    pub async fn push(
        &self,
        switch_id: &str,
        port: &PortRef,
        desired: &DesiredPortConfig,
    ) -> Result<PhysicalPortRef, ConvergenceError> {
        let target = match self.directory.resolve(switch_id, port).await {
            Ok(target) => target,
            Err(e) => {
                self.metrics.record_push(false);
                return Err(ConvergenceError::ResolutionFailed {
                    switch_id: switch_id.to_string(),
                    port: port.clone(),
                    source: Box::new(e),
                });
            }
        };

        let request = desired.render(&target);
        debug!(
            "Pushing {} config to {} (vlan {:?})",
            desired.vlan_mode, target, request.port_vlan
        );

        let attempts = AtomicU32::new(0);
        let result = backoff::future::retry_notify(
            self.policy.backoff(),
            || {
                let attempts = &attempts;
                let request = &request;
                async move {
                    attempts.fetch_add(1, Ordering::Relaxed);
                    self.metrics.push_attempts.inc();
                    self.controller
                        .set_port_config(request)
                        .await
                        .map_err(|e| {
                            if e.is_retryable() {
                                backoff::Error::transient(e)
                            } else {
                                backoff::Error::permanent(e)
                            }
                        })
                }
            },
            |e: Error, wait: Duration| {
                warn!(
                    "Failed to configure port {}, retrying in {:?}: {}",
                    target, wait, e
                );
            },
        )
        .await;

        match result {
            Ok(()) => {
                self.metrics.record_push(true);
                info!(
                    "Configured port {} on switch {} ({})",
                    target.port_idx, target.switch_id, desired.vlan_mode
                );
                Ok(target)
            }
            Err(e) => {
                self.metrics.record_push(false);
                Err(ConvergenceError::ApplyFailed {
                    switch_id: target.switch_id,
                    port_idx: target.port_idx,
                    attempts: attempts.load(Ordering::Relaxed),
                    source: Box::new(e),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureFlags;
    use crate::controlplane::controller::InMemoryController;
    use crate::domain::vlan::VlanId;
    use crate::engine::builder::build_access_config;
    use assert_matches::assert_matches;
    use tokio::time::Instant;

    const SWITCH: &str = "aa:bb:cc:dd:ee:ff";

    fn setup(attempts: u32) -> (Arc<InMemoryController>, Arc<ConvergencePusher>) {
        let controller = InMemoryController::new();
        controller.add_switch(SWITCH, 8);
        let directory = SwitchDirectory::new(controller.clone(), Duration::ZERO);
        let pusher = ConvergencePusher::new(
            directory,
            controller.clone(),
            RetryPolicy::new(attempts, Duration::from_secs(1)),
            EngineMetrics::new().unwrap(),
        );
        (controller, pusher)
    }

    fn desired() -> DesiredPortConfig {
        build_access_config(VlanId::new(100).unwrap(), "p", &FeatureFlags::default())
    }

    #[tokio::test]
    async fn test_push_success() {
        let (controller, pusher) = setup(3);

        let target = pusher
            .push(SWITCH, &PortRef::Index(3), &desired())
            .await
            .unwrap();

        assert_eq!(target.port_idx, 3);
        let submitted = controller.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].port_vlan, Some(100));
        assert_eq!(submitted[0].port_idx, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound() {
        let (controller, pusher) = setup(3);
        controller.fail_submissions(true);

        let start = Instant::now();
        let err = pusher
            .push(SWITCH, &PortRef::Index(3), &desired())
            .await
            .unwrap_err();

        assert_matches!(err, ConvergenceError::ApplyFailed { attempts: 3, port_idx: 3, .. });
        assert_eq!(controller.submission_attempts(), 3);

        // Two sleeps of one second between three attempts
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let (controller, pusher) = setup(3);
        controller.fail_next_submissions(2);

        pusher
            .push(SWITCH, &PortRef::Index(3), &desired())
            .await
            .unwrap();

        assert_eq!(controller.submission_attempts(), 3);
        assert_eq!(controller.submitted().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_request_not_retried() {
        let (controller, pusher) = setup(5);
        controller.reject_submissions(true);

        let err = pusher
            .push(SWITCH, &PortRef::Index(3), &desired())
            .await
            .unwrap_err();

        assert_matches!(err, ConvergenceError::ApplyFailed { attempts: 1, .. });
        assert_eq!(controller.submission_attempts(), 1);
    }

    #[tokio::test]
    async fn test_resolution_failure_not_retried() {
        let (controller, pusher) = setup(3);

        let err = pusher
            .push("11:22:33:44:55:66", &PortRef::Index(3), &desired())
            .await
            .unwrap_err();
        assert_matches!(err, ConvergenceError::ResolutionFailed { .. });

        let err = pusher
            .push(SWITCH, &PortRef::Name("uplink".into()), &desired())
            .await
            .unwrap_err();
        assert_matches!(err, ConvergenceError::ResolutionFailed { source, .. } => {
            assert_eq!(source.kind(), "port_not_found");
        });

        assert_eq!(controller.submission_attempts(), 0);
    }
}
