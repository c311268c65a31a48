//! Error types for the switchport reconciler
//!
//! Provides structured error types for every stage of reconciliation:
//! target resolution, convergence, trunk membership, controller
//! connectivity, and the host-facing adapters.

use crate::domain::topology::PortRef;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Resolution Errors
// =============================================================================

/// A physical target could not be located in the controller inventory
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("switch {switch_id} not found in controller inventory")]
    SwitchNotFound { switch_id: String },

    #[error("port {port} not found on switch {switch_id}")]
    PortNotFound { switch_id: String, port: PortRef },
}

// =============================================================================
// Convergence Errors
// =============================================================================

/// Pushing a desired configuration to a switch port failed
#[derive(Error, Debug)]
pub enum ConvergenceError {
    #[error("cannot resolve port {port} on switch {switch_id}: {source}")]
    ResolutionFailed {
        switch_id: String,
        port: PortRef,
        #[source]
        source: Box<Error>,
    },

    #[error(
        "failed to configure port {port_idx} on switch {switch_id} after {attempts} attempt(s): {source}"
    )]
    ApplyFailed {
        switch_id: String,
        port_idx: u32,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },
}

/// One failed physical link of a multi-link logical port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFailure {
    pub switch_id: String,
    pub port: PortRef,
    pub reason: String,
}

impl std::fmt::Display for LinkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}: {}", self.switch_id, self.port, self.reason)
    }
}

fn join_failures(failures: &[LinkFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Unified error type for the reconciler
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Controller Connectivity Errors
    // =========================================================================
    #[error("Controller unreachable at {endpoint}: {reason}")]
    ControllerUnreachable { endpoint: String, reason: String },

    #[error("Controller authentication failed: {reason}")]
    ControllerAuthentication { reason: String },

    #[error("Controller {operation} timed out after {after:?}")]
    ControllerTimeout { operation: String, after: Duration },

    #[error("Controller rejected {operation} (status {status}): {message}")]
    ControllerRejected {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("Controller response could not be decoded: {0}")]
    ControllerResponse(String),

    // =========================================================================
    // Reconciliation Errors
    // =========================================================================
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Convergence(#[from] ConvergenceError),

    #[error("Trunk membership for {parent_port_id} unavailable: {reason}")]
    TrunkMembershipUnavailable {
        parent_port_id: String,
        reason: String,
    },

    #[error("Trunk configuration failed for {port_id}: {reason}")]
    TrunkConfig { port_id: String, reason: String },

    #[error("{} of {attempted} link(s) failed for port {port_id}: {}", .failures.len(), join_failures(.failures))]
    LinkFailures {
        port_id: String,
        attempted: usize,
        failures: Vec<LinkFailure>,
    },

    // =========================================================================
    // Host Adapter Errors
    // =========================================================================
    #[error("Host API error: {operation} - {reason}")]
    HostApi { operation: String, reason: String },

    #[error("Not found: {kind}/{id}")]
    NotFound { kind: String, id: String },

    // =========================================================================
    // API Errors
    // =========================================================================
    #[error("API request validation failed: {0}")]
    ApiValidation(String),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action to take when an operation fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Retry with the configured backoff
    RetryWithBackoff,
    /// Retry after a specific duration
    RetryAfter(Duration),
    /// Don't retry, the same request will fail again
    NoRetry,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::ControllerUnreachable { .. }
            | Error::ControllerTimeout { .. }
            | Error::HostApi { .. }
            | Error::TrunkMembershipUnavailable { .. } => ErrorAction::RetryWithBackoff,

            // Throttled or server-side failures
            Error::ControllerRejected { status, .. } if *status == 429 => {
                ErrorAction::RetryAfter(Duration::from_secs(5))
            }
            Error::ControllerRejected { status, .. } if *status >= 500 => {
                ErrorAction::RetryWithBackoff
            }

            // Requests the controller will keep refusing
            Error::ControllerRejected { .. }
            | Error::ControllerAuthentication { .. }
            | Error::Resolution(_)
            | Error::Configuration(_)
            | Error::ApiValidation(_)
            | Error::TrunkConfig { .. }
            | Error::NotFound { .. }
            | Error::YamlParse(_) => ErrorAction::NoRetry,

            Error::Convergence(ConvergenceError::ResolutionFailed { .. }) => ErrorAction::NoRetry,

            // All other errors - retry with backoff
            _ => ErrorAction::RetryWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRetry)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ControllerUnreachable { .. }
                | Error::ControllerTimeout { .. }
                | Error::HostApi { .. }
        )
    }

    /// Short machine-readable kind, used in API responses and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Internal(_) => "internal",
            Error::Configuration(_) => "configuration",
            Error::ControllerUnreachable { .. } => "controller_unreachable",
            Error::ControllerAuthentication { .. } => "controller_authentication",
            Error::ControllerTimeout { .. } => "controller_timeout",
            Error::ControllerRejected { .. } => "controller_rejected",
            Error::ControllerResponse(_) => "controller_response",
            Error::Resolution(ResolutionError::SwitchNotFound { .. }) => "switch_not_found",
            Error::Resolution(ResolutionError::PortNotFound { .. }) => "port_not_found",
            Error::Convergence(ConvergenceError::ResolutionFailed { .. }) => "resolution_failed",
            Error::Convergence(ConvergenceError::ApplyFailed { .. }) => "apply_failed",
            Error::TrunkMembershipUnavailable { .. } => "trunk_membership_unavailable",
            Error::TrunkConfig { .. } => "trunk_config",
            Error::LinkFailures { .. } => "link_failures",
            Error::HostApi { .. } => "host_api",
            Error::NotFound { .. } => "not_found",
            Error::ApiValidation(_) => "validation",
            Error::JsonParse(_) => "json_parse",
            Error::YamlParse(_) => "yaml_parse",
            Error::Io(_) => "io",
        }
    }
}

/// Result type alias for the reconciler
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_actions() {
        let err = Error::ControllerRejected {
            operation: "set_port_config".into(),
            status: 429,
            message: "slow down".into(),
        };
        assert_eq!(err.action(), ErrorAction::RetryAfter(Duration::from_secs(5)));

        let err = Error::Configuration("bad config".into());
        assert_eq!(err.action(), ErrorAction::NoRetry);

        let err = Error::ControllerRejected {
            operation: "set_port_config".into(),
            status: 502,
            message: "bad gateway".into(),
        };
        assert_eq!(err.action(), ErrorAction::RetryWithBackoff);
    }

    #[test]
    fn test_error_retryable() {
        let transient = Error::ControllerUnreachable {
            endpoint: "https://unifi.local:8443".into(),
            reason: "connection refused".into(),
        };
        assert!(transient.is_retryable());
        assert!(transient.is_transient());

        let auth = Error::ControllerAuthentication {
            reason: "invalid credentials".into(),
        };
        assert!(!auth.is_retryable());
        assert!(!auth.is_transient());

        let resolution = Error::from(ResolutionError::SwitchNotFound {
            switch_id: "aa:bb:cc:dd:ee:ff".into(),
        });
        assert!(!resolution.is_retryable());
    }

    #[test]
    fn test_link_failures_message() {
        let err = Error::LinkFailures {
            port_id: "trunk-parent".into(),
            attempted: 2,
            failures: vec![LinkFailure {
                switch_id: "aa:bb:cc:dd:ee:ff".into(),
                port: PortRef::Index(4),
                reason: "timeout".into(),
            }],
        };
        let message = err.to_string();
        assert!(message.starts_with("1 of 2 link(s) failed for port trunk-parent"));
        assert!(message.contains("aa:bb:cc:dd:ee:ff/4: timeout"));
        assert_eq!(err.kind(), "link_failures");
    }
}
