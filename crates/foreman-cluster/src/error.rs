//! Cluster error types.

use thiserror::Error;

/// Result type for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors observed at the leader-duties boundary.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Node registry or job store is unavailable.
    #[error("Store error: {0}")]
    Store(String),

    /// Cloud manager call failed.
    #[error("Cloud manager error: {0}")]
    Cloud(String),

    /// A write lost against a concurrent writer (e.g. duplicate lock key).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Record not found where one was required.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Cron expression could not be parsed.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A cluster-wide invariant no longer holds.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClusterError {
    /// Returns true if the next periodic tick may succeed where this one
    /// failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClusterError::Store(_) | ClusterError::Cloud(_))
    }

    /// Returns true if this error must stop the leader duties instead of
    /// being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClusterError::Configuration(_) | ClusterError::InvariantViolation(_)
        )
    }
}

impl From<foreman_core::ForemanError> for ClusterError {
    fn from(err: foreman_core::ForemanError) -> Self {
        match err {
            foreman_core::ForemanError::Store(msg) => ClusterError::Store(msg),
            foreman_core::ForemanError::Conflict(msg) => ClusterError::Conflict(msg),
            foreman_core::ForemanError::Configuration(msg) => ClusterError::Configuration(msg),
            foreman_core::ForemanError::InvariantViolation(msg) => {
                ClusterError::InvariantViolation(msg)
            }
            other => ClusterError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(ClusterError::Store("connection refused".to_string()).is_retryable());
        assert!(ClusterError::Cloud("api unreachable".to_string()).is_retryable());
        assert!(!ClusterError::Conflict("lock taken".to_string()).is_retryable());
        assert!(!ClusterError::Configuration("empty dead-band".to_string()).is_retryable());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(ClusterError::Configuration("maxNodes < minNodes".to_string()).is_fatal());
        assert!(
            ClusterError::InvariantViolation("lock queued and running".to_string()).is_fatal()
        );
        assert!(!ClusterError::Store("transient".to_string()).is_fatal());
        assert!(!ClusterError::Cloud("transient".to_string()).is_fatal());
    }

    #[test]
    fn test_core_error_conversion() {
        let err: ClusterError = foreman_core::ForemanError::store("down").into();
        assert!(matches!(err, ClusterError::Store(_)));

        let err: ClusterError = foreman_core::ForemanError::conflict("dup").into();
        assert!(matches!(err, ClusterError::Conflict(_)));
    }
}
