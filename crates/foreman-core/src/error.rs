//! Unified error types for all layers of the framework.

use thiserror::Error;

/// Unified error type for Foreman.
///
/// This enum provides the error variants shared across the cluster core and
/// any embedding application: domain lookups, store and cloud failures,
/// configuration problems, and invariant breaches.
#[derive(Error, Debug)]
pub enum ForemanError {
    // ============ Domain Errors ============
    /// Resource not found
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict error (e.g., duplicate lock key)
    #[error("Conflict: {0}")]
    Conflict(String),

    // ============ Infrastructure Errors ============
    /// Store error (node registry or job store)
    #[error("Store error: {0}")]
    Store(String),

    /// External service error
    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    // ============ Internal Errors ============
    /// A cluster-wide invariant no longer holds
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ForemanError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::Store(_) => "STORE_ERROR",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::InvariantViolation(_) => "INVARIANT_VIOLATION",
            Self::Internal(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a not found error for a resource.
    #[must_use]
    pub fn not_found<T: ToString>(resource_type: &'static str, id: T) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict<T: Into<String>>(message: T) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates a store error.
    #[must_use]
    pub fn store<T: Into<String>>(message: T) -> Self {
        Self::Store(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }

    /// Checks if this error is retriable on a later tick.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Store(_) | Self::ExternalService { .. } | Self::Timeout(_)
        )
    }

    /// Checks if this error must stop the process rather than be retried.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::InvariantViolation(_))
    }
}

impl From<serde_json::Error> for ForemanError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON serialization error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ForemanError::not_found("Node", 1).error_code(), "NOT_FOUND");
        assert_eq!(
            ForemanError::validation("bad cron").error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            ForemanError::conflict("duplicate lock").error_code(),
            "CONFLICT"
        );
        assert_eq!(
            ForemanError::store("connection refused").error_code(),
            "STORE_ERROR"
        );
        assert_eq!(
            ForemanError::InvariantViolation("lock in both sets".to_string()).error_code(),
            "INVARIANT_VIOLATION"
        );
        assert_eq!(ForemanError::internal("oops").error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_retriable_errors() {
        assert!(ForemanError::store("connection lost").is_retriable());
        assert!(ForemanError::Timeout("request timed out".to_string()).is_retriable());
        assert!(ForemanError::ExternalService {
            service: "cloud".to_string(),
            message: "unreachable".to_string()
        }
        .is_retriable());
        assert!(!ForemanError::not_found("Node", 1).is_retriable());
        assert!(!ForemanError::validation("bad input").is_retriable());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(ForemanError::Configuration("empty dead-band".to_string()).is_fatal());
        assert!(ForemanError::InvariantViolation("dup lock".to_string()).is_fatal());
        assert!(!ForemanError::store("transient").is_fatal());
    }

    #[test]
    fn test_error_constructors() {
        let not_found = ForemanError::not_found("Node", "node-3");
        assert!(not_found.to_string().contains("Node"));

        let validation = ForemanError::validation("invalid cron expression");
        assert!(validation.to_string().contains("invalid cron expression"));

        let conflict = ForemanError::conflict("lock already queued");
        assert!(conflict.to_string().contains("lock already queued"));
    }
}
