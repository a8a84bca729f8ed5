//! Error types for expansion trials.
//!
//! Classifies failures into the outcomes a trial can end with: skipped,
//! transient (tolerated inside the fault loop), or fatal.

use std::time::Duration;
use thiserror::Error;

/// Error type for trial operations
#[derive(Error, Debug)]
pub enum TrialError {
    /// The cluster is not in a state where the trial may start (skip, not fail)
    #[error("Precondition not met: {0}")]
    PreconditionNotMet(String),

    /// The scale-out request was rejected or could not be issued
    #[error("Capacity expansion failed: {0}")]
    ExpansionFailed(String),

    /// No live instance of the class exists at the requested ordinal
    #[error("No {class} instance at ordinal {ordinal}")]
    InstanceNotFound { class: String, ordinal: usize },

    /// A named platform object does not exist (any more)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A bounded wait ran out of time
    #[error("Deadline exceeded after {elapsed:?} waiting for {what}")]
    DeadlineExceeded { what: String, elapsed: Duration },

    /// The cluster did not report healthy after the trial
    #[error("Cluster health check failed: {0}")]
    HealthCheckFailed(String),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Missing required field in a cluster resource
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TrialError {
    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TrialError::InstanceNotFound { .. } | TrialError::NotFound(_)
        ) || matches!(self, TrialError::Kube(kube::Error::Api(e)) if e.code == 404)
    }

    /// Check if the trial should be reported as skipped rather than failed
    pub fn is_skip(&self) -> bool {
        matches!(self, TrialError::PreconditionNotMet(_))
    }

    /// Check if a fault-injection iteration may swallow this error and continue.
    ///
    /// Kills race against rescheduling, so a missing instance or a flaky API
    /// call is expected mid-trial.
    pub fn is_transient(&self) -> bool {
        match self {
            TrialError::InstanceNotFound { .. } | TrialError::NotFound(_) => true,
            TrialError::Kube(e) => {
                matches!(
                    e,
                    kube::Error::Api(api_err)
                        if api_err.code == 404 || api_err.code == 409 || api_err.code == 429 || api_err.code >= 500
                ) || matches!(e, kube::Error::Service(_))
            }
            _ => false,
        }
    }

    /// Stable, machine-readable failure reason
    pub fn reason(&self) -> &'static str {
        match self {
            TrialError::PreconditionNotMet(_) => "PreconditionNotMet",
            TrialError::ExpansionFailed(_) => "ExpansionFailed",
            TrialError::InstanceNotFound { .. } => "InstanceNotFound",
            TrialError::NotFound(_) => "NotFound",
            TrialError::DeadlineExceeded { .. } => "DeadlineExceeded",
            TrialError::HealthCheckFailed(_) => "HealthCheckFailed",
            TrialError::Kube(_) => "KubernetesApiError",
            TrialError::MissingField(_) => "MissingField",
            TrialError::Config(_) => "ConfigError",
            TrialError::Serialization(_) => "SerializationError",
        }
    }
}

/// Result type alias for trial operations
pub type Result<T> = std::result::Result<T, TrialError>;
