//! Error types for the dispatch engine.
//!
//! Per-message failures (network, rejection, acknowledgement) are contained
//! by the dispatcher and never abort sibling dispatches; only configuration
//! problems, a failed health gate, a queue receive failure, or an exhausted
//! error budget surface as engine-level errors.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error conditions raised by the dispatch engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Invalid or incomplete configuration.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// What was wrong with the configuration
        message: String,
    },

    /// Worker health endpoint never answered within the wait budget.
    #[error("worker health check failed after {waited_ms} ms")]
    HealthCheck {
        /// How long the gate waited before giving up
        waited_ms: u64,
    },

    /// Queue receive or queue resolution failed.
    #[error("queue error: {message}")]
    Queue {
        /// Error message from the queue backend
        message: String,
    },

    /// Network-level failure while talking to the worker.
    #[error("network error: {message}")]
    Network {
        /// Error message describing the failure
        message: String,
    },

    /// Per-delivery timeout elapsed before the worker responded.
    #[error("request timeout after {timeout_ms} ms")]
    Timeout {
        /// The configured per-delivery timeout
        timeout_ms: u64,
    },

    /// Worker answered with a non-2xx status.
    #[error("worker rejected message: HTTP {status}")]
    WorkerRejected {
        /// HTTP status code from the worker
        status: u16,
    },

    /// Delete call for an accepted message failed.
    #[error("acknowledge failed: {message}")]
    Acknowledge {
        /// Error message from the queue backend
        message: String,
    },

    /// The error counter crossed the configured maximum.
    #[error("error budget exceeded: {errors} errors (max {max_errors})")]
    ErrorBudgetExceeded {
        /// Failures recorded over the engine's lifetime
        errors: u32,
        /// Configured maximum before draining
        max_errors: u32,
    },
}

impl EngineError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Creates a health check error from the elapsed wait.
    pub fn health_check(waited: Duration) -> Self {
        Self::HealthCheck { waited_ms: waited.as_millis() as u64 }
    }

    /// Creates a queue error.
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue { message: message.into() }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout_ms: timeout.as_millis() as u64 }
    }

    /// Creates a rejection error from a worker status code.
    pub fn worker_rejected(status: u16) -> Self {
        Self::WorkerRejected { status }
    }

    /// Creates an acknowledgement error.
    pub fn acknowledge(message: impl Into<String>) -> Self {
        Self::Acknowledge { message: message.into() }
    }

    /// Creates an error-budget-exceeded error.
    pub fn budget_exceeded(errors: u32, max_errors: u32) -> Self {
        Self::ErrorBudgetExceeded { errors, max_errors }
    }

    /// Whether this error is fatal to the engine as a whole.
    ///
    /// Non-fatal errors describe a single delivery attempt; they are logged
    /// and counted against the error budget but never stop the loop.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Configuration { .. }
            | Self::HealthCheck { .. }
            | Self::Queue { .. }
            | Self::ErrorBudgetExceeded { .. } => true,

            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::WorkerRejected { .. }
            | Self::Acknowledge { .. } => false,
        }
    }
}
