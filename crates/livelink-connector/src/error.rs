//! Connector error types.
//!
//! Provides a unified error hierarchy for traversal operations:
//! - `ConnectorError`: Top-level error for every connector operation
//!
//! Repository failures (`ConnectionFailed`, `ReadError`) are retryable: the
//! traversal call that hit them aborts without committing any checkpoint
//! movement, so the next call starts again from the last committed position.

use thiserror::Error;

/// Errors that can occur during connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Failed to reach the repository.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A repository query failed or returned an unusable row.
    #[error("read error: {0}")]
    ReadError(String),

    /// Invalid connector configuration.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Required configuration key is missing.
    #[error("missing required config: {0}")]
    MissingConfig(String),

    /// A persisted checkpoint string could not be parsed.
    #[error("malformed checkpoint '{checkpoint}': {reason}")]
    MalformedCheckpoint {
        /// The checkpoint text as received.
        checkpoint: String,
        /// What was wrong with it.
        reason: String,
    },

    /// No query template is registered under the key for the active dialect.
    #[error("unknown query template '{key}' for {dialect}")]
    UnknownTemplate {
        /// The template key that was requested.
        key: String,
        /// The active SQL dialect.
        dialect: String,
    },

    /// A template referenced a parameter that was not supplied, or a
    /// choice selector had an unusable value.
    #[error("template '{key}' parameter error: {message}")]
    TemplateParameter {
        /// The template key being rendered.
        key: String,
        /// Details about the failure.
        message: String,
    },

    /// A negative batch size hint.
    #[error("invalid batch size: {0}")]
    InvalidBatchSize(i64),

    /// An internal error that doesn't fit other categories.
    #[error("internal error: {0}")]
    Internal(String),

    /// An I/O error from the underlying system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectorError {
    /// Creates a `MalformedCheckpoint` error.
    pub(crate) fn malformed(checkpoint: &str, reason: impl Into<String>) -> Self {
        ConnectorError::MalformedCheckpoint {
            checkpoint: checkpoint.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the host should simply call again later.
    ///
    /// Repository failures are retryable; configuration and checkpoint
    /// errors need an operator.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed(_) | ConnectorError::ReadError(_)
        )
    }
}
