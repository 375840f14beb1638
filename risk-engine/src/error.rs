//! Error types for risk engine

use compliance_service::ComplianceError;
use thiserror::Error;

/// Risk engine error
#[derive(Debug, Error)]
pub enum Error {
    /// Request failed validation; no assessment is produced
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Rule definition could not be used
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    /// External collaborator (history store, telecom provider, ...) failed
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Watchlist screening failed
    #[error("Screening error: {0}")]
    Screening(#[from] ComplianceError),

    /// Caller deadline elapsed before the assessment finished
    #[error("Assessment deadline exceeded after {0}ms")]
    DeadlineExceeded(u64),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
