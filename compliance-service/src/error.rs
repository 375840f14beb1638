use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ComplianceError {
    #[error("Invalid screening input: {0}")]
    InvalidInput(String),

    #[error("Watchlist load failed: {0}")]
    LoadFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<csv::Error> for ComplianceError {
    fn from(err: csv::Error) -> Self {
        ComplianceError::LoadFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ComplianceError>;
