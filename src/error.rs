use std::sync::PoisonError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CellbaseError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Internal consistency violated: {0}")]
    InternalConsistency(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Data corruption: {message}")]
    DataCorruption { message: String },
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, CellbaseError>;

impl CellbaseError {
    /// True for the per-call failures a caller can recover from; the dataset stays usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_) | Self::InvalidState(_) | Self::Cancelled
        )
    }
}

// Helper conversions
impl From<rusqlite::Error> for CellbaseError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}
impl From<config::ConfigError> for CellbaseError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
impl From<serde_json::Error> for CellbaseError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}
impl<T> From<PoisonError<T>> for CellbaseError {
    fn from(e: PoisonError<T>) -> Self {
        Self::Lock(e.to_string())
    }
}
