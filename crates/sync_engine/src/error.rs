//! Sync engine errors

use contracts::ContractError;
use thiserror::Error;

/// Errors raised when a session cannot start
#[derive(Debug, Error)]
pub enum SyncError {
    /// Capture format the detectors cannot read
    #[error("unsupported capture format: {message}")]
    UnsupportedFormat { message: String },

    /// Engine tuning outside its working range
    #[error("invalid engine config '{field}': {message}")]
    InvalidConfig { field: String, message: String },
}

impl SyncError {
    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            message: message.into(),
        }
    }

    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<SyncError> for ContractError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::UnsupportedFormat { message } => ContractError::unsupported_format(message),
            SyncError::InvalidConfig { field, message } => {
                ContractError::config_validation(field, message)
            }
        }
    }
}

/// Sync engine Result alias
pub type Result<T> = std::result::Result<T, SyncError>;
