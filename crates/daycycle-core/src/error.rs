//! Daycycle error model.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DaycycleError>;

#[derive(Debug, Error)]
pub enum DaycycleError {
    /// Participant input that can be corrected and resent (e.g. a malformed time).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Event for a participant with no record.
    #[error("Participant not found: {0}")]
    NotFound(String),

    /// Transport call failed.
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Record store load/save failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DaycycleError {
    /// Whether the participant should be told about this error.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, DaycycleError::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_validation_is_user_visible() {
        assert!(DaycycleError::Validation("bad time".into()).is_user_visible());
        assert!(!DaycycleError::Delivery("timeout".into()).is_user_visible());
        assert!(!DaycycleError::Persistence("disk full".into()).is_user_visible());
        assert!(!DaycycleError::NotFound("42".into()).is_user_visible());
    }

    #[test]
    fn test_io_error_converts() {
        let err: DaycycleError = std::io::Error::other("boom").into();
        assert!(err.to_string().contains("boom"));
    }
}
