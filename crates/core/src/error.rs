//! Error types shared across the workspace.

/// A notification request failed shape validation.
///
/// Raised before any provider call and before any lifecycle event is
/// emitted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Notification validation failed for field {field}: {reason}")]
pub struct ValidationError {
    /// Name of the offending request field (`userId`, `email`, ...).
    pub field: &'static str,
    /// Human-readable reason.
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Missing or malformed configuration. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("Configuration error: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
