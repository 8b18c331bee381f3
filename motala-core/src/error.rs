//! Error types for motala-core

use thiserror::Error;

/// Main error type for the motala-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed or missing input; carries field-level detail
    #[error("validation error on {field}: {message}")]
    Validation { field: String, message: String },

    /// Referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Caller may not read or aggregate the requested data.
    /// Distinct from `NotFound` so callers can tell "doesn't exist"
    /// from "not yours".
    #[error("scope violation: {0}")]
    ScopeViolation(String),

    /// Manager has no school affiliation yet
    #[error("manager has no school assigned")]
    NoSchoolAssigned,

    /// Invitation code does not map to an active school
    #[error("invalid invitation code: {0}")]
    InvalidInvitationCode(String),

    /// Phone number already belongs to a registered account
    #[error("already registered: {0}")]
    AlreadyRegistered(String),

    /// Session interval with end before start
    #[error("invalid interval: end {end} is before start {start}")]
    InvalidInterval {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },
}

impl Error {
    /// Shorthand constructor for field-level validation errors
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand constructor for missing-entity errors
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result type alias for motala-core
pub type Result<T> = std::result::Result<T, Error>;
