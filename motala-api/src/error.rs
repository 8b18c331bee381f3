//! Error classification for transports
//!
//! Core errors stay as [`motala_core::Error`] all the way through the
//! handlers; this module only classifies them coarsely enough for a
//! transport to pick a status code, and renders a serializable body.

use motala_core::Error;
use serde::Serialize;

/// Coarse error class. The mapping a transport would typically use:
/// `Validation` -> 400, `NotFound` -> 404, `Forbidden` -> 403,
/// `Conflict` -> 409, `Internal` -> 500.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    Conflict,
    Internal,
}

impl ErrorKind {
    /// Classify a core error.
    ///
    /// `ScopeViolation` and `NoSchoolAssigned` map to `Forbidden`, not
    /// `NotFound`: "not yours" and "doesn't exist" stay
    /// distinguishable at the transport boundary.
    pub fn of(err: &Error) -> ErrorKind {
        match err {
            Error::Validation { .. }
            | Error::InvalidInterval { .. }
            | Error::InvalidInvitationCode(_) => ErrorKind::Validation,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::ScopeViolation(_) | Error::NoSchoolAssigned => ErrorKind::Forbidden,
            Error::AlreadyRegistered(_) => ErrorKind::Conflict,
            Error::Database(_) | Error::Io(_) | Error::Json(_) | Error::Config(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Wire shape for an error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        ErrorBody {
            kind: ErrorKind::of(err),
            message: err.to_string(),
        }
    }
}
