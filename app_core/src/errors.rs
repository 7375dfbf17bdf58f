//! Definitions for error types used throughout core.

use crate::{CrError, DbError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// missing or invalid principal
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// cross-tenant access or write in view-all mode
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// unknown id or slug
    #[error("not found: {0}")]
    NotFound(String),

    /// malformed or rejected input
    #[error("validation error: {0}")]
    Validation(String),

    /// illegal state transition or colliding mutation
    #[error("conflict: {0}")]
    Conflict(String),

    /// database error
    #[error("database error: {0}")]
    Db(#[from] DbError),

    /// client registry error
    #[error("client registry error: {0}")]
    Cr(#[from] CrError),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Outward classification of a core error, used by the transport to pick a
/// status code and by logging to decide between warn and error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Conflict,
    Internal,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Unauthorized(_) => ErrorKind::Unauthorized,
            CoreError::Forbidden(_) => ErrorKind::Forbidden,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::Db(DbError::NotFound) => ErrorKind::NotFound,
            CoreError::Db(DbError::UniqueViolation(_)) => ErrorKind::Conflict,
            CoreError::Db(_) => ErrorKind::Internal,
            CoreError::Cr(_) => ErrorKind::Internal,
        }
    }

    /// Operational errors are expected and logged without stack context.
    pub fn is_operational(&self) -> bool {
        self.kind() != ErrorKind::Internal
    }

    /// Stable machine-readable code for the wire envelope.
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}
