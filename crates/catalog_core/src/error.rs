//! Service-level error taxonomy.
//!
//! # Invariants
//! - Every store failure is converted at the call site into one of these
//!   variants; none is swallowed.
//! - `NotFound` covers both missing rows and failed ownership checks, so
//!   callers cannot probe for existence.
//! - `Internal` keeps the engine diagnostic for logs; `public_message()` is
//!   the text safe to return to an untrusted caller.

use crate::store::{ScopeError, StoreError, StoreErrorKind};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Row absent, zero rows affected, or owned by someone else.
    NotFound,
    /// Write violated a uniqueness constraint.
    Conflict(String),
    /// Operation requires an authenticated actor.
    Unauthorized,
    /// Caller asked for an undeclared field or sort key.
    InvalidInput(String),
    /// Any other persistence failure.
    Internal(String),
}

impl ServiceError {
    /// Stable code used in log events and transport mappings.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Unauthorized => "unauthorized",
            Self::InvalidInput(_) => "invalid_input",
            Self::Internal(_) => "internal",
        }
    }

    /// Message safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::Internal(message) => write!(f, "internal error: {message}"),
        }
    }
}

impl Error for ServiceError {}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value.kind() {
            StoreErrorKind::Conflict => Self::Conflict(value.message().to_string()),
            _ => Self::Internal(value.message().to_string()),
        }
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(value: rusqlite::Error) -> Self {
        StoreError::from(value).into()
    }
}

impl From<ScopeError> for ServiceError {
    fn from(value: ScopeError) -> Self {
        StoreError::from(value).into()
    }
}
