//! Persistence store boundary.
//!
//! # Responsibility
//! - Classify SQLite failures into a small structured taxonomy.
//! - Provide transaction scopes with an explicit lifecycle.
//!
//! # Invariants
//! - Callers above this module never inspect SQLite result codes.

use rusqlite::{ffi, ErrorCode};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod scope;

pub use scope::{
    run_in_scope, DataSource, ScopeError, ScopeResult, ScopeState, TransactionScope, UnitOfWork,
};

pub type StoreResult<T> = Result<T, StoreError>;

/// Structured classification of a failed store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Unique or primary-key constraint violated.
    Conflict,
    /// Any other constraint (check, not-null, foreign key) violated.
    ConstraintViolation,
    /// Database busy or locked past the busy timeout.
    Timeout,
    Unknown,
}

impl StoreErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conflict => "conflict",
            Self::ConstraintViolation => "constraint_violation",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }
}

/// Store failure with its classification and the engine diagnostic.
#[derive(Debug)]
pub struct StoreError {
    kind: StoreErrorKind,
    message: String,
    source: Option<rusqlite::Error>,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn kind(&self) -> StoreErrorKind {
        self.kind
    }

    /// Engine diagnostic, intended for operator-facing logs.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} store error: {}", self.kind.as_str(), self.message)
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|err| err as &(dyn Error + 'static))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self {
            kind: classify(&value),
            message: value.to_string(),
            source: Some(value),
        }
    }
}

impl From<ScopeError> for StoreError {
    fn from(value: ScopeError) -> Self {
        match value {
            ScopeError::Sqlite(err) => err.into(),
            other => Self::new(StoreErrorKind::Unknown, other.to_string()),
        }
    }
}

fn classify(err: &rusqlite::Error) -> StoreErrorKind {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::ConstraintViolation => match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    StoreErrorKind::Conflict
                }
                _ => StoreErrorKind::ConstraintViolation,
            },
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StoreErrorKind::Timeout,
            _ => StoreErrorKind::Unknown,
        },
        _ => StoreErrorKind::Unknown,
    }
}
