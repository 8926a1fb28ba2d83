//! Repository error types
//!
//! Repositories translate store failures into a [`RepositoryError`] that
//! names the operation and the entity involved. Errors are `Clone` so one
//! deduplicated read can hand the same failure to every waiting caller.
//!
//! # Example
//!
//! ```rust
//! use pagewise::repository::{RepositoryError, RepositoryErrorKind};
//!
//! let error = RepositoryError::not_found("UcUser", "7");
//! assert!(matches!(error.kind, RepositoryErrorKind::NotFound));
//! assert!(error.is_not_found());
//! ```

use std::fmt;

use crate::error::{DatabaseError, DatabaseErrorKind};
use crate::page::PageError;

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    FindById,
    /// Fetching one page of a listing
    FindPage,
    Count,
    Create,
    Update,
    /// Opening or finishing a transaction
    Transaction,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FindById => write!(f, "find_by_id"),
            Self::FindPage => write!(f, "find_page"),
            Self::Count => write!(f, "count"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Transaction => write!(f, "transaction"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// Entity was not found
    NotFound,
    /// Database constraint violation
    ConstraintViolation,
    /// Validation failed before the store was touched
    ValidationFailed,
    ConnectionFailed,
    /// The paged query could not be planned
    InvalidQuery,
    DatabaseError,
    Other,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::InvalidQuery => write!(f, "invalid_query"),
            Self::DatabaseError => write!(f, "database_error"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Structured repository error with operation context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    pub operation: RepositoryOperation,
    pub kind: RepositoryErrorKind,
    pub message: String,
    /// The type of entity involved (e.g. "UcUser")
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
}

impl RepositoryError {
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
        }
    }

    /// Create a "not found" error with entity context
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::FindById,
            RepositoryErrorKind::NotFound,
            "Entity not found",
        )
        .with_entity(entity_type, entity_id)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Create,
            RepositoryErrorKind::ValidationFailed,
            message,
        )
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::FindById,
            RepositoryErrorKind::ConnectionFailed,
            message,
        )
    }

    pub fn database_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::DatabaseError, message)
    }

    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == RepositoryErrorKind::NotFound
    }

    /// Transient errors that may succeed on retry
    pub fn is_retriable(&self) -> bool {
        self.kind == RepositoryErrorKind::ConnectionFailed
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let (Some(entity_type), Some(entity_id)) = (&self.entity_type, &self.entity_id) {
            write!(f, " [{}: {}]", entity_type, entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}

impl From<DatabaseError> for RepositoryError {
    fn from(err: DatabaseError) -> Self {
        let kind = match err.kind {
            DatabaseErrorKind::NotFound => RepositoryErrorKind::NotFound,
            DatabaseErrorKind::ConstraintViolation => RepositoryErrorKind::ConstraintViolation,
            DatabaseErrorKind::ConnectionFailed | DatabaseErrorKind::PoolExhausted => {
                RepositoryErrorKind::ConnectionFailed
            }
            DatabaseErrorKind::Other => RepositoryErrorKind::Other,
            _ => RepositoryErrorKind::DatabaseError,
        };
        let operation = match err.kind {
            DatabaseErrorKind::TransactionFailed => RepositoryOperation::Transaction,
            _ => RepositoryOperation::FindById,
        };
        Self::new(operation, kind, err.to_string())
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        DatabaseError::from(err).into()
    }
}

impl From<PageError> for RepositoryError {
    fn from(err: PageError) -> Self {
        match err {
            PageError::Database(db) => Self::from(db).with_operation(RepositoryOperation::FindPage),
            other => Self::new(
                RepositoryOperation::FindPage,
                RepositoryErrorKind::InvalidQuery,
                other.to_string(),
            ),
        }
    }
}
