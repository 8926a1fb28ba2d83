//! Repository plumbing shared by service data layers
//!
//! Data layers return [`RepositoryResult`] so that store failures keep their
//! operation and entity context until they reach the handler, where
//! [`ApiError`](crate::handlers::ApiError) maps them onto wire reasons.

mod error;

pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;
