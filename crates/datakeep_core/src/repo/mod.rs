//! Public data-access facade.
//!
//! # Responsibility
//! - Combine the specification engine and the change buffer over one store.
//! - Apply the cloning policy and type mappings at the boundary.
//!
//! # Invariants
//! - Reads always go through the change buffer merge, never the raw store.
//! - Invalid arguments are rejected before any store access.
//! - Uncommitted changes are visible only through the owning instance.

mod repository;

use crate::spec::SpecError;
use crate::staging::StageError;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub use repository::Repository;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error taxonomy.
#[derive(Debug)]
pub enum RepoError {
    /// Malformed descriptor or argument; raised before store access.
    InvalidArgument(String),
    /// Staged update/delete refused; the buffer is unchanged.
    OperationNotPermitted(StageError),
    /// Business rule or capability the store does not implement.
    NotSupported(String),
    /// `find_single` matched more than one record.
    MultipleResults { count: usize },
    /// Store failure, passed through unmodified.
    Store(StoreError),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::OperationNotPermitted(err) => write!(f, "operation not permitted: {err}"),
            Self::NotSupported(message) => write!(f, "not supported: {message}"),
            Self::MultipleResults { count } => {
                write!(f, "expected at most one record, found {count}")
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::OperationNotPermitted(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::InvalidArgument(_) | Self::NotSupported(_) | Self::MultipleResults { .. } => {
                None
            }
        }
    }
}

impl From<SpecError> for RepoError {
    fn from(value: SpecError) -> Self {
        match value {
            SpecError::InvalidArgument(message) => Self::InvalidArgument(message),
        }
    }
}

impl From<StageError> for RepoError {
    fn from(value: StageError) -> Self {
        Self::OperationNotPermitted(value)
    }
}

impl From<StoreError> for RepoError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotSupported(message) => Self::NotSupported(message),
            other => Self::Store(other),
        }
    }
}
