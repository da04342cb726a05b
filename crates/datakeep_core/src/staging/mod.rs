//! Per-repository ledger of uncommitted changes.
//!
//! # Responsibility
//! - Record pending additions, updates and deletions over one store.
//! - Merge pending state into persisted reads (uncommitted read-through).
//! - Hand the pending set to the store as one unit on commit.
//!
//! # Invariants
//! - Batch update/delete validation runs before any mutation; a rejected
//!   batch leaves the buffer exactly as it was.
//! - An id pending deletion can never gain a fresh pending update.
//! - The buffer is cleared only after the store reports a successful persist.

mod buffer;

use crate::model::entity::RecordId;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub use buffer::{ChangeBuffer, ChangeSet, PendingCounts};

pub type StageResult<T> = Result<T, StageError>;

/// Why a staged mutation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Target id is already pending deletion.
    PendingDeletion,
    /// Target id is neither persisted nor staged.
    UnknownRecord,
    /// Transient id that was never staged as an addition.
    NotStaged,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingDeletion => "pending_deletion",
            Self::UnknownRecord => "unknown_record",
            Self::NotStaged => "not_staged",
        }
    }
}

/// Staging validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    UpdateRejected { id: RecordId, reason: RejectReason },
    DeleteRejected { id: RecordId, reason: RejectReason },
}

impl Display for StageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpdateRejected { id, reason } => {
                write!(f, "update of record {id} rejected: {}", reason.as_str())
            }
            Self::DeleteRejected { id, reason } => {
                write!(f, "delete of record {id} rejected: {}", reason.as_str())
            }
        }
    }
}

impl Error for StageError {}
