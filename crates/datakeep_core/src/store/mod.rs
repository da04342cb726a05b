//! Store adapter contract and the bundled adapters.
//!
//! # Responsibility
//! - Define the read/persist boundary every backing medium implements.
//! - Provide memory, JSON file and SQLite adapters.
//!
//! # Invariants
//! - `persist` is atomic from the repository's point of view: on error no
//!   change is visible and no addition handle has been given an id.
//! - Stores assign positive ids to additions; provisional ids never persist.
//! - An update whose row no longer exists fails the whole persist with
//!   `InvalidData`.
//! - Ids are never reused after a deletion.

mod handles;
pub mod json_file;
pub mod memory;
pub mod sqlite;

use crate::config::StoreOptions;
use crate::db::DbError;
use crate::model::entity::{Entity, EntityRef};
use crate::spec::BusinessRule;
use crate::staging::ChangeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub use json_file::JsonFileStore;
pub use memory::{MemoryStore, MemoryWriteGuard};
pub use sqlite::{RuleQuery, SqliteStore};

pub type StoreResult<T> = Result<T, StoreError>;

/// Store-level failures, surfaced to callers unmodified.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    Io(std::io::Error),
    Serde(serde_json::Error),
    InvalidData(String),
    NotSupported(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "store i/o failed: {err}"),
            Self::Serde(err) => write!(f, "store encoding failed: {err}"),
            Self::InvalidData(message) => write!(f, "invalid stored record: {message}"),
            Self::NotSupported(message) => write!(f, "not supported by this store: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Serde(err) => Some(err),
            Self::InvalidData(_) | Self::NotSupported(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// Result of a named business rule.
#[derive(Debug, Clone)]
pub enum RuleOutcome<T> {
    Single(Option<EntityRef<T>>),
    Many(Vec<EntityRef<T>>),
}

impl<T> RuleOutcome<T> {
    /// Applies `f` to every returned handle.
    pub fn map_records(self, f: impl FnMut(EntityRef<T>) -> EntityRef<T>) -> Self {
        match self {
            Self::Single(record) => Self::Single(record.map(f)),
            Self::Many(records) => Self::Many(records.into_iter().map(f).collect()),
        }
    }

    pub fn into_vec(self) -> Vec<EntityRef<T>> {
        match self {
            Self::Single(record) => record.into_iter().collect(),
            Self::Many(records) => records,
        }
    }
}

/// Read/persist primitives one backing medium provides.
pub trait StoreAdapter<T: Entity> {
    /// Store settings, including the cloning policy.
    fn options(&self) -> &StoreOptions;

    /// Returns every persisted record in store-native order.
    fn read_all(&self) -> StoreResult<Vec<EntityRef<T>>>;

    /// Applies additions, updates and deletions as one unit.
    ///
    /// On success, each handle in `changes.additions` carries its assigned id.
    fn persist(&self, changes: &ChangeSet<'_, T>) -> StoreResult<()>;

    /// Whether include paths are honoured. Others ignore them.
    fn supports_includes(&self) -> bool {
        false
    }

    /// Runs a named store-defined query.
    fn execute_business_rule(&self, rule: &BusinessRule) -> StoreResult<RuleOutcome<T>> {
        Err(StoreError::NotSupported(format!(
            "business rule `{}`",
            rule.name
        )))
    }
}
