//! Storage-agnostic data-access core.
//!
//! Callers describe queries with [`Specification`], stage writes through a
//! [`Repository`], and commit them to any [`StoreAdapter`]: the shared
//! [`MemoryStore`], a [`JsonFileStore`] or a [`SqliteStore`].

pub mod config;
pub mod db;
pub mod logging;
pub mod mapping;
pub mod model;
pub mod repo;
pub mod spec;
pub mod staging;
pub mod store;

pub use config::{ConfigError, DataKeepConfig, LoggingConfig, StoreOptions};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use mapping::{TypeMapRegistry, TypeMapping};
pub use model::entity::{Entity, EntityRef, RecordId};
pub use repo::{RepoError, RepoResult, Repository};
pub use spec::{BusinessRule, OrderDirection, Predicate, RuleArg, SpecError, Specification};
pub use staging::{PendingCounts, RejectReason, StageError};
pub use store::{
    JsonFileStore, MemoryStore, RuleOutcome, RuleQuery, SqliteStore, StoreAdapter, StoreError,
    StoreResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
