//! Record model shared by every store.
//!
//! # Responsibility
//! - Define record identity and the transient/persisted lifecycle.
//! - Provide the shared handle type that crosses the repository boundary.
//!
//! # Invariants
//! - `record_id <= 0` means transient, `record_id > 0` means persisted.
//! - Positive ids are only ever assigned by a store during commit.

pub mod entity;
