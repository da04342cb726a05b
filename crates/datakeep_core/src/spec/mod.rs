//! Query descriptors shared by every store.
//!
//! # Responsibility
//! - Build composable predicate trees, ordering chains, caps and include hints.
//! - Evaluate a descriptor against a candidate set identically for every store.
//!
//! # Invariants
//! - Evaluation order is filter, stable sort, truncate.
//! - A cap set on any node of a composed tree bounds the root result.
//! - Business-rule descriptors carry no predicate and are never evaluated here.

pub mod predicate;
pub mod rule;
pub mod specification;

use std::error::Error;
use std::fmt::{Display, Formatter};

pub use predicate::Predicate;
pub use rule::{BusinessRule, RuleArg};
pub use specification::{and, not, or, OrderDirection, Specification};

pub type SpecResult<T> = Result<T, SpecError>;

/// Descriptor construction and validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    InvalidArgument(String),
}

impl Display for SpecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid specification: {message}"),
        }
    }
}

impl Error for SpecError {}
