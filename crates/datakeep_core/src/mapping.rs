//! Explicit registry of logical-to-stored entity transforms.
//!
//! # Responsibility
//! - Hold at most one field-level transform per entity type.
//! - Stay immutable once built; repositories receive it by `Arc`.
//!
//! # Invariants
//! - Transforms never change the record id; repositories re-apply it.
//! - Registration happens only through the builder.

use crate::model::entity::Entity;
use once_cell::sync::Lazy;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

static EMPTY_REGISTRY: Lazy<Arc<TypeMapRegistry>> =
    Lazy::new(|| Arc::new(TypeMapRegistry::builder().build()));

type Transform<T> = Arc<dyn Fn(&T) -> T + Send + Sync>;

/// Forward (`to_store`) and inverse (`from_store`) transforms for `T`.
pub struct TypeMapping<T> {
    to_store: Transform<T>,
    from_store: Transform<T>,
}

impl<T: Entity> TypeMapping<T> {
    pub fn new<W, R>(to_store: W, from_store: R) -> Self
    where
        W: Fn(&T) -> T + Send + Sync + 'static,
        R: Fn(&T) -> T + Send + Sync + 'static,
    {
        Self {
            to_store: Arc::new(to_store),
            from_store: Arc::new(from_store),
        }
    }

    /// Logical value to stored shape.
    pub fn to_store(&self, logical: &T) -> T {
        let mut stored = (self.to_store)(logical);
        stored.set_record_id(logical.record_id());
        stored
    }

    /// Stored shape to logical value.
    pub fn from_store(&self, stored: &T) -> T {
        let mut logical = (self.from_store)(stored);
        logical.set_record_id(stored.record_id());
        logical
    }
}

impl<T> Clone for TypeMapping<T> {
    fn clone(&self) -> Self {
        Self {
            to_store: Arc::clone(&self.to_store),
            from_store: Arc::clone(&self.from_store),
        }
    }
}

/// Immutable table from entity type to its mapping.
pub struct TypeMapRegistry {
    mappings: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl TypeMapRegistry {
    pub fn builder() -> TypeMapRegistryBuilder {
        TypeMapRegistryBuilder {
            mappings: HashMap::new(),
        }
    }

    /// Shared registry with no mappings.
    pub fn empty() -> Arc<Self> {
        Arc::clone(&EMPTY_REGISTRY)
    }

    pub fn get<T: Entity>(&self) -> Option<&TypeMapping<T>> {
        self.mappings
            .get(&TypeId::of::<T>())
            .and_then(|mapping| mapping.downcast_ref::<TypeMapping<T>>())
    }

    pub fn contains<T: Entity>(&self) -> bool {
        self.mappings.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

pub struct TypeMapRegistryBuilder {
    mappings: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl TypeMapRegistryBuilder {
    /// Registers the mapping for `T`, replacing an earlier one.
    pub fn register<T: Entity>(mut self, mapping: TypeMapping<T>) -> Self {
        self.mappings.insert(TypeId::of::<T>(), Box::new(mapping));
        self
    }

    pub fn build(self) -> TypeMapRegistry {
        TypeMapRegistry {
            mappings: self.mappings,
        }
    }
}
