//! Entity contract and shared entity handle.
//!
//! # Responsibility
//! - Define the identity contract every stored record implements.
//! - Provide `EntityRef`, the lockable handle used by repositories and stores.
//!
//! # Invariants
//! - Cloning an `EntityRef` aliases the same record; `duplicate` never does.
//! - Handle access never panics on lock poisoning.

use std::fmt::{Debug, Formatter};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Store-assigned record identity.
///
/// Zero and negative values are transient; the staging layer hands out
/// negative provisional ids so transient entries stay addressable.
pub type RecordId = i64;

/// Identity and copy contract for records managed by a repository.
pub trait Entity: Clone + 'static {
    /// Returns the current record id.
    fn record_id(&self) -> RecordId;

    /// Overwrites the record id. Called by stores on commit and by staging.
    fn set_record_id(&mut self, id: RecordId);

    /// Returns whether the record has not been committed yet.
    fn is_transient(&self) -> bool {
        self.record_id() <= 0
    }

    /// Returns whether the record exists in its store.
    fn is_persisted(&self) -> bool {
        !self.is_transient()
    }

    /// Produces an independent copy with identical field values.
    ///
    /// Override when `Clone` would share interior state.
    fn duplicate(&self) -> Self {
        self.clone()
    }
}

/// Shared, lockable handle to one entity value.
pub struct EntityRef<T> {
    inner: Arc<RwLock<T>>,
}

impl<T> EntityRef<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value)),
        }
    }

    /// Acquires shared read access.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires exclusive write access.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns whether both handles point at the same record instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Entity> EntityRef<T> {
    /// Returns a detached copy of the current value.
    pub fn snapshot(&self) -> T {
        self.read().duplicate()
    }

    /// Returns a new handle over an independent copy.
    pub fn duplicate(&self) -> Self {
        Self::new(self.snapshot())
    }

    pub fn record_id(&self) -> RecordId {
        self.read().record_id()
    }

    /// Writes `id` into the shared value.
    pub fn set_record_id(&self, id: RecordId) {
        self.write().set_record_id(id);
    }
}

impl<T> Clone for EntityRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Entity> From<T> for EntityRef<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Debug> Debug for EntityRef<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EntityRef").field(&*self.read()).finish()
    }
}
