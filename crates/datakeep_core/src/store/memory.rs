//! Shared in-process store.
//!
//! Clones of a `MemoryStore` share one backing state, so several
//! repositories can work over the same records. Ordinary repository calls
//! take the store lock themselves; direct bulk mutation goes through
//! [`MemoryStore::write_lock`].

use super::{StoreAdapter, StoreError, StoreResult};
use crate::config::StoreOptions;
use crate::model::entity::{Entity, EntityRef, RecordId};
use crate::staging::ChangeSet;
use log::debug;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

struct MemoryState<T> {
    records: Vec<EntityRef<T>>,
    next_id: RecordId,
}

impl<T: Entity> MemoryState<T> {
    fn assign_id(&mut self) -> RecordId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

pub struct MemoryStore<T> {
    state: Arc<RwLock<MemoryState<T>>>,
    options: StoreOptions,
}

impl<T> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            options: self.options.clone(),
        }
    }
}

impl<T: Entity> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> MemoryStore<T> {
    pub fn new() -> Self {
        Self::with_options(StoreOptions::default())
    }

    pub fn with_options(options: StoreOptions) -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState {
                records: Vec::new(),
                next_id: 1,
            })),
            options,
        }
    }

    /// Creates a store holding `records`, assigning ids to transient ones.
    pub fn seeded(options: StoreOptions, records: impl IntoIterator<Item = T>) -> Self {
        let store = Self::with_options(options);
        {
            let mut guard = store.write_lock();
            for record in records {
                guard.insert(record);
            }
        }
        store
    }

    /// Enters the store write lock; dropping the guard exits it.
    pub fn write_lock(&self) -> MemoryWriteGuard<'_, T> {
        MemoryWriteGuard {
            state: self.state.write().unwrap_or_else(PoisonError::into_inner),
        }
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to a memory store for direct bulk mutation.
pub struct MemoryWriteGuard<'a, T> {
    state: RwLockWriteGuard<'a, MemoryState<T>>,
}

impl<T: Entity> MemoryWriteGuard<'_, T> {
    /// Inserts a record, keeping a positive id or assigning the next one.
    pub fn insert(&mut self, record: T) -> RecordId {
        let mut record = record;
        let id = if record.record_id() > 0 {
            record.record_id()
        } else {
            self.state.assign_id()
        };
        record.set_record_id(id);
        self.state.next_id = self.state.next_id.max(id + 1);
        self.state.records.push(EntityRef::new(record));
        id
    }

    /// Removes a record by id. Returns whether it existed.
    pub fn remove(&mut self, id: RecordId) -> bool {
        let before = self.state.records.len();
        self.state.records.retain(|record| record.record_id() != id);
        self.state.records.len() != before
    }

    pub fn clear(&mut self) {
        self.state.records.clear();
    }

    pub fn records(&self) -> &[EntityRef<T>] {
        &self.state.records
    }

    pub fn len(&self) -> usize {
        self.state.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.records.is_empty()
    }
}

impl<T: Entity> StoreAdapter<T> for MemoryStore<T> {
    fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn read_all(&self) -> StoreResult<Vec<EntityRef<T>>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.records.clone())
    }

    fn persist(&self, changes: &ChangeSet<'_, T>) -> StoreResult<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(missing) = changes
            .updates
            .keys()
            .find(|id| !state.records.iter().any(|record| record.record_id() == **id))
        {
            return Err(StoreError::InvalidData(format!(
                "record {missing} no longer exists in memory store"
            )));
        }

        state
            .records
            .retain(|record| !changes.deletions.contains(&record.record_id()));
        for record in state.records.iter_mut() {
            if let Some(updated) = changes.updates.get(&record.record_id()) {
                *record = updated.clone();
            }
        }
        for addition in changes.additions {
            let id = state.assign_id();
            addition.set_record_id(id);
            state.records.push(addition.clone());
        }

        debug!(
            "event=store_persist module=store.memory status=ok added={} updated={} deleted={} total={}",
            changes.additions.len(),
            changes.updates.len(),
            changes.deletions.len(),
            state.records.len()
        );
        Ok(())
    }
}
