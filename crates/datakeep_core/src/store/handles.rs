//! Handle identity for stores that decode records on every read.
//!
//! # Invariants
//! - With cloning disabled, a record id maps to one handle until the record
//!   is deleted, so mutations through a returned handle are seen by later
//!   reads of the same store.
//! - Clones of a store share one cache.
//! - A cached handle wins over the decoded row for the same id; committed
//!   changes refresh the cache.

use crate::config::StoreOptions;
use crate::model::entity::{Entity, EntityRef, RecordId};
use crate::staging::ChangeSet;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub(crate) struct HandleCache<T> {
    enabled: bool,
    handles: Arc<Mutex<HashMap<RecordId, EntityRef<T>>>>,
}

impl<T> Clone for HandleCache<T> {
    fn clone(&self) -> Self {
        Self {
            enabled: self.enabled,
            handles: Arc::clone(&self.handles),
        }
    }
}

impl<T: Entity> HandleCache<T> {
    pub(crate) fn new(options: &StoreOptions) -> Self {
        Self {
            enabled: !options.clone_entities,
            handles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wraps a full read. Ids missing from `records` are dropped.
    pub(crate) fn resolve_all(&self, records: Vec<T>) -> Vec<EntityRef<T>> {
        if !self.enabled {
            return records.into_iter().map(EntityRef::new).collect();
        }
        let mut handles = self.lock();
        let present: HashSet<RecordId> = records.iter().map(Entity::record_id).collect();
        handles.retain(|id, _| present.contains(id));
        records
            .into_iter()
            .map(|record| Self::handle_for(&mut handles, record))
            .collect()
    }

    /// Wraps a partial read, such as a business-rule result.
    pub(crate) fn resolve(&self, records: Vec<T>) -> Vec<EntityRef<T>> {
        if !self.enabled {
            return records.into_iter().map(EntityRef::new).collect();
        }
        let mut handles = self.lock();
        records
            .into_iter()
            .map(|record| Self::handle_for(&mut handles, record))
            .collect()
    }

    /// Mirrors a successful persist. Additions must already carry their ids.
    pub(crate) fn committed(&self, changes: &ChangeSet<'_, T>) {
        if !self.enabled {
            return;
        }
        let mut handles = self.lock();
        for id in changes.deletions {
            handles.remove(id);
        }
        for (id, updated) in changes.updates {
            handles.insert(*id, updated.clone());
        }
        for addition in changes.additions {
            handles.insert(addition.record_id(), addition.clone());
        }
    }

    fn handle_for(handles: &mut HashMap<RecordId, EntityRef<T>>, record: T) -> EntityRef<T> {
        handles
            .entry(record.record_id())
            .or_insert_with(|| EntityRef::new(record))
            .clone()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RecordId, EntityRef<T>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
