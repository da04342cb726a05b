//! Change buffer implementation.

use super::{RejectReason, StageError, StageResult};
use crate::model::entity::{Entity, EntityRef, RecordId};
use crate::spec::Specification;
use crate::store::{StoreAdapter, StoreResult};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Read-only view of pending changes handed to a store on commit.
///
/// Stores write the ids they assign into `additions` handles once the
/// persist has succeeded.
#[derive(Debug)]
pub struct ChangeSet<'a, T> {
    pub additions: &'a [EntityRef<T>],
    pub updates: &'a BTreeMap<RecordId, EntityRef<T>>,
    pub deletions: &'a BTreeSet<RecordId>,
}

impl<T> ChangeSet<'_, T> {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.updates.is_empty() && self.deletions.is_empty()
    }
}

/// Sizes of the three pending sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    pub additions: usize,
    pub updates: usize,
    pub deletions: usize,
}

enum UpdateTarget {
    Addition(usize),
    Persisted(RecordId),
}

/// Pending additions, updates and deletions for one repository instance.
#[derive(Debug)]
pub struct ChangeBuffer<T> {
    additions: Vec<EntityRef<T>>,
    updates: BTreeMap<RecordId, EntityRef<T>>,
    deletions: BTreeSet<RecordId>,
    next_provisional_id: RecordId,
}

impl<T: Entity> Default for ChangeBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> ChangeBuffer<T> {
    pub fn new() -> Self {
        Self {
            additions: Vec::new(),
            updates: BTreeMap::new(),
            deletions: BTreeSet::new(),
            next_provisional_id: -1,
        }
    }

    pub fn counts(&self) -> PendingCounts {
        PendingCounts {
            additions: self.additions.len(),
            updates: self.updates.len(),
            deletions: self.deletions.len(),
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.change_set().is_empty()
    }

    pub fn is_pending_deletion(&self, id: RecordId) -> bool {
        self.deletions.contains(&id)
    }

    pub fn change_set(&self) -> ChangeSet<'_, T> {
        ChangeSet {
            additions: &self.additions,
            updates: &self.updates,
            deletions: &self.deletions,
        }
    }

    /// Stages one addition and returns the staged handle.
    ///
    /// An entity whose id is pending deletion is resurrected instead: the
    /// deletion is cancelled and the persisted record is returned.
    pub fn stage_add(
        &mut self,
        entity: EntityRef<T>,
        persisted: &[EntityRef<T>],
    ) -> EntityRef<T> {
        let id = entity.record_id();

        if id > 0 && self.deletions.remove(&id) {
            if let Some(existing) = persisted.iter().find(|record| record.record_id() == id) {
                return existing.clone();
            }
        }

        if id <= 0 {
            if let Some(index) = self.addition_index(id) {
                self.additions[index] = entity.clone();
                return entity;
            }
        }

        // A persisted handle must never be re-labelled as transient.
        let staged = if id > 0 { entity.duplicate() } else { entity };
        staged.set_record_id(self.take_provisional_id());
        self.additions.push(staged.clone());
        staged
    }

    /// Stages additions in input order. Each element succeeds independently.
    pub fn stage_add_many(
        &mut self,
        entities: Vec<EntityRef<T>>,
        persisted: &[EntityRef<T>],
    ) -> Vec<EntityRef<T>> {
        entities
            .into_iter()
            .map(|entity| self.stage_add(entity, persisted))
            .collect()
    }

    /// Stages one update.
    ///
    /// # Errors
    /// - `UpdateRejected` when the target is pending deletion, is an
    ///   unstaged transient id, or is unknown to both store and buffer.
    pub fn stage_update(
        &mut self,
        entity: EntityRef<T>,
        persisted: &[EntityRef<T>],
    ) -> StageResult<EntityRef<T>> {
        let known = persisted_ids(persisted);
        let target = self.validate_update(entity.record_id(), &known)?;
        Ok(self.apply_update(target, entity))
    }

    /// Stages updates all-or-nothing.
    ///
    /// Every element is validated before anything is recorded.
    pub fn stage_update_many(
        &mut self,
        entities: Vec<EntityRef<T>>,
        persisted: &[EntityRef<T>],
    ) -> StageResult<Vec<EntityRef<T>>> {
        let known = persisted_ids(persisted);
        let targets = entities
            .iter()
            .map(|entity| self.validate_update(entity.record_id(), &known))
            .collect::<StageResult<Vec<_>>>()?;

        Ok(targets
            .into_iter()
            .zip(entities)
            .map(|(target, entity)| self.apply_update(target, entity))
            .collect())
    }

    /// Stages one deletion.
    ///
    /// A transient id cancels its pending addition instead. Deleting a
    /// persisted id drops any pending update for it.
    ///
    /// # Errors
    /// - `DeleteRejected` for a double delete, an unstaged transient id or
    ///   an id unknown to both store and buffer.
    pub fn stage_delete(&mut self, id: RecordId, persisted: &[EntityRef<T>]) -> StageResult<()> {
        self.stage_delete_many(&[id], persisted)
    }

    /// Stages deletions all-or-nothing.
    ///
    /// A target that is already pending deletion, repeated within the batch
    /// or unknown rejects the whole call.
    pub fn stage_delete_many(
        &mut self,
        ids: &[RecordId],
        persisted: &[EntityRef<T>],
    ) -> StageResult<()> {
        let known = persisted_ids(persisted);
        let mut seen = BTreeSet::new();
        for id in ids {
            self.validate_delete(*id, &seen, &known)?;
            seen.insert(*id);
        }
        for id in ids {
            self.apply_delete(*id);
        }
        Ok(())
    }

    /// Overlays pending state on `persisted`.
    ///
    /// Result is `(persisted + additions) - deletions` with pending updates
    /// replacing persisted entries in place. Persisted order comes first,
    /// additions follow in staging order.
    pub fn merged(&self, persisted: Vec<EntityRef<T>>) -> Vec<EntityRef<T>> {
        let mut merged = Vec::with_capacity(persisted.len() + self.additions.len());
        for record in persisted {
            let id = record.record_id();
            if self.deletions.contains(&id) {
                continue;
            }
            match self.updates.get(&id) {
                Some(updated) => merged.push(updated.clone()),
                None => merged.push(record),
            }
        }
        merged.extend(self.additions.iter().cloned());
        merged
    }

    /// Merges pending state and evaluates `spec` over the result.
    pub fn merge(
        &self,
        persisted: Vec<EntityRef<T>>,
        spec: &Specification<T>,
    ) -> Vec<EntityRef<T>> {
        spec.apply(self.merged(persisted))
    }

    /// Persists pending changes through `store`, then clears the buffer.
    ///
    /// On store failure the buffer is left untouched.
    pub fn commit<S>(&mut self, store: &S) -> StoreResult<PendingCounts>
    where
        S: StoreAdapter<T> + ?Sized,
    {
        let counts = self.counts();
        if self.has_changes() {
            store.persist(&self.change_set())?;
        }
        self.discard();
        Ok(counts)
    }

    /// Drops every pending change without touching the store.
    pub fn discard(&mut self) {
        self.additions.clear();
        self.updates.clear();
        self.deletions.clear();
    }

    fn validate_update(
        &self,
        id: RecordId,
        persisted: &HashSet<RecordId>,
    ) -> StageResult<UpdateTarget> {
        if self.deletions.contains(&id) {
            return Err(StageError::UpdateRejected {
                id,
                reason: RejectReason::PendingDeletion,
            });
        }

        if id <= 0 {
            return self
                .addition_index(id)
                .map(UpdateTarget::Addition)
                .ok_or(StageError::UpdateRejected {
                    id,
                    reason: RejectReason::NotStaged,
                });
        }

        if persisted.contains(&id) || self.updates.contains_key(&id) {
            Ok(UpdateTarget::Persisted(id))
        } else {
            Err(StageError::UpdateRejected {
                id,
                reason: RejectReason::UnknownRecord,
            })
        }
    }

    fn apply_update(&mut self, target: UpdateTarget, entity: EntityRef<T>) -> EntityRef<T> {
        match target {
            UpdateTarget::Addition(index) => self.additions[index] = entity.clone(),
            UpdateTarget::Persisted(id) => {
                self.updates.insert(id, entity.clone());
            }
        }
        entity
    }

    fn validate_delete(
        &self,
        id: RecordId,
        seen: &BTreeSet<RecordId>,
        persisted: &HashSet<RecordId>,
    ) -> StageResult<()> {
        if self.deletions.contains(&id) || seen.contains(&id) {
            return Err(StageError::DeleteRejected {
                id,
                reason: RejectReason::PendingDeletion,
            });
        }
        if id <= 0 && self.addition_index(id).is_none() {
            return Err(StageError::DeleteRejected {
                id,
                reason: RejectReason::NotStaged,
            });
        }
        if id > 0 && !persisted.contains(&id) && !self.updates.contains_key(&id) {
            return Err(StageError::DeleteRejected {
                id,
                reason: RejectReason::UnknownRecord,
            });
        }
        Ok(())
    }

    fn apply_delete(&mut self, id: RecordId) {
        if id <= 0 {
            if let Some(index) = self.addition_index(id) {
                self.additions.remove(index);
            }
            return;
        }
        self.updates.remove(&id);
        self.deletions.insert(id);
    }

    fn addition_index(&self, id: RecordId) -> Option<usize> {
        if id == 0 {
            return None;
        }
        self.additions
            .iter()
            .position(|addition| addition.record_id() == id)
    }

    fn take_provisional_id(&mut self) -> RecordId {
        let id = self.next_provisional_id;
        self.next_provisional_id -= 1;
        id
    }
}

fn persisted_ids<T: Entity>(persisted: &[EntityRef<T>]) -> HashSet<RecordId> {
    persisted
        .iter()
        .map(EntityRef::record_id)
        .filter(|id| *id > 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::ChangeBuffer;
    use crate::model::entity::{Entity, EntityRef, RecordId};
    use crate::staging::{RejectReason, StageError};

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: RecordId,
        value: i32,
    }

    impl Entity for Row {
        fn record_id(&self) -> RecordId {
            self.id
        }

        fn set_record_id(&mut self, id: RecordId) {
            self.id = id;
        }
    }

    fn persisted(count: i64) -> Vec<EntityRef<Row>> {
        (1..=count)
            .map(|id| EntityRef::new(Row { id, value: id as i32 }))
            .collect()
    }

    fn ids(records: &[EntityRef<Row>]) -> Vec<RecordId> {
        records.iter().map(EntityRef::record_id).collect()
    }

    #[test]
    fn additions_get_distinct_provisional_ids() {
        let store = persisted(2);
        let mut buffer = ChangeBuffer::new();

        let first = buffer.stage_add(Row { id: 0, value: 10 }.into(), &store);
        let second = buffer.stage_add(Row { id: 0, value: 20 }.into(), &store);

        assert_eq!(first.record_id(), -1);
        assert_eq!(second.record_id(), -2);
        assert!(first.read().is_transient());
        assert_eq!(ids(&buffer.merged(store)), vec![1, 2, -1, -2]);
    }

    #[test]
    fn re_adding_a_deleted_record_resurrects_it() {
        let store = persisted(3);
        let mut buffer = ChangeBuffer::new();
        buffer.stage_delete(2, &store).unwrap();
        assert_eq!(ids(&buffer.merged(store.clone())), vec![1, 3]);

        let restored = buffer.stage_add(Row { id: 2, value: 99 }.into(), &store);

        assert_eq!(restored.record_id(), 2);
        assert_eq!(restored.read().value, 2);
        assert_eq!(buffer.counts().additions, 0);
        assert_eq!(ids(&buffer.merged(store)), vec![1, 2, 3]);
    }

    #[test]
    fn deleting_a_transient_record_cancels_the_addition() {
        let store = persisted(1);
        let mut buffer = ChangeBuffer::new();
        let added = buffer.stage_add(Row { id: 0, value: 5 }.into(), &store);

        buffer.stage_delete(added.record_id(), &store).unwrap();

        assert_eq!(buffer.counts().additions, 0);
        assert_eq!(buffer.counts().deletions, 0);
        assert!(!buffer.has_changes());
    }

    #[test]
    fn update_after_delete_is_rejected() {
        let store = persisted(2);
        let mut buffer = ChangeBuffer::new();
        buffer.stage_delete(1, &store).unwrap();

        let err = buffer
            .stage_update(Row { id: 1, value: 7 }.into(), &store)
            .unwrap_err();

        assert_eq!(
            err,
            StageError::UpdateRejected {
                id: 1,
                reason: RejectReason::PendingDeletion
            }
        );
        assert_eq!(buffer.counts().updates, 0);
    }

    #[test]
    fn update_batch_with_one_invalid_element_changes_nothing() {
        let store = persisted(3);
        let mut buffer = ChangeBuffer::new();

        let result = buffer.stage_update_many(
            vec![
                Row { id: 1, value: 100 }.into(),
                Row { id: 0, value: 200 }.into(),
                Row { id: 3, value: 300 }.into(),
            ],
            &store,
        );

        assert!(matches!(
            result,
            Err(StageError::UpdateRejected {
                id: 0,
                reason: RejectReason::NotStaged
            })
        ));
        assert!(!buffer.has_changes());
    }

    #[test]
    fn delete_batch_with_double_delete_changes_nothing() {
        let store = persisted(3);
        let mut buffer = ChangeBuffer::new();
        buffer.stage_delete(2, &store).unwrap();

        let err = buffer.stage_delete_many(&[1, 2, 3], &store).unwrap_err();

        assert!(matches!(err, StageError::DeleteRejected { id: 2, .. }));
        assert!(!buffer.is_pending_deletion(1));
        assert!(!buffer.is_pending_deletion(3));
        assert_eq!(buffer.counts().deletions, 1);
    }

    #[test]
    fn delete_batch_with_unknown_id_changes_nothing() {
        let store = persisted(3);
        let mut buffer = ChangeBuffer::new();

        let err = buffer.stage_delete_many(&[1, 404], &store).unwrap_err();

        assert_eq!(
            err,
            StageError::DeleteRejected {
                id: 404,
                reason: RejectReason::UnknownRecord
            }
        );
        assert!(!buffer.has_changes());
    }

    #[test]
    fn pending_update_overrides_persisted_entry_in_place() {
        let store = persisted(3);
        let mut buffer = ChangeBuffer::new();

        buffer
            .stage_update(Row { id: 2, value: 42 }.into(), &store)
            .unwrap();
        let merged = buffer.merged(store);

        assert_eq!(ids(&merged), vec![1, 2, 3]);
        assert_eq!(merged[1].read().value, 42);
    }
}
