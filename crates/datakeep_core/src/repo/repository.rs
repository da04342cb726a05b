//! Repository over one store adapter.

use super::{RepoError, RepoResult};
use crate::config::StoreOptions;
use crate::mapping::{TypeMapRegistry, TypeMapping};
use crate::model::entity::{Entity, EntityRef, RecordId};
use crate::spec::Specification;
use crate::staging::{ChangeBuffer, PendingCounts, StageError};
use crate::store::{RuleOutcome, StoreAdapter};
use log::{debug, info, warn};
use std::sync::Arc;
use uuid::Uuid;

/// Generic repository: queries, staged writes and commits over `S`.
///
/// One instance owns one change buffer and is meant for one caller at a
/// time. Independent instances over the same store see only committed state.
pub struct Repository<T: Entity, S: StoreAdapter<T>> {
    store: S,
    buffer: ChangeBuffer<T>,
    registry: Arc<TypeMapRegistry>,
    instance_id: Uuid,
}

impl<T: Entity, S: StoreAdapter<T>> Repository<T, S> {
    pub fn new(store: S) -> Self {
        Self::with_registry(store, TypeMapRegistry::empty())
    }

    /// Creates a repository that consults `registry` for `T`'s mapping.
    pub fn with_registry(store: S, registry: Arc<TypeMapRegistry>) -> Self {
        let instance_id = Uuid::new_v4();
        debug!(
            "event=repo_open module=repo status=ok instance={instance_id} mapped={}",
            registry.contains::<T>()
        );
        Self {
            store,
            buffer: ChangeBuffer::new(),
            registry,
            instance_id,
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> &StoreOptions {
        self.store.options()
    }

    pub fn has_pending_changes(&self) -> bool {
        self.buffer.has_changes()
    }

    pub fn pending_counts(&self) -> PendingCounts {
        self.buffer.counts()
    }

    /// Returns every visible record in store-native order.
    pub fn find_all(&self) -> RepoResult<Vec<EntityRef<T>>> {
        self.find_all_matching(&Specification::all())
    }

    /// Returns the records selected by `spec`.
    ///
    /// # Errors
    /// - `InvalidArgument` for business-rule descriptors (use `execute`),
    ///   malformed include paths or rule names.
    pub fn find_all_matching(&self, spec: &Specification<T>) -> RepoResult<Vec<EntityRef<T>>> {
        self.check_query(spec)?;

        let persisted = self.store.read_all()?;
        let selected = match self.mapping() {
            Some(mapping) => {
                let logical = self
                    .buffer
                    .merged(persisted)
                    .iter()
                    .map(|record| EntityRef::new(mapping.from_store(&record.read())))
                    .collect();
                spec.apply(logical)
            }
            None => self
                .buffer
                .merge(persisted, spec)
                .into_iter()
                .map(|record| self.hand_out(record))
                .collect(),
        };

        debug!(
            "event=repo_find module=repo status=ok instance={} {} returned={}",
            self.instance_id,
            spec.describe(),
            selected.len()
        );
        Ok(selected)
    }

    pub fn find_all_where<F>(&self, predicate: F) -> RepoResult<Vec<EntityRef<T>>>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.find_all_matching(&Specification::lambda(predicate))
    }

    /// Returns the only match, or `None`.
    ///
    /// # Errors
    /// - `MultipleResults` when more than one record matches.
    pub fn find_single(&self, spec: &Specification<T>) -> RepoResult<Option<EntityRef<T>>> {
        let mut matches = self.find_all_matching(spec)?;
        match matches.len() {
            0 | 1 => Ok(matches.pop()),
            count => Err(RepoError::MultipleResults { count }),
        }
    }

    /// Like `find_single`, returning `default` when nothing matches.
    pub fn find_single_or(&self, spec: &Specification<T>, default: T) -> RepoResult<EntityRef<T>> {
        Ok(self
            .find_single(spec)?
            .unwrap_or_else(|| EntityRef::new(default)))
    }

    pub fn find_single_where<F>(&self, predicate: F) -> RepoResult<Option<EntityRef<T>>>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.find_single(&Specification::lambda(predicate))
    }

    /// Returns the first match in specification order, or `None`.
    pub fn find_first(&self, spec: &Specification<T>) -> RepoResult<Option<EntityRef<T>>> {
        Ok(self.find_all_matching(spec)?.into_iter().next())
    }

    pub fn find_first_or(&self, spec: &Specification<T>, default: T) -> RepoResult<EntityRef<T>> {
        Ok(self
            .find_first(spec)?
            .unwrap_or_else(|| EntityRef::new(default)))
    }

    pub fn find_first_where<F>(&self, predicate: F) -> RepoResult<Option<EntityRef<T>>>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.find_first(&Specification::lambda(predicate))
    }

    /// Stages one addition and returns the staged record.
    ///
    /// Re-adding a record that is pending deletion cancels the deletion and
    /// returns the persisted record with its original id.
    pub fn add_entity(&mut self, entity: impl Into<EntityRef<T>>) -> RepoResult<EntityRef<T>> {
        let mut staged = self.add_entities(vec![entity.into()])?;
        Ok(staged.remove(0))
    }

    /// Stages additions in input order.
    pub fn add_entities(&mut self, entities: Vec<EntityRef<T>>) -> RepoResult<Vec<EntityRef<T>>> {
        let resurrects = entities
            .iter()
            .any(|entity| self.buffer.is_pending_deletion(entity.record_id()));
        let persisted = if resurrects {
            self.store.read_all()?
        } else {
            Vec::new()
        };

        let incoming = entities
            .into_iter()
            .map(|entity| self.take_in(entity))
            .collect();
        let staged = self.buffer.stage_add_many(incoming, &persisted);

        debug!(
            "event=repo_add module=repo status=ok instance={} count={}",
            self.instance_id,
            staged.len()
        );
        Ok(staged
            .into_iter()
            .map(|record| self.hand_out(record))
            .collect())
    }

    /// Stages one update.
    ///
    /// # Errors
    /// - `OperationNotPermitted` when the record is pending deletion, is an
    ///   unstaged transient record, or is unknown.
    pub fn update_entity(&mut self, entity: impl Into<EntityRef<T>>) -> RepoResult<EntityRef<T>> {
        let persisted = self.store.read_all()?;
        let incoming = self.take_in(entity.into());
        let staged = self
            .buffer
            .stage_update(incoming, &persisted)
            .map_err(|err| self.rejected("update", err))?;
        Ok(self.hand_out(staged))
    }

    /// Stages updates all-or-nothing.
    pub fn update_entities(
        &mut self,
        entities: Vec<EntityRef<T>>,
    ) -> RepoResult<Vec<EntityRef<T>>> {
        let persisted = self.store.read_all()?;
        let incoming = entities
            .into_iter()
            .map(|entity| self.take_in(entity))
            .collect();
        let staged = self
            .buffer
            .stage_update_many(incoming, &persisted)
            .map_err(|err| self.rejected("update", err))?;
        Ok(staged
            .into_iter()
            .map(|record| self.hand_out(record))
            .collect())
    }

    /// Stages one deletion. A transient record is cancelled instead.
    pub fn delete_entity(&mut self, entity: &EntityRef<T>) -> RepoResult<()> {
        self.delete_by_id(entity.record_id())
    }

    pub fn delete_by_id(&mut self, id: RecordId) -> RepoResult<()> {
        let persisted = self.store.read_all()?;
        self.buffer
            .stage_delete(id, &persisted)
            .map_err(|err| self.rejected("delete", err))
    }

    /// Stages deletions all-or-nothing.
    ///
    /// # Errors
    /// - `OperationNotPermitted` when any target is pending deletion,
    ///   repeated, an unstaged transient record, or unknown.
    pub fn delete_entities(&mut self, entities: &[EntityRef<T>]) -> RepoResult<()> {
        let persisted = self.store.read_all()?;
        let ids = entities
            .iter()
            .map(EntityRef::record_id)
            .collect::<Vec<_>>();
        self.buffer
            .stage_delete_many(&ids, &persisted)
            .map_err(|err| self.rejected("delete", err))
    }

    /// Persists every pending change, then clears the buffer.
    ///
    /// A store failure is returned unmodified and the buffer is kept.
    pub fn save_changes(&mut self) -> RepoResult<PendingCounts> {
        match self.buffer.commit(&self.store) {
            Ok(counts) => {
                info!(
                    "event=repo_save module=repo status=ok instance={} added={} updated={} deleted={}",
                    self.instance_id, counts.additions, counts.updates, counts.deletions
                );
                Ok(counts)
            }
            Err(err) => {
                warn!(
                    "event=repo_save module=repo status=error instance={} error={err}",
                    self.instance_id
                );
                Err(err.into())
            }
        }
    }

    /// Discards every pending change without touching the store.
    pub fn reset(&mut self) {
        let counts = self.buffer.counts();
        self.buffer.discard();
        debug!(
            "event=repo_reset module=repo status=ok instance={} dropped_additions={} dropped_updates={} dropped_deletions={}",
            self.instance_id, counts.additions, counts.updates, counts.deletions
        );
    }

    /// Runs a business-rule descriptor against the store.
    ///
    /// Predicate descriptors are a no-op and return `Ok(None)`.
    ///
    /// # Errors
    /// - `NotSupported` when the store has no executor for the rule name.
    pub fn execute(&self, spec: &Specification<T>) -> RepoResult<Option<RuleOutcome<T>>> {
        let Some(rule) = spec.rule() else {
            debug!(
                "event=repo_execute module=repo status=skipped instance={} reason=not_a_rule",
                self.instance_id
            );
            return Ok(None);
        };
        spec.validate()?;

        let outcome = match self.store.execute_business_rule(rule) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    "event=repo_execute module=repo status=error instance={} rule={} error={err}",
                    self.instance_id, rule.name
                );
                return Err(err.into());
            }
        };

        let outcome = match self.mapping() {
            Some(mapping) => outcome
                .map_records(|record| EntityRef::new(mapping.from_store(&record.read()))),
            None => outcome.map_records(|record| self.hand_out(record)),
        };
        Ok(Some(outcome))
    }

    fn check_query(&self, spec: &Specification<T>) -> RepoResult<()> {
        if let Some(rule) = spec.rule() {
            return Err(RepoError::InvalidArgument(format!(
                "business rule `{}` cannot be used as a query; use execute",
                rule.name
            )));
        }
        spec.validate()?;
        if !spec.include_paths().is_empty() && !self.store.supports_includes() {
            debug!(
                "event=repo_find module=repo status=ignored instance={} reason=includes_unsupported paths={}",
                self.instance_id,
                spec.include_paths().len()
            );
        }
        Ok(())
    }

    fn mapping(&self) -> Option<&TypeMapping<T>> {
        self.registry.get::<T>()
    }

    fn clones(&self) -> bool {
        self.store.options().clone_entities
    }

    /// Converts a caller handle into the handle the buffer keeps.
    fn take_in(&self, entity: EntityRef<T>) -> EntityRef<T> {
        match self.mapping() {
            Some(mapping) => EntityRef::new(mapping.to_store(&entity.read())),
            None if self.clones() => entity.duplicate(),
            None => entity,
        }
    }

    /// Converts a stored or staged handle into the handle a caller receives.
    fn hand_out(&self, record: EntityRef<T>) -> EntityRef<T> {
        match self.mapping() {
            Some(mapping) => EntityRef::new(mapping.from_store(&record.read())),
            None if self.clones() => record.duplicate(),
            None => record,
        }
    }

    fn rejected(&self, op: &str, err: StageError) -> RepoError {
        warn!(
            "event=repo_{op} module=repo status=rejected instance={} error={err}",
            self.instance_id
        );
        err.into()
    }
}
