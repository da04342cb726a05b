//! Relational store keeping records as JSON documents in SQLite.
//!
//! # Responsibility
//! - Read and persist one collection of the `records` table.
//! - Execute registered business rules as raw SQL.
//!
//! # Invariants
//! - The borrowed connection must be fully migrated (`ensure_schema_ready`).
//! - Persist runs in one immediate transaction; ids are written into
//!   staged handles only after commit.
//! - With cloning disabled, reads and rule results share one handle per id.
//! - The row `record_id` is authoritative over any id inside the payload.
//! - Nested children live inside the owning document, so every include
//!   path is satisfied by a plain read.

use super::handles::HandleCache;
use super::{RuleOutcome, StoreAdapter, StoreError, StoreResult};
use crate::config::StoreOptions;
use crate::db::ensure_schema_ready;
use crate::model::entity::{Entity, EntityRef, RecordId};
use crate::spec::{BusinessRule, RuleArg};
use crate::staging::ChangeSet;
use log::{debug, info, warn};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Raw SQL behind a named business rule.
///
/// Statements must select `record_id` and `payload` columns and may bind
/// rule arguments positionally (`?1`, `?2`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleQuery {
    /// First row or nothing.
    Single(String),
    /// Every row, in statement order.
    Many(String),
}

pub struct SqliteStore<'conn, T> {
    conn: &'conn Connection,
    collection: String,
    rules: Arc<BTreeMap<String, RuleQuery>>,
    options: StoreOptions,
    handles: HandleCache<T>,
}

impl<T> Clone for SqliteStore<'_, T> {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn,
            collection: self.collection.clone(),
            rules: Arc::clone(&self.rules),
            options: self.options.clone(),
            handles: self.handles.clone(),
        }
    }
}

impl<'conn, T> SqliteStore<'conn, T>
where
    T: Entity + Serialize + DeserializeOwned,
{
    /// Binds a store to `collection` on a migrated connection.
    ///
    /// # Errors
    /// - `Db(SchemaNotReady | MissingTable)` when the connection was not
    ///   opened through `open_db*`.
    pub fn try_new(conn: &'conn Connection, collection: impl Into<String>) -> StoreResult<Self> {
        ensure_schema_ready(conn)?;
        let collection = collection.into();
        if collection.trim().is_empty() {
            return Err(StoreError::InvalidData(
                "collection name cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            conn,
            collection,
            rules: Arc::new(BTreeMap::new()),
            handles: HandleCache::new(&StoreOptions::default()),
            options: StoreOptions::default(),
        })
    }

    /// Replaces the store options. Handles handed out earlier are forgotten.
    pub fn with_options(mut self, options: StoreOptions) -> Self {
        self.handles = HandleCache::new(&options);
        self.options = options;
        self
    }

    /// Registers a named rule. A later registration replaces an earlier one.
    pub fn with_rule(mut self, name: impl Into<String>, query: RuleQuery) -> Self {
        Arc::make_mut(&mut self.rules).insert(name.into(), query);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn rule_names(&self) -> Vec<String> {
        self.rules.keys().cloned().collect()
    }

    fn encode(&self, record: &T) -> StoreResult<String> {
        Ok(serde_json::to_string(record)?)
    }

    fn decode_row(&self, row: &Row<'_>) -> StoreResult<T> {
        let id: RecordId = row.get("record_id")?;
        let payload: String = row.get("payload")?;
        let mut record: T = serde_json::from_str(&payload).map_err(|err| {
            StoreError::InvalidData(format!(
                "record {id} in collection `{}` has an unreadable payload: {err}",
                self.collection
            ))
        })?;
        record.set_record_id(id);
        Ok(record)
    }

    fn query_records(&self, sql: &str, args: &[RuleArg]) -> StoreResult<Vec<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(args.iter().map(rule_arg_to_value)))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(self.decode_row(row)?);
        }
        Ok(records)
    }

    fn write_changes(&self, tx: &Transaction<'_>, changes: &ChangeSet<'_, T>) -> StoreResult<Vec<RecordId>> {
        for id in changes.deletions {
            tx.execute(
                "DELETE FROM records WHERE collection = ?1 AND record_id = ?2;",
                params![self.collection, id],
            )?;
        }

        for (id, updated) in changes.updates {
            let mut record = updated.snapshot();
            record.set_record_id(*id);
            let changed = tx.execute(
                "UPDATE records
                 SET payload = ?1, updated_at = (strftime('%s', 'now') * 1000)
                 WHERE collection = ?2 AND record_id = ?3;",
                params![self.encode(&record)?, self.collection, id],
            )?;
            if changed == 0 {
                return Err(StoreError::InvalidData(format!(
                    "record {id} no longer exists in collection `{}`",
                    self.collection
                )));
            }
        }

        let mut assigned = Vec::with_capacity(changes.additions.len());
        for addition in changes.additions {
            let mut record = addition.snapshot();
            tx.execute(
                "INSERT INTO records (collection, payload) VALUES (?1, ?2);",
                params![self.collection, self.encode(&record)?],
            )?;
            let id = tx.last_insert_rowid();
            record.set_record_id(id);
            tx.execute(
                "UPDATE records SET payload = ?1 WHERE record_id = ?2;",
                params![self.encode(&record)?, id],
            )?;
            assigned.push(id);
        }
        Ok(assigned)
    }
}

impl<T> StoreAdapter<T> for SqliteStore<'_, T>
where
    T: Entity + Serialize + DeserializeOwned,
{
    fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn read_all(&self) -> StoreResult<Vec<EntityRef<T>>> {
        let sql = "SELECT record_id, payload FROM records WHERE collection = ?1 ORDER BY record_id ASC;";
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([self.collection.as_str()])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(self.decode_row(row)?);
        }
        Ok(self.handles.resolve_all(records))
    }

    fn persist(&self, changes: &ChangeSet<'_, T>) -> StoreResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let assigned = match self.write_changes(&tx, changes) {
            Ok(assigned) => assigned,
            Err(err) => {
                warn!(
                    "event=store_persist module=store.sqlite status=error collection={} error={err}",
                    self.collection
                );
                return Err(err);
            }
        };
        tx.commit()?;

        for (addition, id) in changes.additions.iter().zip(assigned) {
            addition.set_record_id(id);
        }
        self.handles.committed(changes);
        info!(
            "event=store_persist module=store.sqlite status=ok collection={} added={} updated={} deleted={}",
            self.collection,
            changes.additions.len(),
            changes.updates.len(),
            changes.deletions.len()
        );
        Ok(())
    }

    fn supports_includes(&self) -> bool {
        true
    }

    fn execute_business_rule(&self, rule: &BusinessRule) -> StoreResult<RuleOutcome<T>> {
        let query = self.rules.get(rule.name.as_str()).ok_or_else(|| {
            StoreError::NotSupported(format!(
                "business rule `{}` on collection `{}`",
                rule.name, self.collection
            ))
        })?;
        debug!(
            "event=rule_execute module=store.sqlite status=start rule={} args={}",
            rule.name,
            rule.args.len()
        );

        match query {
            RuleQuery::Single(sql) => {
                let first = self.query_records(sql, &rule.args)?.into_iter().take(1).collect();
                Ok(RuleOutcome::Single(self.handles.resolve(first).pop()))
            }
            RuleQuery::Many(sql) => {
                let records = self.query_records(sql, &rule.args)?;
                Ok(RuleOutcome::Many(self.handles.resolve(records)))
            }
        }
    }
}

fn rule_arg_to_value(arg: &RuleArg) -> Value {
    match arg {
        RuleArg::Null => Value::Null,
        RuleArg::Bool(value) => Value::Integer(i64::from(*value)),
        RuleArg::Integer(value) => Value::Integer(*value),
        RuleArg::Real(value) => Value::Real(*value),
        RuleArg::Text(value) => Value::Text(value.clone()),
    }
}
