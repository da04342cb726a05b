//! Flat-file store keeping one JSON document per collection file.
//!
//! The document holds the records array and the next id to assign:
//! `{"next_id": 7, "records": [...]}`.
//!
//! # Invariants
//! - A missing or blank file reads as an empty collection.
//! - Every persisted record has a positive, unique id below `next_id`.
//! - `next_id` only grows, so a deleted id is never handed out again.
//! - Writes go to a sibling temp file that is renamed over the target, so a
//!   failed persist leaves the previous file intact.

use super::handles::HandleCache;
use super::{StoreAdapter, StoreError, StoreResult};
use crate::config::StoreOptions;
use crate::model::entity::{Entity, EntityRef, RecordId};
use crate::staging::ChangeSet;
use log::{debug, error};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize)]
struct FileContents<T> {
    #[serde(default)]
    next_id: RecordId,
    records: Vec<T>,
}

pub struct JsonFileStore<T> {
    path: PathBuf,
    options: StoreOptions,
    handles: HandleCache<T>,
}

impl<T> Clone for JsonFileStore<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            options: self.options.clone(),
            handles: self.handles.clone(),
        }
    }
}

impl<T> JsonFileStore<T>
where
    T: Entity + Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_options(path, StoreOptions::default())
    }

    pub fn with_options(path: impl Into<PathBuf>, options: StoreOptions) -> Self {
        Self {
            path: path.into(),
            handles: HandleCache::new(&options),
            options,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> StoreResult<FileContents<T>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(FileContents {
                    next_id: 1,
                    records: Vec::new(),
                })
            }
            Err(err) => return Err(err.into()),
        };
        if raw.trim().is_empty() {
            return Ok(FileContents {
                next_id: 1,
                records: Vec::new(),
            });
        }

        let mut contents: FileContents<T> = serde_json::from_str(&raw)?;
        let mut seen = HashSet::with_capacity(contents.records.len());
        for record in &contents.records {
            let id = record.record_id();
            if id <= 0 || !seen.insert(id) {
                return Err(StoreError::InvalidData(format!(
                    "record id {id} in `{}` is not positive and unique",
                    self.path.display()
                )));
            }
        }
        let above_stored = seen.iter().max().map_or(1, |max| max + 1);
        contents.next_id = contents.next_id.max(above_stored);
        Ok(contents)
    }

    fn write_atomically(&self, contents: &FileContents<T>) -> StoreResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut staged = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut staged, contents)?;
        staged.write_all(b"\n")?;
        staged.as_file().sync_all()?;
        staged
            .persist(&self.path)
            .map_err(|err| StoreError::Io(err.error))?;
        Ok(())
    }

    fn apply(
        &self,
        contents: &mut FileContents<T>,
        changes: &ChangeSet<'_, T>,
    ) -> StoreResult<Vec<RecordId>> {
        let records = &mut contents.records;
        records.retain(|record| !changes.deletions.contains(&record.record_id()));
        for (id, updated) in changes.updates {
            let target = records.iter_mut().find(|record| record.record_id() == *id);
            let Some(record) = target else {
                return Err(StoreError::InvalidData(format!(
                    "record {id} no longer exists in `{}`",
                    self.path.display()
                )));
            };
            *record = updated.snapshot();
            record.set_record_id(*id);
        }

        let mut assigned = Vec::with_capacity(changes.additions.len());
        for addition in changes.additions {
            let mut record = addition.snapshot();
            record.set_record_id(contents.next_id);
            assigned.push(contents.next_id);
            records.push(record);
            contents.next_id += 1;
        }
        Ok(assigned)
    }
}

impl<T> StoreAdapter<T> for JsonFileStore<T>
where
    T: Entity + Serialize + DeserializeOwned,
{
    fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn read_all(&self) -> StoreResult<Vec<EntityRef<T>>> {
        Ok(self.handles.resolve_all(self.load()?.records))
    }

    fn persist(&self, changes: &ChangeSet<'_, T>) -> StoreResult<()> {
        let mut contents = self.load()?;
        let written = self
            .apply(&mut contents, changes)
            .and_then(|assigned| self.write_atomically(&contents).map(|()| assigned));
        let assigned = match written {
            Ok(assigned) => assigned,
            Err(err) => {
                error!(
                    "event=store_persist module=store.json_file status=error path={} error={err}",
                    self.path.display()
                );
                return Err(err);
            }
        };

        for (addition, id) in changes.additions.iter().zip(assigned) {
            addition.set_record_id(id);
        }
        self.handles.committed(changes);
        debug!(
            "event=store_persist module=store.json_file status=ok path={} total={} next_id={}",
            self.path.display(),
            contents.records.len(),
            contents.next_id
        );
        Ok(())
    }
}
