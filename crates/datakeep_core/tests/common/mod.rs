#![allow(dead_code)]

use datakeep_core::{Entity, EntityRef, MemoryStore, RecordId, Repository, StoreOptions};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub record_id: RecordId,
    pub numeric_value: i64,
    pub text_value: String,
    pub boolean_value: bool,
}

impl Entity for Sample {
    fn record_id(&self) -> RecordId {
        self.record_id
    }

    fn set_record_id(&mut self, id: RecordId) {
        self.record_id = id;
    }
}

pub fn sample(numeric_value: i64, text_value: &str, boolean_value: bool) -> Sample {
    Sample {
        record_id: 0,
        numeric_value,
        text_value: text_value.to_string(),
        boolean_value,
    }
}

/// Six records with numeric values 3,3,7,2,5,1 (ids 1-6 once stored).
pub fn six_samples() -> Vec<Sample> {
    vec![
        sample(3, "a1", true),
        sample(3, "a2", false),
        sample(7, "a3", true),
        sample(2, "a4", true),
        sample(5, "a5", true),
        sample(1, "a6", true),
    ]
}

pub fn memory_store(clone_entities: bool) -> MemoryStore<Sample> {
    MemoryStore::seeded(StoreOptions::cloning(clone_entities), six_samples())
}

pub fn memory_repo(
    store: &MemoryStore<Sample>,
) -> Repository<Sample, MemoryStore<Sample>> {
    Repository::new(store.clone())
}

pub fn ids(records: &[EntityRef<Sample>]) -> Vec<RecordId> {
    records.iter().map(EntityRef::record_id).collect()
}

pub fn snapshot(records: &[EntityRef<Sample>]) -> Vec<Sample> {
    records.iter().map(EntityRef::snapshot).collect()
}
