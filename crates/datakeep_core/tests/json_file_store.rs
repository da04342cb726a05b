mod common;

use common::{ids, sample, six_samples, Sample};
use datakeep_core::{JsonFileStore, RepoError, Repository, StoreError, StoreOptions};
use std::path::Path;

fn seeded_repo(path: &Path) -> Repository<Sample, JsonFileStore<Sample>> {
    let mut repo = Repository::new(JsonFileStore::new(path));
    repo.add_entities(six_samples().into_iter().map(Into::into).collect())
        .unwrap();
    repo.save_changes().unwrap();
    repo
}

#[test]
fn committed_records_are_written_and_visible_to_new_instances() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("samples.json");
    seeded_repo(&path);

    let fresh = Repository::new(JsonFileStore::<Sample>::new(&path));
    assert_eq!(ids(&fresh.find_all().unwrap()), vec![1, 2, 3, 4, 5, 6]);

    let raw = std::fs::read_to_string(&path).unwrap();
    let on_disk: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(on_disk["next_id"], 7);
    assert_eq!(on_disk["records"].as_array().unwrap().len(), 6);
    assert_eq!(on_disk["records"][2]["numeric_value"], 7);
    assert_eq!(on_disk["records"][5]["record_id"], 6);
}

#[test]
fn updates_and_deletes_rewrite_the_file_without_reusing_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("samples.json");
    let mut repo = seeded_repo(&path);

    let fourth = repo.find_single_where(|s| s.record_id == 4).unwrap().unwrap();
    fourth.write().text_value = "renamed".to_string();
    repo.update_entity(fourth).unwrap();
    let sixth = repo.find_single_where(|s| s.record_id == 6).unwrap().unwrap();
    repo.delete_entity(&sixth).unwrap();
    repo.add_entity(sample(8, "late", false)).unwrap();
    repo.save_changes().unwrap();

    let fresh = Repository::new(JsonFileStore::<Sample>::new(&path));
    let all = fresh.find_all().unwrap();
    assert_eq!(ids(&all), vec![1, 2, 3, 4, 5, 7]);
    assert_eq!(all[3].read().text_value, "renamed");
    assert_eq!(all[5].read().text_value, "late");
}

#[test]
fn failed_commit_keeps_pending_changes_and_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("samples.json");
    let mut repo = Repository::new(JsonFileStore::with_options(
        &path,
        StoreOptions::cloning(true),
    ));
    repo.add_entity(sample(1, "pending", true)).unwrap();

    std::fs::write(&path, "not json").unwrap();
    let err = repo.save_changes().unwrap_err();

    assert!(matches!(err, RepoError::Store(StoreError::Serde(_))));
    assert_eq!(repo.pending_counts().additions, 1);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json");

    std::fs::write(&path, r#"{"records":[]}"#).unwrap();
    repo.save_changes().unwrap();
    assert_eq!(ids(&repo.find_all().unwrap()), vec![1]);
}

#[test]
fn update_of_a_record_deleted_elsewhere_fails_the_commit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("samples.json");
    seeded_repo(&path);
    let mut stale = Repository::new(JsonFileStore::<Sample>::new(&path));
    let mut remover = Repository::new(JsonFileStore::<Sample>::new(&path));

    let third = stale.find_single_where(|s| s.record_id == 3).unwrap().unwrap();
    third.write().numeric_value = 30;
    stale.update_entity(third).unwrap();
    stale.add_entity(sample(9, "orphan", true)).unwrap();
    remover.delete_by_id(3).unwrap();
    remover.save_changes().unwrap();

    let err = stale.save_changes().unwrap_err();

    assert!(matches!(err, RepoError::Store(StoreError::InvalidData(_))));
    assert_eq!(stale.pending_counts().updates, 1);
    assert_eq!(stale.pending_counts().additions, 1);
    let fresh = Repository::new(JsonFileStore::<Sample>::new(&path));
    assert_eq!(ids(&fresh.find_all().unwrap()), vec![1, 2, 4, 5, 6]);
}

#[test]
fn sharing_store_exposes_caller_mutations_to_later_reads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("samples.json");
    seeded_repo(&path);
    let mut repo = Repository::new(JsonFileStore::<Sample>::with_options(
        &path,
        StoreOptions::cloning(false),
    ));

    let first = repo.find_single_where(|s| s.record_id == 1).unwrap().unwrap();
    first.write().numeric_value = 999;

    let again = repo.find_single_where(|s| s.record_id == 1).unwrap().unwrap();
    assert!(again.ptr_eq(&first));
    assert_eq!(again.read().numeric_value, 999);

    repo.update_entity(first.clone()).unwrap();
    let added = repo.add_entity(sample(4, "shared", true)).unwrap();
    repo.save_changes().unwrap();

    assert_eq!(added.record_id(), 7);
    let reread = repo.find_all().unwrap();
    assert!(reread[0].ptr_eq(&first));
    assert!(reread[6].ptr_eq(&added));
    let fresh = Repository::new(JsonFileStore::<Sample>::new(&path));
    assert_eq!(
        fresh.find_single_where(|s| s.record_id == 1).unwrap().unwrap().read().numeric_value,
        999
    );
}

#[test]
fn cloning_store_isolates_caller_mutations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("samples.json");
    let repo = seeded_repo(&path);

    let first = repo.find_single_where(|s| s.record_id == 1).unwrap().unwrap();
    first.write().numeric_value = 999;

    let again = repo.find_single_where(|s| s.record_id == 1).unwrap().unwrap();
    assert!(!again.ptr_eq(&first));
    assert_eq!(again.read().numeric_value, 3);
}
