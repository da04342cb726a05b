mod common;

use common::{ids, memory_repo, memory_store, sample, snapshot, Sample};
use datakeep_core::{EntityRef, RejectReason, RepoError, Specification, StageError, StoreError};

#[test]
fn staged_additions_are_visible_only_to_the_owning_instance() {
    let store = memory_store(true);
    let mut writer = memory_repo(&store);
    let reader = memory_repo(&store);

    let added = writer.add_entity(sample(10, "b1", true)).unwrap();

    assert!(added.read().record_id <= 0);
    assert_eq!(writer.find_all().unwrap().len(), 7);
    assert_eq!(reader.find_all().unwrap().len(), 6);
    assert_ne!(writer.instance_id(), reader.instance_id());
}

#[test]
fn save_changes_assigns_positive_ids_visible_to_new_instances() {
    let store = memory_store(true);
    let mut writer = memory_repo(&store);

    writer
        .add_entities(vec![
            sample(10, "b1", true).into(),
            sample(11, "b2", false).into(),
        ])
        .unwrap();
    let counts = writer.save_changes().unwrap();

    assert_eq!(counts.additions, 2);
    assert!(!writer.has_pending_changes());

    let fresh = memory_repo(&store);
    let added = fresh
        .find_all_where(|s| s.text_value.starts_with('b'))
        .unwrap();
    assert_eq!(ids(&added), vec![7, 8]);
}

#[test]
fn updates_and_deletions_are_merged_into_reads() {
    let store = memory_store(true);
    let mut repo = memory_repo(&store);

    let third = repo.find_single_where(|s| s.record_id == 3).unwrap().unwrap();
    third.write().numeric_value = 70;
    repo.update_entity(third).unwrap();
    let first = repo.find_first_where(|s| s.record_id == 1).unwrap().unwrap();
    repo.delete_entity(&first).unwrap();

    let visible = repo.find_all().unwrap();
    assert_eq!(ids(&visible), vec![2, 3, 4, 5, 6]);
    assert_eq!(visible[1].read().numeric_value, 70);

    repo.save_changes().unwrap();
    let fresh = memory_repo(&store);
    let stored = fresh.find_single_where(|s| s.record_id == 3).unwrap().unwrap();
    assert_eq!(stored.read().numeric_value, 70);
    assert_eq!(fresh.find_all().unwrap().len(), 5);
}

#[test]
fn re_adding_a_deleted_record_restores_its_original_id() {
    let store = memory_store(true);
    let mut repo = memory_repo(&store);

    let second = repo.find_single_where(|s| s.record_id == 2).unwrap().unwrap();
    repo.delete_entity(&second).unwrap();
    assert_eq!(repo.find_all().unwrap().len(), 5);

    let restored = repo.add_entity(second).unwrap();

    assert_eq!(restored.record_id(), 2);
    assert_eq!(ids(&repo.find_all().unwrap()), vec![1, 2, 3, 4, 5, 6]);
    assert!(!repo.has_pending_changes());
}

#[test]
fn update_batch_is_all_or_nothing() {
    let store = memory_store(true);
    let mut repo = memory_repo(&store);
    let doomed = repo.find_single_where(|s| s.record_id == 5).unwrap().unwrap();
    repo.delete_entity(&doomed).unwrap();
    let before = snapshot(&repo.find_all().unwrap());

    let mut valid = repo.find_single_where(|s| s.record_id == 1).unwrap().unwrap().snapshot();
    valid.numeric_value = 100;

    let invalid_targets = [
        sample(1, "transient", true),
        Sample {
            record_id: 5,
            ..sample(1, "deleted", true)
        },
        Sample {
            record_id: 404,
            ..sample(1, "unknown", true)
        },
    ];
    for invalid in invalid_targets {
        let err = repo
            .update_entities(vec![valid.clone().into(), invalid.into()])
            .unwrap_err();
        assert!(matches!(err, RepoError::OperationNotPermitted(_)));
        assert_eq!(snapshot(&repo.find_all().unwrap()), before);
    }

    assert_eq!(repo.pending_counts().updates, 0);
}

#[test]
fn update_rejection_reports_the_reason() {
    let store = memory_store(true);
    let mut repo = memory_repo(&store);

    let err = repo
        .update_entity(Sample {
            record_id: 404,
            ..sample(1, "unknown", true)
        })
        .unwrap_err();

    assert!(matches!(
        err,
        RepoError::OperationNotPermitted(StageError::UpdateRejected {
            id: 404,
            reason: RejectReason::UnknownRecord
        })
    ));
}

#[test]
fn delete_batch_with_a_double_delete_deletes_nothing() {
    let store = memory_store(true);
    let mut repo = memory_repo(&store);
    let records = repo.find_all().unwrap();
    repo.delete_entity(&records[1]).unwrap();
    let before = snapshot(&repo.find_all().unwrap());

    let batch = vec![records[0].clone(), records[1].clone(), records[2].clone()];
    let err = repo.delete_entities(&batch).unwrap_err();

    assert!(matches!(
        err,
        RepoError::OperationNotPermitted(StageError::DeleteRejected { id: 2, .. })
    ));
    let after = repo.find_all().unwrap();
    assert_eq!(snapshot(&after), before);
    assert_eq!(ids(&after), vec![1, 3, 4, 5, 6]);
}

#[test]
fn delete_batch_with_an_unknown_id_deletes_nothing() {
    let store = memory_store(true);
    let mut repo = memory_repo(&store);
    let before = snapshot(&repo.find_all().unwrap());
    let first = repo.find_single_where(|s| s.record_id == 1).unwrap().unwrap();
    let unknown = EntityRef::new(Sample {
        record_id: 404,
        ..sample(0, "ghost", true)
    });

    let err = repo.delete_entities(&[first, unknown.clone()]).unwrap_err();

    assert!(matches!(
        err,
        RepoError::OperationNotPermitted(StageError::DeleteRejected {
            id: 404,
            reason: RejectReason::UnknownRecord
        })
    ));
    assert_eq!(repo.pending_counts().deletions, 0);
    assert_eq!(snapshot(&repo.find_all().unwrap()), before);
    assert!(repo.delete_entity(&unknown).is_err());
}

#[test]
fn deleting_a_staged_addition_cancels_it() {
    let store = memory_store(true);
    let mut repo = memory_repo(&store);

    let added = repo.add_entity(sample(9, "temp", true)).unwrap();
    repo.delete_entity(&added).unwrap();

    assert!(!repo.has_pending_changes());
    assert_eq!(repo.find_all().unwrap().len(), 6);
}

#[test]
fn staged_addition_can_be_updated_before_commit() {
    let store = memory_store(true);
    let mut repo = memory_repo(&store);

    let added = repo.add_entity(sample(9, "draft", true)).unwrap();
    added.write().text_value = "final".to_string();
    repo.update_entity(added).unwrap();
    repo.save_changes().unwrap();

    let fresh = memory_repo(&store);
    let stored = fresh
        .find_single(&Specification::lambda(|s: &Sample| s.numeric_value == 9))
        .unwrap()
        .unwrap();
    assert_eq!(stored.read().text_value, "final");
    assert_eq!(stored.record_id(), 7);
}

#[test]
fn reset_discards_pending_changes() {
    let store = memory_store(true);
    let mut repo = memory_repo(&store);
    let records = repo.find_all().unwrap();

    repo.add_entity(sample(9, "temp", true)).unwrap();
    repo.delete_entities(&records[..2]).unwrap();
    assert_eq!(repo.find_all().unwrap().len(), 5);

    repo.reset();

    assert!(!repo.has_pending_changes());
    assert_eq!(ids(&repo.find_all().unwrap()), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(store.len(), 6);
}

#[test]
fn direct_store_mutation_under_write_lock_is_seen_by_repositories() {
    let store = memory_store(true);
    let repo = memory_repo(&store);

    {
        let mut guard = store.write_lock();
        guard.remove(1);
        guard.insert(sample(8, "direct", false));
    }

    let found: Vec<EntityRef<Sample>> = repo.find_all().unwrap();
    assert_eq!(ids(&found), vec![2, 3, 4, 5, 6, 7]);
}

#[test]
fn update_of_a_record_deleted_by_another_instance_fails_the_commit() {
    let store = memory_store(true);
    let mut stale = memory_repo(&store);
    let mut remover = memory_repo(&store);

    let fifth = stale.find_single_where(|s| s.record_id == 5).unwrap().unwrap();
    fifth.write().text_value = "edited".to_string();
    stale.update_entity(fifth).unwrap();
    stale.delete_by_id(1).unwrap();
    remover.delete_by_id(5).unwrap();
    remover.save_changes().unwrap();

    let err = stale.save_changes().unwrap_err();

    assert!(matches!(err, RepoError::Store(StoreError::InvalidData(_))));
    assert_eq!(stale.pending_counts().updates, 1);
    assert_eq!(stale.pending_counts().deletions, 1);
    assert_eq!(ids(&memory_repo(&store).find_all().unwrap()), vec![1, 2, 3, 4, 6]);
}
