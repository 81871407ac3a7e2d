//! Tests for VectorStore.

use std::fs;

use tempfile::TempDir;

use super::*;
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::types::{DeleteOutcome, GroupDeleteOutcome, GroupId, ImageId, UpdateOutcome};

const DIM: usize = 4;

fn unit(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[axis] = 1.0;
    v
}

fn config_in(dir: &TempDir) -> StoreConfig {
    StoreConfig::new(
        DIM,
        dir.path().join("vectors.index"),
        dir.path().join("vectors_meta.bin"),
    )
}

fn open_in(dir: &TempDir) -> VectorStore {
    VectorStore::open(config_in(dir)).expect("open store")
}

/// Store with ids 1..=n, paths "img_{id}.jpg", vectors along axis (id-1) % DIM.
fn populated(dir: &TempDir, groups: &[i64]) -> VectorStore {
    let mut store = open_in(dir);
    let n = groups.len();
    let vectors: Vec<Vec<f32>> = (0..n).map(|i| unit(i % DIM)).collect();
    let ids: Vec<ImageId> = (1..=n as i64).map(ImageId).collect();
    let paths: Vec<String> = (1..=n).map(|i| format!("img_{}.jpg", i)).collect();
    let group_ids: Vec<GroupId> = groups.iter().copied().map(GroupId).collect();
    store
        .add_batch(&vectors, &ids, &paths, &group_ids)
        .expect("add batch");
    store
}

// =========================================================================
// OPEN TESTS
// =========================================================================

#[test]
fn test_open_without_files_is_empty() {
    let dir = TempDir::new().unwrap();
    let store = open_in(&dir);
    assert!(store.is_empty());
    assert_eq!(store.dimension(), DIM);
    assert!(!store.is_dirty());
    assert!(!dir.path().join("vectors.index").exists());
}

#[test]
fn test_open_rejects_invalid_config() {
    let err = VectorStore::initialize(0, "a.index", "a.meta").unwrap_err();
    assert!(matches!(err, StoreError::InvalidConfig(_)));
}

#[test]
fn test_open_with_only_structure_file_fails() {
    let dir = TempDir::new().unwrap();
    let mut store = populated(&dir, &[1]);
    store.save().unwrap();
    fs::remove_file(dir.path().join("vectors_meta.bin")).unwrap();

    let err = VectorStore::open(config_in(&dir)).unwrap_err();
    assert!(matches!(err, StoreError::UnpairedFiles { .. }));
    assert_eq!(err.kind(), crate::error::ErrorKind::Persistence);
}

#[test]
fn test_open_with_other_dimension_fails() {
    let dir = TempDir::new().unwrap();
    populated(&dir, &[1, 2]).save().unwrap();

    let mut config = config_in(&dir);
    config.dimension = 8;
    let err = VectorStore::open(config).unwrap_err();
    assert!(matches!(
        err,
        StoreError::IncompatibleIndex {
            expected: 8,
            actual: 4
        }
    ));
}

#[test]
fn test_open_corrupted_metadata_fails() {
    let dir = TempDir::new().unwrap();
    populated(&dir, &[1]).save().unwrap();
    let meta_path = dir.path().join("vectors_meta.bin");
    let mut bytes = fs::read(&meta_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&meta_path, bytes).unwrap();

    let err = VectorStore::open(config_in(&dir)).unwrap_err();
    assert!(err.to_string().contains("checksum mismatch"));
}

// =========================================================================
// ADD / QUERY TESTS
// =========================================================================

#[test]
fn test_add_then_query_returns_self_first() {
    let dir = TempDir::new().unwrap();
    let mut store = open_in(&dir);
    let v: Vec<f32> = vec![0.3, -1.2, 0.5, 2.0];
    store
        .add_batch(&[v.clone()], &[ImageId(1)], &["a.jpg".into()], &[GroupId(100)])
        .unwrap();

    let matches = store.query(&v, 1).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].image_id, ImageId(1));
    assert_eq!(matches[0].path, "a.jpg");
    assert_eq!(matches[0].group_id, GroupId(100));
    assert!((matches[0].score - 1.0).abs() < 1e-5);
}

#[test]
fn test_add_normalizes_vectors() {
    let dir = TempDir::new().unwrap();
    let mut store = open_in(&dir);
    store
        .add_batch(&[vec![0.0f32, 3.0, 4.0, 0.0]], &[ImageId(1)], &["a".into()], &[GroupId(1)])
        .unwrap();

    let stored = &store.vectors()[0];
    assert!((stored[1] - 0.6).abs() < 1e-6);
    assert!((stored[2] - 0.8).abs() < 1e-6);
    assert_eq!(store.index().reconstruct(0).unwrap(), stored.as_slice());
}

#[test]
fn test_add_rejects_wrong_dimension_without_mutation() {
    let dir = TempDir::new().unwrap();
    let mut store = populated(&dir, &[1]);
    let err = store
        .add_batch(
            &[unit(0), vec![1.0, 2.0]],
            &[ImageId(10), ImageId(11)],
            &["x".into(), "y".into()],
            &[GroupId(1), GroupId(1)],
        )
        .unwrap_err();

    assert!(matches!(err, StoreError::DimensionMismatch { .. }));
    assert_eq!(store.len(), 1);
    assert!(store.check_consistency().is_aligned());
}

#[test]
fn test_add_rejects_length_mismatch() {
    let dir = TempDir::new().unwrap();
    let mut store = open_in(&dir);
    let err = store
        .add_batch(&[unit(0)], &[ImageId(1)], &[], &[GroupId(1)])
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::LengthMismatch {
            field: "paths",
            expected: 1,
            actual: 0
        }
    ));
}

#[test]
fn test_add_empty_batch_is_noop() {
    let dir = TempDir::new().unwrap();
    let mut store = open_in(&dir);
    let empty: Vec<Vec<f32>> = Vec::new();
    assert_eq!(store.add_batch(&empty, &[], &[], &[]).unwrap(), 0);
    assert!(!store.is_dirty());
}

#[test]
fn test_query_empty_store_returns_nothing() {
    let dir = TempDir::new().unwrap();
    let store = open_in(&dir);
    assert!(store.query(&unit(0), 5).unwrap().is_empty());
}

#[test]
fn test_query_k_larger_than_store() {
    let dir = TempDir::new().unwrap();
    let store = populated(&dir, &[1, 1, 1]);
    let matches = store.query(&unit(0), 50).unwrap();
    assert_eq!(matches.len(), 3);
}

#[test]
fn test_query_orders_by_score_then_position() {
    let dir = TempDir::new().unwrap();
    let mut store = open_in(&dir);
    // Positions 0 and 2 tie on score.
    let vectors = vec![unit(1), unit(0), unit(1)];
    store
        .add_batch(
            &vectors,
            &[ImageId(1), ImageId(2), ImageId(3)],
            &["a".into(), "b".into(), "c".into()],
            &[GroupId(1), GroupId(1), GroupId(1)],
        )
        .unwrap();

    let matches = store.query(&unit(1), 3).unwrap();
    let ids: Vec<ImageId> = matches.iter().map(|m| m.image_id).collect();
    assert_eq!(ids, vec![ImageId(1), ImageId(3), ImageId(2)]);
    assert!(matches[0].score >= matches[2].score);
}

#[test]
fn test_query_rejects_zero_vector() {
    let dir = TempDir::new().unwrap();
    let store = populated(&dir, &[1]);
    let err = store.query(&[0.0; DIM], 1).unwrap_err();
    assert!(matches!(err, StoreError::InvalidVector(_)));
}

#[test]
fn test_query_batch_matches_single_queries() {
    let dir = TempDir::new().unwrap();
    let store = populated(&dir, &[1, 2, 3, 4]);
    let queries = vec![unit(2), unit(0)];

    let batched = store.query_batch(&queries, 2).unwrap();
    assert_eq!(batched.len(), 2);
    assert_eq!(batched[0], store.query(&queries[0], 2).unwrap());
    assert_eq!(batched[1], store.query(&queries[1], 2).unwrap());
    assert_eq!(batched[0][0].image_id, ImageId(3));
}

// =========================================================================
// DELETE TESTS
// =========================================================================

#[test]
fn test_delete_by_image_id_removes_exactly_one() {
    let dir = TempDir::new().unwrap();
    let mut store = populated(&dir, &[1, 2, 3]);

    let outcome = store.delete_by_image_id(ImageId(2)).unwrap();
    assert_eq!(
        outcome,
        DeleteOutcome::Deleted {
            image_id: ImageId(2),
            position: 1
        }
    );
    assert_eq!(store.image_ids(), &[ImageId(1), ImageId(3)]);
    assert_eq!(store.len(), 2);
    assert_eq!(store.rebuild_count(), 1);
    assert!(store.check_consistency().is_aligned());

    let matches = store.query(&unit(1), 10).unwrap();
    assert!(matches.iter().all(|m| m.image_id != ImageId(2)));
}

#[test]
fn test_delete_missing_id_is_not_found() {
    let dir = TempDir::new().unwrap();
    let mut store = populated(&dir, &[1, 2]);
    let outcome = store.delete_by_image_id(ImageId(999)).unwrap();
    assert_eq!(outcome, DeleteOutcome::NotFound);
    assert_eq!(store.rebuild_count(), 0);
    assert!(!store.is_dirty());
}

#[test]
fn test_delete_keeps_relative_order_and_vectors() {
    let dir = TempDir::new().unwrap();
    let mut store = populated(&dir, &[1, 1, 1, 1]);
    store.delete_by_image_id(ImageId(1)).unwrap();

    assert_eq!(store.paths(), &["img_2.jpg", "img_3.jpg", "img_4.jpg"]);
    for position in 0..store.len() {
        assert_eq!(
            store.index().reconstruct(position).unwrap(),
            store.vectors()[position].as_slice()
        );
    }
}

#[test]
fn test_delete_by_group_id_single_rebuild() {
    let dir = TempDir::new().unwrap();
    let mut store = populated(&dir, &[10, 20, 10]);

    let outcome = store.delete_by_group_id(GroupId(10)).unwrap();
    assert_eq!(outcome.removed_count(), 2);
    assert_eq!(
        outcome,
        GroupDeleteOutcome::Deleted {
            group_id: GroupId(10),
            removed: vec![ImageId(1), ImageId(3)]
        }
    );
    assert_eq!(store.image_ids(), &[ImageId(2)]);
    assert_eq!(store.group_ids(), &[GroupId(20)]);
    assert_eq!(store.len(), 1);
    assert_eq!(store.rebuild_count(), 1);
}

#[test]
fn test_delete_missing_group_is_not_found() {
    let dir = TempDir::new().unwrap();
    let mut store = populated(&dir, &[10]);
    let outcome = store.delete_by_group_id(GroupId(99)).unwrap();
    assert_eq!(outcome, GroupDeleteOutcome::NotFound);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_delete_many_reports_each_id() {
    let dir = TempDir::new().unwrap();
    let mut store = populated(&dir, &[1, 1, 1, 1, 1]);

    let outcome = store
        .delete_many(&[ImageId(5), ImageId(1), ImageId(42), ImageId(5)])
        .unwrap();
    assert_eq!(outcome.deleted_count(), 2);
    assert_eq!(outcome.missing(), vec![ImageId(42)]);
    assert_eq!(outcome.rebuilds, 1);
    assert_eq!(store.image_ids(), &[ImageId(2), ImageId(3), ImageId(4)]);
}

#[test]
fn test_delete_many_all_missing_skips_rebuild() {
    let dir = TempDir::new().unwrap();
    let mut store = populated(&dir, &[1]);
    let outcome = store.delete_many(&[ImageId(7)]).unwrap();
    assert_eq!(outcome.rebuilds, 0);
    assert_eq!(store.rebuild_count(), 0);
}

// =========================================================================
// UPDATE / RESET TESTS
// =========================================================================

#[test]
fn test_update_record_vector_and_path() {
    let dir = TempDir::new().unwrap();
    let mut store = populated(&dir, &[1, 1]);

    let outcome = store
        .update_record(ImageId(1), Some(unit(3).as_slice()), Some("renamed.jpg".into()))
        .unwrap();
    assert_eq!(
        outcome,
        UpdateOutcome::Updated {
            image_id: ImageId(1),
            vector_changed: true,
            path_changed: true
        }
    );
    assert_eq!(store.paths()[0], "renamed.jpg");
    assert_eq!(store.query(&unit(3), 1).unwrap()[0].image_id, ImageId(1));
    assert_eq!(store.rebuild_count(), 1);
}

#[test]
fn test_update_record_same_path_is_not_a_change() {
    let dir = TempDir::new().unwrap();
    let mut store = populated(&dir, &[1]);
    let outcome = store
        .update_record(ImageId(1), None, Some("img_1.jpg".into()))
        .unwrap();
    assert_eq!(
        outcome,
        UpdateOutcome::Updated {
            image_id: ImageId(1),
            vector_changed: false,
            path_changed: false
        }
    );
}

#[test]
fn test_update_record_invalid_vector_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let mut store = populated(&dir, &[1]);
    let before = store.vectors().to_vec();
    let err = store
        .update_record(ImageId(1), Some(&[0.0; DIM][..]), Some("new.jpg".into()))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidVector(_)));
    assert_eq!(store.vectors(), before.as_slice());
    assert_eq!(store.paths()[0], "img_1.jpg");
}

#[test]
fn test_update_missing_record() {
    let dir = TempDir::new().unwrap();
    let mut store = populated(&dir, &[1]);
    let outcome = store.update_record(ImageId(2), None, None).unwrap();
    assert_eq!(outcome, UpdateOutcome::NotFound);
}

#[test]
fn test_reset_persists_empty_state() {
    let dir = TempDir::new().unwrap();
    let mut store = populated(&dir, &[1, 2]);
    store.save().unwrap();

    store.reset().unwrap();
    assert!(store.is_empty());
    assert!(store.image_ids().is_empty());

    let reopened = open_in(&dir);
    assert!(reopened.is_empty());
    assert!(reopened.check_consistency().is_aligned());
}

// =========================================================================
// PERSISTENCE TESTS
// =========================================================================

#[test]
fn test_save_then_load_reproduces_sequences() {
    let dir = TempDir::new().unwrap();
    let mut store = populated(&dir, &[5, 6, 5]);
    store.save().unwrap();
    assert!(!store.is_dirty());

    let reopened = open_in(&dir);
    assert_eq!(reopened.image_ids(), store.image_ids());
    assert_eq!(reopened.paths(), store.paths());
    assert_eq!(reopened.group_ids(), store.group_ids());
    assert_eq!(reopened.vectors(), store.vectors());
    assert_eq!(reopened.index(), store.index());
}

#[test]
fn test_save_creates_parent_directories() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::new(
        DIM,
        dir.path().join("nested/deeper/v.index"),
        dir.path().join("nested/deeper/v.meta"),
    );
    let mut store = VectorStore::open(config).unwrap();
    store.save().unwrap();
    assert!(dir.path().join("nested/deeper/v.index").exists());
}

#[test]
fn test_load_reconstructs_missing_vectors() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir);
    config.cache_vectors_in_metadata = false;

    let mut store = VectorStore::open(config.clone()).unwrap();
    store
        .add_batch(
            &[unit(0), unit(2)],
            &[ImageId(1), ImageId(2)],
            &["a".into(), "b".into()],
            &[GroupId(1), GroupId(1)],
        )
        .unwrap();
    store.save().unwrap();

    let reopened = VectorStore::open(config).unwrap();
    assert_eq!(reopened.vectors(), &[unit(0), unit(2)]);
    assert!(reopened.check_consistency().is_aligned());
}

#[test]
fn test_load_reconstructs_short_vectors() {
    let dir = TempDir::new().unwrap();
    let mut store = populated(&dir, &[1, 1, 1]);
    store.save().unwrap();

    // Rewrite metadata with one vector dropped.
    let meta_path = dir.path().join("vectors_meta.bin");
    let mut meta = MetadataFile::from_bytes(&fs::read(&meta_path).unwrap()).unwrap();
    meta.vectors.as_mut().unwrap().pop();
    fs::write(&meta_path, meta.to_bytes().unwrap()).unwrap();

    let reopened = open_in(&dir);
    assert_eq!(reopened.vectors().len(), 3);
    assert_eq!(reopened.vectors(), store.vectors());
}

#[test]
fn test_load_does_not_repair_id_mismatch() {
    let dir = TempDir::new().unwrap();
    populated(&dir, &[1, 1]).save().unwrap();

    let meta_path = dir.path().join("vectors_meta.bin");
    let mut meta = MetadataFile::from_bytes(&fs::read(&meta_path).unwrap()).unwrap();
    meta.image_ids.pop();
    fs::write(&meta_path, meta.to_bytes().unwrap()).unwrap();

    let reopened = open_in(&dir);
    let report = reopened.check_consistency();
    assert_eq!(report.num_image_ids, 1);
    assert_eq!(report.num_vectors, 2);
    assert!(!report.is_aligned());
    assert!(report.ensure_aligned().is_err());
}

// =========================================================================
// LOOKUP / DIAGNOSTIC TESTS
// =========================================================================

#[test]
fn test_get_ids_by_group() {
    let dir = TempDir::new().unwrap();
    let store = populated(&dir, &[7, 8, 7, 9]);
    assert_eq!(store.get_ids_by_group(GroupId(7)), vec![ImageId(1), ImageId(3)]);
    assert!(store.get_ids_by_group(GroupId(1)).is_empty());
    assert_eq!(store.unique_group_count(), 3);
}

#[test]
fn test_record_lookups() {
    let dir = TempDir::new().unwrap();
    let store = populated(&dir, &[7, 8]);
    assert!(store.contains_image_id(ImageId(2)));
    assert!(!store.contains_image_id(ImageId(3)));
    assert!(store.contains_path("img_1.jpg"));

    let record = store.record_by_image_id(ImageId(2)).unwrap();
    assert_eq!(record.group_id, GroupId(8));
    assert_eq!(record.vector, unit(1));
    assert!(store.record_by_image_id(ImageId(9)).is_none());
}

#[test]
fn test_check_consistency_counts() {
    let dir = TempDir::new().unwrap();
    let store = populated(&dir, &[1, 1, 2]);
    let report = store.check_consistency();
    assert!(report.is_aligned());
    assert_eq!(report.num_vectors, 3);
    assert_eq!(report.num_unique_group_ids, 2);
    assert_eq!(report.duplicate_image_ids(), 0);
    assert_eq!(report.num_nan_vectors, 0);
    assert_eq!(report.min_vector_value, Some(0.0));
    assert_eq!(report.max_vector_value, Some(1.0));
}

#[test]
fn test_check_consistency_empty_store() {
    let dir = TempDir::new().unwrap();
    let report = open_in(&dir).check_consistency();
    assert!(report.is_aligned());
    assert_eq!(report.min_vector_value, None);
}

#[test]
fn test_search_records_pages() {
    let dir = TempDir::new().unwrap();
    let store = populated(&dir, &[1; 12]);

    let page = store.search_records("", 2, 5).unwrap();
    assert_eq!(page.total, 12);
    assert_eq!(page.records.len(), 5);
    assert_eq!(page.records[0].image_id, ImageId(6));

    let last = store.search_records("", 3, 5).unwrap();
    assert_eq!(last.records.len(), 2);
}

#[test]
fn test_search_records_matches_path_case_insensitive() {
    let dir = TempDir::new().unwrap();
    let store = populated(&dir, &[1; 12]);

    let page = store.search_records("IMG_1", 1, 20).unwrap();
    // img_1, img_10, img_11, img_12
    assert_eq!(page.total, 4);
}

#[test]
fn test_search_records_rejects_zero_page() {
    let dir = TempDir::new().unwrap();
    let store = populated(&dir, &[1]);
    assert!(matches!(
        store.search_records("", 0, 10).unwrap_err(),
        StoreError::InvalidArgument(_)
    ));
}

#[test]
fn test_sample_records() {
    let dir = TempDir::new().unwrap();
    let store = populated(&dir, &[1; 6]);
    let sample = store.sample_records(2);
    assert_eq!(sample.total, 6);
    let first: Vec<usize> = sample.first.iter().map(|r| r.position).collect();
    let last: Vec<usize> = sample.last.iter().map(|r| r.position).collect();
    assert_eq!(first, vec![0, 1]);
    assert_eq!(last, vec![4, 5]);
}
