//! B-tree and hash indexes agree with a linear scan.

use std::collections::BTreeSet;
use std::fs;

use minibase_core::index::{index_path, Index, IndexKind};
use minibase_core::storage::{BlockStore, RecordPointer};
use minibase_core::types::Value;
use ntest::timeout;

use super::helpers::{movie_fields, populate_movies, temp_config};

/// Pointers of rows whose field equals `value`, found by scanning.
fn scan_pointers(store: &BlockStore, field: &str, value: &str) -> BTreeSet<RecordPointer> {
    let index = store.field_index(field).unwrap();
    let target = Value::parse(store.fields()[index].field_type(), value).unwrap();
    store
        .entries()
        .filter(|(record, _)| record.values[index].loosely_equals(&target))
        .map(|(_, position)| position.pointer())
        .collect()
}

#[timeout(10000)]
#[test]
fn test_indexes_agree_with_scan() {
    let (_dir, config) = temp_config();
    populate_movies(&config, 1500);

    let probes = [
        ("id", vec!["0", "1", "749", "1499", "1500", "-3"]),
        ("title", vec!["t0", "t5", "t36", "t37", "nothing"]),
        ("year", vec!["1950", "1957", "2009", "1951", "1800"]),
    ];

    for kind in [IndexKind::BTree, IndexKind::Hash] {
        for (field, values) in &probes {
            let mut index = Index::create(&config, "movie", field, kind).unwrap();
            let store = BlockStore::open_existing(&config.data_dir, "movie").unwrap();
            for value in values {
                let found: BTreeSet<RecordPointer> =
                    index.search(field, value).unwrap().into_iter().collect();
                let expected = scan_pointers(&store, field, value);
                assert_eq!(
                    found, expected,
                    "{:?} index on {} disagrees with scan for {}",
                    kind, field, value
                );
                for ptr in &found {
                    assert!(store.record_at(*ptr).is_some());
                }
            }
            store.close().unwrap();
        }
    }
}

#[timeout(10000)]
#[test]
fn test_btree_grows_internal_levels() {
    let (_dir, config) = temp_config();
    populate_movies(&config, 2000);
    let mut index = Index::create(&config, "movie", "year", IndexKind::BTree).unwrap();
    assert!(index.meta().has_root);
    assert_eq!(index.meta().level_count, 2);
    // 60 distinct years over 8 leaves, so runs of one year straddle leaf boundaries
    let store = BlockStore::open_existing(&config.data_dir, "movie").unwrap();
    for year in ["1950", "1980", "2009"] {
        let hits = index.search("year", year).unwrap().len();
        assert_eq!(hits, scan_pointers(&store, "year", year).len());
        assert!(hits > 0);
    }
}

#[timeout(5000)]
#[test]
fn test_rebuild_is_byte_identical() {
    let (_dir, config) = temp_config();
    populate_movies(&config, 700);
    for kind in [IndexKind::BTree, IndexKind::Hash] {
        Index::create(&config, "movie", "title", kind).unwrap();
        let first = fs::read(index_path(&config.data_dir, "movie", kind)).unwrap();
        Index::create(&config, "movie", "title", kind).unwrap();
        let second = fs::read(index_path(&config.data_dir, "movie", kind)).unwrap();
        assert_eq!(first, second);
    }
}

#[timeout(2000)]
#[test]
fn test_empty_table_index() {
    let (_dir, config) = temp_config();
    BlockStore::open(&config.data_dir, "movie", Some(&movie_fields()))
        .unwrap()
        .close()
        .unwrap();
    for kind in [IndexKind::BTree, IndexKind::Hash] {
        let mut index = Index::create(&config, "movie", "id", kind).unwrap();
        assert!(!index.meta().has_root);
        assert_eq!(index.meta().root_block_id, -1);
        assert!(index.search("id", "1").unwrap().is_empty());

        let mut reopened = Index::open(&config, "movie", kind).unwrap();
        assert!(reopened.search("id", "1").unwrap().is_empty());
    }
}

#[timeout(5000)]
#[test]
fn test_index_is_stale_until_rebuilt() {
    let (_dir, config) = temp_config();
    populate_movies(&config, 10);
    let mut index = Index::create(&config, "movie", "id", IndexKind::Hash).unwrap();

    let mut store = BlockStore::open_existing(&config.data_dir, "movie").unwrap();
    store.insert(&["500", "late", "2000", "1"]).unwrap();
    store.close().unwrap();
    assert!(index.search("id", "500").unwrap().is_empty());

    let mut index = Index::create(&config, "movie", "id", IndexKind::Hash).unwrap();
    assert_eq!(index.search("id", "500").unwrap().len(), 1);
}
