//! Point lookup benchmarks: linear scan versus B-tree and hash indexes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use minibase_core::config::EngineConfig;
use minibase_core::index::{Index, IndexKind};
use minibase_core::storage::BlockStore;
use minibase_core::types::{FieldDescriptor, FieldType};
use rand::Rng;
use std::hint::black_box;
use std::time::Duration;
use tempfile::TempDir;

/// Creates `account(id INTEGER(8), owner VARSTRING(16))` with `rows` records.
fn populate(rows: usize) -> (TempDir, EngineConfig) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = EngineConfig::with_data_dir(dir.path());
    let fields = vec![
        FieldDescriptor::new("id", FieldType::Integer, 8).unwrap(),
        FieldDescriptor::new("owner", FieldType::VarString, 16).unwrap(),
    ];
    let mut store = BlockStore::open(&config.data_dir, "account", Some(&fields))
        .expect("Failed to create benchmark table");
    for i in 0..rows {
        store
            .insert(&[i.to_string(), format!("owner{}", i % 997)])
            .unwrap();
    }
    store.close().unwrap();
    (dir, config)
}

fn benchmark_point_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("point_lookup");
    group.sample_size(30);
    group.warm_up_time(Duration::from_secs(1));

    for rows in [1_000usize, 10_000] {
        let (_dir, config) = populate(rows);
        let mut rng = rand::thread_rng();

        let store = BlockStore::open_existing(&config.data_dir, "account").unwrap();
        group.bench_with_input(BenchmarkId::new("scan", rows), &rows, |b, &rows| {
            b.iter(|| {
                let key = rng.gen_range(0..rows).to_string();
                black_box(store.find_by_field("id", &key).unwrap())
            })
        });
        store.close().unwrap();

        for kind in [IndexKind::BTree, IndexKind::Hash] {
            let mut index = Index::create(&config, "account", "id", kind).unwrap();
            group.bench_with_input(BenchmarkId::new(kind.name(), rows), &rows, |b, &rows| {
                b.iter(|| {
                    let key = rng.gen_range(0..rows).to_string();
                    black_box(index.search("id", &key).unwrap())
                })
            });
        }
    }
    group.finish();
}

fn benchmark_index_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_build");
    group.sample_size(10);
    let (_dir, config) = populate(10_000);

    for kind in [IndexKind::BTree, IndexKind::Hash] {
        group.bench_function(BenchmarkId::new(kind.name(), 10_000), |b| {
            b.iter(|| black_box(Index::create(&config, "account", "owner", kind).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_point_lookup, benchmark_index_build);
criterion_main!(benches);
