//! Shared fixtures.

use minibase_core::config::EngineConfig;
use minibase_core::storage::BlockStore;
use minibase_core::types::{FieldDescriptor, FieldType};
use tempfile::TempDir;

/// Fresh configuration rooted in its own temp directory.
pub fn temp_config() -> (TempDir, EngineConfig) {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::with_data_dir(dir.path());
    (dir, config)
}

/// `movie(id INTEGER(6), title VARSTRING(7), year INTEGER(4), color BOOLEAN(1))`
pub fn movie_fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::new("id", FieldType::Integer, 6).unwrap(),
        FieldDescriptor::new("title", FieldType::VarString, 7).unwrap(),
        FieldDescriptor::new("year", FieldType::Integer, 4).unwrap(),
        FieldDescriptor::new("color", FieldType::Boolean, 1).unwrap(),
    ]
}

/// Writes `rows` movies with repeating titles and years.
pub fn populate_movies(config: &EngineConfig, rows: usize) {
    let mut store = BlockStore::open(&config.data_dir, "movie", Some(&movie_fields())).unwrap();
    for i in 0..rows {
        store
            .insert(&[
                i.to_string(),
                format!("t{}", i % 37),
                (1950 + (i * 7) % 60).to_string(),
                (i % 2).to_string(),
            ])
            .unwrap();
    }
    store.close().unwrap();
}
