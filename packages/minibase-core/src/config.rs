//! Engine configuration.

use std::env;
use std::path::{Path, PathBuf};

use crate::error::DbError;

/// Smallest key width that still holds an 8-byte integer key.
pub const MIN_KEY_WIDTH: usize = 8;
/// Largest key width accepted for index entries.
pub const MAX_KEY_WIDTH: usize = 64;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Directory holding table files, index files and the schema catalog
    pub data_dir: PathBuf,
    /// Directory for before/after image log files
    pub log_dir: PathBuf,
    /// Bytes reserved per index key (string keys are truncated to this width)
    pub index_key_width: usize,
    /// Number of buckets in a hash index
    pub hash_bucket_count: usize,
    /// Maximum number of leaf blocks a B-tree search may walk forward
    pub btree_scan_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            log_dir: PathBuf::from("./logs"),
            index_key_width: 8,
            hash_bucket_count: 1024,
            btree_scan_cap: 1024,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration rooted at `data_dir`, with logs in `data_dir/logs`.
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        Self {
            log_dir: data_dir.join("logs"),
            data_dir,
            ..Default::default()
        }
    }

    /// Path of the `.dat` file backing `table`.
    pub fn table_path(&self, table: &str) -> PathBuf {
        crate::storage::table_file(&self.data_dir, table)
    }

    /// Applies environment variable overrides.
    ///
    /// Variables are prefixed with `MINIBASE_`, e.g. `MINIBASE_DATA_DIR=/srv/db`.
    pub fn apply_env_overrides(&mut self) -> Result<(), DbError> {
        if let Ok(val) = env::var("MINIBASE_DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("MINIBASE_LOG_DIR") {
            self.log_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("MINIBASE_KEY_WIDTH") {
            self.index_key_width = val
                .parse()
                .map_err(|_| DbError::Config(format!("Invalid index_key_width: {}", val)))?;
        }
        if let Ok(val) = env::var("MINIBASE_HASH_BUCKETS") {
            self.hash_bucket_count = val
                .parse()
                .map_err(|_| DbError::Config(format!("Invalid hash_bucket_count: {}", val)))?;
        }
        if let Ok(val) = env::var("MINIBASE_BTREE_SCAN_CAP") {
            self.btree_scan_cap = val
                .parse()
                .map_err(|_| DbError::Config(format!("Invalid btree_scan_cap: {}", val)))?;
        }
        self.validate()
    }

    /// Rejects values the on-disk formats cannot represent.
    pub fn validate(&self) -> Result<(), DbError> {
        if !(MIN_KEY_WIDTH..=MAX_KEY_WIDTH).contains(&self.index_key_width) {
            return Err(DbError::Config(format!(
                "index_key_width {} outside {}..={}",
                self.index_key_width, MIN_KEY_WIDTH, MAX_KEY_WIDTH
            )));
        }
        if self.hash_bucket_count == 0 || self.hash_bucket_count > u32::MAX as usize {
            return Err(DbError::Config(format!(
                "hash_bucket_count {} must be between 1 and {}",
                self.hash_bucket_count,
                u32::MAX
            )));
        }
        if self.btree_scan_cap == 0 {
            return Err(DbError::Config("btree_scan_cap must be positive".to_string()));
        }
        Ok(())
    }
}
