//! Secondary indexes over a single table field.
//!
//! An index is rebuilt from a full table scan on every [`Index::create`];
//! inserts, updates and deletes on the table do not touch it. Callers that
//! need a current index rebuild it after mutating.

pub mod btree;
pub mod hash;
pub mod key;
pub mod meta;

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::EngineConfig;
use crate::error::{classify_io_error, DbError, IndexError, SchemaError};
use crate::storage::block::{read_u32, write_u32, BLOCK_SIZE};
use crate::storage::{BlockStore, RecordPointer};
use crate::types::Value;

pub use key::{KeyCodec, KeyKind};
pub use meta::{IndexKind, IndexMeta};

/// Encoded key and the record it points at.
pub type IndexEntry = (Vec<u8>, RecordPointer);

pub(crate) fn block_offset(block_id: u32) -> u64 {
    block_id as u64 * BLOCK_SIZE as u64
}

pub(crate) fn write_entry(buf: &mut [u8], at: usize, key: &[u8], ptr: RecordPointer) {
    let width = key.len();
    buf[at..at + width].copy_from_slice(key);
    write_u32(buf, at + width, ptr.block_id);
    write_u32(buf, at + width + 4, ptr.offset);
}

pub(crate) fn read_entry(buf: &[u8], at: usize, width: usize) -> IndexEntry {
    (
        buf[at..at + width].to_vec(),
        RecordPointer {
            block_id: read_u32(buf, at + width),
            offset: read_u32(buf, at + width + 4),
        },
    )
}

/// Reads up to `len` bytes at `pos`; a short result means end of file.
///
/// The buffer is sized by what the file actually holds, so a corrupt length
/// read from disk cannot force a huge allocation.
pub(crate) fn read_at(
    file: &mut File,
    path: &Path,
    pos: u64,
    len: usize,
) -> Result<Vec<u8>, DbError> {
    let context = format!("read {} bytes at {} of {}", len, pos, path.display());
    let remaining = file
        .metadata()
        .map_err(|e| classify_io_error(e, &context))?
        .len()
        .saturating_sub(pos);
    file.seek(SeekFrom::Start(pos))
        .map_err(|e| classify_io_error(e, &context))?;
    let mut buf = Vec::with_capacity(len.min(usize::try_from(remaining).unwrap_or(usize::MAX)));
    file.take(len as u64)
        .read_to_end(&mut buf)
        .map_err(|e| classify_io_error(e, &context))?;
    Ok(buf)
}

pub(crate) fn write_at(file: &mut File, path: &Path, pos: u64, bytes: &[u8]) -> Result<(), DbError> {
    let context = format!("write {} bytes at {} of {}", bytes.len(), pos, path.display());
    file.seek(SeekFrom::Start(pos))
        .map_err(|e| classify_io_error(e, &context))?;
    file.write_all(bytes)
        .map_err(|e| classify_io_error(e, &context))
}

/// Path of the `kind` index file for `table`.
pub fn index_path(dir: &Path, table: &str, kind: IndexKind) -> PathBuf {
    dir.join(format!("{}.{}", table.trim(), kind.extension()))
}

/// An index file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub kind: IndexKind,
    pub path: PathBuf,
    pub size: u64,
}

/// Index files that exist for `table`.
pub fn list_indexes(config: &EngineConfig, table: &str) -> Result<Vec<IndexInfo>, DbError> {
    let mut found = Vec::new();
    for kind in [IndexKind::BTree, IndexKind::Hash] {
        let path = index_path(&config.data_dir, table, kind);
        match fs::metadata(&path) {
            Ok(m) => found.push(IndexInfo {
                kind,
                path,
                size: m.len(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(classify_io_error(e, &format!("stat {}", path.display()))),
        }
    }
    Ok(found)
}

/// Removes the `kind` index of `table`. Returns false when there was none.
pub fn drop_index(config: &EngineConfig, table: &str, kind: IndexKind) -> Result<bool, DbError> {
    let path = index_path(&config.data_dir, table, kind);
    match fs::remove_file(&path) {
        Ok(()) => {
            tracing::info!("Dropped {} index {}", kind.name(), path.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(classify_io_error(e, &format!("remove {}", path.display()))),
    }
}

/// An open index file.
#[derive(Debug)]
pub struct Index {
    table: String,
    path: PathBuf,
    file: File,
    meta: IndexMeta,
    codec: KeyCodec,
    scan_cap: usize,
}

impl Index {
    /// Builds a `kind` index on `field` of `table`, replacing any previous
    /// index of that kind.
    ///
    /// An empty table yields an empty index (`has_root == false`).
    pub fn create(
        config: &EngineConfig,
        table: &str,
        field: &str,
        kind: IndexKind,
    ) -> Result<Self, DbError> {
        config.validate()?;
        let table = table.trim();
        let store = BlockStore::open_existing(&config.data_dir, table)?;
        let field_index = store.field_index(field)?;
        let descriptor = store.fields()[field_index].clone();
        let key_kind = KeyKind::for_field(&descriptor)?;
        let codec = KeyCodec::new(key_kind, config.index_key_width);

        let mut entries = Vec::with_capacity(store.len());
        for (record, position) in store.entries() {
            match record.values.get(field_index).and_then(|v| codec.encode(v)) {
                Some(key) => entries.push((key, position.pointer())),
                None => tracing::warn!(
                    "Skipping record at block {} offset {} of '{}': no {} key for '{}'",
                    position.block_id,
                    position.offset,
                    table,
                    kind.name(),
                    descriptor.name()
                ),
            }
        }
        store.close()?;

        let path = index_path(&config.data_dir, table, kind);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| classify_io_error(e, &format!("create {}", path.display())))?;

        let count = entries.len();
        let meta = match kind {
            IndexKind::BTree => btree::build(&mut file, &path, &codec, entries, descriptor.name())?,
            IndexKind::Hash => hash::build(
                &mut file,
                &path,
                &codec,
                entries,
                config.hash_bucket_count,
                descriptor.name(),
            )?,
        };
        file.sync_all()
            .map_err(|e| classify_io_error(e, &format!("sync {}", path.display())))?;
        tracing::info!(
            "Built {} index on {}.{} ({} entries, {} blocks)",
            kind.name(),
            table,
            descriptor.name(),
            count,
            meta.data_block_count
        );

        Ok(Self {
            table: table.to_string(),
            path,
            file,
            meta,
            codec,
            scan_cap: config.btree_scan_cap,
        })
    }

    /// Opens an existing `kind` index of `table`.
    pub fn open(config: &EngineConfig, table: &str, kind: IndexKind) -> Result<Self, DbError> {
        let table = table.trim();
        let path = index_path(&config.data_dir, table, kind);
        let mut file = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IndexError::NotFound {
                    table: table.to_string(),
                    kind: kind.name(),
                }
                .into())
            }
            Err(e) => return Err(classify_io_error(e, &format!("open {}", path.display()))),
        };
        let buf = read_at(&mut file, &path, 0, BLOCK_SIZE)?;
        let meta = IndexMeta::decode(&path.display().to_string(), &buf)?;
        if meta.kind != kind {
            return Err(IndexError::KindMismatch {
                path: path.display().to_string(),
                expected: kind.name(),
                found: meta.kind.name(),
            }
            .into());
        }
        let codec = KeyCodec::new(meta.key_kind, meta.key_width as usize);
        Ok(Self {
            table: table.to_string(),
            path,
            file,
            meta,
            codec,
            scan_cap: config.btree_scan_cap,
        })
    }

    pub fn kind(&self) -> IndexKind {
        self.meta.kind
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the indexed field.
    pub fn field(&self) -> &str {
        &self.meta.field_name
    }

    /// Record pointers whose key equals `value`.
    ///
    /// Text keys are compared on their first `index_key_width` bytes, so
    /// longer strings sharing that prefix are returned as well.
    pub fn search(&mut self, field: &str, value: &str) -> Result<Vec<RecordPointer>, DbError> {
        let field = field.trim();
        if field != self.meta.field_name {
            return Err(IndexError::FieldNotIndexed {
                table: self.table.clone(),
                field: field.to_string(),
                indexed: self.meta.field_name.clone(),
            }
            .into());
        }
        let literal_type = self.codec.kind().literal_type();
        let key = Value::parse(literal_type, value)
            .and_then(|v| self.codec.encode(&v))
            .ok_or_else(|| SchemaError::TypeCoercionFailed {
                table: self.table.clone(),
                field: field.to_string(),
                value: value.trim().to_string(),
                expected: literal_type.name(),
            })?;

        match self.meta.kind {
            IndexKind::BTree => btree::search(
                &mut self.file,
                &self.path,
                &self.meta,
                &self.codec,
                &key,
                self.scan_cap,
            ),
            IndexKind::Hash => hash::search(&mut self.file, &self.path, &self.meta, &self.codec, &key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldDescriptor, FieldType};
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> EngineConfig {
        let config = EngineConfig::with_data_dir(dir.path());
        let fields = vec![
            FieldDescriptor::new("id", FieldType::Integer, 6).unwrap(),
            FieldDescriptor::new("name", FieldType::VarString, 12).unwrap(),
            FieldDescriptor::new("alive", FieldType::Boolean, 1).unwrap(),
        ];
        let mut store = BlockStore::open(&config.data_dir, "star", Some(&fields)).unwrap();
        for (id, name) in [(1, "ford"), (2, "fisher"), (3, "ford"), (4, "hamill")] {
            store.insert(&[id.to_string(), name.to_string(), "1".to_string()]).unwrap();
        }
        store.close().unwrap();
        config
    }

    #[test]
    fn test_create_and_search_both_kinds() {
        let dir = TempDir::new().unwrap();
        let config = setup(&dir);
        for kind in [IndexKind::BTree, IndexKind::Hash] {
            let mut index = Index::create(&config, "star", "name", kind).unwrap();
            assert_eq!(index.search("name", "ford").unwrap().len(), 2);
            assert!(index.search("name", "leia").unwrap().is_empty());

            let mut reopened = Index::open(&config, "star", kind).unwrap();
            assert_eq!(reopened.field(), "name");
            assert_eq!(reopened.search("name", " hamill ").unwrap().len(), 1);
        }
        assert_eq!(list_indexes(&config, "star").unwrap().len(), 2);
    }

    #[test]
    fn test_search_validates_field_and_literal() {
        let dir = TempDir::new().unwrap();
        let config = setup(&dir);
        let mut index = Index::create(&config, "star", "id", IndexKind::BTree).unwrap();
        assert!(matches!(
            index.search("name", "ford"),
            Err(DbError::Index(IndexError::FieldNotIndexed { .. }))
        ));
        assert!(matches!(
            index.search("id", "four"),
            Err(DbError::Schema(SchemaError::TypeCoercionFailed { .. }))
        ));
    }

    #[test]
    fn test_create_errors() {
        let dir = TempDir::new().unwrap();
        let config = setup(&dir);
        assert!(matches!(
            Index::create(&config, "star", "nope", IndexKind::Hash),
            Err(DbError::Schema(SchemaError::FieldNotFound { .. }))
        ));
        assert!(matches!(
            Index::create(&config, "star", "alive", IndexKind::Hash),
            Err(DbError::Index(IndexError::UnsupportedKeyType { .. }))
        ));
    }

    #[test]
    fn test_open_missing_and_mismatched() {
        let dir = TempDir::new().unwrap();
        let config = setup(&dir);
        assert!(matches!(
            Index::open(&config, "star", IndexKind::Hash),
            Err(DbError::Index(IndexError::NotFound { .. }))
        ));
        Index::create(&config, "star", "id", IndexKind::BTree).unwrap();
        fs::copy(
            index_path(&config.data_dir, "star", IndexKind::BTree),
            index_path(&config.data_dir, "star", IndexKind::Hash),
        )
        .unwrap();
        assert!(matches!(
            Index::open(&config, "star", IndexKind::Hash),
            Err(DbError::Index(IndexError::KindMismatch { .. }))
        ));
    }

    #[test]
    fn test_drop_index() {
        let dir = TempDir::new().unwrap();
        let config = setup(&dir);
        Index::create(&config, "star", "id", IndexKind::Hash).unwrap();
        assert!(drop_index(&config, "star", IndexKind::Hash).unwrap());
        assert!(!drop_index(&config, "star", IndexKind::Hash).unwrap());
        assert!(list_indexes(&config, "star").unwrap().is_empty());
    }
}
