//! Block store: one table file, loaded eagerly into memory.
//!
//! The in-memory record list is the working set. Inserts append to the last
//! data block in place; deletes and updates change the list and then
//! regenerate every data block through [`BlockStore::rewrite`], which costs
//! O(rows) per mutation.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog::SchemaResolver;
use crate::error::{classify_io_error, DbError, SchemaError, StorageError};
use crate::journal::{MutationKind, MutationSink, NoopSink};
use crate::types::{FieldDescriptor, Value};

use super::block::{DataBlock, TableMeta, BLOCK_SIZE, DATA_HEADER_SIZE, MAX_FIELDS, SLOT_SIZE};
use super::record::{
    decode_record, encode_record, record_length, today, validate_value, validate_values, Record,
};

/// Address of a record inside a table file: data block id and in-block
/// byte offset. This is what index entries point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordPointer {
    pub block_id: u32,
    pub offset: u32,
}

/// Where a loaded record lives on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordPosition {
    pub block_id: u32,
    pub slot: u32,
    pub offset: u32,
}

impl RecordPosition {
    pub fn pointer(&self) -> RecordPointer {
        RecordPointer {
            block_id: self.block_id,
            offset: self.offset,
        }
    }
}

/// Path of the file backing `table` inside `dir`.
pub fn table_file(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{}.dat", table.trim()))
}

/// Checks a table definition before it is written to a meta block.
pub fn check_definition(table: &str, fields: &[FieldDescriptor]) -> Result<(), SchemaError> {
    if fields.is_empty() {
        return Err(SchemaError::SchemaRequired {
            table: table.to_string(),
        });
    }
    if fields.len() > MAX_FIELDS {
        return Err(SchemaError::ArityMismatch {
            table: table.to_string(),
            expected: MAX_FIELDS,
            got: fields.len(),
        });
    }
    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field.name()) {
            return Err(SchemaError::DuplicateField {
                table: table.to_string(),
                field: field.name().to_string(),
            });
        }
    }
    let width = record_length(fields);
    let max = BLOCK_SIZE - DATA_HEADER_SIZE - SLOT_SIZE;
    if width > max {
        return Err(SchemaError::RecordTooWide {
            table: table.to_string(),
            width,
            max,
        });
    }
    Ok(())
}

fn block_start(block_id: u32) -> u64 {
    block_id as u64 * BLOCK_SIZE as u64
}

/// Storage for one table.
#[derive(Debug)]
pub struct BlockStore {
    table: String,
    path: PathBuf,
    file: File,
    meta: TableMeta,
    records: Vec<Record>,
    positions: Vec<RecordPosition>,
    sink: Arc<dyn MutationSink>,
    // data written since the last sync
    dirty: bool,
}

impl BlockStore {
    /// Opens the table file in `dir`, creating it from `fields` when it does
    /// not exist yet.
    ///
    /// When the file exists, supplied descriptors must match the stored
    /// meta block exactly.
    pub fn open(
        dir: impl AsRef<Path>,
        table: &str,
        fields: Option<&[FieldDescriptor]>,
    ) -> Result<Self, DbError> {
        let dir = dir.as_ref();
        let table = table.trim();
        let path = table_file(dir, table);
        let is_new = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);

        if is_new {
            let fields = fields.ok_or_else(|| SchemaError::SchemaRequired {
                table: table.to_string(),
            })?;
            check_definition(table, fields)?;
            fs::create_dir_all(dir)
                .map_err(|e| classify_io_error(e, &format!("create {}", dir.display())))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| classify_io_error(e, &format!("open {}", path.display())))?;

        let mut store = Self {
            table: table.to_string(),
            path,
            file,
            meta: TableMeta {
                data_block_count: 0,
                fields: Vec::new(),
            },
            records: Vec::new(),
            positions: Vec::new(),
            sink: Arc::new(NoopSink::default()),
            dirty: false,
        };

        match (is_new, fields) {
            (true, Some(fields)) => {
                store.meta.fields = fields.to_vec();
                store.write_meta()?;
                store.sync()?;
                tracing::info!(
                    "Created table '{}' with {} fields ({} byte records)",
                    store.table,
                    fields.len(),
                    record_length(fields)
                );
            }
            _ => {
                store.load()?;
                if let Some(fields) = fields {
                    store.check_matches(fields)?;
                }
            }
        }
        Ok(store)
    }

    /// Opens a table whose file must already exist.
    pub fn open_existing(dir: impl AsRef<Path>, table: &str) -> Result<Self, DbError> {
        let dir = dir.as_ref();
        let path = table_file(dir, table);
        if !path.exists() {
            return Err(StorageError::TableNotFound(table.trim().to_string()).into());
        }
        Self::open(dir, table, None)
    }

    /// Opens a table, taking its definition from `resolver` when the file
    /// has to be created.
    pub fn open_with_resolver(
        dir: impl AsRef<Path>,
        table: &str,
        resolver: &dyn SchemaResolver,
    ) -> Result<Self, DbError> {
        let fields = resolver.fields_for(table)?;
        Self::open(dir, table, Some(&fields))
    }

    /// Routes mutation notifications to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn MutationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Removes the table file. Returns false when there was none.
    pub fn drop_table(dir: impl AsRef<Path>, table: &str) -> Result<bool, DbError> {
        let path = table_file(dir.as_ref(), table);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("Dropped table file {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(classify_io_error(e, &format!("remove {}", path.display()))),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.meta.fields
    }

    pub fn meta(&self) -> &TableMeta {
        &self.meta
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Width of one encoded record, header included.
    pub fn record_width(&self) -> usize {
        record_length(&self.meta.fields)
    }

    /// Every loaded record in block order.
    pub fn scan(&self) -> &[Record] {
        &self.records
    }

    /// Records paired with their on-disk positions.
    pub fn entries(&self) -> impl Iterator<Item = (&Record, RecordPosition)> {
        self.records.iter().zip(self.positions.iter().copied())
    }

    /// Resolves an index hit back to its record.
    pub fn record_at(&self, ptr: RecordPointer) -> Option<&Record> {
        self.positions
            .iter()
            .position(|p| p.pointer() == ptr)
            .map(|i| &self.records[i])
    }

    /// Position of `name` among the table's fields.
    pub fn field_index(&self, name: &str) -> Result<usize, SchemaError> {
        let name = name.trim();
        self.meta
            .fields
            .iter()
            .position(|f| f.name() == name)
            .ok_or_else(|| SchemaError::FieldNotFound {
                table: self.table.clone(),
                field: name.to_string(),
            })
    }

    /// Parses a lookup literal for field `index`.
    fn parse_literal(&self, index: usize, raw: &str) -> Result<Value, SchemaError> {
        let field = &self.meta.fields[index];
        Value::parse(field.field_type(), raw).ok_or_else(|| SchemaError::TypeCoercionFailed {
            table: self.table.clone(),
            field: field.name().to_string(),
            value: raw.trim().to_string(),
            expected: field.field_type().name(),
        })
    }

    fn first_match(&self, field: &str, value: &str) -> Result<Option<usize>, SchemaError> {
        let index = self.field_index(field)?;
        let target = self.parse_literal(index, value)?;
        Ok(self
            .records
            .iter()
            .position(|r| r.values[index].loosely_equals(&target)))
    }

    /// Validates and appends one record.
    ///
    /// Nothing is written unless every value passes validation.
    pub fn insert<S: AsRef<str>>(&mut self, raw: &[S]) -> Result<RecordPointer, DbError> {
        let values = validate_values(&self.table, &self.meta.fields, raw)?;
        let tx = self.sink.begin(MutationKind::Insert, &self.table)?;
        self.sink
            .before_image(tx, MutationKind::Insert, &self.table, None)?;

        let last_update = today();
        let body = encode_record(&self.meta.fields, &values, &last_update);

        let last = match self.meta.data_block_count {
            0 => None,
            id => Some(self.read_data_block(id)?),
        };
        let (mut block, appended) = match last {
            Some(block) if block.can_fit(body.len()) => (block, false),
            _ => (DataBlock::new(self.meta.data_block_count + 1), true),
        };
        let offset = block
            .push_record(&body)
            .ok_or_else(|| SchemaError::RecordTooWide {
                table: self.table.clone(),
                width: body.len(),
                max: BLOCK_SIZE - DATA_HEADER_SIZE - SLOT_SIZE,
            })?;

        self.dirty = true;
        self.write_block(&block)?;
        if appended {
            self.meta.data_block_count = block.block_id();
            self.write_meta()?;
            tracing::debug!(
                "Table '{}' grew to {} data blocks",
                self.table,
                self.meta.data_block_count
            );
        }

        let position = RecordPosition {
            block_id: block.block_id(),
            slot: block.record_count() - 1,
            offset,
        };
        self.sink
            .after_image(tx, MutationKind::Insert, &self.table, Some(&values))?;
        self.records.push(Record {
            values,
            last_update,
        });
        self.positions.push(position);
        self.sink.commit(tx, MutationKind::Insert, &self.table)?;
        Ok(position.pointer())
    }

    /// Records whose `field` equals `value` after type coercion.
    pub fn find_by_field(&self, field: &str, value: &str) -> Result<Vec<Record>, DbError> {
        let index = self.field_index(field)?;
        let target = self.parse_literal(index, value)?;
        Ok(self
            .records
            .iter()
            .filter(|r| r.values[index].loosely_equals(&target))
            .cloned()
            .collect())
    }

    /// Deletes the first record whose `field` equals `value`, then rewrites
    /// the table. Returns false when nothing matched.
    pub fn delete_by_field(&mut self, field: &str, value: &str) -> Result<bool, DbError> {
        let Some(index) = self.first_match(field, value)? else {
            return Ok(false);
        };
        let tx = self.sink.begin(MutationKind::Delete, &self.table)?;
        self.sink.before_image(
            tx,
            MutationKind::Delete,
            &self.table,
            Some(&self.records[index].values),
        )?;
        self.records.remove(index);
        self.positions.remove(index);
        self.rewrite()?;
        self.sink
            .after_image(tx, MutationKind::Delete, &self.table, None)?;
        self.sink.commit(tx, MutationKind::Delete, &self.table)?;
        Ok(true)
    }

    /// Sets `update_field` on the first record whose `match_field` equals
    /// `match_value`, then rewrites the table. Returns false when nothing
    /// matched.
    pub fn update_by_field(
        &mut self,
        match_field: &str,
        match_value: &str,
        update_field: &str,
        new_value: &str,
    ) -> Result<bool, DbError> {
        let target = self.field_index(update_field)?;
        let new_value = validate_value(&self.table, &self.meta.fields[target], new_value)?;
        let Some(index) = self.first_match(match_field, match_value)? else {
            return Ok(false);
        };

        let tx = self.sink.begin(MutationKind::Update, &self.table)?;
        self.sink.before_image(
            tx,
            MutationKind::Update,
            &self.table,
            Some(&self.records[index].values),
        )?;
        let record = &mut self.records[index];
        record.values[target] = new_value;
        record.last_update = today();
        self.rewrite()?;
        self.sink.after_image(
            tx,
            MutationKind::Update,
            &self.table,
            Some(&self.records[index].values),
        )?;
        self.sink.commit(tx, MutationKind::Update, &self.table)?;
        Ok(true)
    }

    /// Regenerates every data block from the in-memory records.
    ///
    /// Rows are packed in order into as many consecutive blocks as they
    /// need. Data blocks are written before the meta block and the file is
    /// truncated last, so the stored block count never names a block past
    /// the end of the file.
    pub fn rewrite(&mut self) -> Result<(), DbError> {
        let mut blocks: Vec<DataBlock> = Vec::new();
        let mut positions = Vec::with_capacity(self.records.len());

        for record in &self.records {
            let body = encode_record(&self.meta.fields, &record.values, &record.last_update);
            let fits = blocks.last().is_some_and(|b| b.can_fit(body.len()));
            if !fits {
                blocks.push(DataBlock::new(blocks.len() as u32 + 1));
            }
            let Some(block) = blocks.last_mut() else {
                continue;
            };
            let offset = block
                .push_record(&body)
                .ok_or_else(|| SchemaError::RecordTooWide {
                    table: self.table.clone(),
                    width: body.len(),
                    max: BLOCK_SIZE - DATA_HEADER_SIZE - SLOT_SIZE,
                })?;
            positions.push(RecordPosition {
                block_id: block.block_id(),
                slot: block.record_count() - 1,
                offset,
            });
        }

        self.dirty = true;
        for block in &blocks {
            self.write_block(block)?;
        }
        let block_count = blocks.len() as u32;
        self.meta.data_block_count = block_count;
        self.write_meta()?;
        self.file
            .set_len(block_start(block_count + 1))
            .map_err(|e| classify_io_error(e, &format!("truncate {}", self.path.display())))?;
        self.sync()?;
        self.dirty = false;
        self.positions = positions;

        tracing::info!(
            "Rewrote table '{}': {} records in {} data blocks",
            self.table,
            self.records.len(),
            block_count
        );
        Ok(())
    }

    /// Flushes the meta block if anything was written, then releases the
    /// file. Read-only handles close without touching the disk.
    pub fn close(mut self) -> Result<(), DbError> {
        if self.dirty {
            self.write_meta()?;
            self.sync()?;
        }
        tracing::debug!("Closed table '{}'", self.table);
        Ok(())
    }

    fn check_matches(&self, fields: &[FieldDescriptor]) -> Result<(), SchemaError> {
        if fields == self.meta.fields.as_slice() {
            return Ok(());
        }
        let stored: Vec<String> = self
            .meta
            .fields
            .iter()
            .map(|f| format!("{}:{}({})", f.name(), f.field_type().name(), f.length()))
            .collect();
        Err(SchemaError::SchemaMismatch {
            table: self.table.clone(),
            detail: format!("stored fields are [{}]", stored.join(", ")),
        })
    }

    fn load(&mut self) -> Result<(), DbError> {
        let meta_bytes = self.read_block(0)?;
        self.meta = TableMeta::decode(&self.table, &meta_bytes)?;
        self.check_file_length()?;
        let width = self.record_width();

        for block_id in 1..=self.meta.data_block_count {
            let block = self.read_data_block(block_id)?;

            for slot in 0..block.record_count() {
                let malformed = |offset: u32, detail: String| StorageError::MalformedRecord {
                    table: self.table.clone(),
                    block_id,
                    offset,
                    detail,
                };
                let offset = block
                    .slot(slot as usize)
                    .ok_or_else(|| malformed(0, format!("slot {} missing", slot)))?;
                let body = block.body(offset, width).ok_or_else(|| {
                    malformed(offset, format!("{} byte record overruns the block", width))
                })?;
                let record =
                    decode_record(&self.meta.fields, body).map_err(|e| malformed(offset, e))?;
                self.records.push(record);
                self.positions.push(RecordPosition {
                    block_id,
                    slot,
                    offset,
                });
            }
        }

        tracing::debug!(
            "Loaded table '{}': {} records in {} data blocks",
            self.table,
            self.records.len(),
            self.meta.data_block_count
        );
        Ok(())
    }

    /// Reconciles the stored block count with the file length.
    ///
    /// A count past the end of the file by more than one block is corrupt.
    /// A single missing or short tail block is dropped from the count, and
    /// the meta block is rewritten on close.
    fn check_file_length(&mut self) -> Result<(), DbError> {
        let len = self
            .file
            .metadata()
            .map_err(|e| classify_io_error(e, &format!("stat {}", self.path.display())))?
            .len();
        let complete = (len / BLOCK_SIZE as u64).saturating_sub(1);
        let claimed = u64::from(self.meta.data_block_count);
        if claimed <= complete {
            return Ok(());
        }
        if claimed > complete + 1 {
            return Err(StorageError::CorruptMeta {
                table: self.table.clone(),
                detail: format!(
                    "meta block claims {} data blocks, file holds {}",
                    claimed, complete
                ),
            }
            .into());
        }
        tracing::warn!(
            "Dropping truncated data block {} of table '{}' ({} byte file)",
            claimed,
            self.table,
            len
        );
        self.meta.data_block_count = complete as u32;
        self.dirty = true;
        Ok(())
    }

    /// Reads and checks data block `block_id`.
    fn read_data_block(&mut self, block_id: u32) -> Result<DataBlock, DbError> {
        let bytes = self.read_block(block_id)?;
        let malformed = |detail: String| StorageError::MalformedBlock {
            table: self.table.clone(),
            block_id,
            detail,
        };
        if bytes.len() < BLOCK_SIZE {
            return Err(malformed(format!("block is {} bytes", bytes.len())).into());
        }
        let block = DataBlock::from_bytes(bytes);
        if block.block_id() != block_id {
            return Err(malformed(format!("header names block {}", block.block_id())).into());
        }
        block.validate(&self.table)?;
        Ok(block)
    }

    fn read_block(&mut self, block_id: u32) -> Result<Vec<u8>, DbError> {
        let context = format!("read block {} of {}", block_id, self.path.display());
        self.file
            .seek(SeekFrom::Start(block_start(block_id)))
            .map_err(|e| classify_io_error(e, &context))?;
        let mut buf = Vec::with_capacity(BLOCK_SIZE);
        (&mut self.file)
            .take(BLOCK_SIZE as u64)
            .read_to_end(&mut buf)
            .map_err(|e| classify_io_error(e, &context))?;
        Ok(buf)
    }

    fn write_at(&mut self, block_id: u32, bytes: &[u8]) -> Result<(), DbError> {
        let context = format!("write block {} of {}", block_id, self.path.display());
        self.file
            .seek(SeekFrom::Start(block_start(block_id)))
            .map_err(|e| classify_io_error(e, &context))?;
        self.file
            .write_all(bytes)
            .map_err(|e| classify_io_error(e, &context))
    }

    fn write_block(&mut self, block: &DataBlock) -> Result<(), DbError> {
        self.write_at(block.block_id(), block.as_bytes())
    }

    fn write_meta(&mut self) -> Result<(), DbError> {
        let bytes = self.meta.encode();
        self.write_at(0, &bytes)
    }

    fn sync(&mut self) -> Result<(), DbError> {
        self.file
            .sync_all()
            .map_err(|e| classify_io_error(e, &format!("sync {}", self.path.display())))
    }
}
