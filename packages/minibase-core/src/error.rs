//! Database error types.
//!
//! Errors are grouped by the layer that raises them. Every public operation
//! returns [`DbError`], which wraps the layer-specific enums so callers can
//! match on the concrete cause.

use std::io::ErrorKind;

use thiserror::Error;

/// Schema and field validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Field not found in table
    #[error("Field '{field}' not found in table '{table}'")]
    FieldNotFound { table: String, field: String },

    /// Value is longer than the declared field length
    #[error("Value for field '{field}' in table '{table}' is {len} bytes, limit {max}")]
    FieldTooLong {
        table: String,
        field: String,
        len: usize,
        max: usize,
    },

    /// Value cannot be coerced to the field type
    #[error("Cannot coerce '{value}' to {expected} for field '{field}' in table '{table}'")]
    TypeCoercionFailed {
        table: String,
        field: String,
        value: String,
        expected: &'static str,
    },

    /// A new table file needs field descriptors
    #[error("Table '{table}' has no stored schema and none was supplied")]
    SchemaRequired { table: String },

    /// Supplied descriptors disagree with the stored meta block
    #[error("Schema mismatch for table '{table}': {detail}")]
    SchemaMismatch { table: String, detail: String },

    /// Field name is empty or longer than the on-disk limit
    #[error("Invalid field name '{name}': {reason}")]
    InvalidFieldName { name: String, reason: &'static str },

    /// Duplicate field name in a table definition
    #[error("Field '{field}' declared twice in table '{table}'")]
    DuplicateField { table: String, field: String },

    /// Wrong number of values for a record
    #[error("Table '{table}' expects {expected} values, got {got}")]
    ArityMismatch {
        table: String,
        expected: usize,
        got: usize,
    },

    /// A single record cannot fit in an empty data block
    #[error("Record width {width} of table '{table}' exceeds block capacity {max}")]
    RecordTooWide {
        table: String,
        width: usize,
        max: usize,
    },

    /// Table already registered in the catalog
    #[error("Table '{0}' already exists")]
    TableAlreadyExists(String),

    /// Table not registered in the catalog
    #[error("Table '{0}' not found in catalog")]
    TableNotFound(String),
}

/// Block file and I/O errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// I/O error during a file operation
    #[error("I/O error: {0}")]
    Io(String),

    /// Disk full while writing
    #[error("Disk full: {0}")]
    DiskFull(String),

    /// Meta block unreadable or inconsistent
    #[error("Corrupt meta block in '{table}': {detail}")]
    CorruptMeta { table: String, detail: String },

    /// Data block header or slot array out of range
    #[error("Malformed data block {block_id} in '{table}': {detail}")]
    MalformedBlock {
        table: String,
        block_id: u32,
        detail: String,
    },

    /// Record body could not be decoded
    #[error("Malformed record in '{table}' block {block_id} at offset {offset}: {detail}")]
    MalformedRecord {
        table: String,
        block_id: u32,
        offset: u32,
        detail: String,
    },

    /// Table file does not exist
    #[error("Table file for '{0}' does not exist")]
    TableNotFound(String),

    /// Lock poisoned (Mutex poisoned)
    #[error("Lock poisoned")]
    LockPoisoned,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Secondary index errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// Node or bucket read returned fewer bytes than the layout requires
    #[error("Index '{path}' is corrupt: {detail}")]
    Corrupt { path: String, detail: String },

    /// Field type cannot be used as an index key
    #[error("Field '{field}' of type {field_type} cannot be indexed")]
    UnsupportedKeyType {
        field: String,
        field_type: &'static str,
    },

    /// Search names a field the index was not built on
    #[error("Index on '{table}' covers field '{indexed}', not '{field}'")]
    FieldNotIndexed {
        table: String,
        field: String,
        indexed: String,
    },

    /// Index file does not exist
    #[error("No {kind} index exists for table '{table}'")]
    NotFound { table: String, kind: &'static str },

    /// Index layout does not fit its on-disk address width
    #[error("Index '{path}' is too large: {detail}")]
    TooLarge { path: String, detail: String },

    /// File on disk holds the other index kind
    #[error("Index file '{path}' holds a {found} index, expected {expected}")]
    KindMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Logical plan evaluation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Field reference resolves to zero or several columns
    #[error("Field reference '{reference}' is unknown or ambiguous")]
    AmbiguousOrUnknownField { reference: String },

    /// Literal cannot be coerced to the referenced field type
    #[error("Literal '{literal}' cannot be compared with {expected} field '{field}'")]
    LiteralCoercion {
        field: String,
        literal: String,
        expected: &'static str,
    },
}

/// Umbrella error returned by every public operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Query(#[from] QueryError),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result alias used across the crate.
pub type DbResult<T> = Result<T, DbError>;

/// Classifies I/O errors into storage error variants.
pub fn classify_io_error(error: std::io::Error, context: &str) -> DbError {
    match error.kind() {
        ErrorKind::StorageFull | ErrorKind::OutOfMemory => {
            StorageError::DiskFull(format!("{}: {}", context, error)).into()
        }
        _ => StorageError::Io(format!("{}: {}", context, error)).into(),
    }
}
