//! Single-user, file-backed relational storage engine.
//!
//! Tables live in files of fixed 4096-byte blocks: a meta block holding the
//! field descriptors, followed by slotted data blocks of fixed-width
//! records. Secondary B-tree and hash indexes over one field are bulk-built
//! from a table scan into their own block files. A nested-loop executor
//! evaluates cross/filter/project plans over the stored tables.
//!
//! ```no_run
//! use minibase_core::{Database, EngineConfig, FieldDescriptor, FieldType, IndexKind};
//!
//! # fn main() -> Result<(), minibase_core::DbError> {
//! let db = Database::open(EngineConfig::with_data_dir("./data"))?;
//! db.create_table(
//!     "movie",
//!     vec![
//!         FieldDescriptor::new("id", FieldType::Integer, 6)?,
//!         FieldDescriptor::new("title", FieldType::VarString, 30)?,
//!     ],
//! )?;
//! db.insert("movie", &["1", "Alien"])?;
//! db.create_index("movie", "id", IndexKind::BTree)?;
//! let rows = db.search_index("movie", "id", "1", IndexKind::BTree)?;
//! assert_eq!(rows.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod index;
pub mod journal;
pub mod query;
pub mod storage;
pub mod types;

pub use catalog::{JsonCatalog, MemoryCatalog, SchemaResolver};
pub use config::EngineConfig;
pub use database::Database;
pub use error::{DbError, DbResult, IndexError, QueryError, SchemaError, StorageError};
pub use index::{Index, IndexKind};
pub use journal::{FileLogSink, MutationKind, MutationSink, NoopSink, TracingSink};
pub use query::{Column, LogicalPlan, PlanBuilder, Predicate, QueryExecutor, ResultSet};
pub use storage::{BlockStore, Record, RecordPointer};
pub use types::{FieldDescriptor, FieldType, Row, Value};
