//! Database facade tying the catalog, table files, indexes and the mutation
//! sink together.

use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::catalog::{JsonCatalog, SchemaResolver};
use crate::config::EngineConfig;
use crate::error::{classify_io_error, DbError, SchemaError, StorageError};
use crate::index::{self, Index, IndexInfo, IndexKind, IndexMeta};
use crate::journal::{MutationKind, MutationSink, NoopSink};
use crate::query::{LogicalPlan, PlanBuilder, Predicate, QueryExecutor, ResultSet};
use crate::storage::{BlockStore, RecordPointer};
use crate::types::{FieldDescriptor, Row, Value};

/// Database rooted at one data directory.
///
/// Table files are opened per operation and closed before it returns; only
/// the catalog stays in memory.
#[derive(Debug)]
pub struct Database {
    config: EngineConfig,
    catalog: RwLock<JsonCatalog>,
    sink: Arc<dyn MutationSink>,
}

impl Database {
    /// Opens (creating if needed) the database in `config.data_dir`.
    pub fn open(config: EngineConfig) -> Result<Self, DbError> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            classify_io_error(e, &format!("create {}", config.data_dir.display()))
        })?;
        let catalog = JsonCatalog::open(&config.data_dir)?;
        tracing::info!(
            "Opened database at {} ({} tables)",
            config.data_dir.display(),
            catalog.table_names().len()
        );
        Ok(Self {
            config,
            catalog: RwLock::new(catalog),
            sink: Arc::new(NoopSink::default()),
        })
    }

    /// Routes mutation notifications to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn MutationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Creates a table file and registers it in the catalog.
    pub fn create_table(&self, name: &str, fields: Vec<FieldDescriptor>) -> Result<(), DbError> {
        let name = name.trim();
        let mut catalog = self.catalog.write().map_err(|_| StorageError::LockPoisoned)?;
        if catalog.find_table(name) {
            return Err(SchemaError::TableAlreadyExists(name.to_string()).into());
        }

        let tx = self.sink.begin(MutationKind::CreateTable, name)?;
        self.sink
            .before_image(tx, MutationKind::CreateTable, name, None)?;
        BlockStore::open(self.data_dir(), name, Some(&fields))?.close()?;
        let names: Row = fields
            .iter()
            .map(|f| Value::Text(f.name().to_string()))
            .collect();
        catalog.append_table(name, fields)?;
        self.sink
            .after_image(tx, MutationKind::CreateTable, name, Some(&names))?;
        self.sink.commit(tx, MutationKind::CreateTable, name)?;
        Ok(())
    }

    /// Removes a table, its file and any index files.
    pub fn drop_table(&self, name: &str) -> Result<(), DbError> {
        let name = name.trim();
        let mut catalog = self.catalog.write().map_err(|_| StorageError::LockPoisoned)?;
        let fields = catalog.delete_table(name)?;

        let tx = self.sink.begin(MutationKind::DropTable, name)?;
        let names: Row = fields
            .iter()
            .map(|f| Value::Text(f.name().to_string()))
            .collect();
        self.sink
            .before_image(tx, MutationKind::DropTable, name, Some(&names))?;
        BlockStore::drop_table(self.data_dir(), name)?;
        for kind in [IndexKind::BTree, IndexKind::Hash] {
            index::drop_index(&self.config, name, kind)?;
        }
        self.sink
            .after_image(tx, MutationKind::DropTable, name, None)?;
        self.sink.commit(tx, MutationKind::DropTable, name)?;
        Ok(())
    }

    /// Registered table names, sorted.
    pub fn table_names(&self) -> Result<Vec<String>, DbError> {
        let catalog = self.catalog.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(catalog.table_names())
    }

    /// Field descriptors of `table`.
    pub fn fields(&self, table: &str) -> Result<Vec<FieldDescriptor>, DbError> {
        let catalog = self.catalog.read().map_err(|_| StorageError::LockPoisoned)?;
        catalog.fields_for(table)
    }

    fn store(&self, table: &str) -> Result<BlockStore, DbError> {
        let catalog = self.catalog.read().map_err(|_| StorageError::LockPoisoned)?;
        let store = BlockStore::open_with_resolver(self.data_dir(), table, &*catalog)?;
        Ok(store.with_sink(Arc::clone(&self.sink)))
    }

    /// Inserts one row of raw values.
    pub fn insert<S: AsRef<str>>(&self, table: &str, values: &[S]) -> Result<RecordPointer, DbError> {
        let mut store = self.store(table)?;
        let ptr = store.insert(values)?;
        store.close()?;
        Ok(ptr)
    }

    /// Every row of `table`.
    pub fn scan(&self, table: &str) -> Result<Vec<Row>, DbError> {
        let store = self.store(table)?;
        let rows = store.scan().iter().map(|r| r.values.clone()).collect();
        store.close()?;
        Ok(rows)
    }

    /// Rows whose `field` equals `value`, by linear scan.
    pub fn find(&self, table: &str, field: &str, value: &str) -> Result<Vec<Row>, DbError> {
        let store = self.store(table)?;
        let rows = store
            .find_by_field(field, value)?
            .into_iter()
            .map(|r| r.values)
            .collect();
        store.close()?;
        Ok(rows)
    }

    /// Deletes the first row whose `field` equals `value`.
    pub fn delete_where(&self, table: &str, field: &str, value: &str) -> Result<bool, DbError> {
        let mut store = self.store(table)?;
        let deleted = store.delete_by_field(field, value)?;
        store.close()?;
        Ok(deleted)
    }

    /// Updates the first row whose `match_field` equals `match_value`.
    pub fn update_where(
        &self,
        table: &str,
        match_field: &str,
        match_value: &str,
        update_field: &str,
        new_value: &str,
    ) -> Result<bool, DbError> {
        let mut store = self.store(table)?;
        let updated = store.update_by_field(match_field, match_value, update_field, new_value)?;
        store.close()?;
        Ok(updated)
    }

    /// Builds (or rebuilds) a `kind` index on `field` of `table`.
    pub fn create_index(
        &self,
        table: &str,
        field: &str,
        kind: IndexKind,
    ) -> Result<IndexMeta, DbError> {
        self.fields(table)?;
        let index = Index::create(&self.config, table, field, kind)?;
        Ok(index.meta().clone())
    }

    /// Rows whose `field` equals `value`, located through the `kind` index.
    ///
    /// Hits are resolved back to rows and rechecked against the full value,
    /// so string keys that only share a prefix are dropped.
    pub fn search_index(
        &self,
        table: &str,
        field: &str,
        value: &str,
        kind: IndexKind,
    ) -> Result<Vec<Row>, DbError> {
        let pointers = Index::open(&self.config, table, kind)?.search(field, value)?;
        let store = self.store(table)?;
        let position = store.field_index(field)?;
        let target = Value::parse(store.fields()[position].field_type(), value);
        let rows = pointers
            .into_iter()
            .filter_map(|ptr| store.record_at(ptr))
            .filter(|record| {
                target
                    .as_ref()
                    .is_some_and(|t| record.values[position].loosely_equals(t))
            })
            .map(|record| record.values.clone())
            .collect();
        store.close()?;
        Ok(rows)
    }

    pub fn drop_index(&self, table: &str, kind: IndexKind) -> Result<bool, DbError> {
        index::drop_index(&self.config, table, kind)
    }

    pub fn list_indexes(&self, table: &str) -> Result<Vec<IndexInfo>, DbError> {
        index::list_indexes(&self.config, table)
    }

    /// Evaluates a logical plan.
    pub fn query(&self, plan: &LogicalPlan) -> Result<ResultSet, DbError> {
        QueryExecutor::new(&self.config).evaluate(plan)
    }

    /// Builds and evaluates a select-from-where plan.
    pub fn select(
        &self,
        select_list: &[&str],
        from_list: &[&str],
        where_list: Vec<Predicate>,
    ) -> Result<ResultSet, DbError> {
        for table in from_list {
            self.fields(table)?;
        }
        self.query(&PlanBuilder::select(select_list, from_list, where_list))
    }
}
