//! Schema catalog: maps table names to ordered field descriptors.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{classify_io_error, DbError, SchemaError, StorageError};
use crate::storage::check_definition;
use crate::types::FieldDescriptor;

/// Catalog file name inside the data directory.
pub const CATALOG_FILE: &str = "schema.json";

const CATALOG_VERSION: u32 = 1;

/// Lookup service: table name to ordered field descriptors.
pub trait SchemaResolver {
    fn fields_for(&self, table: &str) -> Result<Vec<FieldDescriptor>, DbError>;
}

/// In-memory catalog.
#[derive(Debug, Default, Clone)]
pub struct MemoryCatalog {
    tables: HashMap<String, Vec<FieldDescriptor>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table. Fails if the name is taken or the field list is
    /// empty or repeats a name.
    pub fn append_table(
        &mut self,
        table: &str,
        fields: Vec<FieldDescriptor>,
    ) -> Result<(), DbError> {
        let table = table.trim();
        if self.tables.contains_key(table) {
            return Err(SchemaError::TableAlreadyExists(table.to_string()).into());
        }
        check_definition(table, &fields)?;
        self.tables.insert(table.to_string(), fields);
        Ok(())
    }

    /// Removes a table, returning its former fields.
    pub fn delete_table(&mut self, table: &str) -> Result<Vec<FieldDescriptor>, DbError> {
        let table = table.trim();
        self.tables
            .remove(table)
            .ok_or_else(|| SchemaError::TableNotFound(table.to_string()).into())
    }

    pub fn find_table(&self, table: &str) -> bool {
        self.tables.contains_key(table.trim())
    }

    /// Registered table names, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}

impl SchemaResolver for MemoryCatalog {
    fn fields_for(&self, table: &str) -> Result<Vec<FieldDescriptor>, DbError> {
        let table = table.trim();
        self.tables
            .get(table)
            .cloned()
            .ok_or_else(|| SchemaError::TableNotFound(table.to_string()).into())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    version: u32,
    tables: BTreeMap<String, Vec<FieldDescriptor>>,
}

/// Catalog persisted as `schema.json` in the data directory.
///
/// Every mutation rewrites the whole file through a temporary file and an
/// atomic rename.
#[derive(Debug)]
pub struct JsonCatalog {
    path: PathBuf,
    inner: MemoryCatalog,
}

impl JsonCatalog {
    /// Loads the catalog from `data_dir`, starting empty when no file exists.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = data_dir.as_ref().join(CATALOG_FILE);
        let mut inner = MemoryCatalog::new();
        if path.exists() {
            let contents = fs::read_to_string(&path)
                .map_err(|e| classify_io_error(e, &format!("read {}", path.display())))?;
            let file: CatalogFile = serde_json::from_str(&contents).map_err(|e| {
                StorageError::Serialization(format!("Failed to parse catalog: {}", e))
            })?;
            if file.version != CATALOG_VERSION {
                return Err(StorageError::Serialization(format!(
                    "Unsupported catalog version: {}",
                    file.version
                ))
                .into());
            }
            for (table, fields) in file.tables {
                inner.append_table(&table, fields)?;
            }
            tracing::debug!(
                "Loaded catalog {} with {} tables",
                path.display(),
                inner.tables.len()
            );
        }
        Ok(Self { path, inner })
    }

    fn save(&self) -> Result<(), DbError> {
        let file = CatalogFile {
            version: CATALOG_VERSION,
            tables: self
                .inner
                .tables
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| classify_io_error(e, "create data directory"))?;
        }
        let temp_path = self.path.with_extension("json.tmp");
        let mut temp = File::create(&temp_path)
            .map_err(|e| classify_io_error(e, "create catalog temp file"))?;
        temp.write_all(json.as_bytes())
            .map_err(|e| classify_io_error(e, "write catalog"))?;
        temp.sync_all()
            .map_err(|e| classify_io_error(e, "sync catalog"))?;
        fs::rename(&temp_path, &self.path)
            .map_err(|e| classify_io_error(e, "rename catalog file"))?;
        Ok(())
    }

    pub fn append_table(
        &mut self,
        table: &str,
        fields: Vec<FieldDescriptor>,
    ) -> Result<(), DbError> {
        self.inner.append_table(table, fields)?;
        self.save()
    }

    pub fn delete_table(&mut self, table: &str) -> Result<Vec<FieldDescriptor>, DbError> {
        let fields = self.inner.delete_table(table)?;
        self.save()?;
        Ok(fields)
    }

    pub fn find_table(&self, table: &str) -> bool {
        self.inner.find_table(table)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.inner.table_names()
    }
}

impl SchemaResolver for JsonCatalog {
    fn fields_for(&self, table: &str) -> Result<Vec<FieldDescriptor>, DbError> {
        self.inner.fields_for(table)
    }
}
