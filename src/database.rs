//! Database: the registry of tables
//!
//! Loads the catalog at startup, builds one [`Table`] per row, and keeps the
//! catalog file in step as tables are created and dropped.

use indexmap::IndexMap;
use std::fs;
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::{Catalog, Field, TableDef};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::executor::SelectionCriterion;
use crate::storage::{FileBackend, Record, StorageBackend, Table};

/// An open database
#[derive(Debug)]
pub struct Database {
    config: DatabaseConfig,
    catalog: Catalog,
    backend: Arc<dyn StorageBackend>,
    /// Tables in catalog order
    tables: IndexMap<String, Table>,
    table_count: usize,
}

impl Database {
    /// Open the database in `config.data_dir`, storing tables in log files
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        let backend = Arc::new(FileBackend::new(&config));
        Self::with_backend(config, backend)
    }

    /// Open the database with table stores provided by `backend`.
    ///
    /// The catalog file still lives in `config.data_dir`.
    pub fn with_backend(config: DatabaseConfig, backend: Arc<dyn StorageBackend>) -> Result<Self> {
        fs::create_dir_all(config.data_path())?;
        let catalog = Catalog::new(config.catalog_path());

        let mut tables = IndexMap::new();
        for def in catalog.load()? {
            if tables.contains_key(&def.name) {
                warn!(table = %def.name, "duplicate catalog row ignored");
                continue;
            }
            let table = Table::open(&def, backend.clone())?;
            tables.insert(def.name.clone(), table);
        }

        let table_count = tables.len();
        info!(
            data_dir = %config.data_path().display(),
            tables = table_count,
            "opened database"
        );

        Ok(Self {
            config,
            catalog,
            backend,
            tables,
            table_count,
        })
    }

    /// Get the configuration the database was opened with
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Create a new, empty table
    pub fn create_table(
        &mut self,
        name: &str,
        fields: Vec<Field>,
        key_field_name: &str,
    ) -> Result<&mut Table> {
        if !is_valid_table_name(name) {
            return Err(Error::InvalidTableName(name.to_string()));
        }
        if self.tables.contains_key(name) {
            return Err(Error::DuplicateTable(name.to_string()));
        }

        let def = TableDef::new(name, fields, key_field_name);
        if !def.has_valid_key() {
            return Err(Error::InvalidKey(
                key_field_name.to_string(),
                name.to_string(),
            ));
        }

        // a store left behind by an earlier crash must not leak into the new table
        self.backend.destroy(name)?;
        let table = Table::open(&def, self.backend.clone())?;
        self.catalog.append(&def)?;

        self.table_count += 1;
        info!(table = name, key = key_field_name, "created table");

        let entry = self.tables.entry(name.to_string()).or_insert(table);
        Ok(entry)
    }

    /// Get a table by name
    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    /// Get a table by name for modification
    pub fn get_table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    /// Drop a table along with its records and catalog row.
    ///
    /// The table stays registered unless both its store and its catalog row
    /// are gone.
    pub fn delete_table(&mut self, name: &str) -> Result<()> {
        let table = self.get_table(name)?;
        table.destroy()?;
        self.catalog.remove(name)?;

        self.tables.shift_remove(name);
        self.table_count -= 1;

        info!(table = name, "deleted table");
        Ok(())
    }

    /// Table names in catalog order
    pub fn list_table_names(&self) -> Vec<&str> {
        self.tables.keys().map(|name| name.as_str()).collect()
    }

    /// Number of tables
    pub fn num_tables(&self) -> usize {
        self.table_count
    }

    /// Join several tables. Not implemented.
    pub fn query_multiple_tables(
        &self,
        _tables: &[&str],
        _criteria_per_table: &[Vec<SelectionCriterion>],
        _join_fields: &[(&str, &str)],
    ) -> Result<Vec<Record>> {
        Err(Error::NotSupported(
            "queries across multiple tables".to_string(),
        ))
    }
}

/// Table names end up in file names
fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
