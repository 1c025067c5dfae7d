//! Database configuration

use std::path::{Path, PathBuf};

/// Default data directory
pub const DEFAULT_DATA_DIR: &str = "./recstore_data";

/// Default catalog file name (inside the data directory)
pub const DEFAULT_CATALOG_FILE: &str = "catalog.jsonl";

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Directory holding the catalog and the table store files
    pub data_dir: PathBuf,
    /// Catalog file name
    pub catalog_file: String,
    /// fsync every store write
    pub sync_writes: bool,
    /// Compact a store log on close once it holds this many entries per live key
    pub compaction_ratio: usize,
    /// Never compact logs shorter than this
    pub compaction_min_entries: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            catalog_file: DEFAULT_CATALOG_FILE.to_string(),
            sync_writes: false,
            compaction_ratio: 4,
            compaction_min_entries: 64,
        }
    }
}

impl DatabaseConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Set the catalog file name
    pub fn catalog_file(mut self, name: impl Into<String>) -> Self {
        self.catalog_file = name.into();
        self
    }

    /// Enable or disable fsync on every write
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Set the compaction thresholds
    pub fn compaction(mut self, ratio: usize, min_entries: usize) -> Self {
        self.compaction_ratio = ratio.max(1);
        self.compaction_min_entries = min_entries;
        self
    }

    /// Full path of the catalog file
    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join(&self.catalog_file)
    }

    /// Data directory as a path
    pub fn data_path(&self) -> &Path {
        &self.data_dir
    }
}
