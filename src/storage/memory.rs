//! In-memory stores
//!
//! Data lives only as long as the backend. Useful for tests and scratch tables.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::store::{KvStore, StorageBackend};
use crate::error::{Error, Result};

type Entries = IndexMap<Vec<u8>, Vec<u8>>;

/// Backend keeping every store in memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    stores: Mutex<HashMap<String, Arc<Mutex<Entries>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn stores(&self) -> Result<MutexGuard<'_, HashMap<String, Arc<Mutex<Entries>>>>> {
        self.stores
            .lock()
            .map_err(|_| Error::Internal("memory backend lock poisoned".to_string()))
    }

    /// Names of the stores that currently exist
    #[cfg(test)]
    fn store_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.stores()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

impl StorageBackend for MemoryBackend {
    fn open(&self, name: &str) -> Result<Box<dyn KvStore>> {
        let entries = self.stores()?.entry(name.to_string()).or_default().clone();
        Ok(Box::new(MemoryStore { entries }))
    }

    fn destroy(&self, name: &str) -> Result<()> {
        self.stores()?.remove(name);
        Ok(())
    }
}

/// An open in-memory store
#[derive(Debug)]
pub struct MemoryStore {
    entries: Arc<Mutex<Entries>>,
}

impl MemoryStore {
    fn lock(&self) -> Result<MutexGuard<'_, Entries>> {
        self.entries
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".to_string()))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.lock()?.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<bool> {
        Ok(self.lock()?.shift_remove(key).is_some())
    }

    fn values(&self) -> Result<Vec<Vec<u8>>> {
        Ok(self.lock()?.values().cloned().collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
