//! Backing store interface
//!
//! Every table keeps its records in one key-value store. The engine only talks
//! to stores through these traits, so the persistence mechanism can be swapped
//! without touching table logic.

use std::fmt;

use crate::error::Result;

/// An open key-value store holding the records of one table.
///
/// Keys and values are opaque bytes. Iteration follows the store's own order.
pub trait KvStore {
    /// Look up a value
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Insert or overwrite a value
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove a key, returning whether it existed
    fn delete(&mut self, key: &[u8]) -> Result<bool>;

    /// Check whether a key exists
    fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// All values in iteration order
    fn values(&self) -> Result<Vec<Vec<u8>>>;

    /// Number of live keys
    fn count(&self) -> Result<usize>;

    /// Flush and release the store
    fn close(self: Box<Self>) -> Result<()>;
}

/// Opens and destroys the stores of a database
pub trait StorageBackend: fmt::Debug + Send + Sync {
    /// Open the store for `name`, creating it empty if it does not exist
    fn open(&self, name: &str) -> Result<Box<dyn KvStore>>;

    /// Remove every persisted artifact of the store for `name`
    fn destroy(&self, name: &str) -> Result<()>;
}

/// Open a store, run `f` against it, and close it on every exit path.
///
/// An error from `f` takes precedence over an error raised while closing.
pub fn with_store<T>(
    backend: &dyn StorageBackend,
    name: &str,
    f: impl FnOnce(&mut dyn KvStore) -> Result<T>,
) -> Result<T> {
    let mut store = backend.open(name)?;
    let result = f(store.as_mut());
    let closed = store.close();
    let value = result?;
    closed?;
    Ok(value)
}
