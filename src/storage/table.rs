//! Table storage for RecStore
//!
//! A table keeps its records in one backing store, keyed by the canonical text
//! form of the key field. Every operation opens the store, does its work, and
//! closes it again.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::record::{decode_record, encode_record, Record, Value};
use super::store::{with_store, KvStore, StorageBackend};
use crate::catalog::{Field, TableDef};
use crate::error::{Error, Result};
use crate::executor::{matches, Operator, SelectionCriterion};

/// A table of records with a unique key field
#[derive(Debug)]
pub struct Table {
    /// Table name (also the store name)
    name: String,
    /// Known fields in discovery order
    fields: Vec<Field>,
    /// Name of the unique key field
    key_field: String,
    /// Cached number of stored records
    record_count: usize,
    /// Fields with a declared index
    indexes: Vec<String>,
    backend: Arc<dyn StorageBackend>,
}

impl Table {
    /// Open the table described by `def`, creating its store if needed.
    ///
    /// The record count is recomputed from the store, and fields found in
    /// stored records are appended to the declared ones.
    pub fn open(def: &TableDef, backend: Arc<dyn StorageBackend>) -> Result<Self> {
        let mut fields = def.fields.clone();
        if def.get_field(&def.key_field).is_none() {
            fields.push(Field::any(def.key_field.clone()));
        }

        let (record_count, stored) = with_store(backend.as_ref(), &def.name, |store| {
            let mut stored = Vec::new();
            for bytes in store.values()? {
                stored.push(decode_record(&bytes)?);
            }
            Ok((store.count()?, stored))
        })?;

        let mut table = Self {
            name: def.name.clone(),
            fields,
            key_field: def.key_field.clone(),
            record_count,
            indexes: Vec::new(),
            backend,
        };
        for record in &stored {
            table.widen(record);
        }

        debug!(table = %table.name, records = record_count, "opened table");
        Ok(table)
    }

    /// Get table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the known fields, in discovery order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Get the key field name
    pub fn key_field_name(&self) -> &str {
        &self.key_field
    }

    /// Fields with a declared index
    pub fn indexes(&self) -> &[String] {
        &self.indexes
    }

    pub fn has_index(&self, field_name: &str) -> bool {
        self.indexes.iter().any(|f| f == field_name)
    }

    /// Current definition (with widened fields)
    pub fn definition(&self) -> TableDef {
        TableDef::new(self.name.clone(), self.fields.clone(), self.key_field.clone())
    }

    /// Number of records, from the cached count
    pub fn count(&self) -> usize {
        self.record_count
    }

    /// Insert a new record
    pub fn insert(&mut self, values: &Record) -> Result<()> {
        let key = values
            .get(&self.key_field)
            .ok_or_else(|| Error::MissingKey(self.key_field.clone()))?
            .to_key();
        let bytes = encode_record(values)?;

        with_store(self.backend.as_ref(), &self.name, |store| {
            if store.contains(key.as_bytes())? {
                return Err(Error::DuplicateKey(key.clone()));
            }
            store.set(key.as_bytes(), &bytes)
        })?;

        self.widen(values);
        self.record_count += 1;
        debug!(table = %self.name, key = %key, "inserted record");
        Ok(())
    }

    /// Delete the record stored under `key`
    pub fn delete(&mut self, key: impl Into<Value>) -> Result<()> {
        let key = key.into().to_key();

        with_store(self.backend.as_ref(), &self.name, |store| {
            if !store.delete(key.as_bytes())? {
                return Err(Error::KeyNotFound(key.clone()));
            }
            Ok(())
        })?;

        self.record_count -= 1;
        debug!(table = %self.name, key = %key, "deleted record");
        Ok(())
    }

    /// Look up the record stored under `key`
    pub fn get(&self, key: impl Into<Value>) -> Result<Option<Record>> {
        let key = key.into().to_key();

        with_store(self.backend.as_ref(), &self.name, |store| {
            store
                .get(key.as_bytes())?
                .map(|bytes| decode_record(&bytes))
                .transpose()
        })
    }

    /// Merge `values` into the record stored under `key`.
    ///
    /// Fields not mentioned in `values` keep their stored value. The key
    /// field may appear in `values` only with its current value.
    pub fn update(&mut self, key: impl Into<Value>, values: &Record) -> Result<()> {
        let key = key.into().to_key();
        let key_field = &self.key_field;

        with_store(self.backend.as_ref(), &self.name, |store| {
            let bytes = store
                .get(key.as_bytes())?
                .ok_or_else(|| Error::KeyNotFound(key.clone()))?;

            if let Some(new_key) = values.get(key_field) {
                if new_key.to_key() != key {
                    return Err(Error::KeyFieldImmutable(key_field.clone()));
                }
            }

            let mut record = decode_record(&bytes)?;
            for (field, value) in values {
                record.insert(field.clone(), value.clone());
            }
            store.set(key.as_bytes(), &encode_record(&record)?)
        })?;

        self.widen(values);
        debug!(table = %self.name, key = %key, "updated record");
        Ok(())
    }

    /// Return every record satisfying all criteria.
    ///
    /// A `key = v` criterion is answered with a direct lookup: when the record
    /// under `v` satisfies the criteria it is the only result and no scan runs.
    /// Otherwise all records are scanned in store order.
    pub fn query(&self, criteria: &[SelectionCriterion]) -> Result<Vec<Record>> {
        with_store(self.backend.as_ref(), &self.name, |store| {
            if let Some((_, record)) = self.lookup_by_key(store, criteria)? {
                return Ok(vec![record]);
            }

            let mut results = Vec::new();
            for bytes in store.values()? {
                let record = decode_record(&bytes)?;
                if matches(&record, criteria) {
                    results.push(record);
                }
            }
            debug!(table = %self.name, matched = results.len(), "scanned table");
            Ok(results)
        })
    }

    /// Delete every record satisfying all criteria, returning how many went.
    ///
    /// Follows the same key lookup shortcut as [`Table::query`].
    pub fn delete_matching(&mut self, criteria: &[SelectionCriterion]) -> Result<usize> {
        let mut deleted = 0;

        let result = with_store(self.backend.as_ref(), &self.name, |store| {
            if let Some((key, _)) = self.lookup_by_key(store, criteria)? {
                if store.delete(key.as_bytes())? {
                    deleted += 1;
                }
                return Ok(());
            }

            for bytes in store.values()? {
                let record = decode_record(&bytes)?;
                if !matches(&record, criteria) {
                    continue;
                }
                match record.get(&self.key_field) {
                    Some(value) => {
                        if store.delete(value.to_key().as_bytes())? {
                            deleted += 1;
                        }
                    }
                    None => warn!(table = %self.name, "stored record lacks its key field"),
                }
            }
            Ok(())
        });

        // keep the count in step with whatever was removed before an error
        self.record_count = self.record_count.saturating_sub(deleted);
        result?;

        debug!(table = %self.name, deleted, "deleted matching records");
        Ok(deleted)
    }

    /// Declare an index on a known field.
    ///
    /// Indexes are bookkeeping only; queries do not use them.
    pub fn create_index(&mut self, field_name: &str) -> Result<()> {
        if !self.has_field(field_name) {
            return Err(Error::UnknownField(
                field_name.to_string(),
                self.name.clone(),
            ));
        }
        if !self.has_index(field_name) {
            self.indexes.push(field_name.to_string());
            info!(table = %self.name, field = field_name, "created index");
        }
        Ok(())
    }

    /// Remove the table's store and everything in it
    pub fn destroy(&self) -> Result<()> {
        self.backend.destroy(&self.name)?;
        info!(table = %self.name, "destroyed table store");
        Ok(())
    }

    /// Append fields seen in `values` that are not known yet
    fn widen(&mut self, values: &Record) {
        for name in values.keys() {
            if !self.has_field(name) {
                debug!(table = %self.name, field = %name, "discovered field");
                self.fields.push(Field::any(name.clone()));
            }
        }
    }

    /// Try each `key = v` criterion as a direct lookup. Returns the storage key
    /// and record of the first hit that satisfies all criteria.
    fn lookup_by_key(
        &self,
        store: &dyn KvStore,
        criteria: &[SelectionCriterion],
    ) -> Result<Option<(String, Record)>> {
        let candidates = criteria
            .iter()
            .filter(|c| c.field_name == self.key_field && c.operator == Operator::Eq);

        for criterion in candidates {
            let key = criterion.value.to_key();
            if let Some(bytes) = store.get(key.as_bytes())? {
                let record = decode_record(&bytes)?;
                if matches(&record, criteria) {
                    return Ok(Some((key, record)));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldType;
    use crate::storage::record::record;
    use crate::storage::MemoryBackend;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn create_test_table() -> Table {
        let def = TableDef::new(
            "users",
            vec![Field::new("id", FieldType::Integer), Field::any("name")],
            "id",
        );
        Table::open(&def, Arc::new(MemoryBackend::new())).unwrap()
    }

    fn user(id: i64, name: &str, age: i64) -> Record {
        record([
            ("id", Value::Integer(id)),
            ("name", Value::from(name)),
            ("age", Value::Integer(age)),
        ])
    }

    #[test]
    fn test_table_insert_and_get() {
        let mut table = create_test_table();

        let alice = user(1, "Alice", 30);
        table.insert(&alice).unwrap();

        assert_eq!(table.count(), 1);
        assert_eq!(table.get(1).unwrap(), Some(alice.clone()));
        // keys are matched by their text form
        assert_eq!(table.get("1").unwrap(), Some(alice));
        assert_eq!(table.get(2).unwrap(), None);
    }

    #[test]
    fn test_insert_missing_key() {
        let mut table = create_test_table();

        let result = table.insert(&record([("name", "NoId")]));
        assert!(matches!(result, Err(Error::MissingKey(ref f)) if f == "id"));
        assert_eq!(table.count(), 0);
        assert_eq!(table.field_names(), vec!["id", "name"]);
    }

    #[test]
    fn test_insert_duplicate_key() {
        let mut table = create_test_table();
        table.insert(&user(1, "Alice", 30)).unwrap();

        let result = table.insert(&user(1, "Impostor", 99));
        assert!(matches!(result, Err(Error::DuplicateKey(ref k)) if k == "1"));
        assert_eq!(table.count(), 1);
        assert_eq!(table.get(1).unwrap(), Some(user(1, "Alice", 30)));
    }

    #[test]
    fn test_field_widening() {
        let mut table = create_test_table();

        table.insert(&user(1, "Alice", 30)).unwrap();
        assert_eq!(table.field_names(), vec!["id", "name", "age"]);

        table.insert(&user(2, "Bob", 25)).unwrap();
        assert_eq!(table.field_names(), vec!["id", "name", "age"]);

        table
            .update(2, &record([("email", "bob@example.com")]))
            .unwrap();
        assert_eq!(table.field_names(), vec!["id", "name", "age", "email"]);
        assert_eq!(table.fields()[3].field_type, FieldType::Any);
    }

    #[test]
    fn test_delete() {
        let mut table = create_test_table();
        table.insert(&user(1, "Alice", 30)).unwrap();
        table.insert(&user(2, "Bob", 25)).unwrap();

        table.delete(1).unwrap();
        assert_eq!(table.count(), 1);
        assert_eq!(table.get(1).unwrap(), None);
        assert_eq!(table.get(2).unwrap(), Some(user(2, "Bob", 25)));

        let result = table.delete(1);
        assert!(matches!(result, Err(Error::KeyNotFound(_))));
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn test_update_merges_fields() {
        let mut table = create_test_table();
        table
            .insert(&record([
                ("id", Value::Integer(1)),
                ("a", Value::Integer(1)),
                ("b", Value::Integer(2)),
            ]))
            .unwrap();

        table.update(1, &record([("b", 3)])).unwrap();

        assert_eq!(
            table.get(1).unwrap(),
            Some(record([("id", 1), ("a", 1), ("b", 3)]))
        );
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn test_update_missing_key() {
        let mut table = create_test_table();
        let result = table.update(9, &record([("name", "Ghost")]));
        assert!(matches!(result, Err(Error::KeyNotFound(_))));
        assert_eq!(table.field_names(), vec!["id", "name"]);
    }

    #[test]
    fn test_update_cannot_change_key() {
        let mut table = create_test_table();
        table.insert(&user(1, "Alice", 30)).unwrap();

        let result = table.update(1, &record([("id", 2)]));
        assert!(matches!(result, Err(Error::KeyFieldImmutable(_))));
        assert_eq!(table.get(1).unwrap(), Some(user(1, "Alice", 30)));

        // restating the same key is fine
        table
            .update(1, &record([("id", Value::Integer(1)), ("age", Value::Integer(31))]))
            .unwrap();
        assert_eq!(table.get(1).unwrap(), Some(user(1, "Alice", 31)));
    }

    #[test]
    fn test_query_conjunction_in_store_order() {
        let mut table = create_test_table();
        table.insert(&user(3, "Carol", 41)).unwrap();
        table.insert(&user(1, "Alice", 30)).unwrap();
        table.insert(&user(2, "Bob", 25)).unwrap();
        table.insert(&user(4, "Dave", 30)).unwrap();

        let results = table
            .query(&[
                SelectionCriterion::new("age", Operator::Gte, 30),
                SelectionCriterion::new("name", Operator::Neq, "Alice"),
            ])
            .unwrap();
        assert_eq!(results, vec![user(3, "Carol", 41), user(4, "Dave", 30)]);

        assert_eq!(table.query(&[]).unwrap().len(), 4);
    }

    #[test]
    fn test_query_key_fast_path_returns_single_record() {
        let mut table = create_test_table();
        table.insert(&user(5, "Eve", 9)).unwrap();
        table.insert(&user(6, "Frank", 9)).unwrap();

        let results = table
            .query(&[
                SelectionCriterion::equals("id", 5),
                SelectionCriterion::equals("age", 9),
            ])
            .unwrap();
        assert_eq!(results, vec![user(5, "Eve", 9)]);

        // a key that is absent falls back to the scan
        let results = table
            .query(&[
                SelectionCriterion::equals("id", 7),
                SelectionCriterion::equals("age", 9),
            ])
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_delete_matching_scan() {
        let mut table = create_test_table();
        for (id, age) in [(1, 20), (2, 35), (3, 50), (4, 18)] {
            table.insert(&user(id, "U", age)).unwrap();
        }

        let deleted = table
            .delete_matching(&[SelectionCriterion::new("age", Operator::Gt, 19)])
            .unwrap();
        assert_eq!(deleted, 3);
        assert_eq!(table.count(), 1);
        assert_eq!(table.query(&[]).unwrap(), vec![user(4, "U", 18)]);
    }

    #[test]
    fn test_delete_matching_fast_path() {
        let mut table = create_test_table();
        table.insert(&user(1, "Same", 1)).unwrap();
        table.insert(&user(2, "Same", 1)).unwrap();

        let deleted = table
            .delete_matching(&[
                SelectionCriterion::equals("name", "Same"),
                SelectionCriterion::equals("id", 2),
            ])
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(table.count(), 1);
        assert_eq!(table.get(1).unwrap(), Some(user(1, "Same", 1)));
    }

    #[test]
    fn test_create_index() {
        let mut table = create_test_table();

        let result = table.create_index("email");
        assert!(matches!(result, Err(Error::UnknownField(_, _))));

        table.create_index("name").unwrap();
        table.create_index("name").unwrap();
        assert_eq!(table.indexes(), &["name".to_string()]);
        assert!(table.has_index("name"));
    }

    #[test]
    fn test_reopen_recounts_and_rediscovers_fields() {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let def = TableDef::new("t", vec![Field::any("k")], "k");

        {
            let mut table = Table::open(&def, backend.clone()).unwrap();
            table.insert(&record([("k", "a"), ("extra", "x")])).unwrap();
            table.insert(&record([("k", "b")])).unwrap();
        }

        let table = Table::open(&def, backend).unwrap();
        assert_eq!(table.count(), 2);
        assert_eq!(table.field_names(), vec!["k", "extra"]);
    }

    #[test]
    fn test_non_finite_floats_are_rejected() {
        let mut table = create_test_table();
        let result = table.insert(&record([
            ("id", Value::Integer(1)),
            ("score", Value::Float(f64::INFINITY)),
        ]));
        assert!(matches!(result, Err(Error::NonFiniteFloat(ref field)) if field == "score"));
        assert_eq!(table.count(), 0);
        assert_eq!(table.field_names(), vec!["id", "name"]);

        table.insert(&user(1, "Alice", 30)).unwrap();
        let result = table.update(1, &record([("age", f64::NAN)]));
        assert!(matches!(result, Err(Error::NonFiniteFloat(_))));
        assert_eq!(table.get(1).unwrap(), Some(user(1, "Alice", 30)));
    }

    /// Memory backend whose stores refuse deletes once `budget` runs out
    #[derive(Debug)]
    struct FailingDeletes {
        inner: MemoryBackend,
        budget: Arc<AtomicUsize>,
    }

    impl StorageBackend for FailingDeletes {
        fn open(&self, name: &str) -> Result<Box<dyn KvStore>> {
            Ok(Box::new(FailingStore {
                inner: self.inner.open(name)?,
                budget: self.budget.clone(),
            }))
        }

        fn destroy(&self, name: &str) -> Result<()> {
            self.inner.destroy(name)
        }
    }

    struct FailingStore {
        inner: Box<dyn KvStore>,
        budget: Arc<AtomicUsize>,
    }

    impl KvStore for FailingStore {
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
            self.inner.set(key, value)
        }

        fn delete(&mut self, key: &[u8]) -> Result<bool> {
            if self.budget.load(AtomicOrdering::SeqCst) == 0 {
                return Err(Error::Internal("disk full".to_string()));
            }
            self.budget.fetch_sub(1, AtomicOrdering::SeqCst);
            self.inner.delete(key)
        }

        fn values(&self) -> Result<Vec<Vec<u8>>> {
            self.inner.values()
        }

        fn count(&self) -> Result<usize> {
            self.inner.count()
        }

        fn close(self: Box<Self>) -> Result<()> {
            self.inner.close()
        }
    }

    #[test]
    fn test_failed_delete_matching_keeps_count_in_step() {
        let budget = Arc::new(AtomicUsize::new(usize::MAX));
        let backend = Arc::new(FailingDeletes {
            inner: MemoryBackend::new(),
            budget: budget.clone(),
        });
        let def = TableDef::new(
            "users",
            vec![Field::new("id", FieldType::Integer), Field::any("name")],
            "id",
        );
        let mut table = Table::open(&def, backend).unwrap();
        for id in 1..=5 {
            table.insert(&user(id, "U", 40)).unwrap();
        }

        budget.store(2, AtomicOrdering::SeqCst);
        let result = table.delete_matching(&[SelectionCriterion::new("age", Operator::Gt, 30)]);
        assert!(matches!(result, Err(Error::Internal(_))));

        budget.store(usize::MAX, AtomicOrdering::SeqCst);
        assert_eq!(table.count(), 3);
        assert_eq!(table.query(&[]).unwrap().len(), table.count());
    }
}
