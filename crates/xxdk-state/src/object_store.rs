//! Versioned object-store databases with IndexedDB semantics
//!
//! A [`Database`] holds named object stores. Each store keeps JSON records
//! under a primary key read from the record's key path (or assigned by an
//! auto-increment counter) and maintains secondary indexes, unique or not,
//! over top-level record fields. Records whose indexed field is missing or
//! null are simply left out of that index.
//!
//! Write transactions change the stores in place under the database's
//! write lock and keep an undo entry per touched record. When the closure
//! returns `Err` the entries are replayed newest first, so a
//! read-modify-write inside one closure is atomic and a write costs only
//! the records it touches.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::mem;
use std::ops::Bound;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Result, StateError};

/// Primary or index key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Text(String),
}

impl Key {
    /// Key for a JSON value, if the value is keyable.
    ///
    /// Booleans index as 0 and 1.
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::Number(n) => n.as_i64().map(Key::Int),
            Value::String(s) => Some(Key::Text(s.clone())),
            Value::Bool(b) => Some(Key::Int(*b as i64)),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Key::Int(n) => Some(*n),
            Key::Text(_) => None,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Key::Int(n) => Value::from(*n),
            Key::Text(s) => Value::from(s.clone()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{}", n),
            Key::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl From<u64> for Key {
    fn from(n: u64) -> Self {
        Key::Int(n as i64)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

/// A contiguous range of keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub lower: Bound<Key>,
    pub upper: Bound<Key>,
}

impl KeyRange {
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    pub fn only(key: impl Into<Key>) -> Self {
        let key = key.into();
        Self {
            lower: Bound::Included(key.clone()),
            upper: Bound::Included(key),
        }
    }

    /// Inclusive on both ends
    pub fn bound(lower: impl Into<Key>, upper: impl Into<Key>) -> Self {
        Self {
            lower: Bound::Included(lower.into()),
            upper: Bound::Included(upper.into()),
        }
    }

    pub fn lower_bound(lower: impl Into<Key>, open: bool) -> Self {
        let lower = lower.into();
        Self {
            lower: if open {
                Bound::Excluded(lower)
            } else {
                Bound::Included(lower)
            },
            upper: Bound::Unbounded,
        }
    }

    pub fn upper_bound(upper: impl Into<Key>, open: bool) -> Self {
        let upper = upper.into();
        Self {
            lower: Bound::Unbounded,
            upper: if open {
                Bound::Excluded(upper)
            } else {
                Bound::Included(upper)
            },
        }
    }

    /// True when no key can fall inside the range.
    ///
    /// `BTreeMap::range` panics on such ranges.
    fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
            (Bound::Included(lo), Bound::Excluded(hi))
            | (Bound::Excluded(lo), Bound::Included(hi))
            | (Bound::Excluded(lo), Bound::Excluded(hi)) => lo >= hi,
            _ => false,
        }
    }

    fn as_bounds(&self) -> (Bound<&Key>, Bound<&Key>) {
        (self.lower.as_ref(), self.upper.as_ref())
    }
}

/// Cursor iteration order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Next,
    Prev,
}

/// How a store finds the primary key of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub key_path: String,
    pub auto_increment: bool,
}

impl StoreOptions {
    pub fn key_path(path: impl Into<String>) -> Self {
        Self {
            key_path: path.into(),
            auto_increment: false,
        }
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }
}

#[derive(Debug, Clone)]
struct Index {
    key_path: String,
    unique: bool,
    entries: BTreeMap<Key, BTreeSet<Key>>,
}

impl Index {
    fn insert(&mut self, index_key: Key, primary: Key) {
        self.entries.entry(index_key).or_default().insert(primary);
    }

    fn remove(&mut self, index_key: &Key, primary: &Key) {
        if let Some(primaries) = self.entries.get_mut(index_key) {
            primaries.remove(primary);
            if primaries.is_empty() {
                self.entries.remove(index_key);
            }
        }
    }
}

#[derive(Debug, Clone)]
struct ObjectStore {
    options: StoreOptions,
    records: BTreeMap<Key, Value>,
    indexes: BTreeMap<String, Index>,
    next_key: i64,
}

impl ObjectStore {
    fn new(options: StoreOptions) -> Self {
        Self {
            options,
            records: BTreeMap::new(),
            indexes: BTreeMap::new(),
            next_key: 1,
        }
    }

    fn index(&self, store: &str, name: &str) -> Result<&Index> {
        self.indexes.get(name).ok_or_else(|| StateError::UnknownIndex {
            store: store.to_string(),
            index: name.to_string(),
        })
    }

    /// Resolve the record's primary key, assigning one when auto-increment
    /// is on and the record has none.
    fn primary_key(&mut self, store: &str, record: &mut Value) -> Result<Key> {
        let path = self.options.key_path.clone();
        let object = record
            .as_object_mut()
            .ok_or_else(|| StateError::InvalidKey(format!("{} records must be objects", store)))?;

        match object.get(&path).filter(|v| !v.is_null()) {
            Some(value) => {
                let key = Key::from_value(value).ok_or_else(|| {
                    StateError::InvalidKey(format!("{}.{} is not a valid key", store, path))
                })?;
                if let Key::Int(n) = key {
                    if self.options.auto_increment && n >= self.next_key {
                        self.next_key = n + 1;
                    }
                }
                Ok(key)
            }
            None if self.options.auto_increment => {
                let key = Key::Int(self.next_key);
                self.next_key += 1;
                object.insert(path, key.to_value());
                Ok(key)
            }
            None => Err(StateError::InvalidKey(format!("{} record has no {}", store, path))),
        }
    }

    /// Store `record`, returning its primary key and the record it replaced
    fn write(&mut self, store: &str, mut record: Value, overwrite: bool) -> Result<(Key, Option<Value>)> {
        let primary = self.primary_key(store, &mut record)?;
        if !overwrite && self.records.contains_key(&primary) {
            return Err(StateError::Constraint {
                store: store.to_string(),
                index: self.options.key_path.clone(),
            });
        }

        // Unique indexes may only point back at this record.
        for (name, index) in &self.indexes {
            if !index.unique {
                continue;
            }
            let Some(index_key) = record.get(&index.key_path).and_then(Key::from_value) else {
                continue;
            };
            if let Some(holders) = index.entries.get(&index_key) {
                if holders.iter().any(|holder| holder != &primary) {
                    return Err(StateError::Constraint {
                        store: store.to_string(),
                        index: name.clone(),
                    });
                }
            }
        }

        let old = self.records.remove(&primary);
        if let Some(old) = &old {
            self.unindex(&primary, old);
        }
        self.reindex(&primary, &record);
        self.records.insert(primary.clone(), record);
        Ok((primary, old))
    }

    fn delete(&mut self, primary: &Key) -> Option<Value> {
        let old = self.records.remove(primary)?;
        self.unindex(primary, &old);
        Some(old)
    }

    /// Put back the record held at `primary` before a write or delete
    fn restore(&mut self, primary: &Key, old: Option<Value>) {
        self.delete(primary);
        if let Some(old) = old {
            self.reindex(primary, &old);
            self.records.insert(primary.clone(), old);
        }
    }

    /// Empty copy with the same schema and key counter
    fn emptied(&self) -> Self {
        let indexes = self
            .indexes
            .iter()
            .map(|(name, index)| {
                let empty = Index {
                    key_path: index.key_path.clone(),
                    unique: index.unique,
                    entries: BTreeMap::new(),
                };
                (name.clone(), empty)
            })
            .collect();
        Self {
            options: self.options.clone(),
            records: BTreeMap::new(),
            indexes,
            next_key: self.next_key,
        }
    }

    fn reindex(&mut self, primary: &Key, record: &Value) {
        for index in self.indexes.values_mut() {
            if let Some(index_key) = record.get(&index.key_path).and_then(Key::from_value) {
                index.insert(index_key, primary.clone());
            }
        }
    }

    fn unindex(&mut self, primary: &Key, record: &Value) {
        for index in self.indexes.values_mut() {
            if let Some(index_key) = record.get(&index.key_path).and_then(Key::from_value) {
                index.remove(&index_key, primary);
            }
        }
    }
}

type Stores = BTreeMap<String, ObjectStore>;

/// Schema changes allowed while a database is being opened at a new version
pub struct Upgrade<'a> {
    stores: &'a mut Stores,
    old_version: u32,
    new_version: u32,
}

impl Upgrade<'_> {
    /// Version the database was at before this open (0 when new)
    pub fn old_version(&self) -> u32 {
        self.old_version
    }

    pub fn new_version(&self) -> u32 {
        self.new_version
    }

    pub fn create_store(&mut self, name: &str, options: StoreOptions) -> Result<()> {
        if self.stores.contains_key(name) {
            return Err(StateError::Constraint {
                store: name.to_string(),
                index: "store name".to_string(),
            });
        }
        self.stores.insert(name.to_string(), ObjectStore::new(options));
        Ok(())
    }

    /// Add an index over `key_path`, indexing existing records
    pub fn create_index(&mut self, store: &str, name: &str, key_path: &str, unique: bool) -> Result<()> {
        let object_store = self
            .stores
            .get_mut(store)
            .ok_or_else(|| StateError::UnknownStore(store.to_string()))?;

        let mut index = Index {
            key_path: key_path.to_string(),
            unique,
            entries: BTreeMap::new(),
        };
        for (primary, record) in &object_store.records {
            if let Some(index_key) = record.get(key_path).and_then(Key::from_value) {
                if unique && index.entries.contains_key(&index_key) {
                    return Err(StateError::Constraint {
                        store: store.to_string(),
                        index: name.to_string(),
                    });
                }
                index.insert(index_key, primary.clone());
            }
        }
        object_store.indexes.insert(name.to_string(), index);
        Ok(())
    }

    pub fn delete_store(&mut self, name: &str) -> Result<()> {
        self.stores
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StateError::UnknownStore(name.to_string()))
    }
}

enum Access<'a> {
    Read(&'a Stores),
    Write(&'a mut Stores),
}

/// How to reverse one change made by a write transaction
enum Undo {
    Record {
        store: String,
        primary: Key,
        old: Option<Value>,
        next_key: i64,
    },
    NextKey {
        store: String,
        next_key: i64,
    },
    Store {
        store: String,
        old: ObjectStore,
    },
}

/// Operations available inside [`Database::read`] and [`Database::write`]
pub struct Transaction<'a> {
    stores: Access<'a>,
    undo: Vec<Undo>,
}

impl Transaction<'_> {
    fn stores(&self) -> &Stores {
        match &self.stores {
            Access::Read(stores) => stores,
            Access::Write(stores) => &**stores,
        }
    }

    fn store(&self, name: &str) -> Result<&ObjectStore> {
        self.stores()
            .get(name)
            .ok_or_else(|| StateError::UnknownStore(name.to_string()))
    }

    fn store_mut(&mut self, name: &str) -> Result<&mut ObjectStore> {
        match &mut self.stores {
            Access::Read(_) => Err(StateError::ReadOnly),
            Access::Write(stores) => stores
                .get_mut(name)
                .ok_or_else(|| StateError::UnknownStore(name.to_string())),
        }
    }

    fn write(&mut self, store: &str, record: Value, overwrite: bool) -> Result<Key> {
        let object_store = self.store_mut(store)?;
        let next_key = object_store.next_key;
        let result = object_store.write(store, record, overwrite);
        let bumped = object_store.next_key != next_key;

        match result {
            Ok((primary, old)) => {
                self.undo.push(Undo::Record {
                    store: store.to_string(),
                    primary: primary.clone(),
                    old,
                    next_key,
                });
                Ok(primary)
            }
            Err(e) => {
                if bumped {
                    self.undo.push(Undo::NextKey {
                        store: store.to_string(),
                        next_key,
                    });
                }
                Err(e)
            }
        }
    }

    fn delete_record(&mut self, store: &str, primary: &Key) -> Result<bool> {
        let object_store = self.store_mut(store)?;
        let next_key = object_store.next_key;
        let Some(old) = object_store.delete(primary) else {
            return Ok(false);
        };
        self.undo.push(Undo::Record {
            store: store.to_string(),
            primary: primary.clone(),
            old: Some(old),
            next_key,
        });
        Ok(true)
    }

    /// Reverse every change, newest first
    fn rollback(&mut self) {
        let Access::Write(stores) = &mut self.stores else {
            return;
        };
        let undone = self.undo.len();
        for undo in mem::take(&mut self.undo).into_iter().rev() {
            match undo {
                Undo::Record {
                    store,
                    primary,
                    old,
                    next_key,
                } => {
                    if let Some(object_store) = stores.get_mut(&store) {
                        object_store.restore(&primary, old);
                        object_store.next_key = next_key;
                    }
                }
                Undo::NextKey { store, next_key } => {
                    if let Some(object_store) = stores.get_mut(&store) {
                        object_store.next_key = next_key;
                    }
                }
                Undo::Store { store, old } => {
                    stores.insert(store, old);
                }
            }
        }
        debug!(changes = undone, "Rolled back write transaction");
    }

    /// Insert a new record; an existing primary key or unique index value
    /// is a [`StateError::Constraint`]
    pub fn add(&mut self, store: &str, record: Value) -> Result<Key> {
        self.write(store, record, false)
    }

    /// Insert or replace a record
    pub fn put(&mut self, store: &str, record: Value) -> Result<Key> {
        self.write(store, record, true)
    }

    pub fn get(&self, store: &str, key: &Key) -> Result<Option<Value>> {
        Ok(self.store(store)?.records.get(key).cloned())
    }

    /// First record (lowest primary key) whose index value equals `key`
    pub fn get_by_index(&self, store: &str, index: &str, key: &Key) -> Result<Option<Value>> {
        let object_store = self.store(store)?;
        let found = object_store
            .index(store, index)?
            .entries
            .get(key)
            .and_then(|primaries| primaries.iter().next())
            .and_then(|primary| object_store.records.get(primary))
            .cloned();
        Ok(found)
    }

    /// Every record whose index value equals `key`, in primary key order
    pub fn get_all_by_index(&self, store: &str, index: &str, key: &Key) -> Result<Vec<Value>> {
        let object_store = self.store(store)?;
        let records = object_store
            .index(store, index)?
            .entries
            .get(key)
            .map(|primaries| {
                primaries
                    .iter()
                    .filter_map(|primary| object_store.records.get(primary).cloned())
                    .collect()
            })
            .unwrap_or_default();
        Ok(records)
    }

    /// Records in `range`, over the primary key or over `index` when given
    pub fn cursor(
        &self,
        store: &str,
        index: Option<&str>,
        range: &KeyRange,
        direction: Direction,
    ) -> Result<Vec<Value>> {
        let object_store = self.store(store)?;
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let mut records: Vec<Value> = match index {
            None => object_store
                .records
                .range::<Key, _>(range.as_bounds())
                .map(|(_, record)| record.clone())
                .collect(),
            Some(name) => object_store
                .index(store, name)?
                .entries
                .range::<Key, _>(range.as_bounds())
                .flat_map(|(_, primaries)| primaries.iter())
                .filter_map(|primary| object_store.records.get(primary).cloned())
                .collect(),
        };
        if direction == Direction::Prev {
            records.reverse();
        }
        Ok(records)
    }

    pub fn delete(&mut self, store: &str, key: &Key) -> Result<bool> {
        self.delete_record(store, key)
    }

    /// Delete every record whose index value equals `key`
    pub fn delete_by_index(&mut self, store: &str, index: &str, key: &Key) -> Result<usize> {
        let primaries: Vec<Key> = self
            .store(store)?
            .index(store, index)?
            .entries
            .get(key)
            .map(|primaries| primaries.iter().cloned().collect())
            .unwrap_or_default();
        if primaries.is_empty() {
            return Ok(0);
        }

        let mut removed = 0;
        for primary in &primaries {
            if self.delete_record(store, primary)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn count(&self, store: &str) -> Result<usize> {
        Ok(self.store(store)?.records.len())
    }

    pub fn clear(&mut self, store: &str) -> Result<()> {
        let object_store = self.store_mut(store)?;
        let emptied = object_store.emptied();
        let old = mem::replace(object_store, emptied);
        self.undo.push(Undo::Store {
            store: store.to_string(),
            old,
        });
        Ok(())
    }
}

/// A named, versioned set of object stores
pub struct Database {
    name: String,
    version: AtomicU32,
    stores: RwLock<Stores>,
}

impl Database {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: AtomicU32::new(0),
            stores: RwLock::new(Stores::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn store_names(&self) -> Vec<String> {
        self.stores.read().keys().cloned().collect()
    }

    /// Run a read-only transaction
    pub fn read<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let stores = self.stores.read();
        let tx = Transaction {
            stores: Access::Read(&*stores),
            undo: Vec::new(),
        };
        f(&tx)
    }

    /// Run a read/write transaction; changes are kept only if `f` succeeds
    pub fn write<T>(&self, f: impl FnOnce(&mut Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut stores = self.stores.write();
        let mut tx = Transaction {
            stores: Access::Write(&mut *stores),
            undo: Vec::new(),
        };
        let result = f(&mut tx);
        if result.is_err() {
            tx.rollback();
        }
        result
    }

    fn upgrade(&self, version: u32, upgrade: impl FnOnce(&mut Upgrade<'_>) -> Result<()>) -> Result<()> {
        let mut stores = self.stores.write();
        let mut staged = stores.clone();
        let old_version = self.version();
        upgrade(&mut Upgrade {
            stores: &mut staged,
            old_version,
            new_version: version,
        })?;

        *stores = staged;
        self.version.store(version, Ordering::SeqCst);
        info!(database = %self.name, old_version, version, "Upgraded database");
        Ok(())
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("version", &self.version())
            .field("stores", &self.store_names())
            .finish()
    }
}

/// Opens and tracks databases by name
#[derive(Default)]
pub struct DatabaseFactory {
    databases: Mutex<HashMap<String, Arc<Database>>>,
}

impl DatabaseFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `name` at `version`, running `upgrade` when the stored version
    /// is older. Opening at an older version than stored fails.
    pub fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: impl FnOnce(&mut Upgrade<'_>) -> Result<()>,
    ) -> Result<Arc<Database>> {
        if version == 0 {
            return Err(StateError::Version {
                database: name.to_string(),
                requested: 0,
                current: 0,
            });
        }

        let mut databases = self.databases.lock();
        let (database, created) = match databases.get(name) {
            Some(database) => (database.clone(), false),
            None => (Arc::new(Database::new(name)), true),
        };

        let current = database.version();
        if version < current {
            return Err(StateError::Version {
                database: name.to_string(),
                requested: version,
                current,
            });
        }
        if version > current {
            database.upgrade(version, upgrade)?;
        }
        if created {
            databases.insert(name.to_string(), database.clone());
        }

        debug!(database = %name, version, "Opened database");
        Ok(database)
    }

    pub fn delete(&self, name: &str) -> bool {
        self.databases.lock().remove(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn people() -> Arc<Database> {
        let factory = DatabaseFactory::new();
        factory
            .open("people", 1, |up| {
                up.create_store("people", StoreOptions::key_path("id").auto_increment())?;
                up.create_index("people", "email", "email", true)?;
                up.create_index("people", "team", "team", false)
            })
            .unwrap()
    }

    #[test]
    fn test_auto_increment_assigns_keys() {
        let db = people();
        let keys = db
            .write(|tx| {
                let a = tx.add("people", json!({"email": "a@x", "team": "red"}))?;
                let b = tx.add("people", json!({"email": "b@x", "team": "red"}))?;
                Ok((a, b))
            })
            .unwrap();
        assert_eq!(keys, (Key::Int(1), Key::Int(2)));

        let a = db.read(|tx| tx.get("people", &Key::Int(1))).unwrap().unwrap();
        assert_eq!(a["id"], 1);
        assert_eq!(a["email"], "a@x");
    }

    #[test]
    fn test_unique_index_rejects_duplicates() {
        let db = people();
        db.write(|tx| tx.add("people", json!({"email": "a@x"}))).unwrap();

        let err = db
            .write(|tx| tx.add("people", json!({"email": "a@x"})))
            .unwrap_err();
        assert_eq!(
            err,
            StateError::Constraint {
                store: "people".into(),
                index: "email".into()
            }
        );
        assert_eq!(db.read(|tx| tx.count("people")).unwrap(), 1);
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let db = people();
        let result: Result<()> = db.write(|tx| {
            tx.add("people", json!({"email": "a@x"}))?;
            Err(StateError::Storage("abort".into()))
        });
        assert!(result.is_err());
        assert_eq!(db.read(|tx| tx.count("people")).unwrap(), 0);
    }

    #[test]
    fn test_rollback_restores_touched_records_and_keeps_other_stores() {
        let factory = DatabaseFactory::new();
        let db = factory
            .open("org", 1, |up| {
                up.create_store("people", StoreOptions::key_path("id").auto_increment())?;
                up.create_index("people", "email", "email", true)?;
                up.create_index("people", "team", "team", false)?;
                up.create_store("teams", StoreOptions::key_path("name"))
            })
            .unwrap();
        db.write(|tx| {
            tx.add("people", json!({"email": "a@x", "team": "red"}))?;
            tx.add("people", json!({"email": "b@x", "team": "red"}))?;
            tx.add("teams", json!({"name": "red"}))?;
            tx.add("teams", json!({"name": "blue"}))
        })
        .unwrap();

        let result: Result<()> = db.write(|tx| {
            tx.put("people", json!({"id": 1, "email": "a@x", "team": "blue"}))?;
            tx.delete("people", &Key::Int(2))?;
            tx.add("people", json!({"email": "c@x", "team": "red"}))?;
            tx.delete_by_index("people", "team", &Key::from("red"))?;
            tx.clear("teams")?;
            tx.add("teams", json!({"name": "green"}))?;
            Err(StateError::Storage("abort".into()))
        });
        assert!(result.is_err());

        let red = db
            .read(|tx| tx.get_all_by_index("people", "team", &Key::from("red")))
            .unwrap();
        let emails: Vec<&str> = red.iter().filter_map(|r| r["email"].as_str()).collect();
        assert_eq!(emails, vec!["a@x", "b@x"]);
        assert!(db
            .read(|tx| tx.get_by_index("people", "email", &Key::from("c@x")))
            .unwrap()
            .is_none());

        let teams = db
            .read(|tx| tx.cursor("teams", None, &KeyRange::all(), Direction::Next))
            .unwrap();
        let names: Vec<&str> = teams.iter().filter_map(|r| r["name"].as_str()).collect();
        assert_eq!(names, vec!["blue", "red"]);

        // The aborted insert does not burn its auto-increment key
        let next = db
            .write(|tx| tx.add("people", json!({"email": "d@x"})))
            .unwrap();
        assert_eq!(next, Key::Int(3));
    }

    #[test]
    fn test_caught_constraint_keeps_earlier_writes() {
        let db = people();
        let keys = db
            .write(|tx| {
                let first = tx.add("people", json!({"email": "a@x"}))?;
                let duplicate = tx.add("people", json!({"email": "a@x"}));
                assert!(duplicate.as_ref().is_err_and(StateError::is_constraint));
                let second = tx.add("people", json!({"email": "b@x"}))?;
                Ok((first, second))
            })
            .unwrap();
        assert_eq!(keys.0, Key::Int(1));
        assert_eq!(db.read(|tx| tx.count("people")).unwrap(), 2);
    }

    #[test]
    fn test_put_updates_index_entries() {
        let db = people();
        let key = db
            .write(|tx| tx.add("people", json!({"email": "a@x", "team": "red"})))
            .unwrap();
        db.write(|tx| tx.put("people", json!({"id": 1, "email": "a@x", "team": "blue"})))
            .unwrap();

        let red = db
            .read(|tx| tx.get_all_by_index("people", "team", &Key::from("red")))
            .unwrap();
        let blue = db
            .read(|tx| tx.get_all_by_index("people", "team", &Key::from("blue")))
            .unwrap();
        assert!(red.is_empty());
        assert_eq!(blue.len(), 1);
        assert_eq!(Key::from_value(&blue[0]["id"]), Some(key));
    }

    #[test]
    fn test_delete_by_index_and_cursor() {
        let db = people();
        db.write(|tx| {
            for (email, team) in [("a", "red"), ("b", "blue"), ("c", "red"), ("d", "green")] {
                tx.add("people", json!({"email": email, "team": team}))?;
            }
            Ok(())
        })
        .unwrap();

        let removed = db
            .write(|tx| tx.delete_by_index("people", "team", &Key::from("red")))
            .unwrap();
        assert_eq!(removed, 2);

        let rest = db
            .read(|tx| tx.cursor("people", None, &KeyRange::all(), Direction::Prev))
            .unwrap();
        let emails: Vec<&str> = rest.iter().filter_map(|r| r["email"].as_str()).collect();
        assert_eq!(emails, vec!["d", "b"]);

        let by_team = db
            .read(|tx| {
                tx.cursor(
                    "people",
                    Some("team"),
                    &KeyRange::lower_bound("blue", true),
                    Direction::Next,
                )
            })
            .unwrap();
        assert_eq!(by_team.len(), 1);
        assert_eq!(by_team[0]["team"], "green");
    }

    #[test]
    fn test_empty_range_is_not_a_panic() {
        let db = people();
        let records = db
            .read(|tx| {
                tx.cursor(
                    "people",
                    None,
                    &KeyRange {
                        lower: Bound::Excluded(Key::Int(3)),
                        upper: Bound::Excluded(Key::Int(3)),
                    },
                    Direction::Next,
                )
            })
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_unknown_store_and_index() {
        let db = people();
        assert_eq!(
            db.read(|tx| tx.count("nope")),
            Err(StateError::UnknownStore("nope".into()))
        );
        assert!(matches!(
            db.read(|tx| tx.get_by_index("people", "nope", &Key::Int(1))),
            Err(StateError::UnknownIndex { .. })
        ));
    }

    #[test]
    fn test_versioning() {
        let factory = DatabaseFactory::new();
        let mut upgrades = 0;
        factory
            .open("db", 2, |up| {
                upgrades += 1;
                assert_eq!((up.old_version(), up.new_version()), (0, 2));
                up.create_store("s", StoreOptions::key_path("k"))
            })
            .unwrap();

        // Same version: no upgrade. Older version: rejected.
        factory
            .open("db", 2, |_| panic!("upgrade must not run"))
            .unwrap();
        assert!(matches!(
            factory.open("db", 1, |_| Ok(())),
            Err(StateError::Version { current: 2, .. })
        ));
        assert_eq!(upgrades, 1);
        assert_eq!(factory.names(), vec!["db".to_string()]);

        assert!(factory.delete("db"));
        assert!(factory.names().is_empty());
    }

    #[test]
    fn test_failed_upgrade_leaves_new_database_unregistered() {
        let factory = DatabaseFactory::new();
        let result = factory.open("bad", 1, |up| up.create_index("missing", "i", "i", false));
        assert_eq!(result.unwrap_err(), StateError::UnknownStore("missing".into()));
        assert!(factory.names().is_empty());
    }

    #[test]
    fn test_missing_key_without_auto_increment() {
        let factory = DatabaseFactory::new();
        let db = factory
            .open("kv", 1, |up| up.create_store("items", StoreOptions::key_path("name")))
            .unwrap();
        assert!(matches!(
            db.write(|tx| tx.add("items", json!({"value": 1}))),
            Err(StateError::InvalidKey(_))
        ));
        db.write(|tx| tx.put("items", json!({"name": "x", "value": 1})))
            .unwrap();
        assert!(db.read(|tx| tx.get("items", &Key::from("x"))).unwrap().is_some());
    }
}
