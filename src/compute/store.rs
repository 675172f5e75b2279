//! store.rs
//! Durable key-value group storage and the execution state backed by it.
//!
//! One group per model invocation. Values with a native encoding are kept
//! as datasets; anything else is persisted as its string representation.

use super::ledger::ExecutionState;
use crate::error::{CallError, StoreError};
use crate::value::Value;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum StoreEntry {
    Dataset(Value),
    Attribute(String),
}

impl StoreEntry {
    pub fn encode(value: Value) -> Self {
        if value.is_encodable() {
            StoreEntry::Dataset(value)
        } else {
            StoreEntry::Attribute(value.to_string())
        }
    }

    /// String attributes read back as `Value::Str`.
    pub fn into_value(self) -> Value {
        match self {
            StoreEntry::Dataset(value) => value,
            StoreEntry::Attribute(text) => Value::Str(text),
        }
    }
}

/// Entries and attributes of one group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreGroup {
    pub entries: BTreeMap<String, StoreEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
}

/// A store of named groups, each a key -> entry map.
///
/// Shared between concurrent calls of one model, hence `&self` methods.
pub trait GroupStore: Send + Sync {
    fn has_group(&self, group: &str) -> Result<bool, StoreError>;

    /// Fails with `GroupExists` if the name is taken.
    fn create_group(&self, group: &str) -> Result<(), StoreError>;

    fn put(&self, group: &str, key: &str, entry: StoreEntry) -> Result<(), StoreError>;

    fn get(&self, group: &str, key: &str) -> Result<StoreEntry, StoreError>;

    fn set_attr(&self, group: &str, key: &str, value: String) -> Result<(), StoreError>;

    /// Snapshot of a whole group.
    fn group(&self, group: &str) -> Result<StoreGroup, StoreError>;

    /// Persists pending writes.
    fn flush(&self) -> Result<(), StoreError> { Ok(()) }
}

type Groups = BTreeMap<String, StoreGroup>;

fn lock(groups: &Mutex<Groups>) -> MutexGuard<'_, Groups> {
    groups.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn group_mut<'a>(groups: &'a mut Groups, group: &str) -> Result<&'a mut StoreGroup, StoreError> {
    groups.get_mut(group).ok_or_else(|| StoreError::GroupNotFound(group.to_string()))
}

macro_rules! impl_group_store_ops {
    () => {
        fn has_group(&self, group: &str) -> Result<bool, StoreError> {
            Ok(lock(&self.groups).contains_key(group))
        }

        fn create_group(&self, group: &str) -> Result<(), StoreError> {
            let mut groups = lock(&self.groups);
            self.sync(&mut groups)?;
            if groups.contains_key(group) {
                return Err(StoreError::GroupExists(group.to_string()));
            }
            groups.insert(group.to_string(), StoreGroup::default());
            Ok(())
        }

        fn put(&self, group: &str, key: &str, entry: StoreEntry) -> Result<(), StoreError> {
            let mut groups = lock(&self.groups);
            group_mut(&mut groups, group)?.entries.insert(key.to_string(), entry);
            Ok(())
        }

        fn get(&self, group: &str, key: &str) -> Result<StoreEntry, StoreError> {
            let groups = lock(&self.groups);
            let found = groups.get(group).ok_or_else(|| StoreError::GroupNotFound(group.to_string()))?;
            found.entries.get(key).cloned().ok_or_else(|| StoreError::EntryNotFound {
                group: group.to_string(),
                key: key.to_string(),
            })
        }

        fn set_attr(&self, group: &str, key: &str, value: String) -> Result<(), StoreError> {
            let mut groups = lock(&self.groups);
            group_mut(&mut groups, group)?.attrs.insert(key.to_string(), value);
            Ok(())
        }

        fn group(&self, group: &str) -> Result<StoreGroup, StoreError> {
            lock(&self.groups).get(group).cloned().ok_or_else(|| StoreError::GroupNotFound(group.to_string()))
        }
    };
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    groups: Mutex<Groups>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn group_names(&self) -> Vec<String> { lock(&self.groups).keys().cloned().collect() }

    fn sync(&self, _groups: &mut Groups) -> Result<(), StoreError> { Ok(()) }
}

impl GroupStore for MemoryStore {
    impl_group_store_ops!();
}

/// Store persisted as one JSON document; written out on `flush`.
///
/// Groups already on disk are merged in before a group is created and
/// before every write-out, so several stores on one file keep each other's
/// groups. Within a process, `JsonFileStore::shared` hands out one store per
/// file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    groups: Mutex<Groups>,
}

fn open_stores() -> &'static Mutex<HashMap<PathBuf, Weak<JsonFileStore>>> {
    static OPEN_STORES: OnceLock<Mutex<HashMap<PathBuf, Weak<JsonFileStore>>>> = OnceLock::new();
    OPEN_STORES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Absolute form of `path`; the file itself need not exist yet.
fn canonical_path(path: &Path) -> PathBuf {
    if let Ok(full) = path.canonicalize() {
        return full;
    }
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (parent.canonicalize(), path.file_name()) {
        (Ok(dir), Some(file)) => dir.join(file),
        _ => path.to_path_buf(),
    }
}

fn load_groups(path: &Path) -> Result<Groups, StoreError> {
    if !path.exists() {
        return Ok(Groups::new());
    }
    let text = fs::read_to_string(path)?;
    if text.trim().is_empty() {
        return Ok(Groups::new());
    }
    Ok(serde_json::from_str(&text)?)
}

impl JsonFileStore {
    /// Opens `path`, loading existing groups if the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let groups = load_groups(&path)?;
        log::debug!("opened store '{}' with {} groups", path.display(), groups.len());
        Ok(Self { path, groups: Mutex::new(groups) })
    }

    /// The store already open for `path` in this process, or a new one.
    pub fn shared(path: impl AsRef<Path>) -> Result<Arc<Self>, StoreError> {
        let key = canonical_path(path.as_ref());
        let mut stores = open_stores().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(store) = stores.get(&key).and_then(Weak::upgrade) {
            return Ok(store);
        }
        let store = Arc::new(Self::open(&key)?);
        stores.retain(|_, open| open.strong_count() > 0);
        stores.insert(key, Arc::downgrade(&store));
        Ok(store)
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn group_names(&self) -> Vec<String> { lock(&self.groups).keys().cloned().collect() }

    /// Adds groups written to the file by other stores since it was read.
    fn sync(&self, groups: &mut Groups) -> Result<(), StoreError> {
        for (name, group) in load_groups(&self.path)? {
            groups.entry(name).or_insert(group);
        }
        Ok(())
    }
}

impl GroupStore for JsonFileStore {
    impl_group_store_ops!();

    fn flush(&self) -> Result<(), StoreError> {
        let mut groups = lock(&self.groups);
        self.sync(&mut groups)?;
        let text = serde_json::to_string_pretty(&*groups)?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}

/// Execution state writing every value into a fresh group of a store.
pub struct StoreLedger {
    store: Arc<dyn GroupStore>,
    group: String,
    written: usize,
    closed: bool,
}

impl StoreLedger {
    /// Creates the run's group, named `"{base} {timestamp}"`.
    ///
    /// If another run already took that name, a microsecond suffix is
    /// appended once; a second collision fails.
    pub fn open(store: Arc<dyn GroupStore>, base: &str) -> Result<Self, StoreError> {
        let now = Local::now();
        let name = format!("{} {}", base, now.format("%y%m%d-%H%M%S"));
        let group = match store.create_group(&name) {
            Ok(()) => name,
            Err(StoreError::GroupExists(_)) => {
                let fallback = format!("{}-{}", name, now.format("%6f"));
                store.create_group(&fallback)?;
                fallback
            }
            Err(e) => return Err(e),
        };
        log::debug!("store group '{}' created", group);
        Ok(Self { store, group, written: 0, closed: false })
    }

    pub fn group(&self) -> &str { &self.group }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl ExecutionState for StoreLedger {
    fn write(&mut self, key: &str, value: Value) -> Result<(), CallError> {
        self.check_open()?;
        self.store.put(&self.group, key, StoreEntry::encode(value))?;
        self.written += 1;
        Ok(())
    }

    fn read(&mut self, key: &str) -> Result<Value, CallError> {
        self.check_open()?;
        Ok(self.store.get(&self.group, key)?.into_value())
    }

    /// Values stay in the store; nothing is held in memory.
    fn live_count(&self) -> usize { 0 }

    fn note_failure(&mut self, message: &str) -> Result<(), CallError> {
        self.check_open()?;
        self.store.set_attr(&self.group, "note", message.to_string())?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), CallError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        log::trace!("closing store group '{}' after {} writes", self.group, self.written);
        self.store.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::kwargs;

    #[test]
    fn test_entry_encoding() {
        assert_eq!(StoreEntry::encode(Value::Int(1)), StoreEntry::Dataset(Value::Int(1)));
        let opaque = StoreEntry::encode(Value::opaque(vec![1u8]));
        assert_eq!(opaque, StoreEntry::Attribute("[1]".into()));
        assert_eq!(opaque.into_value(), Value::from("[1]"));
        assert_eq!(StoreEntry::encode(Value::Float(f64::INFINITY)), StoreEntry::Attribute("inf".into()));
        assert_eq!(StoreEntry::encode(Value::Float(f64::NAN)), StoreEntry::Attribute("NaN".into()));
    }

    #[test]
    fn test_group_name_collision_uses_fallback() {
        let store: Arc<dyn GroupStore> = Arc::new(MemoryStore::new());
        let first = StoreLedger::open(store.clone(), "run").unwrap();
        let second = StoreLedger::open(store.clone(), "run").unwrap();
        assert!(first.group().starts_with("run "));
        assert_ne!(first.group(), second.group());
        assert!(store.has_group(first.group()).unwrap());
        assert!(store.has_group(second.group()).unwrap());
    }

    #[test]
    fn test_ledger_reads_back_and_notes_failure() {
        let store = Arc::new(MemoryStore::new());
        let mut ledger = StoreLedger::open(store.clone(), "run").unwrap();
        ledger.write("a", Value::Float(1.5)).unwrap();
        ledger.write("obj", Value::opaque("handle")).unwrap();
        assert_eq!(ledger.read("a").unwrap(), Value::Float(1.5));
        assert_eq!(ledger.read("obj").unwrap(), Value::from("\"handle\""));

        ledger.note_failure("boom").unwrap();
        ledger.close().unwrap();
        assert!(matches!(ledger.read("a"), Err(CallError::Store(StoreError::Closed))));

        let group = store.group(ledger.group()).unwrap();
        assert_eq!(group.attrs["note"], "boom");
        assert_eq!(group.entries.len(), 2);
    }

    #[test]
    fn test_json_file_store_persists_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.create_group("g").unwrap();
        store.put("g", "x", StoreEntry::encode(Value::from(vec![1, 2]))).unwrap();
        store.put("g", "kw", StoreEntry::encode(Value::map(kwargs([("a", 1)])))).unwrap();
        store.flush().unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.group_names(), vec!["g".to_string()]);
        assert_eq!(reopened.get("g", "x").unwrap().into_value(), Value::from(vec![1, 2]));
        assert_eq!(reopened.get("g", "kw").unwrap().into_value(), Value::map(kwargs([("a", 1)])));
        assert!(matches!(reopened.get("g", "y"), Err(StoreError::EntryNotFound { .. })));
        assert!(matches!(reopened.create_group("g"), Err(StoreError::GroupExists(_))));
    }

    #[test]
    fn test_json_file_stores_on_one_path_keep_each_others_groups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.json");

        let first = JsonFileStore::open(&path).unwrap();
        let second = JsonFileStore::open(&path).unwrap();
        first.create_group("a").unwrap();
        first.flush().unwrap();
        second.create_group("b").unwrap();
        // "a" was written by the other store after this one opened
        assert!(matches!(second.create_group("a"), Err(StoreError::GroupExists(_))));
        second.flush().unwrap();
        first.flush().unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.group_names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_shared_store_per_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.json");
        let one = JsonFileStore::shared(&path).unwrap();
        let two = JsonFileStore::shared(dir.path().join(".").join("runs.json")).unwrap();
        assert!(Arc::ptr_eq(&one, &two));

        let other = JsonFileStore::shared(dir.path().join("other.json")).unwrap();
        assert!(!Arc::ptr_eq(&one, &other));
    }
}
