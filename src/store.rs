// Object store: in-memory records with whole-file JSON persistence

use crate::record::Record;
use eyre::{Context, Result, eyre};
use fs2::FileExt;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Default backing file name
pub const DEFAULT_FILE: &str = "file.json";

/// In-memory registry of records keyed by `<class_name>.<id>`
///
/// The backing file always holds the full registry. Every mutation is followed
/// by `persist()`, which rewrites the whole document.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    objects: BTreeMap<String, Record>,
}

impl Store {
    /// Create an empty store bound to `path` without touching the file
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            objects: BTreeMap::new(),
        }
    }

    /// Open the store at `path` and load whatever the backing file holds
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut store = Self::new(path);
        store.reload()?;
        info!(path = ?store.path, count = store.objects.len(), "Store opened");
        Ok(store)
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ========================================================================
    // Registry
    // ========================================================================

    /// The live mapping, sorted by composite key
    pub fn all(&self) -> &BTreeMap<String, Record> {
        &self.objects
    }

    /// Mutable access to the live mapping (used by delete flows)
    pub fn all_mut(&mut self) -> &mut BTreeMap<String, Record> {
        &mut self.objects
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.objects.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Record> {
        self.objects.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Insert a record under its composite key, replacing any previous entry
    pub fn register(&mut self, record: Record) -> String {
        let key = record.key();
        if self.objects.insert(key.clone(), record).is_some() {
            debug!(key = %key, "register: replaced existing record");
        }
        key
    }

    /// Construct a fresh record of `class_name` and register it
    ///
    /// Nothing is written to disk; call `save` with the returned record's key.
    pub fn create(&mut self, class_name: &str) -> &Record {
        let key = self.register(Record::new(class_name));
        &self.objects[&key]
    }

    /// Bump the record's `updated_at` and persist the whole store
    ///
    /// Returns false (and writes nothing) when `key` is not registered.
    pub fn save(&mut self, key: &str) -> Result<bool> {
        match self.objects.get_mut(key) {
            Some(record) => record.touch(),
            None => return Ok(false),
        }
        self.persist()?;
        Ok(true)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Serialize the full mapping and replace the backing file
    ///
    /// The document is written to a uniquely named temp file in the target's
    /// directory, synced, and renamed over the target so readers never see a
    /// truncated file. Writers are serialized by an exclusive lock on the
    /// `<file>.lock` sidecar, which is never renamed. On failure the temp file
    /// is removed and the previous document is left as it was.
    pub fn persist(&self) -> Result<()> {
        let document: Map<String, Value> = self
            .objects
            .iter()
            .map(|(key, record)| (key.clone(), Value::Object(record.to_mapping())))
            .collect();
        let json = serde_json::to_vec(&Value::Object(document)).context("Failed to serialize store")?;

        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent).context("Failed to create store directory")?;
                parent
            }
            None => Path::new("."),
        };

        let lock_path = self.lock_path();
        let lock = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;
        lock.lock_exclusive().context("Failed to acquire file lock")?;

        let mut temp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        temp.write_all(&json)
            .with_context(|| format!("Failed to write temp file {}", temp.path().display()))?;
        temp.as_file()
            .sync_all()
            .with_context(|| format!("Failed to sync temp file {}", temp.path().display()))?;

        // The failed temp file is dropped (and removed) with the persist error
        temp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        // Lock is released when the sidecar handle is dropped
        debug!(path = ?self.path, count = self.objects.len(), bytes = json.len(), "persist: wrote store");
        Ok(())
    }

    /// Replace the in-memory mapping with the backing file's contents
    ///
    /// A missing file, an unparseable document, or an empty object leaves the
    /// mapping untouched. Only read failures on an existing file are errors.
    /// Records are keyed by the key found in the file.
    pub fn reload(&mut self) -> Result<()> {
        if !self.path.exists() {
            debug!(path = ?self.path, "reload: no backing file");
            return Ok(());
        }

        let bytes = fs::read(&self.path).with_context(|| format!("Failed to read {}", self.path.display()))?;

        match Self::parse_document(&bytes) {
            Ok(Some(objects)) => {
                debug!(path = ?self.path, count = objects.len(), "reload: loaded records");
                self.objects = objects;
            }
            Ok(None) => {
                debug!(path = ?self.path, "reload: empty document, keeping current records");
            }
            Err(e) => {
                warn!(path = ?self.path, error = %format_args!("{:#}", e), "Ignoring malformed store file");
            }
        }

        Ok(())
    }

    fn parse_document(bytes: &[u8]) -> Result<Option<BTreeMap<String, Record>>> {
        let document: Value = serde_json::from_slice(bytes).context("Invalid JSON")?;
        let entries = match document {
            Value::Object(entries) => entries,
            other => return Err(eyre!("Expected a JSON object, found {}", kind_name(&other))),
        };

        if entries.is_empty() {
            return Ok(None);
        }

        let mut objects = BTreeMap::new();
        for (key, value) in entries {
            let mapping = match value {
                Value::Object(mapping) => mapping,
                other => return Err(eyre!("Entry {} is a {}, not an object", key, kind_name(&other))),
            };
            let record = Record::from_mapping(mapping).with_context(|| format!("Invalid entry {}", key))?;
            objects.insert(key, record);
        }

        Ok(Some(objects))
    }

    /// Sidecar file that writers lock while replacing the backing file
    pub fn lock_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".lock");
        PathBuf::from(name)
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store_in(temp: &TempDir) -> Store {
        Store::new(temp.path().join(DEFAULT_FILE))
    }

    fn read_document(store: &Store) -> Map<String, Value> {
        let content = fs::read_to_string(store.path()).unwrap();
        match serde_json::from_str(&content).unwrap() {
            Value::Object(map) => map,
            other => panic!("expected object, got {}", other),
        }
    }

    fn dir_entries(temp: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(temp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = Store::open(temp.path().join(DEFAULT_FILE)).unwrap();

        assert!(store.is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_register_overwrites_same_key() {
        let temp = TempDir::new().unwrap();
        let mut store = store_in(&temp);

        let mut record = Record::new("BaseModel");
        let first_key = store.register(record.clone());
        record.set_attribute("name", json!("second")).unwrap();
        let second_key = store.register(record);

        assert_eq!(first_key, second_key);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&first_key).unwrap().attribute("name"), Some(&json!("second")));
    }

    #[test]
    fn test_create_registers_without_writing() {
        let temp = TempDir::new().unwrap();
        let mut store = store_in(&temp);

        let key = store.create("BaseModel").key();
        assert!(store.get(&key).is_some());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_persist_empty_store_writes_empty_object() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        store.persist().unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "{}");
        assert_eq!(dir_entries(&temp), ["file.json", "file.json.lock"]);
    }

    #[test]
    fn test_persist_document_layout() {
        let temp = TempDir::new().unwrap();
        let mut store = store_in(&temp);

        let key = store.create("BaseModel").key();
        store.get_mut(&key).unwrap().set_attribute("age", json!(30)).unwrap();
        store.persist().unwrap();

        let document = read_document(&store);
        assert_eq!(document.len(), 1);
        let entry = &document[&key];
        let record = store.get(&key).unwrap();
        assert_eq!(entry["id"], json!(record.id()));
        assert_eq!(entry["__class__"], json!("BaseModel"));
        assert_eq!(entry["age"], json!(30));
        assert!(entry["created_at"].is_string());
    }

    #[test]
    fn test_persist_creates_parent_directory() {
        let temp = TempDir::new().unwrap();
        let store = Store::new(temp.path().join("nested/dir/store.json"));

        store.persist().unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_save_touches_and_persists() {
        let temp = TempDir::new().unwrap();
        let mut store = store_in(&temp);

        let key = store.create("BaseModel").key();
        let created = store.get(&key).unwrap().created_at();
        std::thread::sleep(std::time::Duration::from_millis(2));

        assert!(store.save(&key).unwrap());
        let record = store.get(&key).unwrap();
        assert_eq!(record.created_at(), created);
        assert!(record.updated_at() > created);
        assert_eq!(read_document(&store).len(), 1);
    }

    #[test]
    fn test_save_unknown_key_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let mut store = store_in(&temp);

        assert!(!store.save("BaseModel.missing").unwrap());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_persist_then_reload_roundtrip() {
        let temp = TempDir::new().unwrap();
        let mut store = store_in(&temp);

        for i in 0..3 {
            let key = store.create("BaseModel").key();
            store.get_mut(&key).unwrap().set_attribute("n", json!(i)).unwrap();
        }
        store.persist().unwrap();

        let reopened = Store::open(store.path()).unwrap();
        assert_eq!(reopened.all(), store.all());
    }

    #[test]
    fn test_reload_replaces_in_memory_records() {
        let temp = TempDir::new().unwrap();
        let mut store = store_in(&temp);

        let kept = store.create("BaseModel").key();
        store.persist().unwrap();

        // Unsaved record disappears on reload
        let dropped = store.create("BaseModel").key();
        store.reload().unwrap();

        assert!(store.get(&kept).is_some());
        assert!(store.get(&dropped).is_none());
    }

    #[test]
    fn test_reload_malformed_file_keeps_records() {
        let temp = TempDir::new().unwrap();
        let mut store = store_in(&temp);
        let key = store.create("BaseModel").key();

        fs::write(store.path(), "{ not json").unwrap();
        store.reload().unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.get(&key).is_some());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "{ not json");
    }

    #[test]
    fn test_reload_rejects_non_object_documents() {
        let temp = TempDir::new().unwrap();
        let mut store = store_in(&temp);
        let key = store.create("BaseModel").key();

        for content in ["[]", "42", "{\"BaseModel.x\": 7}", "{\"BaseModel.x\": {\"id\": \"x\"}}"] {
            fs::write(store.path(), content).unwrap();
            store.reload().unwrap();
            assert_eq!(store.len(), 1, "content {:?} should be ignored", content);
            assert!(store.get(&key).is_some());
        }
    }

    #[test]
    fn test_reload_empty_object_keeps_records() {
        let temp = TempDir::new().unwrap();
        let mut store = store_in(&temp);
        let key = store.create("BaseModel").key();

        fs::write(store.path(), "{}").unwrap();
        store.reload().unwrap();

        assert!(store.get(&key).is_some());
    }

    #[test]
    fn test_reload_missing_file_does_not_create_it() {
        let temp = TempDir::new().unwrap();
        let mut store = store_in(&temp);

        store.reload().unwrap();
        assert!(store.is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_reload_keys_by_file_key() {
        let temp = TempDir::new().unwrap();
        let mut store = store_in(&temp);

        fs::write(
            store.path(),
            json!({
                "BaseModel.alias": {
                    "id": "real-id",
                    "created_at": "2017-09-28T21:03:54.052298",
                    "updated_at": "2017-09-28T21:03:54.052302",
                    "__class__": "BaseModel",
                    "name": "kept"
                }
            })
            .to_string(),
        )
        .unwrap();
        store.reload().unwrap();

        let record = store.get("BaseModel.alias").unwrap();
        assert_eq!(record.id(), "real-id");
        assert_eq!(record.attribute("name"), Some(&json!("kept")));
        assert!(store.get("BaseModel.real-id").is_none());
    }

    #[test]
    fn test_remove_through_all_mut_then_persist() {
        let temp = TempDir::new().unwrap();
        let mut store = store_in(&temp);

        let a = store.create("BaseModel").key();
        let b = store.create("BaseModel").key();
        store.persist().unwrap();

        assert!(store.all_mut().remove(&a).is_some());
        store.persist().unwrap();

        let document = read_document(&store);
        assert_eq!(document.len(), 1);
        assert!(document.contains_key(&b));
    }

    #[test]
    fn test_persist_waits_for_lock_and_replaces_atomically() {
        let temp = TempDir::new().unwrap();
        let mut first = store_in(&temp);
        first.create("BaseModel");
        first.persist().unwrap();
        let before = fs::read(first.path()).unwrap();

        // Hold the writer lock and keep a handle on the live file
        let lock = fs::File::create(first.lock_path()).unwrap();
        lock.lock_exclusive().unwrap();
        let live = fs::File::open(first.path()).unwrap();

        let mut second = store_in(&temp);
        second.create("BaseModel");
        second.create("BaseModel");
        let writer = std::thread::spawn(move || second.persist().map(|_| second));

        std::thread::sleep(std::time::Duration::from_millis(100));
        assert!(!writer.is_finished());
        assert_eq!(fs::read(first.path()).unwrap(), before);

        lock.unlock().unwrap();
        let second = writer.join().unwrap().unwrap();

        assert_eq!(read_document(&second).len(), 2);
        // The old document was replaced, not rewritten in place
        let mut old = String::new();
        std::io::Read::read_to_string(&mut &live, &mut old).unwrap();
        assert_eq!(old.as_bytes(), before.as_slice());
        assert_eq!(dir_entries(&temp), ["file.json", "file.json.lock"]);
    }

    #[test]
    fn test_persist_error_when_parent_is_a_file() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let mut store = Store::new(blocker.join(DEFAULT_FILE));
        let key = store.create("BaseModel").key();

        assert!(store.persist().is_err());
        assert_eq!(fs::read_to_string(&blocker).unwrap(), "not a directory");
        assert!(store.get(&key).is_some());
    }

    #[test]
    fn test_persist_error_keeps_previous_document() {
        let temp = TempDir::new().unwrap();
        let mut store = store_in(&temp);
        store.create("BaseModel");
        store.persist().unwrap();
        let before = fs::read(store.path()).unwrap();

        // A directory at the target path cannot be replaced by a file
        let mut blocked = Store::new(temp.path().join("blocked"));
        fs::create_dir(blocked.path()).unwrap();
        fs::write(blocked.path().join("inner.json"), "{}").unwrap();
        blocked.create("BaseModel");

        assert!(blocked.persist().is_err());
        assert!(blocked.path().is_dir());
        assert_eq!(fs::read_to_string(blocked.path().join("inner.json")).unwrap(), "{}");
        assert_eq!(fs::read(store.path()).unwrap(), before);
        assert_eq!(
            dir_entries(&temp),
            ["blocked", "blocked.lock", "file.json", "file.json.lock"]
        );
    }

    #[test]
    fn test_reload_unreadable_path_is_an_error() {
        let temp = TempDir::new().unwrap();
        let mut store = store_in(&temp);
        let key = store.create("BaseModel").key();
        fs::create_dir(store.path()).unwrap();

        assert!(store.reload().is_err());
        assert_eq!(store.len(), 1);
        assert!(store.get(&key).is_some());
    }
}
