use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use sponge_types::{KeyValueStore, StorageEngine, StoreError, Update, UpdateFn};
use sponge_wire::snapshot::{SnapshotRecord, decode_snapshot, encode_snapshot};
use tracing::debug;

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// Lifecycle flags shared by an engine and every collection it handed out.
#[derive(Default)]
struct Lifecycle {
    closed: AtomicBool,
    paused: AtomicBool,
}

impl Lifecycle {
    fn check_readable(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        self.check_readable()?;
        if self.paused.load(Ordering::Acquire) {
            return Err(StoreError::Paused);
        }
        Ok(())
    }
}

/// One collection of a [`MemoryEngine`].
///
/// Reads take a read lock, writes and updates take the write lock, so
/// `update` is trivially atomic per key (it is atomic for the whole
/// collection).
struct MemoryCollection {
    entries: RwLock<Table>,
    lifecycle: Arc<Lifecycle>,
}

impl KeyValueStore for MemoryCollection {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.lifecycle.check_readable()?;
        Ok(self
            .entries
            .read()
            .expect("memory collection lock poisoned")
            .get(key)
            .cloned())
    }

    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        self.lifecycle.check_writable()?;
        self.entries
            .write()
            .expect("memory collection lock poisoned")
            .insert(key.to_vec(), value);
        Ok(())
    }

    fn update(&self, key: &[u8], apply: UpdateFn<'_>) -> Result<(), StoreError> {
        self.lifecycle.check_writable()?;
        let mut entries = self.entries.write().expect("memory collection lock poisoned");
        match apply(entries.get(key).map(Vec::as_slice)) {
            Update::Keep => {}
            Update::Put(value) => {
                entries.insert(key.to_vec(), value);
            }
            Update::Delete => {
                entries.remove(key);
            }
        }
        Ok(())
    }

    fn contains(&self, key: &[u8]) -> Result<bool, StoreError> {
        self.lifecycle.check_readable()?;
        Ok(self
            .entries
            .read()
            .expect("memory collection lock poisoned")
            .contains_key(key))
    }
}

/// In-memory storage engine, optionally backed by a snapshot file.
///
/// Collections are `BTreeMap`s behind [`RwLock`]s, so keys iterate in
/// byte order (the blocks of one resource are adjacent). When opened
/// with [`MemoryEngine::open`], the whole engine is loaded from the
/// snapshot file and written back on [`StorageEngine::close`] or
/// [`MemoryEngine::flush`].
///
/// # Example
///
/// ```rust
/// use sponge_cache::MemoryEngine;
/// use sponge_types::StorageEngine;
///
/// let engine = MemoryEngine::new();
/// let store = engine.collection("things").unwrap();
/// store.put(b"key", b"value".to_vec()).unwrap();
/// assert_eq!(store.get(b"key").unwrap().unwrap(), b"value");
/// ```
pub struct MemoryEngine {
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
    lifecycle: Arc<Lifecycle>,
    path: Option<PathBuf>,
}

impl MemoryEngine {
    /// An empty engine that is never persisted.
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            lifecycle: Arc::new(Lifecycle::default()),
            path: None,
        }
    }

    /// Load the engine from the snapshot at `path`, or start empty if the
    /// file does not exist yet. The engine is written back to `path` when
    /// flushed or closed.
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] if the file cannot be read and
    /// [`StoreError::Wire`] if it is not a valid snapshot.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut engine = Self::new();

        match std::fs::read(&path) {
            Ok(bytes) => {
                let records = decode_snapshot(&bytes)?;
                debug!(path = %path.display(), records = records.len(), "restored snapshot");
                for record in records {
                    engine
                        .collection_entry(&record.collection)
                        .entries
                        .write()
                        .expect("memory collection lock poisoned")
                        .insert(record.key, record.value);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no snapshot yet, starting empty");
            }
            Err(err) => return Err(err.into()),
        }

        engine.path = Some(path);
        Ok(engine)
    }

    /// Path of the backing snapshot, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn collection_entry(&self, name: &str) -> Arc<MemoryCollection> {
        if let Some(existing) = self
            .collections
            .read()
            .expect("memory engine lock poisoned")
            .get(name)
        {
            return Arc::clone(existing);
        }

        let mut collections = self.collections.write().expect("memory engine lock poisoned");
        Arc::clone(collections.entry(name.to_owned()).or_insert_with(|| {
            Arc::new(MemoryCollection {
                entries: RwLock::new(Table::new()),
                lifecycle: Arc::clone(&self.lifecycle),
            })
        }))
    }

    /// Every key/value pair of collection `name`, in key order.
    ///
    /// # Errors
    ///
    /// [`StoreError::Closed`] once the engine is closed.
    pub fn entries(&self, name: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.lifecycle.check_readable()?;
        let collections = self.collections.read().expect("memory engine lock poisoned");
        let Some(collection) = collections.get(name) else {
            return Ok(Vec::new());
        };
        Ok(collection
            .entries
            .read()
            .expect("memory collection lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Encode every collection into snapshot bytes, collections sorted by
    /// name so equal contents give equal files.
    fn snapshot_bytes(&self) -> Result<Vec<u8>, StoreError> {
        let collections = self.collections.read().expect("memory engine lock poisoned");
        let mut names: Vec<_> = collections.keys().collect();
        names.sort();

        let mut records = Vec::new();
        for name in names {
            let entries = collections[name]
                .entries
                .read()
                .expect("memory collection lock poisoned");
            records.extend(entries.iter().map(|(key, value)| SnapshotRecord {
                collection: name.clone(),
                key: key.clone(),
                value: value.clone(),
            }));
        }
        Ok(encode_snapshot(&records)?)
    }

    /// Write the snapshot file. A no-op for engines without a path.
    ///
    /// The file is written to a sibling temporary path and renamed into
    /// place, so a crash never leaves a half-written snapshot.
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] if the file cannot be written.
    pub fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = self.snapshot_bytes()?;
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), bytes = bytes.len(), "flushed snapshot");
        Ok(())
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine for MemoryEngine {
    fn collection(&self, name: &str) -> Result<Arc<dyn KeyValueStore>, StoreError> {
        self.lifecycle.check_readable()?;
        Ok(self.collection_entry(name))
    }

    fn close(&self) -> Result<(), StoreError> {
        if self.lifecycle.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.flush()?;
        self.lifecycle.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn pause_for_backup(&self) -> Result<(), StoreError> {
        self.lifecycle.check_readable()?;
        self.lifecycle.paused.store(true, Ordering::Release);
        Ok(())
    }

    fn resume_after_backup(&self) -> Result<(), StoreError> {
        self.lifecycle.check_readable()?;
        self.lifecycle.paused.store(false, Ordering::Release);
        Ok(())
    }

    fn is_paused(&self) -> bool {
        self.lifecycle.paused.load(Ordering::Acquire)
    }
}
