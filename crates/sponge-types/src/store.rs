use std::sync::Arc;

use crate::error::StoreError;

/// Outcome of an [`KeyValueStore::update`] closure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Update {
    /// Leave the stored value as it is.
    Keep,
    /// Replace (or create) the stored value.
    Put(Vec<u8>),
    /// Remove the key.
    Delete,
}

/// Closure given the current value of a key and deciding its new value.
pub type UpdateFn<'a> = Box<dyn FnOnce(Option<&[u8]>) -> Update + Send + 'a>;

/// One named collection of a storage engine: a byte-keyed map.
///
/// Implementations may be in-memory, file-backed, or networked. All
/// methods take `&self`; implementations that need interior mutability
/// use synchronization primitives like [`std::sync::RwLock`].
///
/// Calls are synchronous and may block on I/O. Async callers run them on
/// a blocking thread (see `tokio::task::spawn_blocking`).
///
/// # Atomicity
///
/// `update` is the only read-modify-write primitive. It must behave as a
/// compare-and-swap on a single key: two concurrent updates of the same
/// key never lose each other's change. Updates of different keys may run
/// in parallel.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Engine-specific [`StoreError`].
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `value` under `key`, overwriting any previous value.
    ///
    /// # Errors
    ///
    /// Engine-specific [`StoreError`].
    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError>;

    /// Atomically replace the value under `key` with the outcome of
    /// `apply`. The closure runs exactly once, while the key is held.
    ///
    /// # Errors
    ///
    /// Engine-specific [`StoreError`].
    fn update(&self, key: &[u8], apply: UpdateFn<'_>) -> Result<(), StoreError>;

    /// Check whether a value exists without retrieving it.
    ///
    /// # Errors
    ///
    /// Engine-specific [`StoreError`].
    fn contains(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}

/// A storage engine hosting named collections.
///
/// The lifecycle calls exist for engines that need them (flushing a file
/// on close, quiescing writes while a backup copies the files). Engines
/// without such needs implement them as no-ops.
pub trait StorageEngine: Send + Sync {
    /// Open (creating if needed) the collection called `name`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Closed`] once the engine is closed, or an
    /// engine-specific failure.
    fn collection(&self, name: &str) -> Result<Arc<dyn KeyValueStore>, StoreError>;

    /// Flush and release the engine. Later calls fail with
    /// [`StoreError::Closed`].
    ///
    /// # Errors
    ///
    /// Engine-specific [`StoreError`] if flushing fails.
    fn close(&self) -> Result<(), StoreError>;

    /// Stop accepting writes until [`StorageEngine::resume_after_backup`].
    ///
    /// # Errors
    ///
    /// Engine-specific [`StoreError`].
    fn pause_for_backup(&self) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Engine-specific [`StoreError`].
    fn resume_after_backup(&self) -> Result<(), StoreError>;

    fn is_paused(&self) -> bool;
}
