use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use sponge_types::{
    BLOCK_SIZE, Block, BlockStream, CacheProvider, DownloadState, KeyValueStore, Metadata, ProviderError,
    ResourceKey, SourceProvider, StateError, StorageEngine, Update, fuse_on_error,
};
use sponge_wire::content_key;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CacheError;

/// Name of the collection holding raw block bytes.
pub const CONTENT_COLLECTION: &str = "block-content";

/// Name of the collection holding one [`DownloadState`] per resource.
pub const STATE_COLLECTION: &str = "download-state";

type CachePredicate<K> = Arc<dyn Fn(&K) -> bool + Send + Sync>;

/// Run a synchronous store call on the blocking thread pool.
async fn blocking<T, F>(f: F) -> Result<T, CacheError>
where
    F: FnOnce() -> Result<T, CacheError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

/// A persistent block cache on top of two key/value collections.
///
/// ```text
///   download-state   key bytes            → DownloadState frame
///   block-content    key bytes ‖ id (BE)  → raw block bytes
/// ```
///
/// A resource is served from the cache only once its state is complete;
/// partial downloads are invisible to readers. Writes are gated by a key
/// predicate unless forced.
///
/// # Write protocol
///
/// Writing a block first checks it against the current state, then stores
/// its bytes, then marks it present with a single conditional update of
/// the state entry. A block that could never be served back is refused
/// before it overwrites anything. Concurrent writers of the same resource
/// never lose each other's presence flags, and a reader never sees a flag
/// for content that is not yet stored.
///
/// # Engine ownership
///
/// A cache built with [`BlockCache::open`] owns its engine and forwards
/// the administrative calls ([`close`](BlockCache::close), backup pause
/// and resume) to it. A cache built with [`BlockCache::with_collections`]
/// shares collections owned elsewhere and treats those calls as no-ops.
pub struct BlockCache<K> {
    content: Arc<dyn KeyValueStore>,
    state: Arc<dyn KeyValueStore>,
    engine: Option<Arc<dyn StorageEngine>>,
    should_cache: CachePredicate<K>,
}

impl<K: ResourceKey> BlockCache<K> {
    /// Open the cache collections of `engine`, taking ownership of it.
    ///
    /// # Errors
    ///
    /// [`CacheError::Store`] if the collections cannot be opened.
    pub fn open(engine: Arc<dyn StorageEngine>) -> Result<Self, CacheError> {
        let content = engine.collection(CONTENT_COLLECTION)?;
        let state = engine.collection(STATE_COLLECTION)?;
        Ok(Self {
            content,
            state,
            engine: Some(engine),
            should_cache: Arc::new(|_: &K| true),
        })
    }

    /// Build a cache over collections owned by someone else.
    #[must_use]
    pub fn with_collections(content: Arc<dyn KeyValueStore>, state: Arc<dyn KeyValueStore>) -> Self {
        Self {
            content,
            state,
            engine: None,
            should_cache: Arc::new(|_: &K| true),
        }
    }

    /// Only store resources whose key satisfies `predicate`, unless a
    /// write is forced. By default every key is stored.
    #[must_use]
    pub fn with_predicate(mut self, predicate: impl Fn(&K) -> bool + Send + Sync + 'static) -> Self {
        self.should_cache = Arc::new(predicate);
        self
    }

    fn admits(&self, key: &K, force: bool) -> bool {
        force || (self.should_cache)(key)
    }

    /// Read and decode the persisted state of `key`.
    ///
    /// # Errors
    ///
    /// Store failures, and [`StateError`] if the persisted bytes are
    /// malformed or inconsistent.
    pub async fn read_state(&self, key: &K) -> Result<Option<DownloadState>, CacheError> {
        let key_bytes = key.to_key_bytes()?;
        let state = Arc::clone(&self.state);
        blocking(move || {
            let Some(bytes) = state.get(&key_bytes)? else {
                return Ok(None);
            };
            Ok(Some(DownloadState::decode(&bytes)?))
        })
        .await
        .inspect_err(|err| warn!(?key, %err, "failed to read download state"))
    }

    /// Record `metadata` for `key` unless a state already exists.
    ///
    /// # Errors
    ///
    /// Store failures, or [`StateError::TooManyBlocks`] for an
    /// unaddressable size.
    pub async fn write_metadata(&self, key: &K, metadata: Metadata, force: bool) -> Result<(), CacheError> {
        if !self.admits(key, force) {
            debug!(?key, "not caching metadata: rejected by predicate");
            return Ok(());
        }

        let key_bytes = key.to_key_bytes()?;
        let fresh = DownloadState::new(metadata.size)?.encode()?;
        let state = Arc::clone(&self.state);
        let created = blocking(move || {
            let mut created = false;
            state.update(
                &key_bytes,
                Box::new(|current: Option<&[u8]>| match current {
                    Some(_) => Update::Keep,
                    None => {
                        created = true;
                        Update::Put(fresh)
                    }
                }),
            )?;
            Ok(created)
        })
        .await?;

        debug!(?key, ?metadata, created, "wrote metadata");
        Ok(())
    }

    /// Store `block` and mark it present in the state of `key`.
    ///
    /// The bytes are stored even if no state exists yet; they only become
    /// visible once metadata has been written and the state is complete.
    ///
    /// # Errors
    ///
    /// Store failures, [`StateError::FrontierViolation`],
    /// [`StateError::OutOfRange`], [`StateError::BlockOverflow`] or
    /// [`StateError::ShortBlock`] for a block the state cannot accept, and
    /// [`StateError`] corruption variants if the persisted state is bad.
    pub async fn write_content_block(&self, key: &K, block: &Block, force: bool) -> Result<(), CacheError> {
        if !self.admits(key, force) {
            debug!(?key, block_id = block.id(), "not caching block: rejected by predicate");
            return Ok(());
        }

        let key_bytes = key.to_key_bytes()?;
        let id = block.id();
        let length = block.length();
        let bytes = block.bytes().to_vec();
        let content = Arc::clone(&self.content);
        let state = Arc::clone(&self.state);

        let changed = blocking(move || {
            if let Some(current) = state.get(&key_bytes)? {
                let current = DownloadState::decode(&current)?;
                admit_block(&current, content.as_ref(), &key_bytes, id, length)?;
            }
            content.put(&content_key(&key_bytes, id), bytes)?;

            let mut outcome: Result<bool, StateError> = Ok(false);
            state.update(
                &key_bytes,
                Box::new(|current: Option<&[u8]>| {
                    let Some(current) = current else {
                        return Update::Keep;
                    };
                    match mark_block(current, id, length) {
                        Ok(Some(encoded)) => {
                            outcome = Ok(true);
                            Update::Put(encoded)
                        }
                        Ok(None) => Update::Keep,
                        Err(err) => {
                            outcome = Err(err);
                            Update::Keep
                        }
                    }
                }),
            )?;
            Ok(outcome?)
        })
        .await
        .inspect_err(|err| warn!(?key, block_id = id, %err, "failed to write block"))?;

        debug!(?key, block_id = id, length, changed, "wrote block");
        Ok(())
    }

    /// Blocks of a complete state, read lazily in ascending order.
    fn content_stream(&self, key: &K, key_bytes: Vec<u8>, state: DownloadState, cancel: &CancellationToken) -> BlockStream {
        let ids = (0..=u32::MAX).take(state.slot_count());
        let content = Arc::clone(&self.content);
        let state = Arc::new(state);
        let key = key.clone();

        let blocks = stream::iter(ids).then(move |id| {
            let content = Arc::clone(&content);
            let state = Arc::clone(&state);
            let block_key = content_key(&key_bytes, id);
            let key = key.clone();
            async move {
                let read = async {
                    let bytes = blocking(move || Ok(content.get(&block_key)?))
                        .await?
                        .ok_or(StateError::MissingContent { block_id: id })?;
                    let block = Block::from_id(id, bytes)?;
                    state.check_block(id, block.length())?;
                    Ok::<_, CacheError>(block)
                };
                read.await
                    .inspect_err(|err| warn!(?key, block_id = id, %err, "cached block is unusable"))
                    .map_err(ProviderError::from)
            }
        });

        fuse_on_error(blocks.take_until(cancel.clone().cancelled_owned()).boxed())
    }

    /// Close the owned engine. A no-op for shared collections.
    ///
    /// # Errors
    ///
    /// The engine's close failure.
    pub fn close(&self) -> Result<(), CacheError> {
        if let Some(engine) = &self.engine {
            engine.close()?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// The engine's pause failure.
    pub fn pause_for_backup(&self) -> Result<(), CacheError> {
        if let Some(engine) = &self.engine {
            engine.pause_for_backup()?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// The engine's resume failure.
    pub fn resume_after_backup(&self) -> Result<(), CacheError> {
        if let Some(engine) = &self.engine {
            engine.resume_after_backup()?;
        }
        Ok(())
    }

    /// Whether the owned engine is paused. Always `false` for shared
    /// collections.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.engine.as_ref().is_some_and(|engine| engine.is_paused())
    }
}

/// Refuse a block of `length` bytes at `id` that `state` could never
/// serve back, before its bytes are stored.
///
/// A known size fixes every block's length. With an unknown size only the
/// tail may be short, so appending past a short tail is refused as well.
fn admit_block(
    state: &DownloadState,
    content: &dyn KeyValueStore,
    key_bytes: &[u8],
    id: u32,
    length: u32,
) -> Result<(), CacheError> {
    if state.size().is_some() {
        return Ok(state.check_block(id, length)?);
    }

    let frontier = state.slot_count();
    let index = id as usize;
    if index < frontier {
        return Ok(state.check_block(id, length)?);
    }
    if index > frontier {
        return Err(StateError::FrontierViolation { block_id: id, frontier }.into());
    }
    let Some(tail) = id.checked_sub(1) else {
        return Ok(());
    };
    if let Some(bytes) = content.get(&content_key(key_bytes, tail))? {
        let tail_length = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
        if tail_length != BLOCK_SIZE {
            return Err(StateError::ShortBlock {
                block_id: tail,
                length: tail_length,
                expected: u64::from(BLOCK_SIZE),
            }
            .into());
        }
    }
    Ok(())
}

/// Decode `current`, mark block `id` present and re-encode.
///
/// Returns `None` when the block was already present.
fn mark_block(current: &[u8], id: u32, length: u32) -> Result<Option<Vec<u8>>, StateError> {
    let mut state = DownloadState::decode(current)?;
    let changed = state.mark_present(id)?;
    // The state may have grown since the block was admitted.
    state.check_block(id, length)?;
    if !changed {
        return Ok(None);
    }
    Ok(Some(state.encode()?))
}

#[async_trait]
impl<K: ResourceKey> SourceProvider<K> for BlockCache<K> {
    fn request_content(&self, key: &K, cancel: &CancellationToken) -> BlockStream {
        let this = self.clone_handles();
        let key = key.clone();
        let cancel = cancel.clone();
        stream::once(async move {
            match this.request(&key, &cancel).await {
                Ok(Some((_, content))) => content,
                Ok(None) => stream::empty().boxed(),
                Err(err) => stream::iter([Err(err)]).boxed(),
            }
        })
        .flatten()
        .boxed()
    }

    async fn request_metadata(
        &self,
        key: &K,
        _cancel: &CancellationToken,
    ) -> Result<Option<Metadata>, ProviderError> {
        Ok(self.read_state(key).await?.map(|state| state.metadata()))
    }

    /// One state read answers both: the metadata, and a content stream
    /// that is empty unless the state is complete.
    async fn request(
        &self,
        key: &K,
        cancel: &CancellationToken,
    ) -> Result<Option<(Metadata, BlockStream)>, ProviderError> {
        let Some(state) = self.read_state(key).await? else {
            return Ok(None);
        };
        let metadata = state.metadata();
        if !state.is_complete()? {
            debug!(?key, present = state.present_count(), slots = state.slot_count(), "cached resource is partial");
            return Ok(Some((metadata, stream::empty().boxed())));
        }
        let key_bytes = key.to_key_bytes()?;
        Ok(Some((metadata, self.content_stream(key, key_bytes, state, cancel))))
    }
}

#[async_trait]
impl<K: ResourceKey> CacheProvider<K> for BlockCache<K> {
    async fn request_disk_metadata(&self, key: &K) -> Result<Option<DownloadState>, ProviderError> {
        Ok(self.read_state(key).await?)
    }

    async fn write_metadata(&self, key: &K, metadata: Metadata, force: bool) -> Result<(), ProviderError> {
        Ok(BlockCache::write_metadata(self, key, metadata, force).await?)
    }

    async fn write_content_block(&self, key: &K, block: &Block, force: bool) -> Result<(), ProviderError> {
        Ok(BlockCache::write_content_block(self, key, block, force).await?)
    }
}

impl<K> BlockCache<K> {
    /// A second handle on the same collections, for streams that must
    /// outlive the borrow of `self`.
    fn clone_handles(&self) -> Self {
        Self {
            content: Arc::clone(&self.content),
            state: Arc::clone(&self.state),
            engine: self.engine.clone(),
            should_cache: Arc::clone(&self.should_cache),
        }
    }
}
