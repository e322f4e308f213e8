use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{self, try_join_all};
use futures::stream::{self, StreamExt, TryStreamExt};
use futures::FutureExt;
use sponge_types::{
    Block, BlockStream, CacheProvider, Metadata, ProviderError, ResourceKey, SourceProvider,
    fuse_on_error,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::any_first::{any_first, any_first_stream};
use crate::registry::{Registry, Snapshot};

type Caches<K> = Snapshot<dyn CacheProvider<K>>;

/// Serves resources from caches first, falling back to sources.
///
/// ```text
///   request ──▶ race caches ──value──▶ caller
///                   │
///                 empty
///                   ▼
///              race sources ──▶ write to every cache ──▶ caller
/// ```
///
/// Both races use the any-first rule: the first candidate with a value
/// wins and the others are cancelled, empties are not errors, and errors
/// only surface when nothing produced a value. Source results are written
/// to every registered cache before the caller sees them.
///
/// Registries are snapshotted at the start of each request; providers
/// registered later only serve later requests.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use sponge_orchestrator::Orchestrator;
/// use sponge_types::{CacheProvider, SourceProvider};
///
/// fn wire(cache: Arc<dyn CacheProvider<String>>, origin: Arc<dyn SourceProvider<String>>) -> Orchestrator<String> {
///     let orchestrator = Orchestrator::new();
///     orchestrator.register_cache(cache);
///     orchestrator.register_source(origin);
///     orchestrator
/// }
/// ```
pub struct Orchestrator<K> {
    caches: Registry<dyn CacheProvider<K>>,
    sources: Registry<dyn SourceProvider<K>>,
}

impl<K: ResourceKey> Orchestrator<K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            caches: Registry::new(),
            sources: Registry::new(),
        }
    }

    /// Register a read/write cache. Registering the same instance twice
    /// is a no-op; returns whether it was added.
    pub fn register_cache(&self, cache: Arc<dyn CacheProvider<K>>) -> bool {
        self.caches.register(cache)
    }

    /// Register a read-only source. Registering the same instance twice
    /// is a no-op; returns whether it was added.
    pub fn register_source(&self, source: Arc<dyn SourceProvider<K>>) -> bool {
        self.sources.register(source)
    }

    #[must_use]
    pub fn cache_count(&self) -> usize {
        self.caches.len()
    }

    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Metadata of `key` from the first cache that has it, otherwise from
    /// the first source that has it (after recording it in every cache).
    ///
    /// # Errors
    ///
    /// The aggregated provider errors of the deciding race when no
    /// provider produced a value.
    pub async fn request_metadata(
        &self,
        key: &K,
        cancel: &CancellationToken,
    ) -> Result<Option<Metadata>, ProviderError> {
        let caches = self.caches.snapshot();
        let sources = self.sources.snapshot();

        let cached = any_first(
            cancel,
            caches.iter().map(|cache| {
                let cache = Arc::clone(cache);
                let key = key.clone();
                move |token: CancellationToken| {
                    async move { cache.request_metadata(&key, &token).await }.boxed()
                }
            }),
        )
        .await?;
        if let Some(metadata) = cached {
            debug!(?key, ?metadata, "metadata served from cache");
            return Ok(Some(metadata));
        }

        let fetched = any_first(
            cancel,
            sources.iter().map(|source| {
                let source = Arc::clone(source);
                let caches = Arc::clone(&caches);
                let key = key.clone();
                move |token: CancellationToken| {
                    async move {
                        let Some(metadata) = source.request_metadata(&key, &token).await? else {
                            return Ok(None);
                        };
                        try_join_all(caches.iter().map(|cache| cache.write_metadata(&key, metadata, false)))
                            .await?;
                        Ok(Some(metadata))
                    }
                    .boxed()
                }
            }),
        )
        .await?;

        match fetched {
            Some(metadata) => debug!(?key, ?metadata, caches = caches.len(), "metadata served from source"),
            None => debug!(?key, sources = sources.len(), "metadata not found"),
        }
        Ok(fetched)
    }

    /// Blocks of `key`, deduplicated by block id.
    ///
    /// The stream is lazy: no provider is contacted until it is polled.
    /// It ends quietly when `cancel` fires. A failure of the deciding race
    /// is delivered as the single error item of the stream.
    pub fn request_content(&self, key: &K, cancel: &CancellationToken) -> BlockStream {
        let caches = self.caches.snapshot();
        let sources = self.sources.snapshot();
        let key = key.clone();
        let race_cancel = cancel.clone();

        let winner = async move {
            match race_content(&key, &caches, &sources, &race_cancel).await {
                Ok(Some(content)) => content,
                Ok(None) => {
                    debug!(?key, "content not found");
                    stream::empty().boxed()
                }
                Err(err) => stream::iter([Err(err)]).boxed(),
            }
        };

        let mut seen = HashSet::new();
        let content = stream::once(winner)
            .flatten()
            .try_filter(move |block: &Block| future::ready(seen.insert(block.id())))
            .take_until(cancel.clone().cancelled_owned())
            .boxed();
        fuse_on_error(content)
    }
}

/// Race the caches, then the sources.
///
/// A cache error with no cache value ends the request; sources are only
/// consulted when every cache came back empty.
async fn race_content<K: ResourceKey>(
    key: &K,
    caches: &Caches<K>,
    sources: &Snapshot<dyn SourceProvider<K>>,
    cancel: &CancellationToken,
) -> Result<Option<BlockStream>, ProviderError> {
    let cached = any_first_stream(
        cancel,
        caches.iter().map(|cache| {
            let cache = Arc::clone(cache);
            let key = key.clone();
            move |token: CancellationToken| cache.request_content(&key, &token)
        }),
    )
    .await?;
    if cached.is_some() {
        debug!(?key, "content served from cache");
        return Ok(cached);
    }
    if cancel.is_cancelled() {
        return Ok(None);
    }

    let fetched = any_first_stream(
        cancel,
        sources.iter().map(|source| {
            let source = Arc::clone(source);
            let caches = Arc::clone(caches);
            let key = key.clone();
            move |token: CancellationToken| write_through(source.request_content(&key, &token), caches, key)
        }),
    )
    .await?;
    if fetched.is_some() {
        debug!(?key, caches = caches.len(), "content served from source");
    }
    Ok(fetched)
}

/// Write every block of `content` to every cache before passing it on.
fn write_through<K: ResourceKey>(content: BlockStream, caches: Caches<K>, key: K) -> BlockStream {
    content
        .and_then(move |block| {
            let caches = Arc::clone(&caches);
            let key = key.clone();
            async move {
                try_join_all(caches.iter().map(|cache| cache.write_content_block(&key, &block, false))).await?;
                Ok(block)
            }
        })
        .boxed()
}

impl<K: ResourceKey> Default for Orchestrator<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// An orchestrator is itself a source, so orchestrators can be stacked.
#[async_trait]
impl<K: ResourceKey> SourceProvider<K> for Orchestrator<K> {
    fn request_content(&self, key: &K, cancel: &CancellationToken) -> BlockStream {
        Orchestrator::request_content(self, key, cancel)
    }

    async fn request_metadata(
        &self,
        key: &K,
        cancel: &CancellationToken,
    ) -> Result<Option<Metadata>, ProviderError> {
        Orchestrator::request_metadata(self, key, cancel).await
    }
}
