//! Shared fixtures for the sponge integration tests and benchmarks.
//!
//! [`MemorySource`] stands in for a remote origin: it serves resources
//! from a map, splits them into blocks, and counts every request so tests
//! can assert that a warm cache never reaches it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use sponge_cache::{BlockCache, MemoryEngine};
use sponge_types::{
    BLOCK_SIZE, Block, BlockStream, Metadata, ProviderError, SourceProvider, fuse_on_error,
};
use tokio_util::sync::CancellationToken;

/// Deterministic content of `len` bytes that differs between blocks.
#[must_use]
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Split `data` into the blocks a source would deliver.
///
/// # Panics
///
/// If `data` needs more block ids than fit in `u32`.
#[must_use]
pub fn blocks_of(data: &[u8]) -> Vec<Block> {
    data.chunks(BLOCK_SIZE as usize)
        .enumerate()
        .map(|(id, chunk)| {
            let id = u32::try_from(id).expect("block id fits u32");
            Block::from_id(id, chunk.to_vec()).expect("valid block")
        })
        .collect()
}

/// A cache over a fresh in-memory engine.
///
/// # Panics
///
/// Never in practice; opening collections of a new engine cannot fail.
#[must_use]
pub fn memory_cache() -> Arc<BlockCache<String>> {
    Arc::new(BlockCache::open(Arc::new(MemoryEngine::new())).expect("fresh engine opens"))
}

/// In-memory source with request counters.
#[derive(Default)]
pub struct MemorySource {
    resources: HashMap<String, Vec<u8>>,
    unknown_size: bool,
    metadata_calls: AtomicUsize,
    content_calls: AtomicUsize,
}

impl MemorySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_resource(mut self, key: &str, data: Vec<u8>) -> Self {
        self.resources.insert(key.to_owned(), data);
        self
    }

    /// Report every resource with an unknown size, like a streamed origin.
    #[must_use]
    pub fn without_sizes(mut self) -> Self {
        self.unknown_size = true;
        self
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn content_calls(&self) -> usize {
        self.content_calls.load(Ordering::SeqCst)
    }

    /// Total number of requests of either kind.
    pub fn calls(&self) -> usize {
        self.metadata_calls() + self.content_calls()
    }
}

#[async_trait]
impl SourceProvider<String> for MemorySource {
    fn request_content(&self, key: &String, cancel: &CancellationToken) -> BlockStream {
        self.content_calls.fetch_add(1, Ordering::SeqCst);
        let blocks = self.resources.get(key).map_or_else(Vec::new, |data| blocks_of(data));
        let content = stream::iter(blocks.into_iter().map(Ok)).take_until(cancel.clone().cancelled_owned());
        fuse_on_error(content.boxed())
    }

    async fn request_metadata(
        &self,
        key: &String,
        _cancel: &CancellationToken,
    ) -> Result<Option<Metadata>, ProviderError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.resources.get(key).map(|data| {
            if self.unknown_size {
                Metadata::unknown()
            } else {
                Metadata::known(data.len() as u64)
            }
        }))
    }
}

/// Source whose every request fails.
pub struct BrokenSource;

#[async_trait]
impl SourceProvider<String> for BrokenSource {
    fn request_content(&self, _key: &String, _cancel: &CancellationToken) -> BlockStream {
        stream::iter([Err(ProviderError::upstream(std::io::Error::other("origin unreachable")))]).boxed()
    }

    async fn request_metadata(
        &self,
        _key: &String,
        _cancel: &CancellationToken,
    ) -> Result<Option<Metadata>, ProviderError> {
        Err(ProviderError::upstream(std::io::Error::other("origin unreachable")))
    }
}
