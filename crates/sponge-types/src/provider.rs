use async_trait::async_trait;
use futures::future;
use futures::stream::{BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::block::Block;
use crate::download_state::DownloadState;
use crate::error::ProviderError;
use crate::key::ResourceKey;
use crate::metadata::Metadata;

/// Lazy, ordered sequence of blocks for one resource.
///
/// An empty stream means "no content here", never an error. Once an item
/// is an `Err`, consumers stop reading.
pub type BlockStream = BoxStream<'static, Result<Block, ProviderError>>;

/// End `stream` right after its first error item.
pub fn fuse_on_error(stream: BlockStream) -> BlockStream {
  stream
    .scan(false, |failed, item| {
      if *failed {
        return future::ready(None);
      }
      *failed = item.is_err();
      future::ready(Some(item))
    })
    .boxed()
}

/// A read-only origin of resources.
///
/// Every call receives a cancellation token. When it fires the provider
/// should stop producing work as soon as practical; a stream may simply
/// end. Providers never treat cancellation as an error.
#[async_trait]
pub trait SourceProvider<K: ResourceKey>: Send + Sync {
  /// Blocks of `key` in ascending id order. Empty if the provider does
  /// not have the resource.
  fn request_content(&self, key: &K, cancel: &CancellationToken) -> BlockStream;

  /// Metadata of `key`, `None` if the provider does not have it.
  async fn request_metadata(
    &self,
    key: &K,
    cancel: &CancellationToken,
  ) -> Result<Option<Metadata>, ProviderError>;

  /// Metadata and content together.
  ///
  /// The default asks for metadata first and only opens a content stream
  /// when the resource exists. Providers that can answer both from one
  /// read should override it.
  async fn request(
    &self,
    key: &K,
    cancel: &CancellationToken,
  ) -> Result<Option<(Metadata, BlockStream)>, ProviderError> {
    let Some(metadata) = self.request_metadata(key, cancel).await? else {
      return Ok(None);
    };
    Ok(Some((metadata, self.request_content(key, cancel))))
  }
}

/// A provider that can also be written to.
///
/// Writes carry a `force` flag. Without it, a cache may decline to store
/// a resource (by key predicate); with it, the write always persists.
#[async_trait]
pub trait CacheProvider<K: ResourceKey>: SourceProvider<K> {
  /// The raw persisted state of `key`, including partial downloads.
  async fn request_disk_metadata(&self, key: &K) -> Result<Option<DownloadState>, ProviderError>;

  /// Record the metadata of `key`. The first recorded metadata wins;
  /// later calls for the same key change nothing.
  async fn write_metadata(
    &self,
    key: &K,
    metadata: Metadata,
    force: bool,
  ) -> Result<(), ProviderError>;

  /// Store one block of `key` and mark it present.
  async fn write_content_block(
    &self,
    key: &K,
    block: &Block,
    force: bool,
  ) -> Result<(), ProviderError>;
}

#[cfg(test)]
mod tests {
  use futures::{StreamExt, stream};

  use super::*;

  struct Fixed(Option<Metadata>);

  #[async_trait]
  impl SourceProvider<String> for Fixed {
    fn request_content(&self, _key: &String, _cancel: &CancellationToken) -> BlockStream {
      let block = Block::from_id(0, vec![1, 2, 3]);
      stream::iter(vec![block.map_err(ProviderError::from)]).boxed()
    }

    async fn request_metadata(
      &self,
      _key: &String,
      _cancel: &CancellationToken,
    ) -> Result<Option<Metadata>, ProviderError> {
      Ok(self.0)
    }
  }

  #[tokio::test]
  async fn default_request_combines_metadata_and_content() {
    let provider = Fixed(Some(Metadata::known(3)));
    let (metadata, content) = provider
      .request(&"k".to_owned(), &CancellationToken::new())
      .await
      .unwrap()
      .unwrap();
    assert_eq!(metadata, Metadata::known(3));
    let blocks: Vec<_> = content.collect().await;
    assert_eq!(blocks.len(), 1);
  }

  #[tokio::test]
  async fn fuse_on_error_stops_after_first_error() {
    let items = vec![
      Block::from_id(0, vec![1]).map_err(ProviderError::from),
      Err(ProviderError::upstream(std::io::Error::other("boom"))),
      Block::from_id(1, vec![2]).map_err(ProviderError::from),
    ];
    let fused: Vec<_> = fuse_on_error(stream::iter(items).boxed()).collect().await;
    assert_eq!(fused.len(), 2);
    assert!(fused[0].is_ok());
    assert!(fused[1].is_err());
  }

  #[tokio::test]
  async fn default_request_is_none_without_metadata() {
    let provider = Fixed(None);
    let result = provider
      .request(&"k".to_owned(), &CancellationToken::new())
      .await
      .unwrap();
    assert!(result.is_none());
  }
}
