use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use sponge_types::{BLOCK_SIZE, Block, BlockStream, Metadata, ProviderError, SourceProvider, fuse_on_error};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Source serving the regular files under a directory, keyed by their
/// relative path.
///
/// Keys that are empty, absolute, or contain `.` / `..` components never
/// resolve, so a key cannot reach outside the directory.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Option<PathBuf> {
        let relative = Path::new(key);
        let mut components = relative.components().peekable();
        components.peek()?;
        if components.all(|c| matches!(c, Component::Normal(_))) {
            Some(self.root.join(relative))
        } else {
            debug!(key, "rejected key outside the source directory");
            None
        }
    }
}

/// Read up to one block from `file`. Empty at end of file.
async fn read_block(file: &mut File) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(BLOCK_SIZE as usize);
    file.take(u64::from(BLOCK_SIZE)).read_to_end(&mut buf).await?;
    Ok(buf)
}

#[async_trait]
impl SourceProvider<String> for DirectorySource {
    fn request_content(&self, key: &String, cancel: &CancellationToken) -> BlockStream {
        let Some(path) = self.resolve(key) else {
            return stream::empty().boxed();
        };

        let blocks = stream::try_unfold((path, None::<File>, 0u32), |(path, file, id)| async move {
            let mut file = match file {
                Some(file) => file,
                None => match File::open(&path).await {
                    Ok(file) => file,
                    Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
                    Err(err) => return Err(ProviderError::upstream(err)),
                },
            };
            let bytes = read_block(&mut file).await.map_err(ProviderError::upstream)?;
            if bytes.is_empty() {
                return Ok(None);
            }
            let block = Block::from_id(id, bytes)?;
            Ok(Some((block, (path, Some(file), id + 1))))
        });

        fuse_on_error(blocks.take_until(cancel.clone().cancelled_owned()).boxed())
    }

    async fn request_metadata(
        &self,
        key: &String,
        _cancel: &CancellationToken,
    ) -> Result<Option<Metadata>, ProviderError> {
        let Some(path) = self.resolve(key) else {
            return Ok(None);
        };
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(Metadata::known(meta.len()))),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ProviderError::upstream(err)),
        }
    }
}
