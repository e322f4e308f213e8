#![warn(clippy::pedantic)]

pub mod block;
pub mod download_state;
pub mod error;
pub mod key;
pub mod metadata;
pub mod provider;
pub mod store;

pub use block::Block;
pub use download_state::DownloadState;
pub use error::{KeyError, ProviderError, StateError, StoreError};
pub use key::ResourceKey;
pub use metadata::Metadata;
pub use provider::{BlockStream, CacheProvider, SourceProvider, fuse_on_error};
pub use store::{KeyValueStore, StorageEngine, Update, UpdateFn};

pub use sponge_wire::BLOCK_SIZE;
