#![warn(clippy::pedantic)]

pub mod block_cache;
pub mod error;
pub mod memory;

pub use block_cache::{BlockCache, CONTENT_COLLECTION, STATE_COLLECTION};
pub use error::CacheError;
pub use memory::MemoryEngine;
