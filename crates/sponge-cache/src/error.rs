use sponge_types::{KeyError, ProviderError, StateError, StoreError};

/// Errors raised by [`BlockCache`](crate::BlockCache).
///
/// Error hierarchy:
///
/// ```text
///   CacheError
///   ├── State(StateError)    ← corruption, frontier, range violations
///   ├── Store(StoreError)    ← storage engine failure, not retried here
///   ├── Key(KeyError)        ← resource key cannot be serialized
///   └── Blocking(JoinError)  ← the blocking store call panicked
/// ```
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("blocking store task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}

impl From<CacheError> for ProviderError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::State(err) => Self::State(err),
            CacheError::Store(err) => Self::Store(err),
            CacheError::Key(err) => Self::Key(err),
            CacheError::Blocking(err) => Self::upstream(err),
        }
    }
}
