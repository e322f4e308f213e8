use std::error::Error as StdError;

use sponge_wire::WireError;

/// Violations of the block and download-state invariants.
///
/// These are higher-level than [`WireError`]: the bytes decoded fine (or
/// were never bytes at all) but the values they describe break a rule of
/// the block layout. Except for `Wire`, every variant is either a
/// corruption signal (the persisted state disagrees with itself) or a
/// protocol misuse by the writer.
///
/// ```text
/// ┌──────────────────────┬───────────────────────────────────────────────┐
/// │ Variant              │ Cause                                         │
/// ├──────────────────────┼───────────────────────────────────────────────┤
/// │ Corruption           │ bitmap length disagrees with the known size   │
/// │ BlockOverflow        │ block ends past the declared resource size    │
/// │ ShortBlock           │ block length breaks the fixed-size layout     │
/// │ MissingContent       │ bitmap says present, content collection empty │
/// │ FrontierViolation    │ unknown-size write skips past the frontier    │
/// │ OutOfRange           │ block id beyond a known-size resource         │
/// │ InvalidOffset        │ offset not block-aligned or id overflows u32  │
/// │ InvalidLength        │ block is empty or larger than BLOCK_SIZE      │
/// │ TooManyBlocks        │ size needs more blocks than a u32 can count   │
/// │ Wire                 │ malformed persisted state bytes               │
/// └──────────────────────┴───────────────────────────────────────────────┘
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StateError {
  #[error("download state corrupted: {slots} presence slots, size {size} needs {expected}")]
  Corruption {
    size: u64,
    slots: usize,
    expected: u64,
  },

  #[error("block {block_id} ends at {end}, past the declared size {size}")]
  BlockOverflow { block_id: u32, end: u64, size: u64 },

  #[error("block {block_id} is {length} bytes, expected {expected}")]
  ShortBlock {
    block_id: u32,
    length: u32,
    expected: u64,
  },

  #[error("block {block_id} is marked present but has no stored content")]
  MissingContent { block_id: u32 },

  /// An unknown-size resource may only grow by one slot at a time.
  #[error("block {block_id} is beyond the download frontier {frontier}")]
  FrontierViolation { block_id: u32, frontier: usize },

  #[error("block {block_id} is out of range for a resource of {block_count} blocks")]
  OutOfRange { block_id: u32, block_count: u64 },

  #[error("offset {offset} is not a valid block offset")]
  InvalidOffset { offset: u64 },

  #[error("block at offset {offset} has invalid length {length}")]
  InvalidLength { offset: u64, length: usize },

  #[error("a resource of {size} bytes needs {count} blocks, more than block ids can address")]
  TooManyBlocks { size: u64, count: u64 },

  #[error(transparent)]
  Wire(#[from] WireError),
}

impl StateError {
  /// Whether this error means persisted data contradicts itself, as
  /// opposed to a writer misusing the protocol.
  #[must_use]
  pub fn is_corruption(&self) -> bool {
    matches!(
      self,
      Self::Corruption { .. }
        | Self::BlockOverflow { .. }
        | Self::ShortBlock { .. }
        | Self::MissingContent { .. }
        | Self::Wire(_)
    )
  }
}

/// Failure to turn a resource key into its byte form.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
  #[error("serialized key is {len} bytes, limit is {limit}")]
  TooLong { len: usize, limit: usize },

  #[error("key cannot be serialized: {reason}")]
  Invalid { reason: String },
}

/// Opaque failure from a storage engine.
///
/// Engines are external collaborators, so beyond the lifecycle states
/// every engine shares (closed, paused) the cause is carried as a boxed
/// error. Nothing at this layer retries.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("storage engine is closed")]
  Closed,

  #[error("storage engine is paused for backup")]
  Paused,

  #[error(transparent)]
  Io(#[from] std::io::Error),

  #[error(transparent)]
  Wire(#[from] WireError),

  #[error("storage backend failure: {0}")]
  Backend(#[source] Box<dyn StdError + Send + Sync>),
}

/// The error currency of every cache and source provider.
///
/// `ProviderError` is what the race combinators collect from losing
/// candidates. "No value" is never an error: a cache miss or an absent
/// resource is `Ok(None)` or an empty stream, so every variant here is a
/// genuine failure that must reach the caller when nothing else produced
/// a value.
///
/// Error hierarchy:
///
/// ```text
///   ProviderError
///   ├── State(StateError)     ← corruption, frontier, range violations
///   ├── Key(KeyError)         ← key serialization failed
///   ├── Store(StoreError)     ← storage engine failure
///   ├── Upstream(..)          ← opaque failure of an external source
///   └── Multiple { .. }       ← several candidates of one race failed
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
  #[error(transparent)]
  State(#[from] StateError),

  #[error(transparent)]
  Key(#[from] KeyError),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("upstream provider failed: {0}")]
  Upstream(#[source] Box<dyn StdError + Send + Sync>),

  #[error("{} providers failed; first: {first}", .rest.len() + 1)]
  Multiple {
    first: Box<ProviderError>,
    rest: Vec<ProviderError>,
  },
}

impl ProviderError {
  /// Wrap an arbitrary source failure.
  pub fn upstream(err: impl StdError + Send + Sync + 'static) -> Self {
    Self::Upstream(Box::new(err))
  }

  /// Collapse the failures of a race into one representative error.
  ///
  /// Returns `None` for no failures, the failure itself for exactly one,
  /// and [`ProviderError::Multiple`] otherwise.
  #[must_use]
  pub fn aggregate(errors: Vec<ProviderError>) -> Option<Self> {
    let mut errors = errors.into_iter();
    let first = errors.next()?;
    let rest: Vec<_> = errors.collect();
    if rest.is_empty() {
      Some(first)
    } else {
      Some(Self::Multiple {
        first: Box::new(first),
        rest,
      })
    }
  }

  /// Iterate over the leaf errors, flattening nested aggregates.
  pub fn leaves(&self) -> Box<dyn Iterator<Item = &ProviderError> + '_> {
    match self {
      Self::Multiple { first, rest } => {
        Box::new(first.leaves().chain(rest.iter().flat_map(ProviderError::leaves)))
      }
      other => Box::new(std::iter::once(other)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn io(msg: &str) -> ProviderError {
    ProviderError::upstream(std::io::Error::other(msg.to_owned()))
  }

  #[test]
  fn aggregate_of_nothing_is_none() {
    assert!(ProviderError::aggregate(vec![]).is_none());
  }

  #[test]
  fn aggregate_of_one_is_that_error() {
    let err = ProviderError::aggregate(vec![io("boom")]).unwrap();
    assert!(matches!(err, ProviderError::Upstream(_)));
    assert_eq!(err.to_string(), "upstream provider failed: boom");
  }

  #[test]
  fn aggregate_of_many_keeps_all() {
    let err = ProviderError::aggregate(vec![io("a"), io("b"), io("c")]).unwrap();
    assert_eq!(err.leaves().count(), 3);
    assert_eq!(
      err.to_string(),
      "3 providers failed; first: upstream provider failed: a"
    );
  }

  #[test]
  fn nested_aggregates_flatten() {
    let inner = ProviderError::aggregate(vec![io("a"), io("b")]).unwrap();
    let outer = ProviderError::aggregate(vec![inner, io("c")]).unwrap();
    let messages: Vec<_> = outer.leaves().map(ToString::to_string).collect();
    assert_eq!(
      messages,
      vec![
        "upstream provider failed: a",
        "upstream provider failed: b",
        "upstream provider failed: c",
      ]
    );
  }

  #[test]
  fn corruption_classification() {
    assert!(
      StateError::Corruption {
        size: 1,
        slots: 2,
        expected: 1
      }
      .is_corruption()
    );
    assert!(
      !StateError::FrontierViolation {
        block_id: 3,
        frontier: 1
      }
      .is_corruption()
    );
  }
}
