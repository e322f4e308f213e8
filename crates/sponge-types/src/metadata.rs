use sponge_wire::{BLOCK_SIZE, block_count};

/// What is known about a resource before its content arrives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Metadata {
  /// Total size in bytes, `None` when the resource length is not known
  /// up front (a stream of unknown length, for instance).
  pub size: Option<u64>,
}

impl Metadata {
  #[must_use]
  pub fn known(size: u64) -> Self {
    Self { size: Some(size) }
  }

  #[must_use]
  pub fn unknown() -> Self {
    Self { size: None }
  }

  /// `ceil(size / BLOCK_SIZE)` for a known size, `0` otherwise.
  #[must_use]
  pub fn block_count(&self) -> u64 {
    block_count(self.size, BLOCK_SIZE)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn block_counts() {
    assert_eq!(Metadata::known(0).block_count(), 0);
    assert_eq!(Metadata::known(1).block_count(), 1);
    assert_eq!(Metadata::known(3 * 1024 * 1024 / 2).block_count(), 2);
    assert_eq!(Metadata::unknown().block_count(), 0);
  }
}
