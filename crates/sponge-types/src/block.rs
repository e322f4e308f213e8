use std::fmt;

use sponge_wire::BLOCK_SIZE;

use crate::error::StateError;

/// One fixed-size chunk of a resource.
///
/// A block's offset is always a multiple of [`BLOCK_SIZE`], so the block
/// id is `offset / BLOCK_SIZE`. Every block is `BLOCK_SIZE` bytes except
/// the last block of a resource, which may be shorter. Whether a given
/// length is right for a given resource depends on the resource size and
/// is checked by [`DownloadState::check_block`](crate::DownloadState::check_block),
/// not here.
///
/// The bytes are owned: a `Block` handed to a consumer cannot be mutated
/// by the provider that produced it.
///
/// ```text
///   offset = id × BLOCK_SIZE
///   ┌──────────────── BLOCK_SIZE ────────────────┐
///   │ block 0 │ block 1 │ block 2 │ ... │ last ┆  │
///   └─────────┴─────────┴─────────┴─────┴──────┘
///                                         ↑ may be short
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Block {
  offset: u64,
  bytes: Vec<u8>,
}

impl Block {
  /// Build a block starting at `offset`.
  ///
  /// # Errors
  ///
  /// - [`StateError::InvalidOffset`] if `offset` is not a multiple of
  ///   [`BLOCK_SIZE`] or the resulting id does not fit a `u32`.
  /// - [`StateError::InvalidLength`] if `bytes` is empty or longer than
  ///   [`BLOCK_SIZE`].
  pub fn new(offset: u64, bytes: Vec<u8>) -> Result<Self, StateError> {
    let block_size = u64::from(BLOCK_SIZE);
    if offset % block_size != 0 || offset / block_size > u64::from(u32::MAX) {
      return Err(StateError::InvalidOffset { offset });
    }
    if bytes.is_empty() || bytes.len() > BLOCK_SIZE as usize {
      return Err(StateError::InvalidLength {
        offset,
        length: bytes.len(),
      });
    }
    Ok(Self { offset, bytes })
  }

  /// Build block `id`.
  ///
  /// # Errors
  ///
  /// Same as [`Block::new`], minus the offset checks which cannot fail.
  pub fn from_id(id: u32, bytes: Vec<u8>) -> Result<Self, StateError> {
    Self::new(sponge_wire::block_offset(id), bytes)
  }

  #[must_use]
  pub fn id(&self) -> u32 {
    // `new` guarantees the quotient fits.
    u32::try_from(self.offset / u64::from(BLOCK_SIZE)).unwrap_or(u32::MAX)
  }

  #[must_use]
  pub fn offset(&self) -> u64 {
    self.offset
  }

  #[must_use]
  pub fn length(&self) -> u32 {
    // Bounded by BLOCK_SIZE in `new`.
    u32::try_from(self.bytes.len()).unwrap_or(u32::MAX)
  }

  /// Offset one past the last byte of this block.
  #[must_use]
  pub fn end(&self) -> u64 {
    self.offset + u64::from(self.length())
  }

  #[must_use]
  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }

  #[must_use]
  pub fn into_bytes(self) -> Vec<u8> {
    self.bytes
  }
}

// A full block is a megabyte; never dump it into logs.
impl fmt::Debug for Block {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Block")
      .field("id", &self.id())
      .field("offset", &self.offset)
      .field("length", &self.length())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const MIB: u64 = 1024 * 1024;

  #[test]
  fn id_and_end_follow_offset() {
    let block = Block::new(2 * MIB, vec![7; 10]).unwrap();
    assert_eq!(block.id(), 2);
    assert_eq!(block.offset(), 2 * MIB);
    assert_eq!(block.length(), 10);
    assert_eq!(block.end(), 2 * MIB + 10);
  }

  #[test]
  fn from_id_matches_new() {
    assert_eq!(
      Block::from_id(3, vec![1, 2]).unwrap(),
      Block::new(3 * MIB, vec![1, 2]).unwrap()
    );
  }

  #[test]
  fn reject_misaligned_offset() {
    let result = Block::new(MIB + 1, vec![0]);
    assert!(matches!(
      result,
      Err(StateError::InvalidOffset { offset }) if offset == MIB + 1
    ));
  }

  #[test]
  fn reject_offset_beyond_u32_ids() {
    let offset = (u64::from(u32::MAX) + 1) * MIB;
    assert!(matches!(
      Block::new(offset, vec![0]),
      Err(StateError::InvalidOffset { .. })
    ));
  }

  #[test]
  fn reject_empty_and_oversized() {
    assert!(matches!(
      Block::new(0, Vec::new()),
      Err(StateError::InvalidLength { length: 0, .. })
    ));
    assert!(matches!(
      Block::new(0, vec![0; BLOCK_SIZE as usize + 1]),
      Err(StateError::InvalidLength { .. })
    ));
    assert!(Block::new(0, vec![0; BLOCK_SIZE as usize]).is_ok());
  }

  #[test]
  fn debug_omits_payload() {
    let block = Block::new(0, vec![0xAB; 64]).unwrap();
    let rendered = format!("{block:?}");
    assert_eq!(rendered, "Block { id: 0, offset: 0, length: 64, .. }");
  }

  #[test]
  fn clones_are_independent() {
    let original = Block::new(0, vec![1, 2, 3]).unwrap();
    let mut bytes = original.clone().into_bytes();
    bytes[0] = 9;
    assert_eq!(original.bytes(), &[1, 2, 3]);
  }
}
