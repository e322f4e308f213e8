use sponge_wire::{BLOCK_SIZE, StateFrame, block_count};

use crate::error::StateError;
use crate::metadata::Metadata;

/// Per-resource record of which blocks are cached.
///
/// The presence bitmap has one slot per block id. Its length obeys one of
/// two rules depending on whether the resource size is known:
///
/// ```text
///   size known     len(presence) == ceil(size / BLOCK_SIZE)
///                  ┌───┬───┬───┬───┐
///                  │ 1 │ 0 │ 1 │ 0 │   fixed, ids ≥ len are out of range
///                  └───┴───┴───┴───┘
///
///   size unknown   len(presence) == contiguous slots observed so far
///                  ┌───┬───┬───┐
///                  │ 1 │ 1 │ 1 │ ← frontier (3): the only id that may
///                  └───┴───┴───┘   be appended next
/// ```
///
/// Instances are always consistent: every constructor and mutator checks
/// the rule above, and [`DownloadState::decode`] reports a mismatch as
/// [`StateError::Corruption`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadState {
  size: Option<u64>,
  presence: Vec<bool>,
}

impl DownloadState {
  /// A state with nothing present.
  ///
  /// # Errors
  ///
  /// [`StateError::TooManyBlocks`] if a known `size` needs more block ids
  /// than a `u32` can address.
  pub fn new(size: Option<u64>) -> Result<Self, StateError> {
    let slots = match size {
      Some(size) => Self::addressable_count(size)?,
      None => 0,
    };
    Ok(Self {
      size,
      presence: vec![false; slots],
    })
  }

  /// Assemble a state from its parts, checking the length rule.
  ///
  /// # Errors
  ///
  /// - [`StateError::Corruption`] if a known size disagrees with the
  ///   bitmap length.
  /// - [`StateError::TooManyBlocks`] if the size is not addressable.
  pub fn from_parts(size: Option<u64>, presence: Vec<bool>) -> Result<Self, StateError> {
    let state = Self { size, presence };
    state.validate()?;
    Ok(state)
  }

  /// Number of block slots required by `size`, refusing sizes whose slot
  /// count would not fit a `u32`.
  fn addressable_count(size: u64) -> Result<usize, StateError> {
    let count = block_count(Some(size), BLOCK_SIZE);
    if count > u64::from(u32::MAX) {
      return Err(StateError::TooManyBlocks { size, count });
    }
    usize::try_from(count).map_err(|_| StateError::TooManyBlocks { size, count })
  }

  /// Re-check the length rule.
  ///
  /// # Errors
  ///
  /// [`StateError::Corruption`] on a length mismatch.
  pub fn validate(&self) -> Result<(), StateError> {
    if let Some(size) = self.size {
      let expected = block_count(Some(size), BLOCK_SIZE);
      if self.presence.len() as u64 != expected {
        return Err(StateError::Corruption {
          size,
          slots: self.presence.len(),
          expected,
        });
      }
    }
    Ok(())
  }

  #[must_use]
  pub fn size(&self) -> Option<u64> {
    self.size
  }

  #[must_use]
  pub fn metadata(&self) -> Metadata {
    Metadata { size: self.size }
  }

  #[must_use]
  pub fn presence(&self) -> &[bool] {
    &self.presence
  }

  /// Number of slots in the bitmap. For a known size this is the block
  /// count; for an unknown size it is the frontier.
  #[must_use]
  pub fn slot_count(&self) -> usize {
    self.presence.len()
  }

  #[must_use]
  pub fn present_count(&self) -> usize {
    self.presence.iter().filter(|&&present| present).count()
  }

  /// `true` when no presence flag is false.
  ///
  /// # Errors
  ///
  /// [`StateError::Corruption`] if the length rule does not hold.
  pub fn is_complete(&self) -> Result<bool, StateError> {
    self.validate()?;
    Ok(self.presence.iter().all(|&present| present))
  }

  /// Whether block `id` is cached.
  ///
  /// For an unknown size, ids at or past the frontier are simply not yet
  /// observed and return `false`.
  ///
  /// # Errors
  ///
  /// [`StateError::OutOfRange`] if the size is known and `id` is not below
  /// the block count.
  pub fn is_present(&self, id: u32) -> Result<bool, StateError> {
    match self.presence.get(id as usize) {
      Some(&present) => Ok(present),
      None if self.size.is_none() => Ok(false),
      None => Err(StateError::OutOfRange {
        block_id: id,
        block_count: self.presence.len() as u64,
      }),
    }
  }

  /// Mark block `id` present.
  ///
  /// Returns `true` if the bitmap changed, `false` if the block was
  /// already marked.
  ///
  /// # Errors
  ///
  /// - [`StateError::OutOfRange`] if the size is known and `id` is past
  ///   the last block.
  /// - [`StateError::FrontierViolation`] if the size is unknown and `id`
  ///   is beyond the frontier.
  pub fn mark_present(&mut self, id: u32) -> Result<bool, StateError> {
    let index = id as usize;
    if let Some(slot) = self.presence.get_mut(index) {
      let changed = !*slot;
      *slot = true;
      return Ok(changed);
    }

    match self.size {
      Some(_) => Err(StateError::OutOfRange {
        block_id: id,
        block_count: self.presence.len() as u64,
      }),
      None if index == self.presence.len() => {
        self.presence.push(true);
        Ok(true)
      }
      None => Err(StateError::FrontierViolation {
        block_id: id,
        frontier: self.presence.len(),
      }),
    }
  }

  /// Check that a block of `length` bytes at `id` fits this resource.
  ///
  /// Every block but the last must be exactly [`BLOCK_SIZE`]. For a known
  /// size the last block must end exactly at the size; for an unknown size
  /// the last observed slot may be short.
  ///
  /// # Errors
  ///
  /// - [`StateError::BlockOverflow`] if the block ends past a known size.
  /// - [`StateError::ShortBlock`] if the length breaks the layout.
  /// - [`StateError::OutOfRange`] if `id` has no slot.
  pub fn check_block(&self, id: u32, length: u32) -> Result<(), StateError> {
    let slots = self.presence.len();
    if id as usize >= slots {
      return Err(StateError::OutOfRange {
        block_id: id,
        block_count: slots as u64,
      });
    }

    let is_last = id as usize + 1 == slots;
    let end = sponge_wire::block_offset(id) + u64::from(length);
    match self.size {
      Some(size) if end > size => Err(StateError::BlockOverflow {
        block_id: id,
        end,
        size,
      }),
      Some(size) if is_last && end != size => Err(StateError::ShortBlock {
        block_id: id,
        length,
        expected: size - sponge_wire::block_offset(id),
      }),
      _ if !is_last && length != BLOCK_SIZE => Err(StateError::ShortBlock {
        block_id: id,
        length,
        expected: u64::from(BLOCK_SIZE),
      }),
      _ => Ok(()),
    }
  }

  /// Serialize to the version 1 state frame.
  ///
  /// # Errors
  ///
  /// [`StateError::Wire`] if the frame cannot express this state (more
  /// than 65 535 slots of an unknown-size resource).
  pub fn encode(&self) -> Result<Vec<u8>, StateError> {
    let frame = StateFrame {
      size: self.size,
      presence: self.presence.clone(),
    };
    Ok(frame.encode(BLOCK_SIZE)?)
  }

  /// Parse a version 1 state frame.
  ///
  /// # Errors
  ///
  /// - [`StateError::Wire`] for malformed bytes.
  /// - [`StateError::TooManyBlocks`] for a size that is not addressable.
  pub fn decode(bytes: &[u8]) -> Result<Self, StateError> {
    let StateFrame { size, presence } = StateFrame::decode(bytes, BLOCK_SIZE)?;
    if let Some(size) = size {
      Self::addressable_count(size)?;
    }
    Self::from_parts(size, presence)
  }
}
