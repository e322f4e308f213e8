use crate::error::WireError;
use crate::layout::block_count;

/// Current persisted download state format version.
pub const STATE_FORMAT_VERSION: u8 = 1;

/// Size field value reserved for resources whose total size is unknown.
pub const UNKNOWN_SIZE: u64 = u64::MAX;

/// Maximum number of slots an unknown-size state can carry (16-bit count).
pub const MAX_UNKNOWN_SLOTS: usize = u16::MAX as usize;

const PRESENT: u8 = 0x01;
const ABSENT: u8 = 0x00;

/// State frame — the persisted form of a resource's download state.
///
/// ```text
/// ┌────────┬─────────┬──────────────────────────────────────────────┐
/// │ Offset │ Size    │ Description                                  │
/// ├────────┼─────────┼──────────────────────────────────────────────┤
/// │ 0x00   │ 1 byte  │ Format version (0x01)                        │
/// │ 0x01   │ 8 bytes │ Size, u64 BE (0xFFFF_FFFF_FFFF_FFFF=unknown) │
/// │ 0x09   │ 2 bytes │ Slot count, u16 BE (unknown size only)       │
/// │ ...    │ n bytes │ One presence flag per slot (0x00 / 0x01)     │
/// └────────┴─────────┴──────────────────────────────────────────────┘
/// ```
///
/// For a known size the slot count is not stored: it is always
/// `block_count(size, block_size)`.
///
/// The frame only checks what is needed to make the bytes unambiguous.
/// Semantic rules (frontier, completeness) belong to `DownloadState` in
/// `sponge-types`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateFrame {
    /// Total resource size, `None` when unknown.
    pub size: Option<u64>,

    /// One flag per block slot.
    pub presence: Vec<bool>,
}

impl StateFrame {
    /// Write this frame to the provided writer.
    ///
    /// # Returns
    ///
    /// Total number of bytes written.
    ///
    /// # Errors
    ///
    /// - [`WireError::ReservedSize`] if a known size equals [`UNKNOWN_SIZE`].
    /// - [`WireError::SlotCountMismatch`] if a known-size frame has the
    ///   wrong number of slots for `block_size`.
    /// - [`WireError::TooManySlots`] if an unknown-size frame has more than
    ///   [`MAX_UNKNOWN_SLOTS`] slots.
    /// - [`WireError::Io`] if the writer fails.
    pub fn write_to(
        &self,
        w: &mut impl std::io::Write,
        block_size: u32,
    ) -> Result<usize, WireError> {
        let mut bytes_written = 0;

        w.write_all(&[STATE_FORMAT_VERSION])?;
        bytes_written += 1;

        match self.size {
            Some(size) => {
                if size == UNKNOWN_SIZE {
                    return Err(WireError::ReservedSize { size });
                }
                let expected = block_count(Some(size), block_size);
                if self.presence.len() as u64 != expected {
                    return Err(WireError::SlotCountMismatch {
                        size,
                        actual: self.presence.len(),
                        expected,
                    });
                }
                w.write_all(&size.to_be_bytes())?;
                bytes_written += 8;
            }
            None => {
                let slots = u16::try_from(self.presence.len()).map_err(|_| {
                    WireError::TooManySlots {
                        slots: self.presence.len(),
                        limit: MAX_UNKNOWN_SLOTS,
                    }
                })?;
                w.write_all(&UNKNOWN_SIZE.to_be_bytes())?;
                w.write_all(&slots.to_be_bytes())?;
                bytes_written += 10;
            }
        }

        let flags: Vec<u8> = self
            .presence
            .iter()
            .map(|&present| if present { PRESENT } else { ABSENT })
            .collect();
        w.write_all(&flags)?;
        bytes_written += flags.len();

        Ok(bytes_written)
    }

    /// Encode this frame into a fresh buffer.
    ///
    /// # Errors
    ///
    /// Same as [`write_to`](Self::write_to).
    pub fn encode(&self, block_size: u32) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::with_capacity(11 + self.presence.len());
        self.write_to(&mut buf, block_size)?;
        Ok(buf)
    }

    /// Read a frame from the start of `buf`.
    ///
    /// # Returns
    ///
    /// `(frame, bytes_consumed)`. Bytes after the frame are left alone;
    /// use [`decode`](Self::decode) to reject them.
    ///
    /// # Errors
    ///
    /// - [`WireError::UnexpectedEof`] if the slice is too short, including
    ///   a known size whose implied slot count exceeds the input.
    /// - [`WireError::UnsupportedFormat`] on an unknown version byte.
    /// - [`WireError::InvalidPresenceFlag`] on a flag other than 0/1.
    pub fn read_from(buf: &[u8], block_size: u32) -> Result<(Self, usize), WireError> {
        let mut cursor = 0;

        // 1. Format version
        let version = *buf
            .get(cursor)
            .ok_or(WireError::UnexpectedEof { offset: cursor })?;
        if version != STATE_FORMAT_VERSION {
            return Err(WireError::UnsupportedFormat { version });
        }
        cursor += 1;

        // 2. Size
        let size_bytes: [u8; 8] = buf
            .get(cursor..cursor + 8)
            .and_then(|s| s.try_into().ok())
            .ok_or(WireError::UnexpectedEof { offset: buf.len() })?;
        let raw_size = u64::from_be_bytes(size_bytes);
        cursor += 8;

        // 3. Slot count, stored only for unknown sizes
        let (size, slots) = if raw_size == UNKNOWN_SIZE {
            let count_bytes: [u8; 2] = buf
                .get(cursor..cursor + 2)
                .and_then(|s| s.try_into().ok())
                .ok_or(WireError::UnexpectedEof { offset: buf.len() })?;
            cursor += 2;
            (None, u64::from(u16::from_be_bytes(count_bytes)))
        } else {
            (Some(raw_size), block_count(Some(raw_size), block_size))
        };

        // Check the remaining length before allocating anything sized by
        // the (untrusted) slot count.
        let remaining = (buf.len() - cursor) as u64;
        if remaining < slots {
            return Err(WireError::UnexpectedEof { offset: buf.len() });
        }
        #[allow(clippy::cast_possible_truncation)]
        let slots = slots as usize;

        // 4. Presence flags
        let mut presence = Vec::with_capacity(slots);
        for (i, &flag) in buf[cursor..cursor + slots].iter().enumerate() {
            match flag {
                PRESENT => presence.push(true),
                ABSENT => presence.push(false),
                value => {
                    return Err(WireError::InvalidPresenceFlag {
                        offset: cursor + i,
                        value,
                    });
                }
            }
        }
        cursor += slots;

        Ok((Self { size, presence }, cursor))
    }

    /// Decode a buffer that must contain exactly one frame.
    ///
    /// # Errors
    ///
    /// Everything [`read_from`](Self::read_from) reports, plus
    /// [`WireError::TrailingData`] if bytes follow the frame.
    pub fn decode(buf: &[u8], block_size: u32) -> Result<Self, WireError> {
        let (frame, consumed) = Self::read_from(buf, block_size)?;
        if consumed != buf.len() {
            return Err(WireError::TrailingData {
                extra_bytes: buf.len() - consumed,
            });
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::BLOCK_SIZE;

    fn encode(frame: &StateFrame) -> Vec<u8> {
        frame.encode(BLOCK_SIZE).unwrap()
    }

    #[test]
    fn known_size_layout() {
        let frame = StateFrame {
            size: Some(u64::from(BLOCK_SIZE) + 1),
            presence: vec![true, false],
        };
        let bytes = encode(&frame);
        assert_eq!(
            bytes,
            vec![0x01, 0, 0, 0, 0, 0, 0x10, 0, 0x01, 0x01, 0x00]
        );
    }

    #[test]
    fn unknown_size_layout() {
        let frame = StateFrame {
            size: None,
            presence: vec![true, true, false],
        };
        let bytes = encode(&frame);
        assert_eq!(
            bytes,
            vec![0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x03, 0x01, 0x01, 0x00]
        );
    }

    #[test]
    fn roundtrip_zero_size() {
        let frame = StateFrame {
            size: Some(0),
            presence: vec![],
        };
        let bytes = encode(&frame);
        assert_eq!(bytes.len(), 9);
        assert_eq!(StateFrame::decode(&bytes, BLOCK_SIZE).unwrap(), frame);
    }

    #[test]
    fn roundtrip_unknown_empty() {
        let frame = StateFrame {
            size: None,
            presence: vec![],
        };
        let bytes = encode(&frame);
        assert_eq!(bytes.len(), 11);
        assert_eq!(StateFrame::decode(&bytes, BLOCK_SIZE).unwrap(), frame);
    }

    #[test]
    fn roundtrip_many_slots_small_block_size() {
        let presence: Vec<bool> = (0..1000).map(|i| i % 3 == 0).collect();
        let frame = StateFrame {
            size: Some(4000),
            presence,
        };
        let bytes = frame.encode(4).unwrap();
        let (parsed, consumed) = StateFrame::read_from(&bytes, 4).unwrap();
        assert_eq!(parsed, frame);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn reject_unknown_version() {
        let mut bytes = encode(&StateFrame {
            size: Some(1),
            presence: vec![false],
        });
        bytes[0] = 0x02;
        let result = StateFrame::decode(&bytes, BLOCK_SIZE);
        assert!(matches!(
            result,
            Err(WireError::UnsupportedFormat { version: 2 })
        ));
    }

    #[test]
    fn reject_invalid_presence_flag() {
        let mut bytes = encode(&StateFrame {
            size: None,
            presence: vec![false, false],
        });
        bytes[12] = 0x07;
        let result = StateFrame::decode(&bytes, BLOCK_SIZE);
        assert!(matches!(
            result,
            Err(WireError::InvalidPresenceFlag {
                offset: 12,
                value: 0x07
            })
        ));
    }

    #[test]
    fn reject_trailing_data() {
        let mut bytes = encode(&StateFrame {
            size: Some(10),
            presence: vec![true],
        });
        bytes.extend_from_slice(&[0, 0]);
        let result = StateFrame::decode(&bytes, BLOCK_SIZE);
        assert!(matches!(
            result,
            Err(WireError::TrailingData { extra_bytes: 2 })
        ));
    }

    #[test]
    fn reject_truncated_flags() {
        let bytes = encode(&StateFrame {
            size: None,
            presence: vec![true; 5],
        });
        let result = StateFrame::decode(&bytes[..bytes.len() - 1], BLOCK_SIZE);
        assert!(matches!(result, Err(WireError::UnexpectedEof { .. })));
    }

    #[test]
    fn huge_declared_size_fails_without_allocating() {
        // Size implies ~17 trillion slots but the buffer holds none.
        let mut bytes = vec![STATE_FORMAT_VERSION];
        bytes.extend_from_slice(&(u64::MAX - 1).to_be_bytes());
        let result = StateFrame::decode(&bytes, 1);
        assert!(matches!(result, Err(WireError::UnexpectedEof { .. })));
    }

    #[test]
    fn reject_empty_input() {
        assert!(matches!(
            StateFrame::decode(&[], BLOCK_SIZE),
            Err(WireError::UnexpectedEof { offset: 0 })
        ));
    }

    #[test]
    fn refuse_to_encode_mismatched_slot_count() {
        let frame = StateFrame {
            size: Some(u64::from(BLOCK_SIZE) * 2),
            presence: vec![true],
        };
        let result = frame.encode(BLOCK_SIZE);
        assert!(matches!(
            result,
            Err(WireError::SlotCountMismatch {
                actual: 1,
                expected: 2,
                ..
            })
        ));
    }

    #[test]
    fn refuse_to_encode_too_many_unknown_slots() {
        let frame = StateFrame {
            size: None,
            presence: vec![false; MAX_UNKNOWN_SLOTS + 1],
        };
        assert!(matches!(
            frame.encode(BLOCK_SIZE),
            Err(WireError::TooManySlots { .. })
        ));
    }

    #[test]
    fn refuse_to_encode_reserved_size() {
        let frame = StateFrame {
            size: Some(UNKNOWN_SIZE),
            presence: vec![],
        };
        assert!(matches!(
            frame.encode(BLOCK_SIZE),
            Err(WireError::ReservedSize { .. })
        ));
    }
}
