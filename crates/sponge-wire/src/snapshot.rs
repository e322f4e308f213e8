use crate::error::WireError;

/// Magic number: ASCII "SPG\0".
/// Written as raw bytes, not as a u32, so byte order doesn't matter.
pub const SNAPSHOT_MAGIC: [u8; 4] = [0x53, 0x50, 0x47, 0x00];

/// Total header size in bytes (fixed).
pub const HEADER_SIZE: usize = 8;

/// Current snapshot version major.
pub const VERSION_MAJOR: u8 = 1;

/// Current snapshot version minor.
pub const VERSION_MINOR: u8 = 0;

/// Snapshot file header — the first 8 bytes of a persisted engine image.
///
/// ```text
/// ┌────────┬─────────┬──────────────────────────────────┐
/// │ Offset │ Size    │ Description                      │
/// ├────────┼─────────┼──────────────────────────────────┤
/// │ 0x00   │ 4 bytes │ Magic: "SPG\0" (0x53504700)      │
/// │ 0x04   │ 1 byte  │ Version major                    │
/// │ 0x05   │ 1 byte  │ Version minor                    │
/// │ 0x06   │ 1 byte  │ Flags (none defined, 0x00)       │
/// │ 0x07   │ 1 byte  │ Reserved (0x00)                  │
/// └────────┴─────────┴──────────────────────────────────┘
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub version_major: u8,
    pub version_minor: u8,
}

impl Default for SnapshotHeader {
    fn default() -> Self {
        Self {
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
        }
    }
}

impl SnapshotHeader {
    /// Write the 8-byte header into the provided buffer.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::UnexpectedEof`] if `buf` is shorter than
    /// [`HEADER_SIZE`] (8 bytes).
    pub fn write_to(&self, buf: &mut [u8]) -> Result<(), WireError> {
        if buf.len() < HEADER_SIZE {
            return Err(WireError::UnexpectedEof { offset: buf.len() });
        }

        buf[0..4].copy_from_slice(&SNAPSHOT_MAGIC);
        buf[4] = self.version_major;
        buf[5] = self.version_minor;
        buf[6] = 0x00; // flags
        buf[7] = 0x00; // reserved

        Ok(())
    }

    /// Parse a header from the first 8 bytes of the provided buffer.
    ///
    /// # Errors
    ///
    /// - [`WireError::UnexpectedEof`] if buffer is too short.
    /// - [`WireError::InvalidMagic`] if the magic number doesn't match.
    /// - [`WireError::UnsupportedVersion`] if the major version is unknown.
    /// - [`WireError::ReservedNonZero`] if the flags or reserved byte is set.
    pub fn read_from(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < HEADER_SIZE {
            return Err(WireError::UnexpectedEof { offset: buf.len() });
        }

        if buf[0..4] != SNAPSHOT_MAGIC {
            let found = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
            return Err(WireError::InvalidMagic { found });
        }

        let version_major = buf[4];
        let version_minor = buf[5];
        if version_major != VERSION_MAJOR {
            return Err(WireError::UnsupportedVersion {
                major: version_major,
                minor: version_minor,
            });
        }

        for offset in [6, 7] {
            if buf[offset] != 0x00 {
                return Err(WireError::ReservedNonZero {
                    offset,
                    value: buf[offset],
                });
            }
        }

        Ok(Self {
            version_major,
            version_minor,
        })
    }
}

/// One key/value pair of one named collection.
///
/// ```text
/// ┌──────────────────────────────────────────┐
/// │ name_len   (u8)                          │
/// │ name       [name_len bytes, UTF-8]       │
/// │ key_len    (u32 BE)                      │
/// │ key        [key_len bytes]               │
/// │ value_len  (u32 BE)                      │
/// │ value      [value_len bytes]             │
/// └──────────────────────────────────────────┘
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub collection: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl SnapshotRecord {
    /// Write this record to the provided writer.
    ///
    /// # Returns
    ///
    /// Total number of bytes written.
    ///
    /// # Errors
    ///
    /// - [`WireError::FieldTooLong`] if the name exceeds 255 bytes or the
    ///   key or value exceeds `u32::MAX` bytes.
    /// - [`WireError::Io`] if the writer fails.
    pub fn write_to(&self, w: &mut impl std::io::Write) -> Result<usize, WireError> {
        let name_len = u8::try_from(self.collection.len()).map_err(|_| WireError::FieldTooLong {
            field: "collection",
            len: self.collection.len(),
            limit: u8::MAX as usize,
        })?;
        w.write_all(&[name_len])?;
        w.write_all(self.collection.as_bytes())?;

        let mut bytes_written = 1 + self.collection.len();
        for (field, bytes) in [("key", &self.key), ("value", &self.value)] {
            let len = u32::try_from(bytes.len()).map_err(|_| WireError::FieldTooLong {
                field,
                len: bytes.len(),
                limit: u32::MAX as usize,
            })?;
            w.write_all(&len.to_be_bytes())?;
            w.write_all(bytes)?;
            bytes_written += 4 + bytes.len();
        }

        Ok(bytes_written)
    }

    /// Read a record from the provided byte slice.
    ///
    /// # Returns
    ///
    /// `Some((record, bytes_consumed))`, or `None` if `buf` is empty
    /// (a clean end of the record stream).
    ///
    /// # Errors
    ///
    /// - [`WireError::UnexpectedEof`] if a record is cut short.
    /// - [`WireError::InvalidCollectionName`] if the name is not UTF-8.
    pub fn read_from(buf: &[u8]) -> Result<Option<(Self, usize)>, WireError> {
        let Some(&name_len) = buf.first() else {
            return Ok(None);
        };
        let mut cursor = 1;

        let name_end = cursor + usize::from(name_len);
        let name = buf
            .get(cursor..name_end)
            .ok_or(WireError::UnexpectedEof { offset: buf.len() })?;
        let collection = std::str::from_utf8(name)
            .map_err(|_| WireError::InvalidCollectionName { offset: cursor })?
            .to_owned();
        cursor = name_end;

        let (key, n) = read_len_prefixed(buf, cursor)?;
        cursor += n;
        let (value, n) = read_len_prefixed(buf, cursor)?;
        cursor += n;

        Ok(Some((
            Self {
                collection,
                key,
                value,
            },
            cursor,
        )))
    }
}

/// Read a `u32 BE` length followed by that many bytes, starting at `start`.
fn read_len_prefixed(buf: &[u8], start: usize) -> Result<(Vec<u8>, usize), WireError> {
    let len_bytes: [u8; 4] = buf
        .get(start..start + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or(WireError::UnexpectedEof { offset: buf.len() })?;
    let len = u32::from_be_bytes(len_bytes) as usize;

    let body_start = start + 4;
    let body_end = body_start
        .checked_add(len)
        .ok_or(WireError::UnexpectedEof { offset: buf.len() })?;
    let body = buf
        .get(body_start..body_end)
        .ok_or(WireError::UnexpectedEof { offset: buf.len() })?;

    Ok((body.to_vec(), 4 + len))
}

/// Encode a complete snapshot: header followed by every record.
///
/// # Errors
///
/// Propagates [`SnapshotRecord::write_to`] failures.
pub fn encode_snapshot<'a>(
    records: impl IntoIterator<Item = &'a SnapshotRecord>,
) -> Result<Vec<u8>, WireError> {
    let mut out = vec![0u8; HEADER_SIZE];
    SnapshotHeader::default().write_to(&mut out)?;
    for record in records {
        record.write_to(&mut out)?;
    }
    Ok(out)
}

/// Decode a complete snapshot produced by [`encode_snapshot`].
///
/// # Errors
///
/// Header validation errors from [`SnapshotHeader::read_from`] and
/// record framing errors from [`SnapshotRecord::read_from`].
pub fn decode_snapshot(buf: &[u8]) -> Result<Vec<SnapshotRecord>, WireError> {
    SnapshotHeader::read_from(buf)?;
    let mut cursor = HEADER_SIZE;
    let mut records = Vec::new();
    while let Some((record, consumed)) = SnapshotRecord::read_from(&buf[cursor..])? {
        records.push(record);
        cursor += consumed;
    }
    Ok(records)
}
