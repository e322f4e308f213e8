/// Size of every block except possibly the last one of a resource: 1 MiB.
///
/// This is a deployment-time constant. Caches written with a different
/// block size are not readable by this build: both the presence bitmap
/// length and the content keys depend on it.
pub const BLOCK_SIZE: u32 = 1024 * 1024;

/// Number of bytes appended to a serialized resource key to form a
/// content key.
pub const BLOCK_ID_SIZE: usize = 4;

/// Number of blocks needed to hold `size` bytes.
///
/// Returns `ceil(size / block_size)` for a known size and `0` for an
/// unknown one (the slot count of an unknown-size resource is tracked by
/// its presence bitmap, not derived).
///
/// # Panics
///
/// Panics if `block_size` is zero.
#[must_use]
pub fn block_count(size: Option<u64>, block_size: u32) -> u64 {
    assert!(block_size > 0, "block size must be non-zero");
    match size {
        Some(size) => size.div_ceil(u64::from(block_size)),
        None => 0,
    }
}

/// Byte offset of the first byte of block `id`.
#[must_use]
pub fn block_offset(id: u32) -> u64 {
    u64::from(id) * u64::from(BLOCK_SIZE)
}

/// Build the content-collection key for block `id` of a resource.
///
/// ```text
/// ┌──────────────────────────────┬──────────────────────┐
/// │ serialized resource key      │ block id (u32, BE)   │
/// └──────────────────────────────┴──────────────────────┘
/// ```
///
/// Big-endian ids keep all blocks of one resource adjacent and in
/// ascending order inside an ordered key/value engine.
#[must_use]
pub fn content_key(resource_key: &[u8], id: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(resource_key.len() + BLOCK_ID_SIZE);
    key.extend_from_slice(resource_key);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Split a content key back into the resource key bytes and block id.
///
/// Returns `None` if `key` is shorter than the 4-byte id suffix.
#[must_use]
pub fn split_content_key(key: &[u8]) -> Option<(&[u8], u32)> {
    let split = key.len().checked_sub(BLOCK_ID_SIZE)?;
    let (resource, id) = key.split_at(split);
    let id = u32::from_be_bytes([id[0], id[1], id[2], id[3]]);
    Some((resource, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn block_count_rounds_up() {
        assert_eq!(block_count(Some(0), BLOCK_SIZE), 0);
        assert_eq!(block_count(Some(1), BLOCK_SIZE), 1);
        assert_eq!(block_count(Some(MIB), BLOCK_SIZE), 1);
        assert_eq!(block_count(Some(MIB + 1), BLOCK_SIZE), 2);
        assert_eq!(block_count(Some(3 * MIB / 2), BLOCK_SIZE), 2);
        assert_eq!(block_count(Some(10), 4), 3);
    }

    #[test]
    fn block_count_of_unknown_size_is_zero() {
        assert_eq!(block_count(None, BLOCK_SIZE), 0);
        assert_eq!(block_count(None, 1), 0);
    }

    #[test]
    fn block_count_near_u64_max_does_not_overflow() {
        assert_eq!(block_count(Some(u64::MAX - 1), 1), u64::MAX - 1);
        assert_eq!(block_count(Some(u64::MAX - 1), 2), u64::MAX / 2);
    }

    #[test]
    fn block_offset_is_id_times_block_size() {
        assert_eq!(block_offset(0), 0);
        assert_eq!(block_offset(1), MIB);
        assert_eq!(block_offset(u32::MAX), u64::from(u32::MAX) * MIB);
    }

    #[test]
    fn content_key_appends_big_endian_id() {
        let key = content_key(b"abc", 0x0102_0304);
        assert_eq!(key, b"abc\x01\x02\x03\x04");
    }

    #[test]
    fn content_keys_of_one_resource_sort_by_block_id() {
        let mut keys: Vec<_> = [300u32, 2, 70_000, 0]
            .iter()
            .map(|&id| content_key(b"res", id))
            .collect();
        keys.sort();
        let ids: Vec<_> = keys
            .iter()
            .map(|k| split_content_key(k).unwrap().1)
            .collect();
        assert_eq!(ids, vec![0, 2, 300, 70_000]);
    }

    #[test]
    fn split_content_key_roundtrip() {
        let key = content_key(b"resource", 42);
        assert_eq!(split_content_key(&key), Some((&b"resource"[..], 42)));
        assert_eq!(split_content_key(b"abc"), None);
    }
}
