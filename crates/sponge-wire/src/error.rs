/// Errors raised while reading or writing the persisted byte layouts.
///
/// Every variant that can be triggered by untrusted input carries the
/// byte offset at which parsing failed, so a corrupted state blob or
/// snapshot file can be located with a hex dump.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Input ended before a complete frame, header, or record could be read.
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },

    /// The state frame carries a format version this build does not know.
    #[error("unsupported download state format version {version}")]
    UnsupportedFormat { version: u8 },

    /// A presence flag byte was neither 0x00 nor 0x01.
    #[error("invalid presence flag {value:#04X} at offset {offset}")]
    InvalidPresenceFlag { offset: usize, value: u8 },

    /// Bytes remained after a complete state frame.
    #[error("unexpected {extra_bytes} trailing bytes after state frame")]
    TrailingData { extra_bytes: usize },

    /// An unknown-size state has more slots than the 16-bit count can hold.
    #[error("unknown-size state has {slots} slots, limit is {limit}")]
    TooManySlots { slots: usize, limit: usize },

    /// A known-size state was asked to encode a slot count that does not
    /// match its size.
    #[error("state with size {size} has {actual} slots, expected {expected}")]
    SlotCountMismatch {
        size: u64,
        actual: usize,
        expected: u64,
    },

    /// The known size collides with the value reserved for "unknown".
    #[error("size {size:#X} is reserved for unknown-size resources")]
    ReservedSize { size: u64 },

    /// Magic number did not match "SPG\0".
    #[error("invalid snapshot magic: expected 0x53504700, got {found:#010X}")]
    InvalidMagic { found: u32 },

    /// Unsupported snapshot version.
    #[error("unsupported snapshot version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    /// Reserved field was non-zero.
    #[error("reserved field at offset {offset} was {value:#04X}, expected 0x00")]
    ReservedNonZero { offset: usize, value: u8 },

    /// A snapshot record field is longer than its length prefix can express.
    #[error("snapshot field `{field}` is {len} bytes, limit is {limit}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        limit: usize,
    },

    /// A collection name in a snapshot record is not valid UTF-8.
    #[error("snapshot collection name at offset {offset} is not valid UTF-8")]
    InvalidCollectionName { offset: usize },

    /// I/O error during read or write.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
