use std::fmt;
use std::hash::Hash;

use crate::error::KeyError;

/// Initial buffer capacity when a key gives no size hint.
pub const DEFAULT_KEY_SIZE_HINT: usize = 32;

/// Identity of a resource.
///
/// The key's byte form is used in two places: on its own as the key of the
/// download-state collection, and with a 4-byte block id appended as the
/// key of the content collection. The serialization must therefore be
/// deterministic and injective; equal keys must produce equal bytes.
pub trait ResourceKey: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {
  /// Append this key's byte form to `out`.
  ///
  /// # Errors
  ///
  /// [`KeyError`] if the key cannot be represented.
  fn serialize_into(&self, out: &mut Vec<u8>) -> Result<(), KeyError>;

  /// Expected serialized length, used to pre-size buffers.
  fn size_hint(&self) -> Option<usize> {
    None
  }

  /// Serialize into a fresh buffer.
  ///
  /// # Errors
  ///
  /// Propagates [`ResourceKey::serialize_into`] failures.
  fn to_key_bytes(&self) -> Result<Vec<u8>, KeyError> {
    let mut out = Vec::with_capacity(self.size_hint().unwrap_or(DEFAULT_KEY_SIZE_HINT));
    self.serialize_into(&mut out)?;
    Ok(out)
  }
}

/// `u16 BE length | UTF-8 bytes`.
impl ResourceKey for String {
  fn serialize_into(&self, out: &mut Vec<u8>) -> Result<(), KeyError> {
    let len = u16::try_from(self.len()).map_err(|_| KeyError::TooLong {
      len: self.len(),
      limit: u16::MAX as usize,
    })?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(self.as_bytes());
    Ok(())
  }

  fn size_hint(&self) -> Option<usize> {
    Some(64)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn string_key_is_length_prefixed() {
    let bytes = "héllo".to_owned().to_key_bytes().unwrap();
    assert_eq!(bytes, b"\x00\x06h\xC3\xA9llo");
  }

  #[test]
  fn empty_string_key() {
    assert_eq!(String::new().to_key_bytes().unwrap(), vec![0, 0]);
  }

  #[test]
  fn string_keys_are_prefix_free() {
    let a = "ab".to_owned().to_key_bytes().unwrap();
    let b = "abc".to_owned().to_key_bytes().unwrap();
    assert!(!b.starts_with(&a));
  }

  #[test]
  fn overlong_string_key_is_refused() {
    let key = "x".repeat(70_000);
    assert!(matches!(
      key.to_key_bytes(),
      Err(KeyError::TooLong {
        len: 70_000,
        limit: 65_535
      })
    ));
  }

  #[test]
  fn serialize_into_appends() {
    let mut out = vec![0xFF];
    "a".to_owned().serialize_into(&mut out).unwrap();
    assert_eq!(out, vec![0xFF, 0x00, 0x01, b'a']);
  }
}
