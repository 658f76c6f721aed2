//! Logical and resolved entity addresses.

use crate::cipher::KeyCipher;
use crate::error::{CoreError, CoreResult};
use crate::types::TypeId;
use std::fmt;
use std::sync::Arc;

/// Separator between type name and id in a key's plaintext form.
///
/// Type names may never contain it.
pub const KEY_SEPARATOR: char = ':';

/// Longest accepted type name, in bytes.
pub const MAX_TYPE_NAME_LEN: usize = 128;

/// Checks that `name` can be used as a logical type name.
///
/// # Errors
///
/// Returns [`CoreError::InvalidArgument`] for empty or overlong names, names
/// containing [`KEY_SEPARATOR`], or control characters.
pub fn validate_type_name(name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::invalid_argument("type name must not be empty"));
    }
    if name.len() > MAX_TYPE_NAME_LEN {
        return Err(CoreError::invalid_argument(format!(
            "type name longer than {MAX_TYPE_NAME_LEN} bytes"
        )));
    }
    if name.contains(KEY_SEPARATOR) {
        return Err(CoreError::invalid_argument(format!(
            "type name {name:?} contains the separator {KEY_SEPARATOR:?}"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(CoreError::invalid_argument(format!(
            "type name {name:?} contains control characters"
        )));
    }
    Ok(())
}

/// Logical address of an entity: a type name plus a numeric id.
///
/// Outside the store a key is only ever seen in its rendered form (see
/// [`Key::render`]), which hides both parts.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    type_name: Arc<str>,
    id: u64,
}

impl Key {
    /// Creates a key after validating the type name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if the type name is invalid.
    pub fn new(type_name: &str, id: u64) -> CoreResult<Self> {
        validate_type_name(type_name)?;
        Ok(Self {
            type_name: Arc::from(type_name),
            id,
        })
    }

    /// Creates a key sharing an already validated type name.
    pub(crate) fn from_parts(type_name: Arc<str>, id: u64) -> Self {
        Self { type_name, id }
    }

    /// Returns the type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the numeric id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Renders the opaque external form.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn render(&self, cipher: &KeyCipher) -> CoreResult<String> {
        let plaintext = format!("{}{KEY_SEPARATOR}{}", self.type_name, self.id);
        cipher.seal(plaintext.as_bytes())
    }

    /// Parses a string produced by [`render`](Self::render).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidKey`] if the string cannot be decrypted or
    /// does not hold a `type:id` pair.
    pub fn parse(cipher: &KeyCipher, text: &str) -> CoreResult<Self> {
        let plaintext = cipher.open(text)?;
        let plaintext =
            String::from_utf8(plaintext).map_err(|_| CoreError::invalid_key("key is not UTF-8"))?;
        let (type_name, id) = plaintext
            .rsplit_once(KEY_SEPARATOR)
            .ok_or_else(|| CoreError::invalid_key("key has no separator"))?;
        let id = id
            .parse::<u64>()
            .map_err(|_| CoreError::invalid_key("key id is not numeric"))?;
        Self::new(type_name, id).map_err(|_| CoreError::invalid_key("key type name is invalid"))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({}{KEY_SEPARATOR}{})", self.type_name, self.id)
    }
}

/// Internal address: type tag plus a 128-bit id split into two halves.
///
/// The byte form sorts like the tuple `(type_id, hi, lo)`, so table scans
/// return records of one type in id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResolvedKey {
    /// Registry tag of the type.
    pub type_id: TypeId,
    /// High 64 bits of the id.
    pub hi: u64,
    /// Low 64 bits of the id.
    pub lo: u64,
}

impl ResolvedKey {
    /// Size of [`to_bytes`](Self::to_bytes) output.
    pub const ENCODED_LEN: usize = 20;

    /// Creates a resolved key for a 64-bit id.
    #[must_use]
    pub const fn new(type_id: TypeId, id: u64) -> Self {
        Self {
            type_id,
            hi: 0,
            lo: id,
        }
    }

    /// Returns the full 128-bit id.
    #[must_use]
    pub const fn id128(&self) -> u128 {
        ((self.hi as u128) << 64) | self.lo as u128
    }

    /// Returns the id if it fits in 64 bits.
    #[must_use]
    pub const fn id(&self) -> Option<u64> {
        if self.hi == 0 {
            Some(self.lo)
        } else {
            None
        }
    }

    /// Encodes as big-endian `type_id (4) | hi (8) | lo (8)`.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[..4].copy_from_slice(&self.type_id.as_u32().to_be_bytes());
        buf[4..12].copy_from_slice(&self.hi.to_be_bytes());
        buf[12..].copy_from_slice(&self.lo.to_be_bytes());
        buf
    }

    /// Decodes the form produced by [`to_bytes`](Self::to_bytes).
    ///
    /// Returns `None` if the slice has the wrong length.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return None;
        }
        let mut type_id = [0u8; 4];
        let mut hi = [0u8; 8];
        let mut lo = [0u8; 8];
        type_id.copy_from_slice(&bytes[..4]);
        hi.copy_from_slice(&bytes[4..12]);
        lo.copy_from_slice(&bytes[12..]);
        Some(Self {
            type_id: TypeId::new(u32::from_be_bytes(type_id)),
            hi: u64::from_be_bytes(hi),
            lo: u64::from_be_bytes(lo),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> KeyCipher {
        KeyCipher::from_passphrase("key tests").unwrap()
    }

    #[test]
    fn type_name_rules() {
        assert!(validate_type_name("orders").is_ok());
        assert!(validate_type_name("orders.partition").is_ok());
        assert!(validate_type_name("").is_err());
        assert!(validate_type_name("a:b").is_err());
        assert!(validate_type_name("tab\there").is_err());
        assert!(validate_type_name(&"x".repeat(MAX_TYPE_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn render_parse_restores_key() {
        let c = cipher();
        let key = Key::new("orders", 42).unwrap();
        let text = key.render(&c).unwrap();
        assert!(!text.contains("orders"));
        assert_eq!(Key::parse(&c, &text).unwrap(), key);
    }

    #[test]
    fn render_is_stable() {
        let c = cipher();
        let key = Key::new("orders", 7).unwrap();
        assert_eq!(key.render(&c).unwrap(), key.render(&c).unwrap());
    }

    #[test]
    fn parse_rejects_sealed_garbage() {
        let c = cipher();
        let no_separator = c.seal(b"orders").unwrap();
        assert!(matches!(
            Key::parse(&c, &no_separator),
            Err(CoreError::InvalidKey { .. })
        ));
        let bad_id = c.seal(b"orders:abc").unwrap();
        assert!(Key::parse(&c, &bad_id).is_err());
    }

    #[test]
    fn debug_shows_parts() {
        let key = Key::new("orders", 3).unwrap();
        assert_eq!(format!("{key:?}"), "Key(orders:3)");
    }

    #[test]
    fn resolved_bytes_sort_by_id() {
        let t = TypeId::new(3);
        let a = ResolvedKey::new(t, 9).to_bytes();
        let b = ResolvedKey::new(t, 10).to_bytes();
        let c = ResolvedKey::new(TypeId::new(4), 1).to_bytes();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn resolved_from_bytes() {
        let key = ResolvedKey {
            type_id: TypeId::new(1),
            hi: 2,
            lo: 3,
        };
        let decoded = ResolvedKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(decoded.id(), None);
        assert_eq!(decoded.id128(), (2u128 << 64) | 3);
        assert!(ResolvedKey::from_bytes(&[0u8; 3]).is_none());
    }

    #[test]
    fn resolved_equality_uses_all_fields() {
        let a = ResolvedKey::new(TypeId::new(1), 5);
        let b = ResolvedKey::new(TypeId::new(2), 5);
        assert_ne!(a, b);
        assert_eq!(a, ResolvedKey::new(TypeId::new(1), 5));
    }
}
