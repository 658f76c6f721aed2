//! Reversible obfuscation of keys for external use.
//!
//! Keys leave the store as opaque strings rather than `type:id`
//! concatenations. The string is `base64url(nonce || AES-256-GCM(plaintext))`
//! where the nonce is a keyed HKDF-SHA256 digest of the plaintext. The
//! output is therefore deterministic: the same key always renders to the
//! same string, so rendered keys can be compared and used as row keys.

use crate::error::{CoreError, CoreResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

const DERIVATION_SALT: &[u8] = b"recordb-key-cipher";
const CIPHER_INFO: &[u8] = b"recordb-key-cipher-v1";
const NONCE_INFO: &[u8] = b"recordb-key-nonce-v1";

/// 256-bit secret, zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from exactly 32 raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for any other length.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CoreError::invalid_argument(format!(
                "encryption key must be {KEY_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { bytes: key })
    }

    /// Derives a key from input key material with HKDF-SHA256.
    ///
    /// HKDF is not a password hash; the passphrase is expected to carry
    /// enough entropy on its own.
    ///
    /// # Errors
    ///
    /// Returns an error if HKDF expansion fails.
    pub fn derive(ikm: &[u8], salt: &[u8], info: &[u8]) -> CoreResult<Self> {
        let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(info, &mut bytes)
            .map_err(|_| CoreError::key_derivation_failed("HKDF expand failed"))?;
        Ok(Self { bytes })
    }

    /// Returns the raw key bytes. Never log the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Deterministic authenticated cipher for key strings.
pub struct KeyCipher {
    cipher: Aes256Gcm,
    nonce_key: EncryptionKey,
}

impl KeyCipher {
    /// Creates a cipher from an encryption key and a separate nonce key.
    #[must_use]
    pub fn new(cipher_key: &EncryptionKey, nonce_key: EncryptionKey) -> Self {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(cipher_key.as_bytes()));
        Self { cipher, nonce_key }
    }

    /// Derives both keys from a passphrase.
    ///
    /// # Errors
    ///
    /// Returns an error if key derivation fails.
    pub fn from_passphrase(passphrase: &str) -> CoreResult<Self> {
        let cipher_key = EncryptionKey::derive(passphrase.as_bytes(), DERIVATION_SALT, CIPHER_INFO)?;
        let nonce_key = EncryptionKey::derive(passphrase.as_bytes(), DERIVATION_SALT, NONCE_INFO)?;
        Ok(Self::new(&cipher_key, nonce_key))
    }

    fn synthetic_nonce(&self, plaintext: &[u8]) -> CoreResult<[u8; NONCE_SIZE]> {
        let hk = Hkdf::<Sha256>::new(Some(self.nonce_key.as_bytes()), plaintext);
        let mut nonce = [0u8; NONCE_SIZE];
        hk.expand(NONCE_INFO, &mut nonce)
            .map_err(|_| CoreError::key_derivation_failed("nonce expansion failed"))?;
        Ok(nonce)
    }

    /// Encrypts `plaintext` into a URL-safe string.
    ///
    /// # Errors
    ///
    /// Returns an error if nonce derivation or encryption fails.
    pub fn seal(&self, plaintext: &[u8]) -> CoreResult<String> {
        let nonce_bytes = self.synthetic_nonce(plaintext)?;
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| CoreError::encryption_failed("key encryption error"))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend(ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Decrypts a string produced by [`seal`](Self::seal).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidKey`] for malformed, truncated, tampered or
    /// foreign strings.
    pub fn open(&self, text: &str) -> CoreResult<Vec<u8>> {
        let sealed = URL_SAFE_NO_PAD
            .decode(text)
            .map_err(|_| CoreError::invalid_key("not a base64url string"))?;
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CoreError::invalid_key("key string too short"));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CoreError::invalid_key("key string failed authentication"))?;

        // A valid tag over a non-synthetic nonce means the string was not sealed by us.
        if self.synthetic_nonce(&plaintext)? != nonce {
            return Err(CoreError::invalid_key("key string nonce mismatch"));
        }
        Ok(plaintext)
    }
}

impl std::fmt::Debug for KeyCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> KeyCipher {
        KeyCipher::from_passphrase("test passphrase").unwrap()
    }

    #[test]
    fn seal_open_restores_plaintext() {
        let c = cipher();
        let sealed = c.seal(b"orders:42").unwrap();
        assert_eq!(c.open(&sealed).unwrap(), b"orders:42");
    }

    #[test]
    fn seal_is_deterministic_and_opaque() {
        let c = cipher();
        let a = c.seal(b"orders:42").unwrap();
        assert_eq!(a, c.seal(b"orders:42").unwrap());
        assert_ne!(a, c.seal(b"orders:43").unwrap());
        assert!(!a.contains("orders"));
    }

    #[test]
    fn tampered_string_is_rejected() {
        let c = cipher();
        let mut sealed = c.seal(b"orders:42").unwrap().into_bytes();
        let last = sealed.len() - 1;
        sealed[last] = if sealed[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(sealed).unwrap();
        assert!(matches!(c.open(&tampered), Err(CoreError::InvalidKey { .. })));
    }

    #[test]
    fn foreign_passphrase_is_rejected() {
        let sealed = cipher().seal(b"orders:42").unwrap();
        let other = KeyCipher::from_passphrase("another").unwrap();
        assert!(other.open(&sealed).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        let c = cipher();
        assert!(c.open("not base64 !!").is_err());
        assert!(c.open("AAAA").is_err());
    }

    #[test]
    fn key_from_bytes_checks_length() {
        assert!(EncryptionKey::from_bytes(&[0u8; KEY_SIZE]).is_ok());
        assert!(EncryptionKey::from_bytes(&[0u8; 16]).is_err());
        assert_ne!(
            EncryptionKey::generate().as_bytes(),
            EncryptionKey::generate().as_bytes()
        );
    }

    #[test]
    fn debug_redacts() {
        let key = EncryptionKey::generate();
        assert!(format!("{key:?}").contains("REDACTED"));
    }
}
