//! Protected secret abstraction.
//!
//! This module provides:
//! - [`ProtectedSecret`] - The capability a [`CredentialIdentity`](crate::CredentialIdentity)
//!   reads its password from
//! - [`ProtectedString`] - An in-process implementation that keeps the secret masked
//!
//! # Example
//!
//! ```rust
//! use authident_core::{ProtectedSecret, ProtectedString};
//!
//! let secret = ProtectedString::from("s3cret!");
//! assert_eq!(secret.len(), 7);
//!
//! let mut buf = vec![0u16; secret.len()];
//! secret.copy_decrypted_into(&mut buf);
//! assert_eq!(String::from_utf16(&buf).unwrap(), "s3cret!");
//! ```

use rand::Rng;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::SecretError;

const KEY_UNITS: usize = 16;

/// A secret held in guarded form that can be decrypted into a caller buffer.
///
/// Lengths are counted in UTF-16 code units, the encoding the negotiation
/// record carries.
pub trait ProtectedSecret {
    /// Number of UTF-16 code units in the decrypted secret.
    fn len(&self) -> usize;

    /// Check whether the secret is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the decrypted secret into `buf`.
    ///
    /// `buf` must be exactly [`len()`](ProtectedSecret::len) units long.
    fn copy_decrypted_into(&self, buf: &mut [u16]);
}

/// A UTF-16 secret stored XOR-masked with a per-instance random key.
///
/// The masked units and the key are zeroized on drop. Debug and Display
/// implementations show `[REDACTED]`.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ProtectedString {
    masked: Vec<u16>,
    key: [u16; KEY_UNITS],
    #[zeroize(skip)]
    read_only: bool,
}

impl ProtectedString {
    /// Create an empty protected string.
    pub fn new() -> Self {
        let mut key = [0u16; KEY_UNITS];
        rand::thread_rng().fill(&mut key[..]);
        Self {
            masked: Vec::new(),
            key,
            read_only: false,
        }
    }

    /// Append a character.
    pub fn push(&mut self, ch: char) -> Result<(), SecretError> {
        self.ensure_writable()?;
        self.reserve_zeroizing(2);
        let mut units = [0u16; 2];
        for unit in ch.encode_utf16(&mut units).iter() {
            let mask = self.key[self.masked.len() % KEY_UNITS];
            self.masked.push(*unit ^ mask);
        }
        units.zeroize();
        Ok(())
    }

    /// Remove all characters.
    pub fn clear(&mut self) -> Result<(), SecretError> {
        self.ensure_writable()?;
        self.masked.zeroize();
        Ok(())
    }

    /// Freeze the contents; later mutation fails with [`SecretError::ReadOnly`].
    pub fn make_read_only(&mut self) {
        self.read_only = true;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn ensure_writable(&self) -> Result<(), SecretError> {
        if self.read_only {
            return Err(SecretError::ReadOnly);
        }
        Ok(())
    }

    /// Make room for `additional` units without leaving a stale copy behind.
    ///
    /// A plain `Vec` reallocation frees the old buffer as-is; here the old
    /// buffer is zeroized before it is dropped.
    fn reserve_zeroizing(&mut self, additional: usize) {
        let len = self.masked.len();
        if self.masked.capacity() - len >= additional {
            return;
        }
        let capacity = (len + additional).max(self.masked.capacity() * 2);
        let mut grown = Vec::with_capacity(capacity);
        grown.extend_from_slice(&self.masked);
        self.masked.zeroize();
        self.masked = grown;
    }

    fn extend_from_str(&mut self, value: &str) {
        // UTF-8 byte length bounds the UTF-16 unit count
        self.reserve_zeroizing(value.len());
        for unit in value.encode_utf16() {
            let mask = self.key[self.masked.len() % KEY_UNITS];
            self.masked.push(unit ^ mask);
        }
    }
}

impl ProtectedSecret for ProtectedString {
    fn len(&self) -> usize {
        self.masked.len()
    }

    fn copy_decrypted_into(&self, buf: &mut [u16]) {
        assert_eq!(
            buf.len(),
            self.masked.len(),
            "decryption buffer must match the secret length"
        );
        for (i, (dst, unit)) in buf.iter_mut().zip(&self.masked).enumerate() {
            *dst = unit ^ self.key[i % KEY_UNITS];
        }
    }
}

impl Default for ProtectedString {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ProtectedString {
    fn from(value: &str) -> Self {
        let mut secret = Self::new();
        secret.extend_from_str(value);
        secret
    }
}

impl From<String> for ProtectedString {
    /// The owned plaintext is zeroized once encoded.
    fn from(mut value: String) -> Self {
        let secret = Self::from(value.as_str());
        value.zeroize();
        secret
    }
}

impl std::fmt::Debug for ProtectedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ProtectedString([REDACTED])")
    }
}

impl std::fmt::Display for ProtectedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decrypt(secret: &ProtectedString) -> String {
        let mut buf = vec![0u16; secret.len()];
        secret.copy_decrypted_into(&mut buf);
        String::from_utf16(&buf).unwrap()
    }

    #[test]
    fn test_copy_decrypted_restores_value() {
        let secret = ProtectedString::from("correct horse battery staple");
        assert_eq!(decrypt(&secret), "correct horse battery staple");
    }

    #[test]
    fn test_len_counts_utf16_units() {
        assert_eq!(ProtectedString::from("s3cret!").len(), 7);
        // U+1F512 is a surrogate pair
        assert_eq!(ProtectedString::from("pw\u{1F512}").len(), 4);
        assert!(ProtectedString::new().is_empty());
    }

    #[test]
    fn test_push_builds_secret() {
        let mut secret = ProtectedString::new();
        for ch in "pä\u{1F512}".chars() {
            secret.push(ch).unwrap();
        }
        assert_eq!(secret.len(), 4);
        assert_eq!(decrypt(&secret), "pä\u{1F512}");
    }

    #[test]
    fn test_masked_storage_differs_from_plaintext() {
        // 64 units make an all-zero key (1 in 2^256) the only way to match
        let plain: String = "a".repeat(64);
        let secret = ProtectedString::from(plain.as_str());
        let units: Vec<u16> = plain.encode_utf16().collect();
        assert_ne!(secret.masked, units);
    }

    #[test]
    fn test_push_grows_without_in_place_reallocation() {
        let mut secret = ProtectedString::from("ab");
        let mut expected = String::from("ab");
        let mut capacity = secret.masked.capacity();

        for ch in "cdefghijklmnopqrstuvwxyz\u{1F512}0123456789".chars() {
            secret.push(ch).unwrap();
            expected.push(ch);
            // every push after growth still has room, and growth is geometric
            assert!(secret.masked.capacity() >= secret.masked.len());
            if secret.masked.capacity() != capacity {
                assert!(secret.masked.capacity() >= capacity * 2);
                capacity = secret.masked.capacity();
            }
        }
        assert_eq!(decrypt(&secret), expected);
    }

    #[test]
    fn test_reserve_zeroizing_keeps_contents() {
        let mut secret = ProtectedString::from("s3cret!");
        secret.reserve_zeroizing(1000);
        assert!(secret.masked.capacity() >= 1007);
        assert_eq!(decrypt(&secret), "s3cret!");

        // enough room already: no reallocation
        let before = secret.masked.as_ptr();
        secret.reserve_zeroizing(10);
        assert_eq!(secret.masked.as_ptr(), before);
    }

    #[test]
    fn test_read_only_rejects_mutation() {
        let mut secret = ProtectedString::from("abc");
        secret.make_read_only();
        assert!(secret.is_read_only());
        assert!(matches!(secret.push('d'), Err(SecretError::ReadOnly)));
        assert!(matches!(secret.clear(), Err(SecretError::ReadOnly)));
        assert_eq!(decrypt(&secret), "abc");
    }

    #[test]
    fn test_clear_empties_secret() {
        let mut secret = ProtectedString::from("abc");
        secret.clear().unwrap();
        assert!(secret.is_empty());
    }

    #[test]
    fn test_debug_and_display_redacted() {
        let secret = ProtectedString::from("super-secret");
        let debug = format!("{:?}", secret);
        let display = format!("{}", secret);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
        assert!(!display.contains("super-secret"));
        assert!(display.contains("REDACTED"));
    }
}
