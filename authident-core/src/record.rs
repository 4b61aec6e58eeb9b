//! Fixed-layout record handed to the native negotiation API.
//!
//! [`AuthIdentityRecord`] mirrors `SEC_WINNT_AUTH_IDENTITY_W`. Field order and
//! sizes are an ABI contract:
//!
//! | Field | Type | Offset (64-bit) |
//! |---|---|---|
//! | `user` | `*const u16` | 0 |
//! | `user_length` | `i32` | 8 |
//! | `domain` | `*const u16` | 16 |
//! | `domain_length` | `i32` | 24 |
//! | `password` | `*const u16` | 32 |
//! | `password_length` | `i32` | 40 |
//! | `flags` | `u32` | 44 |
//!
//! Total size is 48 bytes on 64-bit targets and 28 bytes on 32-bit targets.
//! Lengths count UTF-16 code units and exclude the NUL terminator.

use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::ptr;

use serde::{Deserialize, Serialize};

/// Character encoding marker carried in the record's `flags` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum AuthIdentityFlags {
    /// Strings are UTF-16 (`SEC_WINNT_AUTH_IDENTITY_UNICODE`).
    Unicode = 0x2,
}

impl AuthIdentityFlags {
    /// Raw value as it appears in the record.
    pub fn bits(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for AuthIdentityFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthIdentityFlags::Unicode => write!(f, "unicode"),
        }
    }
}

/// Borrowed view of a [`CredentialIdentity`](crate::CredentialIdentity) in the
/// native record layout.
///
/// The record is valid for one negotiation call; it borrows the identity and
/// must not outlive it. It is neither `Send` nor `Sync`.
#[repr(C)]
pub struct AuthIdentityRecord<'a> {
    user: *const u16,
    user_length: i32,
    domain: *const u16,
    domain_length: i32,
    password: *const u16,
    password_length: i32,
    flags: AuthIdentityFlags,
    _identity: PhantomData<&'a ()>,
}

impl<'a> AuthIdentityRecord<'a> {
    pub(crate) fn new(
        user: Option<&'a [u16]>,
        user_length: i32,
        password: *const u16,
        password_length: i32,
        flags: AuthIdentityFlags,
    ) -> Self {
        Self {
            user: user.map_or(ptr::null(), <[u16]>::as_ptr),
            user_length,
            domain: ptr::null(),
            domain_length: 0,
            password,
            password_length,
            flags,
            _identity: PhantomData,
        }
    }

    /// Pointer to pass as the native call's auth-data argument.
    pub fn as_ptr(&self) -> *const c_void {
        (self as *const Self).cast()
    }

    /// NUL-terminated UTF-16 username, or null.
    pub fn user(&self) -> *const u16 {
        self.user
    }

    pub fn user_length(&self) -> i32 {
        self.user_length
    }

    /// Always null; reserved for a domain-qualified credential form.
    pub fn domain(&self) -> *const u16 {
        self.domain
    }

    pub fn domain_length(&self) -> i32 {
        self.domain_length
    }

    /// NUL-terminated UTF-16 password in secure memory, or null.
    pub fn password(&self) -> *const u16 {
        self.password
    }

    pub fn password_length(&self) -> i32 {
        self.password_length
    }

    pub fn flags(&self) -> AuthIdentityFlags {
        self.flags
    }
}

impl fmt::Debug for AuthIdentityRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthIdentityRecord")
            .field("user_length", &self.user_length)
            .field("domain_length", &self.domain_length)
            .field("password", &"[REDACTED]")
            .field("password_length", &self.password_length)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Offset and size of one record field, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldLayout {
    pub name: &'static str,
    pub offset: usize,
    pub size: usize,
}

/// Describe the in-memory layout of [`AuthIdentityRecord`] on this target.
pub fn record_layout() -> Vec<FieldLayout> {
    use std::mem::{offset_of, size_of};

    macro_rules! field {
        ($name:ident, $ty:ty) => {
            FieldLayout {
                name: stringify!($name),
                offset: offset_of!(AuthIdentityRecord<'static>, $name),
                size: size_of::<$ty>(),
            }
        };
    }

    vec![
        field!(user, *const u16),
        field!(user_length, i32),
        field!(domain, *const u16),
        field!(domain_length, i32),
        field!(password, *const u16),
        field!(password_length, i32),
        field!(flags, AuthIdentityFlags),
    ]
}

/// Total size of [`AuthIdentityRecord`] on this target.
pub fn record_size() -> usize {
    std::mem::size_of::<AuthIdentityRecord<'static>>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unicode_flag_value() {
        assert_eq!(AuthIdentityFlags::Unicode.bits(), 0x2);
        assert_eq!(std::mem::size_of::<AuthIdentityFlags>(), 4);
    }

    #[test]
    fn test_field_order_is_fixed() {
        let names: Vec<_> = record_layout().iter().map(|f| f.name).collect();
        assert_eq!(
            names,
            vec![
                "user",
                "user_length",
                "domain",
                "domain_length",
                "password",
                "password_length",
                "flags",
            ]
        );

        let offsets: Vec<_> = record_layout().iter().map(|f| f.offset).collect();
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_layout_64bit() {
        let offsets: Vec<_> = record_layout().iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 8, 16, 24, 32, 40, 44]);
        assert_eq!(record_size(), 48);
    }

    #[cfg(target_pointer_width = "32")]
    #[test]
    fn test_layout_32bit() {
        let offsets: Vec<_> = record_layout().iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8, 12, 16, 20, 24]);
        assert_eq!(record_size(), 28);
    }

    #[test]
    fn test_empty_record_has_null_pointers() {
        let record = AuthIdentityRecord::new(None, 0, ptr::null(), 0, AuthIdentityFlags::Unicode);
        assert!(record.user().is_null());
        assert!(record.domain().is_null());
        assert!(record.password().is_null());
        assert_eq!(record.as_ptr(), (&record as *const AuthIdentityRecord<'_>).cast());
    }
}
