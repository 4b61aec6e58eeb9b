//! Credential identity with a secret held in secure memory.
//!
//! A [`CredentialIdentity`] is built once per authentication attempt, lent to
//! the negotiation engine as an [`AuthIdentityRecord`], and released exactly
//! once. Release zeroes the secret block before freeing it. Dropping an
//! unreleased identity releases it; an explicit [`release`](CredentialIdentity::release)
//! followed by drop frees the block only once.
//!
//! Records are lent through a [`RecordGuard`]. While any guard is alive,
//! [`release`](CredentialIdentity::release) refuses with
//! [`IdentityError::OnLoan`], so a record never points at freed memory.

use std::ops::Deref;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};
use zeroize::Zeroize;

use crate::error::IdentityError;
use crate::memory::{LockedHeap, SecureMemory};
use crate::record::{AuthIdentityFlags, AuthIdentityRecord};
use crate::secret::ProtectedSecret;

/// Released flag in the state word; the remaining bits count records on loan.
const RELEASED: usize = 1 << (usize::BITS - 1);

/// A principal name and password packaged for an SSPI-style negotiation call.
///
/// # Example
///
/// ```rust
/// use authident_core::{CredentialIdentity, ProtectedString};
///
/// let password = ProtectedString::from("s3cret!");
/// let identity = CredentialIdentity::new(Some("alice"), Some(&password))?;
///
/// let record = identity.record()?;
/// assert_eq!(record.user_length(), 5);
/// assert_eq!(record.password_length(), 7);
/// drop(record);
///
/// identity.release()?;
/// assert!(identity.is_released());
/// # Ok::<(), authident_core::IdentityError>(())
/// ```
pub struct CredentialIdentity<M: SecureMemory = LockedHeap> {
    /// NUL-terminated UTF-16 username.
    username: Option<Box<[u16]>>,
    username_len: i32,
    secret: AtomicPtr<u16>,
    secret_len: i32,
    /// Units allocated for the secret, terminator included.
    secret_units: usize,
    state: AtomicUsize,
    flags: AuthIdentityFlags,
    memory: M,
}

impl CredentialIdentity<LockedHeap> {
    /// Build an identity whose secret lives in a page-locked heap block.
    pub fn new(
        username: Option<&str>,
        secret: Option<&dyn ProtectedSecret>,
    ) -> Result<Self, IdentityError> {
        Self::with_memory(username, secret, LockedHeap::new())
    }
}

impl<M: SecureMemory> CredentialIdentity<M> {
    /// Build an identity whose secret is allocated from `memory`.
    ///
    /// An absent or empty username is stored as no username. An absent or
    /// empty secret is stored as a null pointer without touching `memory`.
    /// The secret is decrypted once into the new block; `secret` itself is
    /// only borrowed.
    pub fn with_memory(
        username: Option<&str>,
        secret: Option<&dyn ProtectedSecret>,
        memory: M,
    ) -> Result<Self, IdentityError> {
        let username = username.filter(|name| !name.is_empty()).map(|name| {
            name.encode_utf16()
                .chain(std::iter::once(0))
                .collect::<Box<[u16]>>()
        });
        let username_units = username.as_ref().map_or(0, |name| name.len() - 1);
        let username_len = record_length("username", username_units)?;

        let secret = secret.filter(|s| !s.is_empty());
        let secret_units = secret.map_or(0, |s| s.len());
        let secret_len = record_length("secret", secret_units)?;

        let block = match secret {
            Some(_) => memory
                .allocate(secret_units + 1)
                .map_err(IdentityError::Allocation)?
                .as_ptr(),
            None => ptr::null_mut(),
        };

        // The identity owns the block before the copy, so a panicking
        // secret still has the block zeroed and freed by Drop.
        let identity = Self {
            username,
            username_len,
            secret: AtomicPtr::new(block),
            secret_len,
            secret_units: if block.is_null() { 0 } else { secret_units + 1 },
            state: AtomicUsize::new(0),
            flags: AuthIdentityFlags::Unicode,
            memory,
        };

        if let Some(secret) = secret {
            // SAFETY: allocate returned at least secret_units + 1 writable, zeroed units
            let buf = unsafe { std::slice::from_raw_parts_mut(block, secret_units) };
            secret.copy_decrypted_into(buf);
        }

        debug!(username_len, secret_len, "Constructed credential identity");
        Ok(identity)
    }

    /// Zero and free the secret block.
    ///
    /// Idempotent: only the first call (explicit or via drop) does any work;
    /// later calls return `Ok(())`. The block is zeroed even when freeing it
    /// fails, in which case [`IdentityError::Release`] is returned.
    ///
    /// While a [`RecordGuard`] is alive this fails with
    /// [`IdentityError::OnLoan`] and the identity stays active.
    pub fn release(&self) -> Result<(), IdentityError> {
        match self
            .state
            .compare_exchange(0, RELEASED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => self.zero_and_free(),
            Err(state) if state & RELEASED != 0 => {
                trace!("Credential identity already released");
                Ok(())
            }
            Err(loans) => Err(IdentityError::OnLoan { loans }),
        }
    }

    /// Caller must have set the released flag.
    fn zero_and_free(&self) -> Result<(), IdentityError> {
        let Some(block) = NonNull::new(self.secret.swap(ptr::null_mut(), Ordering::AcqRel)) else {
            trace!("Credential identity released without a secret");
            return Ok(());
        };

        // SAFETY: the released flag guarantees this thread alone owns the block
        let units = unsafe { std::slice::from_raw_parts_mut(block.as_ptr(), self.secret_units) };
        units.zeroize();

        // SAFETY: block came from self.memory with secret_units and is now unreachable
        unsafe { self.memory.free(block, self.secret_units) }.map_err(IdentityError::Release)?;

        debug!("Released credential identity");
        Ok(())
    }

    pub fn is_released(&self) -> bool {
        self.state.load(Ordering::Acquire) & RELEASED != 0
    }

    /// Number of records currently on loan.
    pub fn loans(&self) -> usize {
        self.state.load(Ordering::Acquire) & !RELEASED
    }

    /// Username in UTF-16, without the terminator.
    pub fn username(&self) -> Option<&[u16]> {
        self.username.as_deref().map(|name| &name[..name.len() - 1])
    }

    pub fn username_len(&self) -> i32 {
        self.username_len
    }

    /// Always `None`; the domain field is reserved.
    pub fn domain(&self) -> Option<&[u16]> {
        None
    }

    pub fn domain_len(&self) -> i32 {
        0
    }

    /// Pointer to the NUL-terminated secret, `None` when no secret was given.
    ///
    /// Fails with [`IdentityError::Released`] once the identity is released.
    pub fn secret_ptr(&self) -> Result<Option<NonNull<u16>>, IdentityError> {
        if self.is_released() {
            return Err(IdentityError::Released);
        }
        Ok(NonNull::new(self.secret.load(Ordering::Acquire)))
    }

    /// Secret length in UTF-16 code units; 0 without a secret or after release.
    pub fn secret_len(&self) -> i32 {
        if self.is_released() { 0 } else { self.secret_len }
    }

    pub fn flags(&self) -> AuthIdentityFlags {
        self.flags
    }

    /// Lend the identity in the native record layout.
    ///
    /// The identity cannot be released until the guard is dropped. Fails with
    /// [`IdentityError::Released`] after release.
    pub fn record(&self) -> Result<RecordGuard<'_>, IdentityError> {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                (state & RELEASED == 0).then_some(state + 1)
            })
            .map_err(|_| IdentityError::Released)?;

        let password = self.secret.load(Ordering::Acquire).cast_const();
        Ok(RecordGuard {
            record: AuthIdentityRecord::new(
                self.username.as_deref(),
                self.username_len,
                password,
                self.secret_len,
                self.flags,
            ),
            loans: &self.state,
        })
    }

    /// Lengths and state, without any secret material.
    pub fn summary(&self) -> IdentitySummary {
        IdentitySummary {
            username_length: self.username_len,
            domain_length: self.domain_len(),
            secret_length: self.secret_len(),
            flags: self.flags,
            released: self.is_released(),
        }
    }
}

impl<M: SecureMemory> Drop for CredentialIdentity<M> {
    fn drop(&mut self) {
        // no guard outlives the identity; a count left behind by mem::forget is ignored
        let state = self.state.get_mut();
        if *state & RELEASED != 0 {
            return;
        }
        *state = RELEASED;
        if let Err(e) = self.zero_and_free() {
            error!("Failed to release credential identity on drop: {}", e);
        }
    }
}

impl<M: SecureMemory> std::fmt::Debug for CredentialIdentity<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialIdentity")
            .field("username_len", &self.username_len)
            .field("secret", &"[REDACTED]")
            .field("secret_len", &self.secret_len())
            .field("flags", &self.flags)
            .field("released", &self.is_released())
            .finish()
    }
}

/// An [`AuthIdentityRecord`] on loan from a [`CredentialIdentity`].
///
/// Dereferences to the record; pass `guard.as_ptr()` to the negotiation
/// call. Dropping the guard returns the loan.
pub struct RecordGuard<'a> {
    record: AuthIdentityRecord<'a>,
    loans: &'a AtomicUsize,
}

impl<'a> Deref for RecordGuard<'a> {
    type Target = AuthIdentityRecord<'a>;

    fn deref(&self) -> &Self::Target {
        &self.record
    }
}

impl Drop for RecordGuard<'_> {
    fn drop(&mut self) {
        self.loans.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for RecordGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.record, f)
    }
}

/// Serializable snapshot of a [`CredentialIdentity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySummary {
    pub username_length: i32,
    pub domain_length: i32,
    pub secret_length: i32,
    pub flags: AuthIdentityFlags,
    pub released: bool,
}

fn record_length(field: &'static str, len: usize) -> Result<i32, IdentityError> {
    i32::try_from(len).map_err(|_| IdentityError::LengthOverflow { field, len })
}
