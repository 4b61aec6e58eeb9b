//! Error types for authident.

use thiserror::Error;

/// Error type for secure memory operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The allocator could not provide a block of the requested size.
    #[error("secure allocation of {units} code units failed: {message}")]
    AllocationFailed { units: usize, message: String },

    /// The allocator could not free a block it previously handed out.
    #[error("secure free failed: {message}")]
    FreeFailed { message: String },
}

/// Error type for [`CredentialIdentity`](crate::CredentialIdentity) operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Secure memory for the secret could not be allocated.
    #[error("allocation error: {0}")]
    Allocation(#[source] MemoryError),

    /// The zeroed secret block could not be freed.
    #[error("release error: {0}")]
    Release(#[source] MemoryError),

    /// The secret was read after the identity was released.
    #[error("credential identity has already been released")]
    Released,

    /// Release was attempted while records are on loan.
    #[error("credential identity has {loans} record(s) on loan")]
    OnLoan { loans: usize },

    /// A length does not fit the record's 32-bit length field.
    #[error("{field} length {len} exceeds the record limit")]
    LengthOverflow { field: &'static str, len: usize },
}

/// Error type for protected secret mutation.
#[derive(Debug, Error)]
pub enum SecretError {
    /// The secret was made read-only and can no longer change.
    #[error("protected secret is read-only")]
    ReadOnly,
}
