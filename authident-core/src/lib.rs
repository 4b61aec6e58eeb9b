//! # authident core
//!
//! Credential identities for SSPI-style authentication negotiation.
//!
//! This crate provides:
//! - [`CredentialIdentity`] - A username and password packaged for the native
//!   negotiation call, with the password in zeroed-on-release secure memory
//! - [`AuthIdentityRecord`] - The fixed `#[repr(C)]` record the native API reads
//! - [`ProtectedSecret`] / [`ProtectedString`] - Where the password comes from
//! - [`SecureMemory`] / [`LockedHeap`] - Where the decrypted password lives
//!
//! ## Quick Start
//!
//! ```rust
//! use authident_core::{CredentialIdentity, ProtectedString};
//!
//! fn negotiate(password: &ProtectedString) -> Result<(), authident_core::IdentityError> {
//!     let identity = CredentialIdentity::new(Some("alice"), Some(password))?;
//!     let record = identity.record()?;
//!     // pass record.as_ptr() to the negotiation call here
//!     drop(record);
//!     identity.release()
//! }
//! # negotiate(&ProtectedString::from("s3cret!")).unwrap();
//! ```

pub mod error;
pub mod identity;
pub mod memory;
pub mod record;
pub mod secret;

// Re-export commonly used types at crate root
pub use error::{IdentityError, MemoryError, SecretError};

pub use identity::{CredentialIdentity, IdentitySummary, RecordGuard};

pub use memory::{LockedHeap, SecureMemory};

pub use record::{AuthIdentityFlags, AuthIdentityRecord, FieldLayout, record_layout, record_size};

pub use secret::{ProtectedSecret, ProtectedString};
