//! Secure memory for decrypted secrets.
//!
//! [`SecureMemory`] is the seam between a [`CredentialIdentity`](crate::CredentialIdentity)
//! and whatever hands out memory for the decrypted password. [`LockedHeap`] is
//! the default backend: on Unix it keeps secret pages resident with `mlock`.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::error::MemoryError;

/// Allocator for blocks of UTF-16 code units that hold secret material.
///
/// # Contract
///
/// - [`allocate`](SecureMemory::allocate) is never called with `units == 0`
///   and returns zero-filled memory of at least `units` code units.
/// - [`free`](SecureMemory::free) is called at most once per block, with the
///   same `units`, and only after every unit has been overwritten with zeros.
pub trait SecureMemory: Send + Sync {
    /// Allocate a zero-filled block of `units` UTF-16 code units.
    fn allocate(&self, units: usize) -> Result<NonNull<u16>, MemoryError>;

    /// Free a block previously returned by [`allocate`](SecureMemory::allocate).
    ///
    /// # Safety
    ///
    /// `block` must come from `self.allocate(units)` and must not be used
    /// after this call.
    unsafe fn free(&self, block: NonNull<u16>, units: usize) -> Result<(), MemoryError>;
}

/// Heap-backed [`SecureMemory`] that page-locks secret blocks on Unix.
///
/// With locking enabled, each block occupies its own page-aligned run of pages
/// so that unlocking one block never unlocks another. A failed `mlock` (for
/// example when `RLIMIT_MEMLOCK` is exhausted) is logged and the block is
/// still handed out.
#[derive(Debug, Clone)]
pub struct LockedHeap {
    lock_pages: bool,
    page_size: usize,
}

impl LockedHeap {
    /// Create a heap that locks secret pages where the platform supports it.
    pub fn new() -> Self {
        Self::with_locking(true)
    }

    /// Create a heap with page locking switched on or off.
    pub fn with_locking(lock_pages: bool) -> Self {
        let lock_pages = lock_pages && cfg!(unix);
        Self {
            lock_pages,
            page_size: page_size(),
        }
    }

    /// Whether blocks are page-locked.
    pub fn locks_pages(&self) -> bool {
        self.lock_pages
    }

    fn layout(&self, units: usize) -> Result<Layout, MemoryError> {
        let failed = |message: String| MemoryError::AllocationFailed { units, message };

        let size = units
            .checked_mul(std::mem::size_of::<u16>())
            .ok_or_else(|| failed("size overflow".to_string()))?;

        if self.lock_pages {
            let rounded = size
                .checked_next_multiple_of(self.page_size)
                .ok_or_else(|| failed("size overflow".to_string()))?;
            Layout::from_size_align(rounded, self.page_size).map_err(|e| failed(e.to_string()))
        } else {
            Layout::array::<u16>(units).map_err(|e| failed(e.to_string()))
        }
    }
}

impl Default for LockedHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureMemory for LockedHeap {
    fn allocate(&self, units: usize) -> Result<NonNull<u16>, MemoryError> {
        if units == 0 {
            return Err(MemoryError::AllocationFailed {
                units,
                message: "zero-length secure allocation".to_string(),
            });
        }

        let layout = self.layout(units)?;
        // SAFETY: layout has a non-zero size
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let block = NonNull::new(raw.cast::<u16>()).ok_or_else(|| MemoryError::AllocationFailed {
            units,
            message: "out of memory".to_string(),
        })?;

        #[cfg(unix)]
        if self.lock_pages {
            // SAFETY: block spans layout.size() bytes owned by this allocation
            let rc = unsafe { libc::mlock(block.as_ptr() as *const libc::c_void, layout.size()) };
            if rc != 0 {
                tracing::warn!(
                    "Could not lock secret pages ({}); secret may be swapped",
                    std::io::Error::last_os_error()
                );
            }
        }

        tracing::trace!(units, bytes = layout.size(), "Allocated secure block");
        Ok(block)
    }

    unsafe fn free(&self, block: NonNull<u16>, units: usize) -> Result<(), MemoryError> {
        let layout = self
            .layout(units)
            .map_err(|e| MemoryError::FreeFailed { message: e.to_string() })?;

        #[cfg(unix)]
        let unlock_error = if self.lock_pages {
            // SAFETY: same range that allocate() locked
            let rc = unsafe { libc::munlock(block.as_ptr() as *const libc::c_void, layout.size()) };
            (rc != 0).then(std::io::Error::last_os_error)
        } else {
            None
        };
        #[cfg(not(unix))]
        let unlock_error: Option<std::io::Error> = None;

        // SAFETY: block was allocated by allocate() with this exact layout
        unsafe { alloc::dealloc(block.as_ptr().cast(), layout) };
        tracing::trace!(units, "Freed secure block");

        match unlock_error {
            Some(e) => Err(MemoryError::FreeFailed {
                message: format!("munlock failed: {}", e),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(unix)]
fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { 4096 }
}

#[cfg(not(unix))]
fn page_size() -> usize {
    4096
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_roundtrip(heap: &LockedHeap, units: usize) {
        let block = heap.allocate(units).unwrap();
        let slice = unsafe { std::slice::from_raw_parts_mut(block.as_ptr(), units) };
        assert!(slice.iter().all(|u| *u == 0), "allocation must be zero-filled");

        slice.fill(0x41);
        slice.fill(0);
        unsafe { heap.free(block, units) }.unwrap();
    }

    #[test]
    fn test_unlocked_heap_allocates_zeroed() {
        let heap = LockedHeap::with_locking(false);
        assert!(!heap.locks_pages());
        assert_roundtrip(&heap, 8);
    }

    #[test]
    fn test_locked_heap_allocates_zeroed() {
        let heap = LockedHeap::new();
        assert_roundtrip(&heap, 8);
        assert_roundtrip(&heap, heap.page_size);
    }

    #[test]
    fn test_zero_units_rejected() {
        let heap = LockedHeap::with_locking(false);
        let result = heap.allocate(0);
        assert!(matches!(
            result,
            Err(MemoryError::AllocationFailed { units: 0, .. })
        ));
    }

    #[test]
    fn test_locked_layout_is_page_aligned() {
        let heap = LockedHeap::with_locking(true);
        if !heap.locks_pages() {
            return;
        }
        let layout = heap.layout(3).unwrap();
        assert_eq!(layout.align(), heap.page_size);
        assert_eq!(layout.size() % heap.page_size, 0);
    }

    #[test]
    fn test_oversized_request_fails() {
        let heap = LockedHeap::with_locking(false);
        assert!(heap.allocate(usize::MAX).is_err());
    }
}
