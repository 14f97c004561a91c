//! Device-visible I/O buffers.
//!
//! Buffers are page aligned so they can be handed to `O_DIRECT` I/O without
//! bounce copies. Each slot owns one for the whole run and reuses it.

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;

/// Alignment of every I/O buffer.
pub const BUFFER_ALIGN: usize = 4096;

/// A zero-initialized, page-aligned heap buffer.
pub struct Buffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

// The buffer is a plain owned allocation with no interior sharing.
unsafe impl Send for Buffer {}

impl Buffer {
    /// Allocate `len` zeroed bytes. Returns `None` if `len` is zero or the
    /// allocator is exhausted.
    #[must_use]
    pub fn alloc(len: usize) -> Option<Self> {
        if len == 0 {
            return None;
        }
        let layout = Layout::from_size_align(len, BUFFER_ALIGN).ok()?;
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        NonNull::new(raw).map(|ptr| Self { ptr, layout })
    }

    /// Length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    /// Always false; zero-length buffers are never allocated.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr points to layout.size() initialized bytes owned by self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }

    /// Raw pointer for handing to the kernel.
    #[inline]
    #[must_use]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        // SAFETY: allocated in `alloc` with this exact layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len())
            .finish()
    }
}
