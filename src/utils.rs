use std::alloc::{self, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::slice;

use crate::error::{layout_error, Result};

/// A zero-initialised byte buffer whose first byte sits at a chosen alignment.
///
/// Callers use it to own a scratch arena, or to place operands at a known
/// (mis)alignment. Memory is released with the exact layout it was allocated
/// with.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    len: usize,
    layout: Layout,
}

// SAFETY: the buffer uniquely owns its allocation, like `Vec<u8>`.
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    /// Allocates `len` zeroed bytes aligned to `align`.
    ///
    /// # Errors
    ///
    /// Returns a layout error when `align` is not a power of two or the size
    /// overflows.
    pub fn zeroed(len: usize, align: usize) -> Result<Self> {
        let layout = Layout::from_size_align(len, align)
            .map_err(|_| layout_error(len, align, "alignment must be a power of two"))?;

        if len == 0 {
            // Dangling but aligned, never dereferenced.
            let ptr = NonNull::new(align as *mut u8)
                .ok_or_else(|| layout_error(len, align, "zero alignment"))?;
            return Ok(Self { ptr, len, layout });
        }

        // SAFETY: layout has a non-zero size.
        let raw_ptr = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = match NonNull::new(raw_ptr) {
            Some(p) => p,
            None => alloc::handle_alloc_error(layout),
        };

        Ok(Self { ptr, len, layout })
    }

    /// Allocates a scratch arena large enough for an `n × k` by `k × m` product.
    pub fn scratch(n: usize, m: usize, k: usize) -> Result<Self> {
        Self::zeroed(crate::scratch_size(n, m, k), crate::ARENA_ALIGNMENT)
    }

    /// Alignment the buffer was allocated with.
    pub fn alignment(&self) -> usize {
        self.layout.align()
    }
}

impl Deref for AlignedBuffer {
    type Target = [u8];

    #[inline(always)]
    fn deref(&self) -> &[u8] {
        // SAFETY: `ptr` is valid for `len` initialised bytes (or `len == 0`).
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for AlignedBuffer {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // Deallocating with a zero-sized layout is undefined behavior.
        if self.layout.size() > 0 {
            unsafe {
                alloc::dealloc(self.ptr.as_ptr(), self.layout);
            }
        }
    }
}

/// `true` when `ptr` is a multiple of `align` bytes.
#[inline(always)]
pub fn is_aligned_to<T>(ptr: *const T, align: usize) -> bool {
    (ptr as usize) % align == 0
}
