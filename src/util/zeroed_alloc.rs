//! Zeroed byte slabs backing memory regions.
//!
//! Region memory is handed out by address and may be read by other buffers through merged
//! contents, so it is allocated directly from the global allocator rather than owned by a
//! `Vec`.  Every slab is zero-filled, which keeps partially written tags and padding bytes
//! deterministic in dumps.
use crate::util::constants::PAYLOAD_ALIGNMENT;
use crate::util::Address;
use std::alloc::{alloc_zeroed, dealloc, Layout};

fn slab_layout(size: usize) -> Option<Layout> {
    Layout::from_size_align(size, PAYLOAD_ALIGNMENT).ok()
}

/// Allocate `size` zeroed bytes aligned to [`PAYLOAD_ALIGNMENT`].
///
/// Returns `None` if `size` is zero, the layout is invalid, or the allocator fails.
pub(crate) fn alloc_zeroed_slab(size: usize) -> Option<Address> {
    if size == 0 {
        return None;
    }
    let layout = slab_layout(size)?;
    // SAFETY: the layout has a non-zero size.
    let ptr = unsafe { alloc_zeroed(layout) };
    if ptr.is_null() {
        return None;
    }
    let base = Address::from_mut_ptr(ptr);
    debug_assert!(base.is_aligned_to(PAYLOAD_ALIGNMENT));
    Some(base)
}

/// Return a slab to the allocator.
///
/// # Safety
///
/// `base` must come from [`alloc_zeroed_slab`] with the same `size`, and must not be used
/// afterwards.
pub(crate) unsafe fn free_slab(base: Address, size: usize) {
    if let Some(layout) = slab_layout(size) {
        dealloc(base.to_mut_ptr::<u8>(), layout);
    }
}
