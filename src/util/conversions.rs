use crate::util::constants::PAYLOAD_ALIGNMENT;

/* Alignment */

pub const fn raw_align_up(val: usize, align: usize) -> usize {
    // See https://github.com/rust-lang/rust/blob/e620d0f337d0643c757bab791fc7d88d63217704/src/libcore/alloc.rs#L192
    val.wrapping_add(align).wrapping_sub(1) & !align.wrapping_sub(1)
}

pub const fn raw_is_aligned(val: usize, align: usize) -> bool {
    val & align.wrapping_sub(1) == 0
}

/// The number of region bytes a payload of `size` bytes occupies.
pub const fn payload_footprint(size: usize) -> usize {
    raw_align_up(size, PAYLOAD_ALIGNMENT)
}

#[cfg(test)]
mod tests {
    use crate::util::conversions::*;

    #[test]
    fn test_raw_align_up() {
        assert_eq!(raw_align_up(0, 8), 0);
        assert_eq!(raw_align_up(1, 8), 8);
        assert_eq!(raw_align_up(8, 8), 8);
        assert_eq!(raw_align_up(4095, 8), 4096);
    }

    #[test]
    fn test_payload_footprint() {
        assert_eq!(payload_footprint(4), 8);
        assert_eq!(payload_footprint(4096), 4096);
        assert_eq!(payload_footprint(130), 136);
        assert!(raw_is_aligned(payload_footprint(77), PAYLOAD_ALIGNMENT));
    }
}
