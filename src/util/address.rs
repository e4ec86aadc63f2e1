use bytemuck::NoUninit;

use std::fmt;
use std::ops::Add;

/// Address represents a location of tag payload bytes. Payloads live either inline in a
/// content record or in a memory region owned by some buffer, and both are referred to by
/// address. This type needs to be zero overhead (memory wise and time wise) and is stored
/// in atomics, so it is a transparent `usize`.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, Hash, PartialOrd, Ord, PartialEq, NoUninit)]
pub struct Address(usize);

/// Address + byte offset
impl Add<usize> for Address {
    type Output = Address;
    fn add(self, offset: usize) -> Address {
        Address(self.0 + offset)
    }
}

impl Address {
    /// The null address. Used as the "not allocated" marker of memory regions.
    pub const ZERO: Self = Address(0);

    /// creates Address from a Rust reference
    pub fn from_ref<T>(r: &T) -> Address {
        Address(r as *const T as usize)
    }

    /// creates Address from a mutable pointer
    pub fn from_mut_ptr<T>(ptr: *mut T) -> Address {
        Address(ptr as usize)
    }

    /// is this address zero?
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// is this address aligned to the given alignment
    pub const fn is_aligned_to(self, align: usize) -> bool {
        use crate::util::conversions;
        conversions::raw_is_aligned(self.0, align)
    }

    /// converts the Address to a pointer
    pub fn to_ptr<T>(self) -> *const T {
        self.0 as *const T
    }

    /// converts the Address to a mutable pointer
    pub fn to_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    /// Views `len` bytes starting at this address.
    ///
    /// # Safety
    /// The caller must guarantee that the whole range is readable and stays alive for `'a`.
    pub unsafe fn as_bytes<'a>(self, len: usize) -> &'a [u8] {
        if len == 0 {
            return &[];
        }
        std::slice::from_raw_parts(self.to_ptr::<u8>(), len)
    }

    /// Copies `bytes` to this address.
    ///
    /// # Safety
    /// The caller must guarantee that `bytes.len()` bytes starting at this address are writable
    /// and do not overlap `bytes`.
    pub unsafe fn copy_from_slice(self, bytes: &[u8]) {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.to_mut_ptr::<u8>(), bytes.len());
    }
}

/// allows Display format the Address (as lower-case hex value with 0x prefix)
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// allows Debug format the Address (as lower-case hex value with 0x prefix)
impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use crate::util::Address;

    #[test]
    fn is_aligned_to() {
        let storage = [0u64; 2];
        let addr = Address::from_ref(&storage);
        assert!(addr.is_aligned_to(0x8));
        assert!(!(addr + 1).is_aligned_to(0x8));
    }

    #[test]
    fn copy_and_view_bytes() {
        let mut storage = [0u8; 8];
        let addr = Address::from_mut_ptr(storage.as_mut_ptr());
        unsafe {
            (addr + 2).copy_from_slice(&[1, 2, 3]);
            assert_eq!(addr.as_bytes(6), &[0, 0, 1, 2, 3, 0]);
            assert!(addr.as_bytes(0).is_empty());
        }
    }

    #[test]
    fn display_is_prefixed_hex() {
        let addr = Address::ZERO + 0xbeef;
        assert_eq!(format!("{}", addr), "0xbeef");
        assert_eq!(format!("{:?}", addr), "0xbeef");
        assert!(Address::ZERO.is_zero());
        assert!(!addr.is_zero());
    }
}
