use crate::error::{MetaError, Result};
use crate::util::log::{debug, error, warn};
use crate::util::zeroed_alloc::{alloc_zeroed_slab, free_slab};
use crate::util::Address;
use atomic::Atomic;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A contiguous zeroed slab holding out-of-line tag payloads.
///
/// A region with `size > 0` and a zero base is reserved but not yet allocated. Only the thread
/// that reserved it touches it until the base is published.
pub struct MemoryRegion {
    base: Atomic<Address>,
    size: AtomicUsize,
}

impl MemoryRegion {
    pub const fn new() -> Self {
        MemoryRegion {
            base: Atomic::new(Address::ZERO),
            size: AtomicUsize::new(0),
        }
    }

    pub fn allocate(&self, size: usize) -> Result<()> {
        if size == 0 {
            return Err(MetaError::InvalidArgument(
                "cannot allocate an empty region".into(),
            ));
        }
        let current = self.base.load(Ordering::Acquire);
        if !current.is_zero() {
            return Err(MetaError::InvalidArgument(format!(
                "region already allocated at {}",
                current
            )));
        }
        let base = alloc_zeroed_slab(size).ok_or_else(|| {
            error!("Failed to allocate a region of {} bytes", size);
            MetaError::NoMemory { size }
        })?;
        self.size.store(size, Ordering::Relaxed);
        self.base.store(base, Ordering::Release);
        Ok(())
    }

    /// Free the slab. Releasing a free region does nothing.
    pub fn release(&mut self) {
        let base = std::mem::replace(self.base.get_mut(), Address::ZERO);
        let size = std::mem::replace(self.size.get_mut(), 0);
        if !base.is_zero() {
            // SAFETY: `base` was allocated with `size` bytes and is no longer published.
            unsafe { free_slab(base, size) };
        }
    }

    pub fn is_free(&self) -> bool {
        self.size.load(Ordering::Relaxed) == 0
    }

    /// The base address, or `None` while the region is free or still being allocated.
    pub fn base(&self) -> Option<Address> {
        let base = self.base.load(Ordering::Acquire);
        (!base.is_zero()).then_some(base)
    }

    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }
}

impl Default for MemoryRegion {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryRegion {
    fn drop(&mut self) {
        self.release();
    }
}

/// The regions of one buffer. The table never grows past the capacity fixed at creation, so
/// region slots never move and can be addressed without holding the lock.
pub(crate) struct RegionTable {
    regions: Box<[MemoryRegion]>,
    /// Number of slots handed out so far. Guards the scan-then-reserve sequence.
    used: spin::Mutex<usize>,
}

impl RegionTable {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        RegionTable {
            regions: (0..capacity).map(|_| MemoryRegion::new()).collect(),
            used: spin::Mutex::new(0),
        }
    }

    /// Reserve a slot under the lock, then allocate its slab after unlocking.
    pub(crate) fn reserve_and_allocate(&self, size: usize) -> Result<(u32, Address)> {
        if size == 0 {
            return Err(MetaError::InvalidArgument(
                "cannot reserve an empty region".into(),
            ));
        }
        let index = {
            let mut used = self.used.lock();
            let free = self.regions[..*used].iter().position(|r| r.is_free());
            let index = match free {
                Some(index) => index,
                None if *used < self.regions.len() => {
                    *used += 1;
                    *used - 1
                }
                None => {
                    warn!(
                        "All {} regions are in use, cannot reserve {} bytes",
                        self.regions.len(),
                        size
                    );
                    return Err(MetaError::NoMemory { size });
                }
            };
            // Mark the slot before unlocking so no other thread picks it.
            self.regions[index].size.store(size, Ordering::Relaxed);
            index
        };

        let region = &self.regions[index];
        if let Err(e) = region.allocate(size) {
            region.size.store(0, Ordering::Relaxed);
            return Err(e);
        }
        let base = region.base.load(Ordering::Acquire);
        debug!("Reserved region {} of {} bytes at {}", index, size, base);
        Ok((index as u32, base))
    }

    /// The base and size of an allocated region.
    pub(crate) fn resolve(&self, index: u32) -> Option<(Address, usize)> {
        let region = self.regions.get(index as usize)?;
        region.base().map(|base| (base, region.size()))
    }

    /// Total bytes of all allocated regions.
    pub(crate) fn allocated_bytes(&self) -> usize {
        self.regions
            .iter()
            .filter(|r| r.base().is_some())
            .map(|r| r.size())
            .sum()
    }

    /// Number of allocated regions.
    pub(crate) fn allocated_count(&self) -> usize {
        self.regions.iter().filter(|r| r.base().is_some()).count()
    }
}
