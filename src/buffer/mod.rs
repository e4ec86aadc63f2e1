//! Metadata buffers.
//!
//! A [`MetaBuffer`] holds the tags of one frame. Producers allocate and set tags, consumers
//! read them, and pipeline stages combine buffers:
//!
//! * [`MetaBuffer::copy`] duplicates the bytes of another buffer into this one.
//! * [`MetaBuffer::merge`] makes this buffer read another buffer's values in place. Large
//!   values are referenced, not copied, so the merged buffer stays linked and referenced
//!   until this buffer is reset.
//! * [`MetaBuffer::combine_multi_camera_metadata`] turns this buffer into the root of a
//!   multi-camera set, so tags can be resolved per camera.
//!
//! Each buffer guards its map with a read-write lock, its references and links with a
//! client lock, and its region table with a region lock. A thread holding a map lock may
//! take the client or region lock of the same buffer, never the other way round.

mod camera;
mod compose;
mod content;
mod dump;
mod export;
mod iterator;
pub(crate) mod map;
mod reference;
mod region;

pub use self::content::{Payload, Slot};
pub use self::iterator::MetaIterator;
pub use self::map::{ExportFilter, MapKind};
pub use self::reference::{ClientKey, ReferenceKind};
pub use self::region::MemoryRegion;

use self::camera::CameraState;
use self::map::{HashMap, LinearMap, StorageMap};
use self::reference::ClientState;
use self::region::RegionTable;
use crate::catalog::{ElementType, TagCatalog};
use crate::error::{MetaError, Result};
use crate::util::constants::*;
use crate::util::conversions::payload_footprint;
use crate::util::log::{debug, error, info, trace, warn};
use crate::util::options::Options;
use crate::util::Address;
use itertools::Itertools;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

/// Source of buffer ids. Ids are handed out once per process and never reused.
static NEXT_BUFFER_ID: AtomicU32 = AtomicU32::new(1);

fn next_unique_id() -> u32 {
    METABUFFER_ID_MASK | (NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed) & !METABUFFER_ID_MASK)
}

/// A located tag value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagEntry {
    pub tag: u32,
    pub element_type: ElementType,
    pub count: u32,
    pub size: u32,
    pub address: Address,
}

impl TagEntry {
    /// The value bytes.
    ///
    /// # Safety
    /// The buffer the entry was read from, and every buffer it merged, must stay alive and
    /// must not be reset or rewritten while the slice is in use.
    pub unsafe fn data<'a>(&self) -> &'a [u8] {
        self.address.as_bytes(self.size as usize)
    }
}

/// A reference-counted, mergeable set of tag values.
pub struct MetaBuffer {
    unique_id: u32,
    this: Weak<MetaBuffer>,
    catalog: Arc<dyn TagCatalog>,
    options: Options,
    property_blob_id: Option<u32>,
    map: spin::RwLock<Box<dyn StorageMap>>,
    regions: RegionTable,
    clients: spin::Mutex<ClientState>,
    /// Sum of the counters in `clients`, readable without the lock.
    reference_total: AtomicU32,
    camera: spin::Mutex<CameraState>,
    camera_id: AtomicU32,
    invalidate_pending: AtomicBool,
    destroyed: AtomicBool,
}

impl MetaBuffer {
    /// Create a buffer for the tags of `catalog`, using the backend `options.map_kind`.
    pub fn create(catalog: Arc<dyn TagCatalog>, options: &Options) -> Result<Arc<MetaBuffer>> {
        let map: Box<dyn StorageMap> = match options.map_kind {
            MapKind::Linear => Box::new(LinearMap::create(catalog.clone())?),
            MapKind::Hash => Box::new(HashMap::create(catalog.clone())),
        };
        let property_blob_id = catalog.resolve_location(PROPERTY_BLOB_SECTION, PROPERTY_BLOB_NAME);
        if property_blob_id.is_none() {
            warn!(
                "Catalog has no {}.{} tag, property tags cannot be exported",
                PROPERTY_BLOB_SECTION, PROPERTY_BLOB_NAME
            );
        }
        let region_capacity = catalog.total_tag_count() as usize;
        let unique_id = next_unique_id();

        let buffer = Arc::new_cyclic(|this| MetaBuffer {
            unique_id,
            this: this.clone(),
            catalog,
            options: options.clone(),
            property_blob_id,
            map: spin::RwLock::new(map),
            regions: RegionTable::with_capacity(region_capacity),
            clients: spin::Mutex::new(ClientState::new(
                options.initial_client_slots,
                options.initial_link_slots,
            )),
            reference_total: AtomicU32::new(0),
            camera: spin::Mutex::new(CameraState::default()),
            camera_id: AtomicU32::new(INVALID_CAMERA_ID),
            invalidate_pending: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        });
        debug!(
            "Created buffer {:#x} ({} map, {} regions)",
            unique_id, options.map_kind, region_capacity
        );
        Ok(buffer)
    }

    pub fn unique_id(&self) -> u32 {
        self.unique_id
    }

    pub fn map_kind(&self) -> MapKind {
        self.map.read().kind()
    }

    pub fn catalog(&self) -> &Arc<dyn TagCatalog> {
        &self.catalog
    }

    /// The camera this buffer's values were produced for.
    pub fn camera_id(&self) -> Option<u32> {
        match self.camera_id.load(Ordering::Relaxed) {
            INVALID_CAMERA_ID => None,
            id => Some(id),
        }
    }

    /// Set the camera later writes are stamped with.
    pub fn set_camera_id(&self, camera_id: Option<u32>) {
        self.camera_id
            .store(camera_id.unwrap_or(INVALID_CAMERA_ID), Ordering::Relaxed);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            Err(MetaError::InvalidState(format!(
                "buffer {:#x} is destroyed",
                self.unique_id
            )))
        } else {
            Ok(())
        }
    }

    /// Tear the buffer down. Fails with `Busy` while references remain, unless forced.
    ///
    /// A destroyed buffer is reset and rejects further writes and compositions. Its memory
    /// is returned once the last handle to it is dropped.
    pub fn destroy(&self, force: bool) -> Result<()> {
        let references = self.reference_count();
        if references > 0 && !force {
            warn!(
                "Cannot destroy buffer {:#x}: {} references outstanding",
                self.unique_id, references
            );
            return Err(MetaError::Busy { references });
        }
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Err(MetaError::InvalidState(format!(
                "buffer {:#x} destroyed twice",
                self.unique_id
            )));
        }
        self.reset();
        info!(
            "Destroyed buffer {:#x} (forced: {}, references: {})",
            self.unique_id, force, references
        );
        Ok(())
    }

    /// Clear every value, drop merge links and multi-camera state. Regions stay allocated
    /// and are reused by later writes.
    pub fn reset(&self) {
        let (links, camera) = {
            let mut map = self.map.write();
            map.reset();
            let links = self.clients.lock().take_links();
            let camera = std::mem::take(&mut *self.camera.lock());
            self.invalidate_pending.store(false, Ordering::Release);
            (links, camera)
        };
        trace!(
            "Reset buffer {:#x}, releasing {} links",
            self.unique_id,
            links.len()
        );
        for linked in links {
            linked.release_buffer_reference(self);
        }
        drop(camera);
    }

    /// Reset now if forced or unreferenced, otherwise once the last reference is released.
    pub fn invalidate(&self, force: bool) {
        // The flag is raised under the client lock, where the last release checks it.
        let reset_now = force || {
            let state = self.clients.lock();
            let total = state.total();
            if total != 0 {
                debug!(
                    "Deferring invalidation of buffer {:#x} until {} references are released",
                    self.unique_id, total
                );
                self.invalidate_pending.store(true, Ordering::Release);
            }
            total == 0
        };
        if reset_now {
            self.reset();
        }
    }

    pub fn is_invalidate_pending(&self) -> bool {
        self.invalidate_pending.load(Ordering::Acquire)
    }

    /// Assign storage to `tags` without making them valid. Small tags are stored inline;
    /// large tags without storage share one new region.
    pub fn allocate_buffer(&self, tags: &[u32]) -> Result<()> {
        self.ensure_alive()?;
        if tags.is_empty() {
            return Err(MetaError::InvalidArgument("no tags to allocate".into()));
        }
        if let Some(unknown) = tags
            .iter()
            .find(|tag| self.catalog.info_by_tag(**tag).is_none())
        {
            error!("Cannot allocate unknown tag {:#x}", unknown);
            return Err(MetaError::InvalidArgument(format!(
                "unknown tag {:#x}",
                unknown
            )));
        }

        let mut map = self.map.write();
        let mut pending = Vec::new();
        for tag in tags.iter().copied().unique() {
            if let Some(content) = map.insert(tag) {
                if content.slot() == Slot::Unassigned {
                    pending.push((tag, payload_footprint(content.max_size() as usize)));
                }
            }
        }
        let total: usize = pending.iter().map(|(_, footprint)| footprint).sum();
        if total == 0 {
            return Ok(());
        }

        let (index, base) = self.regions.reserve_and_allocate(total)?;
        let mut offset = 0;
        for (tag, footprint) in pending {
            if let Some(content) = map.find_mut(tag) {
                content.slot = Slot::Region {
                    index,
                    offset: offset as u32,
                };
            }
            offset += footprint;
        }
        debug!(
            "Buffer {:#x} placed {} bytes of tags in region {} at {}",
            self.unique_id, total, index, base
        );
        Ok(())
    }

    pub fn allocate_buffer_set(&self, tags: &HashSet<u32>) -> Result<()> {
        let tags: Vec<u32> = tags.iter().copied().sorted().collect();
        self.allocate_buffer(&tags)
    }

    /// Write a value. `data` holds `count` elements.
    pub fn set_tag(&self, tag: u32, data: &[u8], count: u32) -> Result<()> {
        self.set_tag_at(tag, data, count, 0)
    }

    /// Write `data` at byte `offset` of the value, extending it. The size and count of the
    /// value grow by the elements before `offset`.
    pub fn set_tag_at(&self, tag: u32, data: &[u8], count: u32, offset: u32) -> Result<()> {
        self.ensure_alive()?;
        let info = self.catalog.info_by_tag(tag).ok_or_else(|| {
            error!("Cannot set unknown tag {:#x}", tag);
            MetaError::InvalidArgument(format!("unknown tag {:#x}", tag))
        })?;
        let size = data.len();
        let offset = offset as usize;
        if size == 0 || count == 0 || size + offset > info.max_size as usize {
            error!(
                "Rejecting tag {:#x} ({}): size {} count {} offset {} max size {}",
                tag,
                info.full_name(),
                size,
                count,
                offset,
                info.max_size
            );
            return Err(MetaError::Failed(format!(
                "tag {:#x}: {} bytes at offset {} exceed max size {}",
                tag, size, offset, info.max_size
            )));
        }
        let total_count = count
            .checked_add((offset / info.element_type.unit_size()) as u32)
            .ok_or_else(|| {
                error!(
                    "Rejecting tag {:#x}: count {} at offset {} overflows",
                    tag, count, offset
                );
                MetaError::Failed(format!("tag {:#x}: element count overflows", tag))
            })?;
        let camera_id = self.camera_id();

        let mut map = self.map.write();
        let content = map
            .insert(tag)
            .ok_or_else(|| MetaError::NoSuch(format!("no slot for tag {:#x}", tag)))?;

        if content.fits_inline() {
            if offset != 0 {
                return Err(MetaError::Failed(format!(
                    "tag {:#x} is stored inline and cannot be written at offset {}",
                    tag, offset
                )));
            }
            content.write_inline(data);
        } else {
            let (index, slot_offset) = match content.slot() {
                Slot::Region { index, offset } if self.regions.resolve(index).is_some() => {
                    (index, offset as usize)
                }
                _ => {
                    let (index, _) = self
                        .regions
                        .reserve_and_allocate(payload_footprint(info.max_size as usize))?;
                    content.slot = Slot::Region { index, offset: 0 };
                    (index, 0)
                }
            };
            let slot_base = match self.regions.resolve(index) {
                Some((base, region_size)) if slot_offset + offset + size <= region_size => {
                    base + slot_offset
                }
                _ => {
                    error!(
                        "Tag {:#x} does not fit region {} at offset {}",
                        tag, index, slot_offset
                    );
                    return Err(MetaError::Failed(format!(
                        "cannot resolve region {} for tag {:#x}",
                        index, tag
                    )));
                }
            };
            // SAFETY: the range was checked against the region size above.
            unsafe { (slot_base + offset).copy_from_slice(data) };
            content.payload = Payload::Local(slot_base);
        }

        content.size = (size + offset) as u32;
        content.count = total_count;
        content.owner = None;
        content.camera_id = camera_id;
        trace!(
            "Buffer {:#x} set tag {:#x} size {} count {}",
            self.unique_id,
            tag,
            content.size,
            content.count
        );
        Ok(())
    }

    /// Address of the value of `tag`, or `None` if it has none.
    pub fn get_tag(&self, tag: u32) -> Option<Address> {
        self.map.read().find(tag).and_then(|c| c.address())
    }

    pub fn get_tag_with_count(&self, tag: u32) -> Option<(Address, u32)> {
        let map = self.map.read();
        let content = map.find(tag)?;
        content.address().map(|address| (address, content.count()))
    }

    /// A copy of the value bytes of `tag`.
    pub fn get_tag_bytes(&self, tag: u32) -> Option<Vec<u8>> {
        self.map
            .read()
            .find(tag)
            .and_then(|c| c.bytes().map(<[u8]>::to_vec))
    }

    pub fn get_tag_entry(&self, tag: u32) -> Result<TagEntry> {
        let map = self.map.read();
        let content = map
            .find(tag)
            .filter(|c| c.is_valid())
            .ok_or_else(|| MetaError::NoSuch(format!("tag {:#x} has no value", tag)))?;
        self.entry_of(content)
    }

    fn entry_of(&self, content: &content::Content) -> Result<TagEntry> {
        let info = self
            .catalog
            .info_by_tag(content.tag())
            .ok_or_else(|| MetaError::OutOfBounds(format!("tag {:#x}", content.tag())))?;
        let address = content
            .address()
            .ok_or_else(|| MetaError::NoSuch(format!("tag {:#x} has no value", content.tag())))?;
        Ok(TagEntry {
            tag: content.tag(),
            element_type: info.element_type,
            count: content.count(),
            size: content.size(),
            address,
        })
    }

    /// Where the own storage of `tag` is.
    pub fn slot(&self, tag: u32) -> Option<Slot> {
        self.map.read().find(tag).map(|c| c.slot())
    }

    /// Where the value of `tag` is read from.
    pub fn payload(&self, tag: u32) -> Option<Payload> {
        self.map.read().find(tag).map(|c| c.payload())
    }

    /// Drop the value of `tag`. Its storage is kept.
    pub fn remove_tag(&self, tag: u32) -> Result<()> {
        let mut map = self.map.write();
        let content = map
            .find_mut(tag)
            .filter(|c| c.is_valid())
            .ok_or_else(|| MetaError::NoSuch(format!("tag {:#x} has no value", tag)))?;
        content.invalidate();
        Ok(())
    }

    /// Number of valid tags.
    pub fn count(&self) -> usize {
        self.map.read().count()
    }

    /// Bytes of region memory allocated.
    pub fn capacity(&self) -> usize {
        self.regions.allocated_bytes()
    }

    pub fn create_iterator(&self) -> MetaIterator<'_> {
        MetaIterator::new(self.map.read(), self)
    }

    /// A new buffer of the same backend holding a copy of every value.
    pub fn clone_buffer(&self) -> Result<Arc<MetaBuffer>> {
        let mut options = self.options.clone();
        options.map_kind = self.map_kind();
        let clone = MetaBuffer::create(self.catalog.clone(), &options)?;
        clone.set_camera_id(self.camera_id());
        clone.copy(self, false)?;
        Ok(clone)
    }

    fn handle(&self) -> Option<Arc<MetaBuffer>> {
        self.this.upgrade()
    }
}

impl Drop for MetaBuffer {
    fn drop(&mut self) {
        for linked in self.clients.get_mut().take_links() {
            linked.release_buffer_reference(self);
        }
    }
}

impl std::fmt::Debug for MetaBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("MetaBuffer")
            .field("unique_id", &format_args!("{:#x}", self.unique_id))
            .field("references", &self.reference_count())
            .field("camera_id", &self.camera_id())
            .finish()
    }
}
