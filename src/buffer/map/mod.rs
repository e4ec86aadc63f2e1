//! Tag storage backends.
//!
//! A buffer keeps its contents in one [`StorageMap`], chosen when the buffer is created:
//!
//! * [`LinearMap`]: a dense array with one slot per catalog tag, addressed by the tag's unique
//!   index. Every slot exists from the start.
//! * [`HashMap`]: a hash table keyed by tag id. Slots are created on first write.
//!
//! Composition operations (copy, merge) only run between buffers of the same backend.

mod hash;
mod linear;

pub use self::hash::HashMap;
pub use self::linear::LinearMap;

use super::content::{Content, Payload, Slot};
use super::region::RegionTable;
use crate::catalog::{TagCatalog, TagInfo};
use crate::error::{MetaError, Result};
use crate::metadata::{pack_property_blob, CameraMetadata, PropertyValue};
use crate::util::conversions::payload_footprint;
use crate::util::log::warn;
use crate::util::Address;
use downcast_rs::{impl_downcast, Downcast};
use std::collections::HashSet;
use strum_macros::{Display, EnumString};

/// The storage backend of a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
pub enum MapKind {
    Linear,
    Hash,
}

/// Selects the tags [`StorageMap::get_android_meta`] exports.
#[derive(Clone, Debug, Default)]
pub struct ExportFilter {
    /// Skip tags whose section is not visible to the framework.
    pub framework_tags_only: bool,
    /// Do not pack property tags into the property blob.
    pub filter_properties: bool,
    /// Tags never exported individually.
    pub excluded_tags: HashSet<u32>,
}

impl ExportFilter {
    fn exports(&self, info: &TagInfo) -> bool {
        !self.excluded_tags.contains(&info.tag)
            && (!self.framework_tags_only || info.visibility.is_visible_to_framework())
    }
}

pub(crate) trait StorageMap: Downcast + Send + Sync {
    fn kind(&self) -> MapKind;

    fn find(&self, tag: u32) -> Option<&Content>;

    fn find_mut(&mut self, tag: u32) -> Option<&mut Content>;

    /// Find the content of `tag`, creating it if needed. `None` if the catalog does not know
    /// the tag.
    fn insert(&mut self, tag: u32) -> Option<&mut Content>;

    /// Invalidate every content. Assigned region slots are kept.
    fn reset(&mut self);

    /// Number of valid contents.
    fn count(&self) -> usize;

    /// First phase of a copy. Copies what can be placed right away and marks the rest
    /// [`Slot::Reserved`]. Returns the region bytes the reserved contents need.
    fn copy_valid_and_reserve_unfilled_tags(
        &mut self,
        src: &dyn StorageMap,
        regions: &RegionTable,
        disjoint: bool,
    ) -> usize;

    /// Second phase of a copy. Moves every reserved content into region `region_index` at
    /// `base` and copies its bytes.
    fn set_unfilled_tag_region(&mut self, base: Address, region_index: u32);

    /// Abandon a copy whose region could not be allocated.
    fn discard_unfilled_tags(&mut self);

    fn merge(&mut self, src: &dyn StorageMap, owner: u32);

    fn merge_disjoint(&mut self, src: &dyn StorageMap, owner: u32);

    /// Merge tags not yet valid here. Tags of `src` stamped with `old_camera_id` take their
    /// value from `master` (owned by `master_owner`) when `master` has one.
    fn switch_and_merge(
        &mut self,
        src: &dyn StorageMap,
        owner: u32,
        master: &dyn StorageMap,
        master_owner: u32,
        old_camera_id: u32,
    );

    /// Stamp every valid content with `camera_id`.
    fn update_camera_id(&mut self, camera_id: u32);

    /// Export valid tags into `out`. Property tags go into one blob under `property_blob_id`.
    /// Every tag is attempted; the first failure is returned.
    fn get_android_meta(
        &self,
        out: &mut CameraMetadata,
        filter: &ExportFilter,
        property_blob_id: Option<u32>,
    ) -> Result<()>;

    /// Visit every content in map order, valid or not.
    fn for_each_content(&self, f: &mut dyn FnMut(&Content));
}

impl_downcast!(StorageMap);

/// Place one copied content. Values that fit inline or into an already allocated region of
/// this buffer are copied now. Others are reserved at `*reserved` and the counter advances.
fn copy_or_reserve(dst: &mut Content, src: &Content, regions: &RegionTable, reserved: &mut usize) {
    let (Some(bytes), Some(source)) = (src.bytes(), src.address()) else {
        return;
    };
    dst.describe_as(src);
    dst.owner = None;
    if dst.fits_inline() {
        dst.write_inline(bytes);
        return;
    }
    if let Slot::Region { index, offset } = dst.slot {
        if let Some((base, size)) = regions.resolve(index) {
            if offset as usize + bytes.len() <= size {
                let target = base + offset as usize;
                // The source may already be this very slot if it was merged back from us.
                if target != source {
                    // SAFETY: the range lies inside an allocated region of this buffer.
                    unsafe { target.copy_from_slice(bytes) };
                }
                dst.payload = Payload::Local(target);
                return;
            }
        }
    }
    dst.slot = Slot::Reserved {
        offset: *reserved as u32,
        source,
    };
    dst.payload = Payload::Unset;
    *reserved += payload_footprint(src.max_size as usize);
}

fn fill_reserved(content: &mut Content, base: Address, region_index: u32) {
    if let Slot::Reserved { offset, source } = content.slot {
        let target = base + offset as usize;
        // SAFETY: the reservation covers `max_size >= size` bytes of the new region, and the
        // source is kept readable by the read lock the caller holds on the source buffer.
        unsafe { target.copy_from_slice(source.as_bytes(content.size as usize)) };
        content.slot = Slot::Region {
            index: region_index,
            offset,
        };
        content.payload = Payload::Local(target);
    }
}

fn discard_reserved(content: &mut Content) {
    if let Slot::Reserved { .. } = content.slot {
        content.slot = Slot::Unassigned;
        content.payload = Payload::Unset;
    }
}

fn switch_source<'a>(
    src: &'a Content,
    owner: u32,
    master: &'a dyn StorageMap,
    master_owner: u32,
    old_camera_id: u32,
) -> (&'a Content, u32) {
    if src.camera_id == Some(old_camera_id) {
        if let Some(replacement) = master.find(src.tag).filter(|c| c.is_valid()) {
            return (replacement, master_owner);
        }
    }
    (src, owner)
}

/// Keep the first error of a bulk operation.
pub(super) fn record(first_error: &mut Option<MetaError>, result: Result<()>) {
    if let Err(e) = result {
        warn!("{}", e);
        first_error.get_or_insert(e);
    }
}

fn export_content(out: &mut CameraMetadata, info: &TagInfo, content: &Content) -> Result<()> {
    let bytes = content.bytes().unwrap_or_default();
    out.update(content.tag, info.element_type, content.count, bytes)
        .map_err(|e| {
            MetaError::Failed(format!(
                "cannot export tag {:#x} ({}): {}",
                content.tag,
                info.full_name(),
                e
            ))
        })
}

/// Pack valid property contents, already in catalog index order, into the property blob.
fn export_properties(
    out: &mut CameraMetadata,
    catalog: &dyn TagCatalog,
    property_blob_id: Option<u32>,
    properties: &[&Content],
) -> Result<()> {
    if properties.is_empty() {
        return Ok(());
    }
    let Some(blob_id) = property_blob_id else {
        return Err(MetaError::NoSuch(format!(
            "no property blob tag to export {} properties",
            properties.len()
        )));
    };
    let values: Vec<PropertyValue> = properties
        .iter()
        .map(|c| PropertyValue {
            tag: c.tag,
            data: c.bytes().unwrap_or_default(),
        })
        .collect();
    let blob = pack_property_blob(catalog, &values)?;
    out.update(
        blob_id,
        crate::catalog::ElementType::Byte,
        blob.len() as u32,
        &blob,
    )
}
