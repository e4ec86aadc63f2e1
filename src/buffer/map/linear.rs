use super::*;
use crate::util::log::{debug, error};
use std::sync::Arc;

/// Dense storage: slot `i` holds the tag whose unique index is `i`.
pub struct LinearMap {
    table: Vec<Content>,
    catalog: Arc<dyn TagCatalog>,
}

impl LinearMap {
    /// Build one slot per catalog tag. Fails if the catalog has a hole in its index range.
    pub(crate) fn create(catalog: Arc<dyn TagCatalog>) -> Result<Self> {
        let total = catalog.total_tag_count();
        let table = (0..total)
            .map(|index| {
                catalog.info_by_index(index).map(Content::new).ok_or_else(|| {
                    error!("Catalog has no tag at index {} of {}", index, total);
                    MetaError::OutOfBounds(format!("no tag at index {}", index))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("Created a linear map of {} slots", table.len());
        Ok(LinearMap { table, catalog })
    }

    pub(crate) fn content_at(&self, index: usize) -> Option<&Content> {
        self.table.get(index)
    }

    pub(crate) fn len(&self) -> usize {
        self.table.len()
    }

    fn slot_of(&self, tag: u32) -> Option<usize> {
        self.catalog
            .unique_index(tag)
            .map(|index| index as usize)
            .filter(|index| *index < self.table.len())
    }

    /// Pair every slot with the same slot of `src`.
    fn zip_with<'a>(
        &'a mut self,
        src: &'a dyn StorageMap,
    ) -> impl Iterator<Item = (&'a mut Content, &'a Content)> {
        let src_table: &[Content] = match src.as_any().downcast_ref::<LinearMap>() {
            Some(src) => &src.table,
            None => {
                error!("A linear map can only compose with another linear map");
                &[]
            }
        };
        debug_assert!(src_table.is_empty() || src_table.len() == self.table.len());
        self.table.iter_mut().zip(src_table.iter())
    }
}

impl StorageMap for LinearMap {
    fn kind(&self) -> MapKind {
        MapKind::Linear
    }

    fn find(&self, tag: u32) -> Option<&Content> {
        self.slot_of(tag).map(|index| &self.table[index])
    }

    fn find_mut(&mut self, tag: u32) -> Option<&mut Content> {
        self.slot_of(tag).map(move |index| &mut self.table[index])
    }

    fn insert(&mut self, tag: u32) -> Option<&mut Content> {
        // Every catalog tag already has a slot.
        self.find_mut(tag)
    }

    fn reset(&mut self) {
        self.table.iter_mut().for_each(Content::invalidate);
    }

    fn count(&self) -> usize {
        self.table.iter().filter(|c| c.is_valid()).count()
    }

    fn copy_valid_and_reserve_unfilled_tags(
        &mut self,
        src: &dyn StorageMap,
        regions: &RegionTable,
        disjoint: bool,
    ) -> usize {
        let mut reserved = 0;
        for (dst, src) in self.zip_with(src) {
            if src.is_valid() && !(disjoint && dst.is_valid()) {
                copy_or_reserve(dst, src, regions, &mut reserved);
            }
        }
        reserved
    }

    fn set_unfilled_tag_region(&mut self, base: Address, region_index: u32) {
        for content in self.table.iter_mut() {
            fill_reserved(content, base, region_index);
        }
    }

    fn discard_unfilled_tags(&mut self) {
        self.table.iter_mut().for_each(discard_reserved);
    }

    fn merge(&mut self, src: &dyn StorageMap, owner: u32) {
        for (dst, src) in self.zip_with(src) {
            if src.is_valid() {
                dst.assign(src, owner);
            }
        }
    }

    fn merge_disjoint(&mut self, src: &dyn StorageMap, owner: u32) {
        for (dst, src) in self.zip_with(src) {
            if src.is_valid() && !dst.is_valid() {
                dst.assign(src, owner);
            }
        }
    }

    fn switch_and_merge(
        &mut self,
        src: &dyn StorageMap,
        owner: u32,
        master: &dyn StorageMap,
        master_owner: u32,
        old_camera_id: u32,
    ) {
        for (dst, src) in self.zip_with(src) {
            if src.is_valid() && !dst.is_valid() {
                let (value, value_owner) =
                    switch_source(src, owner, master, master_owner, old_camera_id);
                dst.assign(value, value_owner);
            }
        }
    }

    fn update_camera_id(&mut self, camera_id: u32) {
        for content in self.table.iter_mut().filter(|c| c.is_valid()) {
            content.camera_id = Some(camera_id);
        }
    }

    fn get_android_meta(
        &self,
        out: &mut CameraMetadata,
        filter: &ExportFilter,
        property_blob_id: Option<u32>,
    ) -> Result<()> {
        let properties = self.catalog.property_index_range();
        let split = (properties.start as usize).min(self.table.len());
        let mut first_error = None;

        for content in self.table[..split].iter().filter(|c| c.is_valid()) {
            match self.catalog.info_by_index(content.tag_index) {
                Some(info) if filter.exports(info) => {
                    record(&mut first_error, export_content(out, info, content))
                }
                Some(_) => {}
                None => record(
                    &mut first_error,
                    Err(MetaError::OutOfBounds(format!(
                        "no catalog entry for index {}",
                        content.tag_index
                    ))),
                ),
            }
        }

        if !filter.filter_properties {
            let valid: Vec<&Content> = self.table[split..].iter().filter(|c| c.is_valid()).collect();
            record(
                &mut first_error,
                export_properties(out, self.catalog.as_ref(), property_blob_id, &valid),
            );
        }

        first_error.map_or(Ok(()), Err)
    }

    fn for_each_content(&self, f: &mut dyn FnMut(&Content)) {
        self.table.iter().for_each(f);
    }
}
