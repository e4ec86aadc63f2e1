use super::*;
use crate::util::log::{debug, error};
use std::collections::hash_map::Entry;
use std::collections::HashMap as TagTable;
use std::sync::Arc;

/// Sparse storage keyed by tag id. Contents are boxed so inline payload addresses stay put
/// while the table grows.
pub struct HashMap {
    table: TagTable<u32, Box<Content>>,
    catalog: Arc<dyn TagCatalog>,
}

impl HashMap {
    pub(crate) fn create(catalog: Arc<dyn TagCatalog>) -> Self {
        debug!("Created an empty hash map");
        HashMap {
            table: TagTable::new(),
            catalog,
        }
    }

    /// Tags of all valid contents, in table order.
    pub(crate) fn valid_tags(&self) -> Vec<u32> {
        self.table
            .values()
            .filter(|c| c.is_valid())
            .map(|c| c.tag)
            .collect()
    }

    fn contents_of(src: &dyn StorageMap) -> impl Iterator<Item = &Content> {
        let table = match src.as_any().downcast_ref::<HashMap>() {
            Some(src) => Some(src.table.values()),
            None => {
                error!("A hash map can only compose with another hash map");
                None
            }
        };
        table.into_iter().flatten().map(|c| &**c)
    }

    fn valid_at(&self, tag: u32) -> bool {
        self.table.get(&tag).is_some_and(|c| c.is_valid())
    }
}

impl StorageMap for HashMap {
    fn kind(&self) -> MapKind {
        MapKind::Hash
    }

    fn find(&self, tag: u32) -> Option<&Content> {
        self.table.get(&tag).map(|c| &**c)
    }

    fn find_mut(&mut self, tag: u32) -> Option<&mut Content> {
        self.table.get_mut(&tag).map(|c| &mut **c)
    }

    fn insert(&mut self, tag: u32) -> Option<&mut Content> {
        match self.table.entry(tag) {
            Entry::Occupied(entry) => Some(&mut **entry.into_mut()),
            Entry::Vacant(entry) => {
                let info = self.catalog.info_by_tag(tag)?;
                Some(&mut **entry.insert(Box::new(Content::new(info))))
            }
        }
    }

    fn reset(&mut self) {
        self.table.values_mut().for_each(|c| c.invalidate());
    }

    fn count(&self) -> usize {
        self.table.values().filter(|c| c.is_valid()).count()
    }

    fn copy_valid_and_reserve_unfilled_tags(
        &mut self,
        src: &dyn StorageMap,
        regions: &RegionTable,
        disjoint: bool,
    ) -> usize {
        let mut reserved = 0;
        for src in Self::contents_of(src).filter(|c| c.is_valid()) {
            if disjoint && self.valid_at(src.tag) {
                continue;
            }
            // Inserting here gives a placeholder row to place the copy in.
            if let Some(dst) = self.insert(src.tag) {
                copy_or_reserve(dst, src, regions, &mut reserved);
            }
        }
        reserved
    }

    fn set_unfilled_tag_region(&mut self, base: Address, region_index: u32) {
        for content in self.table.values_mut() {
            fill_reserved(content, base, region_index);
        }
    }

    fn discard_unfilled_tags(&mut self) {
        self.table.values_mut().for_each(|c| discard_reserved(c));
    }

    fn merge(&mut self, src: &dyn StorageMap, owner: u32) {
        for src in Self::contents_of(src).filter(|c| c.is_valid()) {
            if let Some(dst) = self.insert(src.tag) {
                dst.assign(src, owner);
            }
        }
    }

    fn merge_disjoint(&mut self, src: &dyn StorageMap, owner: u32) {
        for src in Self::contents_of(src).filter(|c| c.is_valid()) {
            if self.valid_at(src.tag) {
                continue;
            }
            if let Some(dst) = self.insert(src.tag) {
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
        for src in Self::contents_of(src).filter(|c| c.is_valid()) {
            if self.valid_at(src.tag) {
                continue;
            }
            let (value, value_owner) =
                switch_source(src, owner, master, master_owner, old_camera_id);
            if let Some(dst) = self.insert(src.tag) {
                dst.assign(value, value_owner);
            }
        }
    }

    fn update_camera_id(&mut self, camera_id: u32) {
        for content in self.table.values_mut().filter(|c| c.is_valid()) {
            content.camera_id = Some(camera_id);
        }
    }

    fn get_android_meta(
        &self,
        out: &mut CameraMetadata,
        filter: &ExportFilter,
        property_blob_id: Option<u32>,
    ) -> Result<()> {
        let mut first_error = None;
        let mut properties = Vec::new();

        for content in self.table.values().filter(|c| c.is_valid()) {
            if self.catalog.is_property(content.tag) {
                properties.push(&**content);
                continue;
            }
            match self.catalog.info_by_tag(content.tag) {
                Some(info) if filter.exports(info) => {
                    record(&mut first_error, export_content(out, info, content))
                }
                Some(_) => {}
                None => record(
                    &mut first_error,
                    Err(MetaError::NoSuch(format!(
                        "no catalog entry for tag {:#x}",
                        content.tag
                    ))),
                ),
            }
        }

        if !filter.filter_properties {
            // Pack in catalog order so both backends produce the same blob.
            properties.sort_by_key(|c| c.tag_index);
            record(
                &mut first_error,
                export_properties(out, self.catalog.as_ref(), property_blob_id, &properties),
            );
        }

        first_error.map_or(Ok(()), Err)
    }

    fn for_each_content(&self, f: &mut dyn FnMut(&Content)) {
        self.table.values().for_each(|c| f(c));
    }
}
