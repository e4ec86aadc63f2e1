//! Copying and merging buffers.

use super::map::{MapKind, StorageMap};
use super::{MetaBuffer, Payload};
use crate::error::{MetaError, Result};
use crate::util::log::{debug, error, info};
use itertools::Itertools;
use std::sync::Arc;

/// Buffers whose regions hold foreign payloads of `map`, the map of buffer `source`, as
/// read by buffer `reader`. Neither `source` nor `reader` is listed: the first is linked
/// directly and the second owns its own memory.
pub(super) fn foreign_owners(map: &dyn StorageMap, source: u32, reader: u32) -> Vec<u32> {
    let mut owners = Vec::new();
    map.for_each_content(&mut |content| {
        if let (Payload::Foreign(_), Some(owner)) = (content.payload(), content.owner()) {
            if owner != source && owner != reader {
                owners.push(owner);
            }
        }
    });
    owners.into_iter().unique().collect()
}

impl MetaBuffer {
    /// Check `src` can be copied or merged into this buffer.
    pub(super) fn check_composable(&self, src: &MetaBuffer) -> Result<()> {
        if std::ptr::eq(self, src) {
            return Err(MetaError::InvalidArgument(format!(
                "buffer {:#x} cannot be composed with itself",
                self.unique_id
            )));
        }
        self.ensure_alive()?;
        src.ensure_alive()?;
        let (dst_kind, src_kind) = (self.map_kind(), src.map_kind());
        if dst_kind != src_kind {
            error!(
                "Cannot compose a {} map with a {} map",
                dst_kind, src_kind
            );
            return Err(MetaError::NotImplemented {
                dst: dst_kind,
                src: src_kind,
            });
        }
        if dst_kind == MapKind::Linear
            && self.catalog.total_tag_count() != src.catalog.total_tag_count()
        {
            return Err(MetaError::InvalidArgument(format!(
                "catalogs differ: {} tags vs {}",
                self.catalog.total_tag_count(),
                src.catalog.total_tag_count()
            )));
        }
        Ok(())
    }

    /// Copy the values of `src` into this buffer. With `disjoint`, values already set here are
    /// kept. Large values get their own memory here, so `src` is neither linked nor referenced.
    pub fn copy(&self, src: &MetaBuffer, disjoint: bool) -> Result<()> {
        self.check_composable(src)?;
        let mut map = self.map.write();
        let src_map = src.map.read();

        let needed = map.copy_valid_and_reserve_unfilled_tags(&**src_map, &self.regions, disjoint);
        if needed > 0 {
            match self.regions.reserve_and_allocate(needed) {
                Ok((index, base)) => map.set_unfilled_tag_region(base, index),
                Err(e) => {
                    error!(
                        "Buffer {:#x} cannot copy {:#x}: {}",
                        self.unique_id, src.unique_id, e
                    );
                    map.discard_unfilled_tags();
                    return Err(e);
                }
            }
        }
        debug!(
            "Buffer {:#x} copied {:#x} ({} new region bytes, disjoint: {})",
            self.unique_id, src.unique_id, needed, disjoint
        );
        Ok(())
    }

    /// Make this buffer read the values of `src`. With `disjoint`, values already set here
    /// are kept. `src` is linked and referenced until this buffer is reset.
    pub fn merge(&self, src: &Arc<MetaBuffer>, disjoint: bool) -> Result<()> {
        self.check_composable(src)?;
        let owners = {
            let mut map = self.map.write();
            let src_map = src.map.read();
            if disjoint {
                map.merge_disjoint(&**src_map, src.unique_id);
            } else {
                map.merge(&**src_map, src.unique_id);
            }
            foreign_owners(&**src_map, src.unique_id, self.unique_id)
        };
        self.link(src, &owners);
        debug!(
            "Buffer {:#x} merged {:#x} (disjoint: {})",
            self.unique_id, src.unique_id, disjoint
        );
        Ok(())
    }

    /// Merge `src`, taking the values `src` holds for camera `old_master` from the buffer of
    /// camera `new_master` instead. The camera buffers are found through the merge links of
    /// `src`. Without any multi-camera root this is a plain merge.
    pub fn merge_switching_camera(
        &self,
        src: &Arc<MetaBuffer>,
        old_master: u32,
        new_master: u32,
    ) -> Result<()> {
        self.check_composable(src)?;
        let root = match src.find_subtree_containing_camera_id() {
            Ok(root) => root,
            Err(MetaError::NoSuch(_)) => {
                info!(
                    "No multi-camera root reachable from buffer {:#x}, merging without switch",
                    src.unique_id
                );
                return self.merge(src, false);
            }
            Err(e) => return Err(e),
        };
        let master = root.camera_buffer(new_master).ok_or_else(|| {
            MetaError::InvalidArgument(format!("no buffer for camera {}", new_master))
        })?;
        if std::ptr::eq(&*master, self) {
            return Err(MetaError::InvalidArgument(format!(
                "camera {} resolves to buffer {:#x} itself",
                new_master, self.unique_id
            )));
        }
        let switched = !Arc::ptr_eq(&master, src);
        if switched {
            self.check_composable(&master)?;
        }

        let (src_owners, master_owners) = {
            let mut map = self.map.write();
            let src_map = src.map.read();
            if switched {
                let master_map = master.map.read();
                map.switch_and_merge(
                    &**src_map,
                    src.unique_id,
                    &**master_map,
                    master.unique_id,
                    old_master,
                );
                (
                    foreign_owners(&**src_map, src.unique_id, self.unique_id),
                    foreign_owners(&**master_map, master.unique_id, self.unique_id),
                )
            } else {
                map.switch_and_merge(
                    &**src_map,
                    src.unique_id,
                    &**src_map,
                    src.unique_id,
                    old_master,
                );
                (foreign_owners(&**src_map, src.unique_id, self.unique_id), Vec::new())
            }
        };
        self.link(src, &src_owners);
        if switched {
            self.link(&master, &master_owners);
        }
        debug!(
            "Buffer {:#x} merged {:#x} switching camera {} to {}",
            self.unique_id, src.unique_id, old_master, new_master
        );
        Ok(())
    }

    /// Link `buffer` and take a merge reference on it. Buffers whose memory `buffer` itself
    /// references, listed in `owners`, are linked as well, so every foreign payload here has
    /// its memory held by a link of this buffer.
    pub(super) fn link(&self, buffer: &Arc<MetaBuffer>, owners: &[u32]) {
        self.add_to_free_link(buffer.clone());
        buffer.add_buffer_reference(self);
        for owner in owners {
            match buffer.linked_buffer(*owner) {
                Some(indirect) => {
                    self.add_to_free_link(indirect.clone());
                    indirect.add_buffer_reference(self);
                }
                None => error!(
                    "Buffer {:#x} references {:#x} without a link to it",
                    buffer.unique_id, owner
                ),
            }
        }
    }
}
