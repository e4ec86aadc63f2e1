//! Multi-camera composition.
//!
//! A buffer combining the buffers of several cameras becomes the root of a subtree. It maps
//! each camera id to that camera's buffer and merges the primary camera's values. Buffers that
//! later merge the root, directly or through other buffers, find it again by walking their
//! merge links breadth first, so a tag can be read as seen by any camera of the set.

use super::{MapKind, MetaBuffer};
use crate::error::{MetaError, Result};
use crate::util::constants::{INVALID_CAMERA_ID, MAX_GRAPH_DEPTH};
use crate::util::log::{debug, error, trace, warn};
use crate::util::Address;
use itertools::Itertools;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

#[derive(Default)]
pub(crate) struct CameraState {
    /// Camera id to the buffer of that camera. Only a combining root has entries.
    buffers: BTreeMap<u32, Arc<MetaBuffer>>,
    /// The root found by the last successful search from this buffer.
    subtree_root: Option<Weak<MetaBuffer>>,
}

impl MetaBuffer {
    /// Make this buffer the root of the cameras `camera_ids`, whose values are in `buffers`.
    /// Each camera buffer is linked, referenced and stamped with its camera id. Values of
    /// `primary_camera_id` are merged into this buffer. A root can only be combined once per
    /// reset.
    pub fn combine_multi_camera_metadata(
        &self,
        camera_ids: &[u32],
        buffers: &[Arc<MetaBuffer>],
        primary_camera_id: u32,
    ) -> Result<()> {
        self.ensure_alive()?;
        if self.has_camera_map() {
            return Err(MetaError::InvalidState(format!(
                "buffer {:#x} already combines cameras",
                self.unique_id
            )));
        }
        self.check_camera_set(camera_ids, buffers, primary_camera_id)?;
        let Some(me) = self.handle() else {
            return Err(MetaError::InvalidState("buffer is being dropped".into()));
        };

        {
            let mut camera = self.camera.lock();
            if !camera.buffers.is_empty() {
                return Err(MetaError::InvalidState(format!(
                    "buffer {:#x} already combines cameras",
                    self.unique_id
                )));
            }
            camera.buffers = camera_ids.iter().copied().zip(buffers.iter().cloned()).collect();
            camera.subtree_root = Some(Arc::downgrade(&me));
        }

        let mut primary = None;
        for (camera_id, buffer) in camera_ids.iter().copied().zip(buffers) {
            self.link(buffer, &[]);
            buffer.set_camera_id(Some(camera_id));
            buffer.map.write().update_camera_id(camera_id);
            if camera_id == primary_camera_id {
                primary = Some(buffer);
            }
        }
        if let Some(primary) = primary {
            let owners = {
                let mut map = self.map.write();
                let primary_map = primary.map.read();
                map.merge_disjoint(&**primary_map, primary.unique_id);
                super::compose::foreign_owners(&**primary_map, primary.unique_id, self.unique_id)
            };
            for owner in owners {
                if let Some(indirect) = primary.linked_buffer(owner) {
                    self.link(&indirect, &[]);
                }
            }
        }
        debug!(
            "Buffer {:#x} combines cameras {:?}, primary {}",
            self.unique_id, camera_ids, primary_camera_id
        );
        Ok(())
    }

    fn check_camera_set(
        &self,
        camera_ids: &[u32],
        buffers: &[Arc<MetaBuffer>],
        primary_camera_id: u32,
    ) -> Result<()> {
        let invalid = |reason: String| {
            error!("Cannot combine cameras into {:#x}: {}", self.unique_id, reason);
            Err(MetaError::InvalidArgument(reason))
        };
        if camera_ids.is_empty() || camera_ids.len() != buffers.len() {
            return invalid(format!(
                "{} camera ids for {} buffers",
                camera_ids.len(),
                buffers.len()
            ));
        }
        if camera_ids.contains(&INVALID_CAMERA_ID) {
            return invalid("invalid camera id".into());
        }
        if let Some(duplicate) = camera_ids.iter().duplicates().next() {
            return invalid(format!("camera {} listed twice", duplicate));
        }
        if !camera_ids.contains(&primary_camera_id) {
            return invalid(format!("primary camera {} not listed", primary_camera_id));
        }
        let kind = self.map_kind();
        for buffer in buffers {
            if std::ptr::eq(&**buffer, self) {
                return invalid("a buffer cannot combine itself".into());
            }
            buffer.ensure_alive()?;
            let other: MapKind = buffer.map_kind();
            if other != kind {
                return Err(MetaError::NotImplemented {
                    dst: kind,
                    src: other,
                });
            }
        }
        Ok(())
    }

    pub fn has_camera_map(&self) -> bool {
        !self.camera.lock().buffers.is_empty()
    }

    /// The buffer of `camera_id`, if this buffer is a root combining it.
    pub fn camera_buffer(&self, camera_id: u32) -> Option<Arc<MetaBuffer>> {
        self.camera.lock().buffers.get(&camera_id).cloned()
    }

    /// Find the closest buffer combining cameras, walking merge links breadth first from this
    /// buffer. Fails with `NoSuch` if no such buffer is reachable and with `Failed` if the
    /// links go deeper than [`MAX_GRAPH_DEPTH`] without reaching one. The result is cached
    /// until reset.
    pub fn find_subtree_containing_camera_id(&self) -> Result<Arc<MetaBuffer>> {
        let cached = self.camera.lock().subtree_root.as_ref().and_then(Weak::upgrade);
        if let Some(root) = cached {
            return Ok(root);
        }
        let Some(me) = self.handle() else {
            return Err(MetaError::InvalidState("buffer is being dropped".into()));
        };

        let mut level = vec![me];
        for depth in 0..=MAX_GRAPH_DEPTH {
            if level.is_empty() {
                break;
            }
            if let Some(root) = level.iter().find(|b| b.has_camera_map()) {
                trace!(
                    "Buffer {:#x} found camera root {:#x} at depth {}",
                    self.unique_id,
                    root.unique_id,
                    depth
                );
                self.camera.lock().subtree_root = Some(Arc::downgrade(root));
                return Ok(root.clone());
            }
            level = level
                .iter()
                .flat_map(|b| b.linked_buffers())
                .unique_by(|b| b.unique_id)
                .collect();
        }

        if level.is_empty() {
            Err(MetaError::NoSuch(format!(
                "no camera root reachable from buffer {:#x}",
                self.unique_id
            )))
        } else {
            error!(
                "Merge links from buffer {:#x} go deeper than {}",
                self.unique_id, MAX_GRAPH_DEPTH
            );
            Err(MetaError::Failed(format!(
                "merge graph deeper than {}",
                MAX_GRAPH_DEPTH
            )))
        }
    }

    /// The buffer to read `tag` from as seen by `camera_id`. Values not stamped with a camera
    /// are read from this buffer.
    fn camera_source(&self, tag: u32, camera_id: u32) -> Option<Arc<MetaBuffer>> {
        let stamped = self
            .map
            .read()
            .find(tag)
            .is_some_and(|c| c.is_valid() && c.camera_id().is_some());
        if !stamped {
            return self.handle();
        }
        match self.find_subtree_containing_camera_id() {
            Ok(root) => root.camera_buffer(camera_id),
            Err(e) => {
                warn!(
                    "Reading tag {:#x} from buffer {:#x} for camera {}: {}",
                    tag, self.unique_id, camera_id, e
                );
                self.handle()
            }
        }
    }

    /// Address of `tag` as produced by camera `camera_id`.
    pub fn get_tag_by_camera_id(&self, tag: u32, camera_id: u32) -> Option<Address> {
        self.camera_source(tag, camera_id)?.get_tag(tag)
    }

    pub fn get_tag_bytes_by_camera_id(&self, tag: u32, camera_id: u32) -> Option<Vec<u8>> {
        self.camera_source(tag, camera_id)?.get_tag_bytes(tag)
    }
}
