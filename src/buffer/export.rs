//! Conversion between buffers and [`CameraMetadata`] containers.

use super::map::record;
use super::{ExportFilter, MetaBuffer};
use crate::error::Result;
use crate::metadata::{unpack_property_blob, CameraMetadata};
use crate::util::log::debug;

impl MetaBuffer {
    /// Allocate every tag of `metadata` known to the catalog. The property blob is skipped,
    /// its properties are small and stored on first write.
    pub fn allocate_buffer_from_metadata(&self, metadata: &CameraMetadata) -> Result<()> {
        let tags: Vec<u32> = metadata
            .iter()
            .map(|entry| entry.tag)
            .filter(|tag| Some(*tag) != self.property_blob_id)
            .filter(|tag| self.catalog.info_by_tag(*tag).is_some())
            .collect();
        if tags.is_empty() {
            return Ok(());
        }
        self.allocate_buffer(&tags)
    }

    /// Write every entry of `metadata` into this buffer. The property blob is unpacked into
    /// its property tags. Every entry is attempted; the first failure is returned.
    pub fn set_tags_from_metadata(&self, metadata: &CameraMetadata) -> Result<()> {
        self.ensure_alive()?;
        let mut first_error = None;
        // Entries that cannot be allocated fail again, and are reported, when set.
        if let Err(e) = self.allocate_buffer_from_metadata(metadata) {
            debug!("Buffer {:#x}: allocation before import failed: {}", self.unique_id, e);
        }

        for entry in metadata {
            if Some(entry.tag) == self.property_blob_id {
                match unpack_property_blob(self.catalog.as_ref(), &entry.data) {
                    Ok(values) => {
                        for value in values {
                            record(&mut first_error, self.set_property(value.tag, value.data));
                        }
                    }
                    Err(e) => record(&mut first_error, Err(e)),
                }
            } else {
                record(
                    &mut first_error,
                    self.set_tag(entry.tag, &entry.data, entry.count),
                );
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn set_property(&self, tag: u32, data: &[u8]) -> Result<()> {
        let unit = self
            .catalog
            .info_by_tag(tag)
            .map_or(1, |info| info.element_type.unit_size());
        self.set_tag(tag, data, (data.len() / unit).max(1) as u32)
    }

    /// Export the valid tags of this buffer into `out`. Property tags are packed into the
    /// property blob. Every tag is attempted; the first failure is returned.
    pub fn get_android_meta(&self, out: &mut CameraMetadata, filter: &ExportFilter) -> Result<()> {
        self.map
            .read()
            .get_android_meta(out, filter, self.property_blob_id)
    }
}
