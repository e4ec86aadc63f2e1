//! The framework-facing metadata container.
//!
//! Buffers export their tags into a [`CameraMetadata`] and import tags from one. The container
//! is an ordered list of `(tag, element type, count, bytes)` entries with a little endian byte
//! form:
//!
//! ```text
//! u32 entry count
//! per entry: u32 tag, u32 element type, u32 count, u32 byte length, bytes
//! ```

mod property;

pub use self::property::{pack_property_blob, unpack_property_blob, PropertyValue};

use crate::catalog::ElementType;
use crate::error::{MetaError, Result};

/// One entry of a [`CameraMetadata`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataEntry {
    pub tag: u32,
    pub element_type: ElementType,
    pub count: u32,
    pub data: Vec<u8>,
}

/// An ordered collection of metadata entries, at most one per tag.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CameraMetadata {
    entries: Vec<MetadataEntry>,
}

impl CameraMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        CameraMetadata {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Replace the entry of `tag`, or append one. `data` must hold exactly `count` elements.
    pub fn update(
        &mut self,
        tag: u32,
        element_type: ElementType,
        count: u32,
        data: &[u8],
    ) -> Result<()> {
        let expected = count as usize * element_type.unit_size();
        if data.len() != expected {
            return Err(MetaError::InvalidArgument(format!(
                "tag {:#x}: {} bytes do not hold {} x {}",
                tag,
                data.len(),
                count,
                element_type
            )));
        }
        let entry = MetadataEntry {
            tag,
            element_type,
            count,
            data: data.to_vec(),
        };
        match self.entries.iter_mut().find(|e| e.tag == tag) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        Ok(())
    }

    pub fn find(&self, tag: u32) -> Option<&MetadataEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    pub fn remove(&mut self, tag: u32) -> Option<MetadataEntry> {
        let position = self.entries.iter().position(|e| e.tag == tag)?;
        Some(self.entries.remove(position))
    }

    pub fn entries(&self) -> &[MetadataEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MetadataEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Order entries by tag id. Export order depends on the storage backend, so comparisons
    /// across backends sort first.
    pub fn sort_by_tag(&mut self) {
        self.entries.sort_by_key(|e| e.tag);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let payload: usize = self.entries.iter().map(|e| 16 + e.data.len()).sum();
        let mut out = Vec::with_capacity(4 + payload);
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for entry in &self.entries {
            out.extend_from_slice(&entry.tag.to_le_bytes());
            out.extend_from_slice(&(entry.element_type as u32).to_le_bytes());
            out.extend_from_slice(&entry.count.to_le_bytes());
            out.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
            out.extend_from_slice(&entry.data);
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let count = reader.read_u32()?;
        let mut metadata = CameraMetadata::with_capacity(count as usize);
        for _ in 0..count {
            let tag = reader.read_u32()?;
            let raw_type = reader.read_u32()?;
            let element_type = u8::try_from(raw_type)
                .ok()
                .and_then(ElementType::from_repr)
                .ok_or_else(|| {
                    MetaError::Failed(format!("tag {:#x}: unknown element type {}", tag, raw_type))
                })?;
            let element_count = reader.read_u32()?;
            let len = reader.read_u32()? as usize;
            let data = reader.read_bytes(len)?;
            metadata.update(tag, element_type, element_count, data)?;
        }
        Ok(metadata)
    }
}

impl<'a> IntoIterator for &'a CameraMetadata {
    type Item = &'a MetadataEntry;
    type IntoIter = std::slice::Iter<'a, MetadataEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Cursor over a little endian byte buffer.
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        ByteReader { bytes, position: 0 }
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .position
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                MetaError::Failed(format!(
                    "truncated input: need {} bytes at offset {}, have {}",
                    len,
                    self.position,
                    self.bytes.len()
                ))
            })?;
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        let raw = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_replaces_existing_entry() {
        let mut metadata = CameraMetadata::new();
        metadata.update(7, ElementType::Int32, 1, &1i32.to_le_bytes()).unwrap();
        metadata.update(7, ElementType::Int32, 2, &[0; 8]).unwrap();
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata.find(7).unwrap().count, 2);
    }

    #[test]
    fn update_rejects_mismatched_length() {
        let mut metadata = CameraMetadata::new();
        let result = metadata.update(7, ElementType::Int64, 1, &[0; 4]);
        assert!(matches!(result, Err(MetaError::InvalidArgument(_))));
        assert!(metadata.is_empty());
    }

    #[test]
    fn byte_form_is_little_endian() {
        let mut metadata = CameraMetadata::new();
        metadata.update(0x10, ElementType::Byte, 2, &[0xaa, 0xbb]).unwrap();
        let bytes = metadata.to_bytes();
        assert_eq!(
            bytes,
            vec![1, 0, 0, 0, 0x10, 0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0, 2, 0, 0, 0, 0xaa, 0xbb]
        );
        assert_eq!(CameraMetadata::from_bytes(&bytes).unwrap(), metadata);
    }

    #[test]
    fn truncated_input_fails() {
        let mut metadata = CameraMetadata::new();
        metadata.update(0x10, ElementType::Double, 1, &[0; 8]).unwrap();
        let bytes = metadata.to_bytes();
        let result = CameraMetadata::from_bytes(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(MetaError::Failed(_))));
    }

    #[test]
    fn unknown_element_type_fails() {
        let mut bytes = vec![1, 0, 0, 0];
        bytes.extend_from_slice(&[1, 0, 0, 0, 9, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            CameraMetadata::from_bytes(&bytes),
            Err(MetaError::Failed(_))
        ));
    }
}
