//! Packing of property tags into one opaque blob.
//!
//! The blob has the fixed size [`TagCatalog::property_blob_size`]:
//!
//! ```text
//! u32 property count
//! per property: u32 tag, max_size bytes of value (zero padded)
//! zero padding up to the fixed size
//! ```

use super::ByteReader;
use crate::catalog::TagCatalog;
use crate::error::{MetaError, Result};

/// The value of one property tag. `data` may be shorter than the tag's maximum size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropertyValue<'a> {
    pub tag: u32,
    pub data: &'a [u8],
}

fn property_max_size(catalog: &dyn TagCatalog, tag: u32) -> Result<usize> {
    match catalog.info_by_tag(tag) {
        Some(info) if catalog.is_property(tag) => Ok(info.max_size as usize),
        _ => Err(MetaError::Failed(format!("tag {:#x} is not a property tag", tag))),
    }
}

pub fn pack_property_blob(catalog: &dyn TagCatalog, values: &[PropertyValue]) -> Result<Vec<u8>> {
    if values.len() > catalog.property_tag_count() as usize {
        return Err(MetaError::Failed(format!(
            "{} properties exceed the {} the catalog declares",
            values.len(),
            catalog.property_tag_count()
        )));
    }
    let blob_size = catalog.property_blob_size();
    let mut blob = Vec::with_capacity(blob_size);
    blob.extend_from_slice(&(values.len() as u32).to_le_bytes());
    for value in values {
        let max_size = property_max_size(catalog, value.tag)?;
        if value.data.len() > max_size {
            return Err(MetaError::Failed(format!(
                "property {:#x}: {} bytes exceed max size {}",
                value.tag,
                value.data.len(),
                max_size
            )));
        }
        blob.extend_from_slice(&value.tag.to_le_bytes());
        blob.extend_from_slice(value.data);
        blob.resize(blob.len() + max_size - value.data.len(), 0);
    }
    debug_assert!(blob.len() <= blob_size);
    blob.resize(blob_size, 0);
    Ok(blob)
}

/// Split a blob produced by [`pack_property_blob`]. Each value spans the full maximum size
/// of its tag.
pub fn unpack_property_blob<'a>(
    catalog: &dyn TagCatalog,
    blob: &'a [u8],
) -> Result<Vec<PropertyValue<'a>>> {
    let mut reader = ByteReader::new(blob);
    let count = reader.read_u32()?;
    if count > catalog.property_tag_count() {
        return Err(MetaError::Failed(format!(
            "blob declares {} properties, the catalog has {}",
            count,
            catalog.property_tag_count()
        )));
    }
    (0..count)
        .map(|_| {
            let tag = reader.read_u32()?;
            let max_size = property_max_size(catalog, tag)?;
            let data = reader.read_bytes(max_size)?;
            Ok(PropertyValue { tag, data })
        })
        .collect()
}
