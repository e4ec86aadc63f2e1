//! The tag catalog.
//!
//! A catalog is the read-only table of every tag a buffer may hold. Buffers consult it for
//! the declared maximum size of a tag (which decides between inline and region storage), its
//! dense unique index (which addresses the slot of a linear map), its element type and its
//! visibility. The tags of the trailing index range are "property" tags, which are exported
//! packed into a single blob instead of one entry each.

use crate::error::{MetaError, Result};
use std::collections::HashMap;
use std::ops::{BitOr, Range};
use strum_macros::{Display, EnumString, FromRepr};

/// The element type of a tag. Counts of a tag are in units of its element type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, FromRepr)]
#[repr(u8)]
pub enum ElementType {
    Byte = 0,
    Int32 = 1,
    Float = 2,
    Int64 = 3,
    Double = 4,
    Rational = 5,
}

impl ElementType {
    /// Bytes per element.
    pub const fn unit_size(self) -> usize {
        match self {
            ElementType::Byte => 1,
            ElementType::Int32 | ElementType::Float => 4,
            ElementType::Int64 | ElementType::Double | ElementType::Rational => 8,
        }
    }
}

/// The consumers a tag section is visible to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct TagVisibility(u32);

impl TagVisibility {
    pub const NONE: Self = TagVisibility(0);
    pub const FRAMEWORK: Self = TagVisibility(1);
    pub const OEM: Self = TagVisibility(1 << 1);
    pub const ALL: Self = TagVisibility(Self::FRAMEWORK.0 | Self::OEM.0);

    pub const fn contains(self, other: TagVisibility) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_visible_to_framework(self) -> bool {
        self.contains(Self::FRAMEWORK)
    }
}

impl BitOr for TagVisibility {
    type Output = TagVisibility;
    fn bitor(self, other: TagVisibility) -> TagVisibility {
        TagVisibility(self.0 | other.0)
    }
}

/// Static description of one tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagInfo {
    pub tag: u32,
    pub section: String,
    pub name: String,
    pub element_type: ElementType,
    pub max_count: u32,
    /// `max_count` elements in bytes.
    pub max_size: u32,
    /// Dense index in `[0, total_tag_count)`.
    pub index: u32,
    pub visibility: TagVisibility,
}

impl TagInfo {
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.section, self.name)
    }
}

/// Resolves tag ids from their section and tag names.
pub trait VendorTagLocator {
    fn resolve_location(&self, section: &str, name: &str) -> Option<u32>;
}

/// A read-only table of tag descriptions, shared by all buffers created against it.
pub trait TagCatalog: VendorTagLocator + Send + Sync {
    fn info_by_tag(&self, tag: u32) -> Option<&TagInfo>;

    fn info_by_index(&self, index: u32) -> Option<&TagInfo>;

    fn total_tag_count(&self) -> u32;

    /// Number of property tags. They occupy the trailing index range.
    fn property_tag_count(&self) -> u32;

    fn unique_index(&self, tag: u32) -> Option<u32> {
        self.info_by_tag(tag).map(|info| info.index)
    }

    fn property_index_range(&self) -> Range<u32> {
        let total = self.total_tag_count();
        total.saturating_sub(self.property_tag_count())..total
    }

    fn is_property(&self, tag: u32) -> bool {
        self.unique_index(tag)
            .is_some_and(|index| self.property_index_range().contains(&index))
    }

    /// Byte size of a packed property blob: a `u32` count, then a `u32` tag id and the
    /// `max_size` value bytes of every property tag.
    fn property_blob_size(&self) -> usize {
        let values: usize = self
            .property_index_range()
            .filter_map(|index| self.info_by_index(index))
            .map(|info| 4 + info.max_size as usize)
            .sum();
        4 + values
    }
}

struct PendingTag {
    tag: u32,
    section: String,
    name: String,
    element_type: ElementType,
    max_count: u32,
    visibility: TagVisibility,
}

/// Builds a [`StaticTagCatalog`]. Standard tags get indices in the order they are added,
/// property tags follow them.
#[derive(Default)]
pub struct StaticTagCatalogBuilder {
    standard: Vec<PendingTag>,
    properties: Vec<PendingTag>,
}

impl StaticTagCatalogBuilder {
    pub fn tag(
        mut self,
        tag: u32,
        section: &str,
        name: &str,
        element_type: ElementType,
        max_count: u32,
        visibility: TagVisibility,
    ) -> Self {
        self.standard.push(PendingTag {
            tag,
            section: section.to_owned(),
            name: name.to_owned(),
            element_type,
            max_count,
            visibility,
        });
        self
    }

    pub fn property(
        mut self,
        tag: u32,
        section: &str,
        name: &str,
        element_type: ElementType,
        max_count: u32,
    ) -> Self {
        self.properties.push(PendingTag {
            tag,
            section: section.to_owned(),
            name: name.to_owned(),
            element_type,
            max_count,
            visibility: TagVisibility::OEM,
        });
        self
    }

    pub fn build(self) -> Result<StaticTagCatalog> {
        let property_count = self.properties.len() as u32;
        let mut infos = Vec::with_capacity(self.standard.len() + self.properties.len());
        let mut by_tag = HashMap::new();
        let mut locations = HashMap::new();

        for pending in self.standard.into_iter().chain(self.properties) {
            if pending.max_count == 0 {
                return Err(MetaError::InvalidArgument(format!(
                    "tag {:#x} declares zero elements",
                    pending.tag
                )));
            }
            let index = infos.len() as u32;
            if by_tag.insert(pending.tag, index).is_some() {
                return Err(MetaError::InvalidArgument(format!(
                    "tag {:#x} registered twice",
                    pending.tag
                )));
            }
            let info = TagInfo {
                tag: pending.tag,
                max_size: pending.max_count * pending.element_type.unit_size() as u32,
                section: pending.section,
                name: pending.name,
                element_type: pending.element_type,
                max_count: pending.max_count,
                index,
                visibility: pending.visibility,
            };
            locations.insert(info.full_name(), info.tag);
            infos.push(info);
        }

        Ok(StaticTagCatalog {
            infos,
            by_tag,
            locations,
            property_count,
        })
    }
}

/// A catalog fixed at build time.
pub struct StaticTagCatalog {
    infos: Vec<TagInfo>,
    by_tag: HashMap<u32, u32>,
    locations: HashMap<String, u32>,
    property_count: u32,
}

impl StaticTagCatalog {
    pub fn builder() -> StaticTagCatalogBuilder {
        StaticTagCatalogBuilder::default()
    }
}

impl VendorTagLocator for StaticTagCatalog {
    fn resolve_location(&self, section: &str, name: &str) -> Option<u32> {
        self.locations.get(&format!("{}.{}", section, name)).copied()
    }
}

impl TagCatalog for StaticTagCatalog {
    fn info_by_tag(&self, tag: u32) -> Option<&TagInfo> {
        self.by_tag
            .get(&tag)
            .and_then(|index| self.infos.get(*index as usize))
    }

    fn info_by_index(&self, index: u32) -> Option<&TagInfo> {
        self.infos.get(index as usize)
    }

    fn total_tag_count(&self) -> u32 {
        self.infos.len() as u32
    }

    fn property_tag_count(&self) -> u32 {
        self.property_count
    }
}
