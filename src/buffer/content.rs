use crate::catalog::TagInfo;
use crate::util::constants::INLINE_CAPACITY;
use crate::util::Address;
use static_assertions::const_assert;

/// Where a content keeps its own bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    /// No storage assigned yet. Large tags get a region on first write.
    Unassigned,
    /// Bytes live inside the content record.
    InPlace,
    /// Bytes live at `offset` in region `index` of the owning buffer.
    Region { index: u32, offset: u32 },
    /// A copy is pending: `offset` in a region not allocated yet, filled from `source`.
    Reserved { offset: u32, source: Address },
}

/// Where the current value of a content is read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Payload {
    Unset,
    Inline,
    /// In a region of this buffer.
    Local(Address),
    /// In a region of another buffer this buffer holds a merge link to.
    Foreign(Address),
}

#[repr(C, align(8))]
#[derive(Clone, Copy)]
struct InlineBytes([u8; INLINE_CAPACITY]);

const_assert!(INLINE_CAPACITY % 8 == 0);

/// One metadata entry.
#[derive(Clone)]
pub struct Content {
    pub(crate) tag: u32,
    pub(crate) tag_index: u32,
    pub(crate) size: u32,
    pub(crate) count: u32,
    pub(crate) max_size: u32,
    pub(crate) slot: Slot,
    pub(crate) payload: Payload,
    /// Id of the buffer whose region holds a foreign payload.
    pub(crate) owner: Option<u32>,
    pub(crate) camera_id: Option<u32>,
    inline: InlineBytes,
}

impl Content {
    pub(crate) fn new(info: &TagInfo) -> Self {
        let fits_inline = info.max_size as usize <= INLINE_CAPACITY;
        Content {
            tag: info.tag,
            tag_index: info.index,
            size: 0,
            count: 0,
            max_size: info.max_size,
            slot: if fits_inline {
                Slot::InPlace
            } else {
                Slot::Unassigned
            },
            payload: Payload::Unset,
            owner: None,
            camera_id: None,
            inline: InlineBytes([0; INLINE_CAPACITY]),
        }
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn payload(&self) -> Payload {
        self.payload
    }

    pub fn owner(&self) -> Option<u32> {
        self.owner
    }

    pub fn camera_id(&self) -> Option<u32> {
        self.camera_id
    }

    pub fn is_valid(&self) -> bool {
        self.payload != Payload::Unset
    }

    pub fn fits_inline(&self) -> bool {
        self.max_size as usize <= INLINE_CAPACITY
    }

    pub fn address(&self) -> Option<Address> {
        match self.payload {
            Payload::Unset => None,
            Payload::Inline => Some(Address::from_ref(&self.inline)),
            Payload::Local(address) | Payload::Foreign(address) => Some(address),
        }
    }

    /// The current value.
    pub(crate) fn bytes(&self) -> Option<&[u8]> {
        match self.payload {
            Payload::Unset => None,
            Payload::Inline => Some(&self.inline.0[..self.size as usize]),
            // SAFETY: a local payload lies inside a region of the buffer holding this content,
            // a foreign one inside a region of a buffer kept alive by a merge link. Regions are
            // only freed when their buffer is dropped, and `size` never exceeds the bytes
            // available at the address.
            Payload::Local(address) | Payload::Foreign(address) => {
                Some(unsafe { address.as_bytes(self.size as usize) })
            }
        }
    }

    pub(crate) fn write_inline(&mut self, bytes: &[u8]) {
        debug_assert!(bytes.len() <= INLINE_CAPACITY);
        self.inline.0[..bytes.len()].copy_from_slice(bytes);
        self.slot = Slot::InPlace;
        self.payload = Payload::Inline;
    }

    /// Take the description of `src`, without its payload.
    pub(crate) fn describe_as(&mut self, src: &Content) {
        self.tag = src.tag;
        self.tag_index = src.tag_index;
        self.size = src.size;
        self.count = src.count;
        self.max_size = src.max_size;
        self.camera_id = src.camera_id;
    }

    /// Make this content read the value of `src`, which lives in buffer `owner`. Small values
    /// are copied, large ones are referenced. A value `src` itself references keeps its
    /// original owner.
    pub(crate) fn assign(&mut self, src: &Content, owner: u32) {
        debug_assert!(src.is_valid());
        self.describe_as(src);
        if src.fits_inline() {
            if let Some(bytes) = src.bytes() {
                self.write_inline(bytes);
            }
            self.owner = None;
        } else {
            self.payload = match src.address() {
                Some(address) => Payload::Foreign(address),
                None => Payload::Unset,
            };
            self.owner = match src.payload {
                Payload::Foreign(_) => src.owner.or(Some(owner)),
                _ => Some(owner),
            };
        }
    }

    /// Drop the value but keep the assigned storage, so the next frame reuses it.
    pub(crate) fn invalidate(&mut self) {
        self.size = 0;
        self.count = 0;
        self.payload = Payload::Unset;
        self.owner = None;
        self.camera_id = None;
        if let Slot::Reserved { .. } = self.slot {
            self.slot = Slot::Unassigned;
        }
    }
}

impl std::fmt::Debug for Content {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Content")
            .field("tag", &format_args!("{:#x}", self.tag))
            .field("size", &self.size)
            .field("count", &self.count)
            .field("max_size", &self.max_size)
            .field("slot", &self.slot)
            .field("payload", &self.payload)
            .field("owner", &self.owner)
            .field("camera_id", &self.camera_id)
            .finish()
    }
}
