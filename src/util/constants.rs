/// Payload bytes a content record stores inline. Tags whose declared maximum size fits are
/// never placed in a memory region.
pub const INLINE_CAPACITY: usize = 64;
/// Alignment of every payload placed in a memory region.
pub const PAYLOAD_ALIGNMENT: usize = 8;

/// Bound on the depth of a breadth-first walk over merge links.
pub const MAX_GRAPH_DEPTH: usize = 10;
/// Link slots preallocated by each buffer.
pub const DEFAULT_LINK_SLOTS: usize = 10;
/// Client slots preallocated by each buffer.
pub const DEFAULT_CLIENT_SLOTS: usize = 30;

/// High bit set in every buffer id, so buffer ids never collide with client ids handed out
/// by other subsystems.
pub const METABUFFER_ID_MASK: u32 = 0x8000_0000;
/// Camera id stored when a buffer or tag carries no camera annotation.
pub const INVALID_CAMERA_ID: u32 = u32::MAX;

/// Magic bytes starting a binary dump.
pub const DUMP_MAGIC: [u8; 4] = *b"META";
/// Binary dump format version.
pub const DUMP_VERSION: u32 = 0x0001_0000;

/// Section of the tag carrying packed property tags.
pub const PROPERTY_BLOB_SECTION: &str = "org.codeaurora.qcamera3.internal_private";
/// Name of the tag carrying packed property tags.
pub const PROPERTY_BLOB_NAME: &str = "private_property";
