//! Chunk header structures.

use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Chunk type tags.
pub mod chunk_type {
    /// String pool (`ResStringPool_header`).
    pub const STRING_POOL: u16 = 0x0001;
    /// Top-level binary XML document.
    pub const XML: u16 = 0x0003;
    /// Namespace scope start.
    pub const XML_START_NAMESPACE: u16 = 0x0100;
    /// Namespace scope end.
    pub const XML_END_NAMESPACE: u16 = 0x0101;
    /// Element start tag.
    pub const XML_START_ELEMENT: u16 = 0x0102;
    /// Element end tag.
    pub const XML_END_ELEMENT: u16 = 0x0103;
    /// Character data.
    pub const XML_CDATA: u16 = 0x0104;
    /// Attribute name to resource id map.
    pub const XML_RESOURCE_MAP: u16 = 0x0180;
}

/// Sentinel stored in 32-bit index fields that reference nothing.
pub const NO_INDEX: u32 = 0xFFFF_FFFF;

/// Convert an optional index into its wire representation.
#[inline]
pub(crate) fn index_to_wire(index: Option<u32>) -> u32 {
    index.unwrap_or(NO_INDEX)
}

/// Convert a wire index into an option, mapping the sentinel to `None`.
#[inline]
pub(crate) fn index_from_wire(raw: u32) -> Option<u32> {
    (raw != NO_INDEX).then_some(raw)
}

/// Common header at the start of every chunk (`ResChunk_header`).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct ChunkHeader {
    /// Chunk type tag, one of [`chunk_type`].
    pub chunk_type: U16,
    /// Size of the chunk header, including type-specific header fields.
    pub header_size: U16,
    /// Total chunk size: header plus payload.
    pub size: U32,
}

impl ChunkHeader {
    /// Size of the common header in bytes.
    pub const SIZE: usize = 8;

    /// Create a header.
    pub fn new(chunk_type: u16, header_size: u16, size: u32) -> Self {
        Self {
            chunk_type: U16::new(chunk_type),
            header_size: U16::new(header_size),
            size: U32::new(size),
        }
    }
}

/// String pool chunk header (`ResStringPool_header`).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct StringPoolHeader {
    pub header: ChunkHeader,
    /// Number of strings in the pool.
    pub string_count: U32,
    /// Number of style span arrays.
    pub style_count: U32,
    /// Pool flags, see [`StringPoolHeader::UTF8_FLAG`].
    pub flags: U32,
    /// Offset from the chunk start to the string data.
    pub strings_start: U32,
    /// Offset from the chunk start to the style data.
    pub styles_start: U32,
}

impl StringPoolHeader {
    /// Size of the string pool header in bytes.
    pub const SIZE: usize = 28;

    /// Strings are sorted.
    pub const SORTED_FLAG: u32 = 1 << 0;

    /// Strings are stored as UTF-8 instead of UTF-16.
    pub const UTF8_FLAG: u32 = 1 << 8;
}
