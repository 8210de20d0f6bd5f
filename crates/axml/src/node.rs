//! XML tree node wire structures.
//!
//! Every namespace, element and CDATA chunk starts with a [`NodeHeader`]
//! followed by a type-specific extension record.

use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::attribute::RawValue;
use crate::header::ChunkHeader;

/// Header shared by all XML tree chunks (`ResXMLTree_node`).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct NodeHeader {
    pub header: ChunkHeader,
    /// Source line the node originated from.
    pub line_number: U32,
    /// String index of an attached comment, or `NO_INDEX`.
    pub comment: U32,
}

impl NodeHeader {
    /// Size of a tree node header in bytes.
    pub const SIZE: usize = 16;
}

/// Namespace start/end extension (`ResXMLTree_namespaceExt`).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct NamespaceExt {
    pub prefix: U32,
    pub uri: U32,
}

/// Start element extension (`ResXMLTree_attrExt`).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct StartElementExt {
    /// Element namespace uri string index, or `NO_INDEX`.
    pub namespace: U32,
    /// Element name string index.
    pub name: U32,
    /// Byte offset from the start of this extension to the first attribute.
    pub attribute_start: U16,
    /// Size of each attribute record.
    pub attribute_size: U16,
    pub attribute_count: U16,
    /// 1-based index of the `id` attribute, 0 if none.
    pub id_index: U16,
    /// 1-based index of the `class` attribute, 0 if none.
    pub class_index: U16,
    /// 1-based index of the `style` attribute, 0 if none.
    pub style_index: U16,
}

impl StartElementExt {
    /// Size of the start element extension in bytes.
    pub const SIZE: usize = 20;
}

/// End element extension (`ResXMLTree_endElementExt`).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct EndElementExt {
    pub namespace: U32,
    pub name: U32,
}

/// Character data extension (`ResXMLTree_cdataExt`).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct CDataExt {
    /// Raw character data string index.
    pub data: U32,
    pub typed_value: RawValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_layout() {
        assert_eq!(std::mem::size_of::<NodeHeader>(), NodeHeader::SIZE);
        assert_eq!(std::mem::size_of::<NamespaceExt>(), 8);
        assert_eq!(std::mem::size_of::<StartElementExt>(), StartElementExt::SIZE);
        assert_eq!(std::mem::size_of::<EndElementExt>(), 8);
        assert_eq!(std::mem::size_of::<CDataExt>(), 12);
    }
}
