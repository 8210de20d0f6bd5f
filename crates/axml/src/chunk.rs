//! In-memory chunk model and its serialization.
//!
//! A binary XML document is a sequence of self-describing chunks. Each one
//! starts with a [`ChunkHeader`] whose `size` covers the whole chunk, so the
//! size of every chunk is computed from its payload before anything is
//! written.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::IntoBytes;

use crate::attribute::{Attribute, RawAttribute, Value};
use crate::header::{chunk_type, index_to_wire, ChunkHeader};
use crate::node::{CDataExt, EndElementExt, NamespaceExt, NodeHeader, StartElementExt};
use crate::string_pool::StringPool;
use crate::{Error, Result};

/// One top-level chunk of a binary XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    StringPool(StringPool),
    /// Resource ids for the first attribute names in the string pool.
    ResourceMap(Vec<u32>),
    StartNamespace(Namespace),
    EndNamespace(Namespace),
    StartTag(StartTag),
    EndTag(EndTag),
    CData(CData),
    /// A chunk kind this crate does not interpret, kept byte for byte.
    Unknown(UnknownChunk),
}

/// Namespace start or end record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub line_number: u32,
    pub comment: Option<u32>,
    pub prefix: Option<u32>,
    pub uri: u32,
}

/// Element start record with its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag {
    pub line_number: u32,
    pub comment: Option<u32>,
    pub namespace: Option<u32>,
    pub name: u32,
    pub attributes: Vec<Attribute>,
    /// 1-based index of the `id` attribute, 0 if unset.
    pub id_index: u16,
    /// 1-based index of the `class` attribute, 0 if unset.
    pub class_index: u16,
    /// 1-based index of the `style` attribute, 0 if unset.
    pub style_index: u16,
}

/// Element end record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndTag {
    pub line_number: u32,
    pub comment: Option<u32>,
    pub namespace: Option<u32>,
    pub name: u32,
}

/// Character data record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CData {
    pub line_number: u32,
    pub comment: Option<u32>,
    pub data: u32,
    pub typed_value: Value,
}

/// Uninterpreted chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownChunk {
    pub chunk_type: u16,
    pub header_size: u16,
    /// Everything after the 8-byte common header.
    pub body: Vec<u8>,
}

const NAMESPACE_SIZE: u32 = (NodeHeader::SIZE + 8) as u32;
const END_TAG_SIZE: u32 = (NodeHeader::SIZE + 8) as u32;
const CDATA_SIZE: u32 = (NodeHeader::SIZE + 12) as u32;

impl Chunk {
    /// Chunk type tag written in the header.
    pub fn chunk_type(&self) -> u16 {
        match self {
            Chunk::StringPool(_) => chunk_type::STRING_POOL,
            Chunk::ResourceMap(_) => chunk_type::XML_RESOURCE_MAP,
            Chunk::StartNamespace(_) => chunk_type::XML_START_NAMESPACE,
            Chunk::EndNamespace(_) => chunk_type::XML_END_NAMESPACE,
            Chunk::StartTag(_) => chunk_type::XML_START_ELEMENT,
            Chunk::EndTag(_) => chunk_type::XML_END_ELEMENT,
            Chunk::CData(_) => chunk_type::XML_CDATA,
            Chunk::Unknown(chunk) => chunk.chunk_type,
        }
    }

    /// Total encoded size of this chunk, header included.
    pub fn size(&self) -> Result<u32> {
        let size = match self {
            Chunk::StringPool(pool) => return pool.chunk_size(),
            Chunk::ResourceMap(ids) => ChunkHeader::SIZE + 4 * ids.len(),
            Chunk::StartNamespace(_) | Chunk::EndNamespace(_) => return Ok(NAMESPACE_SIZE),
            Chunk::StartTag(tag) => {
                NodeHeader::SIZE + StartElementExt::SIZE + RawAttribute::SIZE * tag.attributes.len()
            }
            Chunk::EndTag(_) => return Ok(END_TAG_SIZE),
            Chunk::CData(_) => return Ok(CDATA_SIZE),
            Chunk::Unknown(chunk) => ChunkHeader::SIZE + chunk.body.len(),
        };
        u32::try_from(size).map_err(|_| Error::ChunkTooLarge)
    }

    /// String pool indices referenced by this chunk.
    pub fn string_refs(&self) -> Vec<u32> {
        let mut refs = Vec::new();
        match self {
            Chunk::StringPool(_) | Chunk::ResourceMap(_) | Chunk::Unknown(_) => {}
            Chunk::StartNamespace(ns) | Chunk::EndNamespace(ns) => {
                refs.extend(ns.comment);
                refs.extend(ns.prefix);
                refs.push(ns.uri);
            }
            Chunk::StartTag(tag) => {
                refs.extend(tag.comment);
                refs.extend(tag.namespace);
                refs.push(tag.name);
                for attr in &tag.attributes {
                    refs.extend(attr.namespace);
                    refs.push(attr.name);
                    refs.extend(attr.raw_value);
                    refs.extend(attr.typed_value.string_index());
                }
            }
            Chunk::EndTag(tag) => {
                refs.extend(tag.comment);
                refs.extend(tag.namespace);
                refs.push(tag.name);
            }
            Chunk::CData(cdata) => {
                refs.extend(cdata.comment);
                refs.push(cdata.data);
                refs.extend(cdata.typed_value.string_index());
            }
        }
        refs
    }

    /// Serialize this chunk.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let size = self.size()?;
        match self {
            Chunk::StringPool(pool) => pool.write_chunk(writer)?,
            Chunk::ResourceMap(ids) => {
                writer.write_all(
                    ChunkHeader::new(chunk_type::XML_RESOURCE_MAP, ChunkHeader::SIZE as u16, size)
                        .as_bytes(),
                )?;
                for &id in ids {
                    writer.write_u32::<LittleEndian>(id)?;
                }
            }
            Chunk::StartNamespace(ns) | Chunk::EndNamespace(ns) => {
                write_node_header(writer, self.chunk_type(), size, ns.line_number, ns.comment)?;
                let ext = NamespaceExt {
                    prefix: U32::new(index_to_wire(ns.prefix)),
                    uri: U32::new(ns.uri),
                };
                writer.write_all(ext.as_bytes())?;
            }
            Chunk::StartTag(tag) => {
                let attribute_count =
                    u16::try_from(tag.attributes.len()).map_err(|_| Error::ChunkTooLarge)?;
                write_node_header(writer, self.chunk_type(), size, tag.line_number, tag.comment)?;
                let ext = StartElementExt {
                    namespace: U32::new(index_to_wire(tag.namespace)),
                    name: U32::new(tag.name),
                    attribute_start: U16::new(StartElementExt::SIZE as u16),
                    attribute_size: U16::new(RawAttribute::SIZE as u16),
                    attribute_count: U16::new(attribute_count),
                    id_index: U16::new(tag.id_index),
                    class_index: U16::new(tag.class_index),
                    style_index: U16::new(tag.style_index),
                };
                writer.write_all(ext.as_bytes())?;
                for attr in &tag.attributes {
                    writer.write_all(attr.to_raw().as_bytes())?;
                }
            }
            Chunk::EndTag(tag) => {
                write_node_header(writer, self.chunk_type(), size, tag.line_number, tag.comment)?;
                let ext = EndElementExt {
                    namespace: U32::new(index_to_wire(tag.namespace)),
                    name: U32::new(tag.name),
                };
                writer.write_all(ext.as_bytes())?;
            }
            Chunk::CData(cdata) => {
                write_node_header(writer, self.chunk_type(), size, cdata.line_number, cdata.comment)?;
                let ext = CDataExt {
                    data: U32::new(cdata.data),
                    typed_value: cdata.typed_value.to_raw(),
                };
                writer.write_all(ext.as_bytes())?;
            }
            Chunk::Unknown(chunk) => {
                writer.write_all(ChunkHeader::new(chunk.chunk_type, chunk.header_size, size).as_bytes())?;
                writer.write_all(&chunk.body)?;
            }
        }
        Ok(())
    }
}

fn write_node_header<W: Write>(
    writer: &mut W,
    chunk_type: u16,
    size: u32,
    line_number: u32,
    comment: Option<u32>,
) -> Result<()> {
    let header = NodeHeader {
        header: ChunkHeader::new(chunk_type, NodeHeader::SIZE as u16, size),
        line_number: U32::new(line_number),
        comment: U32::new(index_to_wire(comment)),
    };
    writer.write_all(header.as_bytes())?;
    Ok(())
}
