//! Binary XML document: the ordered top-level chunk sequence.

use std::io::Write;

use zerocopy::IntoBytes;

use crate::chunk::{Chunk, Namespace, StartTag};
use crate::header::{chunk_type, ChunkHeader};
use crate::string_pool::StringPool;
use crate::{Error, Result};

/// A binary XML document.
///
/// On disk this is a single `RES_XML_TYPE` chunk whose payload is the
/// sequence of [`Chunk`]s: the string pool first, then namespace and tag
/// chunks in document order.
#[derive(Debug, Clone, Default)]
pub struct ChunkFile {
    chunks: Vec<Chunk>,
}

impl ChunkFile {
    /// Size of the file-level chunk header.
    pub const HEADER_SIZE: usize = ChunkHeader::SIZE;

    /// Create a document from its chunks.
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    /// Check if data starts with a binary XML file header.
    pub fn is_axml(data: &[u8]) -> bool {
        data.len() >= Self::HEADER_SIZE
            && u16::from_le_bytes([data[0], data[1]]) == chunk_type::XML
            && u16::from_le_bytes([data[2], data[3]]) as usize == Self::HEADER_SIZE
    }

    /// The chunks in document order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Consume the document, returning its chunks.
    pub fn into_chunks(self) -> Vec<Chunk> {
        self.chunks
    }

    /// The document's string pool, if it has one.
    pub fn string_pool(&self) -> Option<&StringPool> {
        self.chunks.iter().find_map(|chunk| match chunk {
            Chunk::StringPool(pool) => Some(pool),
            _ => None,
        })
    }

    /// Look up a string pool entry.
    pub fn string(&self, index: u32) -> Result<&str> {
        let pool = self.string_pool();
        pool.and_then(|pool| pool.get(index))
            .ok_or_else(|| Error::StringIndexOutOfRange {
                index,
                count: pool.map_or(0, StringPool::len),
            })
    }

    /// Namespace start chunks in document order.
    pub fn namespaces(&self) -> impl Iterator<Item = &Namespace> + '_ {
        self.chunks.iter().filter_map(|chunk| match chunk {
            Chunk::StartNamespace(ns) => Some(ns),
            _ => None,
        })
    }

    /// Start tag chunks in document order.
    pub fn start_tags(&self) -> impl Iterator<Item = &StartTag> + '_ {
        self.chunks.iter().filter_map(|chunk| match chunk {
            Chunk::StartTag(tag) => Some(tag),
            _ => None,
        })
    }

    /// Total encoded size: the file header plus every chunk.
    pub fn size(&self) -> Result<u32> {
        self.chunks
            .iter()
            .try_fold(Self::HEADER_SIZE as u32, |total, chunk| {
                total.checked_add(chunk.size()?).ok_or(Error::ChunkTooLarge)
            })
    }

    /// Check that every string reference is inside the string pool.
    pub fn validate(&self) -> Result<()> {
        let count = self.string_pool().map_or(0, StringPool::len);
        for chunk in &self.chunks {
            if let Some(&index) = chunk.string_refs().iter().find(|&&i| i as usize >= count) {
                return Err(Error::StringIndexOutOfRange { index, count });
            }
        }
        Ok(())
    }

    /// Serialize the document.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let header = ChunkHeader::new(chunk_type::XML, Self::HEADER_SIZE as u16, self.size()?);
        writer.write_all(header.as_bytes())?;
        for chunk in &self.chunks {
            chunk.write(writer)?;
        }
        Ok(())
    }

    /// Serialize the document into a new buffer of exactly [`size`](Self::size) bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let size = self.size()? as usize;
        let mut output = Vec::with_capacity(size);
        self.write_to(&mut output)?;
        debug_assert_eq!(output.len(), size);
        Ok(output)
    }

    /// Serialize the document into `buffer`, returning the number of bytes written.
    ///
    /// Nothing is written when the buffer is smaller than the document.
    pub fn encode_into(&self, buffer: &mut [u8]) -> Result<usize> {
        let size = self.size()? as usize;
        if buffer.len() < size {
            return Err(Error::BufferTooSmall {
                needed: size,
                available: buffer.len(),
            });
        }
        let mut target = &mut buffer[..size];
        self.write_to(&mut target)?;
        Ok(size)
    }
}
