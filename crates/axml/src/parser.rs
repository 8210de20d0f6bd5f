//! Binary XML decoder.
//!
//! Chunks are read one after another. Each chunk header declares the chunk's
//! total size, so the reader always knows where the next sibling starts, even
//! for chunk kinds it does not interpret.

use std::mem::size_of;

use axml_common::BinaryReader;
use tracing::debug;

use crate::attribute::{Attribute, RawAttribute, Value};
use crate::chunk::{CData, Chunk, EndTag, Namespace, StartTag, UnknownChunk};
use crate::file::ChunkFile;
use crate::header::{chunk_type, index_from_wire, ChunkHeader, StringPoolHeader};
use crate::node::{CDataExt, EndElementExt, NamespaceExt, NodeHeader, StartElementExt};
use crate::string_pool::{StringEncoding, StringPool};
use crate::{Error, Result};

/// Sequential reader over a run of chunks.
///
/// Yields one decoded [`Chunk`] per item. After the first error the reader
/// is exhausted; chunks yielded before it are complete and usable.
///
/// # Example
///
/// ```
/// use axml::{ChunkReader, Element, XmlCompiler, XmlDocument};
///
/// let file = XmlCompiler::default().compile(&XmlDocument::from(Element::new("Root")))?;
/// let bytes = file.to_bytes()?;
///
/// for chunk in ChunkReader::for_document(&bytes)? {
///     println!("{:#06x}", chunk?.chunk_type());
/// }
/// # Ok::<(), axml::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ChunkReader<'a> {
    reader: BinaryReader<'a>,
    /// Offset of `reader`'s data within the original buffer.
    base: usize,
    done: bool,
}

impl<'a> ChunkReader<'a> {
    /// Read a bare chunk sequence.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    fn with_base(data: &'a [u8], base: usize) -> Self {
        Self {
            reader: BinaryReader::new(data),
            base,
            done: false,
        }
    }

    /// Validate a binary XML file header and read the chunks it wraps.
    ///
    /// Bytes after the file chunk's declared size are ignored.
    pub fn for_document(data: &'a [u8]) -> Result<Self> {
        let header = check_header(data, 0)?;
        if header.chunk_type.get() != chunk_type::XML {
            return Err(Error::UnexpectedChunkType {
                offset: 0,
                expected: chunk_type::XML,
                actual: header.chunk_type.get(),
            });
        }
        let header_size = header.header_size.get() as usize;
        let size = header.size.get() as usize;
        Ok(Self::with_base(&data[header_size..size], header_size))
    }

    /// Offset of the next chunk within the original buffer.
    pub fn offset(&self) -> usize {
        self.base + self.reader.position()
    }

    fn read_chunk(&mut self) -> Result<Chunk> {
        let offset = self.offset();
        let header = check_header(self.reader.remaining_bytes(), offset)?;
        let bytes = self.reader.read_bytes(header.size.get() as usize)?;
        decode_chunk(&header, bytes, offset)
    }
}

impl Iterator for ChunkReader<'_> {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.reader.is_empty() {
            return None;
        }
        let chunk = self.read_chunk();
        self.done = chunk.is_err();
        Some(chunk)
    }
}

impl ChunkFile {
    /// Parse a binary XML document.
    ///
    /// The first chunk must be a `RES_XML_TYPE` file chunk. Every string
    /// reference is checked against the document's string pool.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let chunks = ChunkReader::for_document(data)?.collect::<Result<Vec<_>>>()?;
        let file = Self::new(chunks);
        file.validate()?;
        debug!(chunks = file.chunks().len(), "decoded binary XML document");
        Ok(file)
    }
}

/// Read and sanity-check the chunk header at the start of `data`.
fn check_header(data: &[u8], offset: usize) -> Result<ChunkHeader> {
    if data.len() < ChunkHeader::SIZE {
        return Err(Error::TruncatedChunk {
            offset,
            declared: ChunkHeader::SIZE,
            available: data.len(),
        });
    }
    let header: ChunkHeader = BinaryReader::new(data).read_struct()?;
    let header_size = header.header_size.get();
    let size = header.size.get();

    if (header_size as usize) < ChunkHeader::SIZE || u32::from(header_size) > size {
        return Err(Error::InvalidChunkHeader {
            offset,
            header_size,
            size,
        });
    }
    if size as usize > data.len() {
        return Err(Error::TruncatedChunk {
            offset,
            declared: size as usize,
            available: data.len(),
        });
    }
    Ok(header)
}

fn decode_chunk(header: &ChunkHeader, bytes: &[u8], offset: usize) -> Result<Chunk> {
    let header_size = header.header_size.get() as usize;
    match header.chunk_type.get() {
        chunk_type::STRING_POOL => decode_string_pool(bytes, offset).map(Chunk::StringPool),
        chunk_type::XML_RESOURCE_MAP => Ok(Chunk::ResourceMap(
            bytes[header_size..]
                .chunks_exact(4)
                .map(|id| u32::from_le_bytes([id[0], id[1], id[2], id[3]]))
                .collect(),
        )),
        chunk_type::XML_START_NAMESPACE => decode_namespace(bytes, offset).map(Chunk::StartNamespace),
        chunk_type::XML_END_NAMESPACE => decode_namespace(bytes, offset).map(Chunk::EndNamespace),
        chunk_type::XML_START_ELEMENT => decode_start_tag(bytes, offset).map(Chunk::StartTag),
        chunk_type::XML_END_ELEMENT => decode_end_tag(bytes, offset).map(Chunk::EndTag),
        chunk_type::XML_CDATA => decode_cdata(bytes, offset).map(Chunk::CData),
        other => {
            debug!(offset, size = bytes.len(), "skipping unknown chunk type {other:#06x}");
            Ok(Chunk::Unknown(UnknownChunk {
                chunk_type: other,
                header_size: header_size as u16,
                body: bytes[ChunkHeader::SIZE..].to_vec(),
            }))
        }
    }
}

/// Read the tree node header and return a reader positioned at the extension.
///
/// The chunk must hold the node header plus `ext_size` bytes of extension.
fn node_header<'a>(
    bytes: &'a [u8],
    offset: usize,
    ext_size: usize,
) -> Result<(NodeHeader, BinaryReader<'a>)> {
    if bytes.len() < NodeHeader::SIZE {
        return Err(Error::MalformedChunk {
            offset,
            reason: "chunk is shorter than a tree node header",
        });
    }
    let node: NodeHeader = BinaryReader::new(bytes).read_struct()?;
    let header_size = node.header.header_size.get() as usize;
    if header_size < NodeHeader::SIZE {
        return Err(Error::MalformedChunk {
            offset,
            reason: "tree node header is shorter than 16 bytes",
        });
    }
    if bytes.len() < header_size + ext_size {
        return Err(Error::MalformedChunk {
            offset,
            reason: "chunk is too short for its node record",
        });
    }
    Ok((node, BinaryReader::new_at(bytes, header_size)))
}

fn decode_namespace(bytes: &[u8], offset: usize) -> Result<Namespace> {
    let (node, mut ext_reader) = node_header(bytes, offset, size_of::<NamespaceExt>())?;
    let ext: NamespaceExt = ext_reader.read_struct()?;
    Ok(Namespace {
        line_number: node.line_number.get(),
        comment: index_from_wire(node.comment.get()),
        prefix: index_from_wire(ext.prefix.get()),
        uri: ext.uri.get(),
    })
}

fn decode_start_tag(bytes: &[u8], offset: usize) -> Result<StartTag> {
    let (node, mut ext_reader) = node_header(bytes, offset, StartElementExt::SIZE)?;
    let ext_start = ext_reader.position();
    let ext: StartElementExt = ext_reader.read_struct()?;

    let count = ext.attribute_count.get() as usize;
    let stride = ext.attribute_size.get() as usize;
    if count > 0 && stride < RawAttribute::SIZE {
        return Err(Error::MalformedChunk {
            offset,
            reason: "attribute records are shorter than 20 bytes",
        });
    }

    let first = ext_start + ext.attribute_start.get() as usize;
    let mut attributes = Vec::with_capacity(count);
    for i in 0..count {
        let raw: RawAttribute = BinaryReader::new_at(bytes, first + i * stride)
            .read_struct()
            .map_err(|_| Error::MalformedChunk {
                offset,
                reason: "attribute record runs past the end of the chunk",
            })?;
        attributes.push(Attribute::from_raw(&raw));
    }

    Ok(StartTag {
        line_number: node.line_number.get(),
        comment: index_from_wire(node.comment.get()),
        namespace: index_from_wire(ext.namespace.get()),
        name: ext.name.get(),
        attributes,
        id_index: ext.id_index.get(),
        class_index: ext.class_index.get(),
        style_index: ext.style_index.get(),
    })
}

fn decode_end_tag(bytes: &[u8], offset: usize) -> Result<EndTag> {
    let (node, mut ext_reader) = node_header(bytes, offset, size_of::<EndElementExt>())?;
    let ext: EndElementExt = ext_reader.read_struct()?;
    Ok(EndTag {
        line_number: node.line_number.get(),
        comment: index_from_wire(node.comment.get()),
        namespace: index_from_wire(ext.namespace.get()),
        name: ext.name.get(),
    })
}

fn decode_cdata(bytes: &[u8], offset: usize) -> Result<CData> {
    let (node, mut ext_reader) = node_header(bytes, offset, size_of::<CDataExt>())?;
    let ext: CDataExt = ext_reader.read_struct()?;
    Ok(CData {
        line_number: node.line_number.get(),
        comment: index_from_wire(node.comment.get()),
        data: ext.data.get(),
        typed_value: Value::from_raw(&ext.typed_value),
    })
}

fn decode_string_pool(bytes: &[u8], offset: usize) -> Result<StringPool> {
    let header: StringPoolHeader = BinaryReader::new(bytes).read_struct()?;
    let header_size = header.header.header_size.get() as usize;
    if header_size < StringPoolHeader::SIZE {
        return Err(Error::MalformedChunk {
            offset,
            reason: "string pool header is shorter than 28 bytes",
        });
    }

    let count = header.string_count.get() as usize;
    let style_count = header.style_count.get();
    let encoding = if header.flags.get() & StringPoolHeader::UTF8_FLAG != 0 {
        StringEncoding::Utf8
    } else {
        StringEncoding::Utf16
    };

    let mut table = BinaryReader::new_at(bytes, header_size);
    let offsets = (0..count)
        .map(|_| table.read_u32())
        .collect::<axml_common::Result<Vec<u32>>>()?;

    let strings_start = header.strings_start.get() as usize;
    let styles_start = header.styles_start.get() as usize;
    let strings_end = if style_count > 0 && styles_start > strings_start {
        styles_start
    } else {
        bytes.len()
    };
    if count > 0 && (strings_start > strings_end || strings_end > bytes.len()) {
        return Err(Error::MalformedChunk {
            offset,
            reason: "string data lies outside the string pool chunk",
        });
    }
    let data = if count > 0 { &bytes[strings_start..strings_end] } else { &[][..] };

    let mut pool = StringPool::new(encoding);
    for (index, &string_offset) in offsets.iter().enumerate() {
        let s = decode_string(data, string_offset as usize, encoding)
            .map_err(|_| Error::MalformedString { index })?;
        pool.push_decoded(s)?;
    }
    if style_count > 0 {
        debug!(offset, style_count, "ignoring string pool style spans");
    }
    Ok(pool)
}

fn read_utf8_len(reader: &mut BinaryReader<'_>) -> Result<usize> {
    let first = reader.read_u8()? as usize;
    if first & 0x80 != 0 {
        Ok(((first & 0x7F) << 8) | reader.read_u8()? as usize)
    } else {
        Ok(first)
    }
}

fn decode_string(data: &[u8], offset: usize, encoding: StringEncoding) -> Result<String> {
    let mut reader = BinaryReader::new_at(data, offset);
    match encoding {
        StringEncoding::Utf8 => {
            // UTF-16 length first, then the byte length we actually need
            read_utf8_len(&mut reader)?;
            let len = read_utf8_len(&mut reader)?;
            Ok(reader.read_string(len)?.to_owned())
        }
        StringEncoding::Utf16 => {
            let mut len = reader.read_u16()? as usize;
            if len & 0x8000 != 0 {
                len = ((len & 0x7FFF) << 16) | reader.read_u16()? as usize;
            }
            let units = reader.read_u16_units(len)?;
            Ok(String::from_utf16(&units)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walker::{Element, XmlDocument};
    use crate::{CompileOptions, XmlCompiler};

    const ANDROID_URI: &str = "http://schemas.android.com/apk/res/android";

    // Layout of `sample_bytes`:
    // file header 0..8, pool 8..128, namespace start 128..152,
    // start tag 152..208, end tag 208..232, namespace end 232..256
    const POOL_END: usize = 128;
    const START_TAG: usize = 152;

    fn sample() -> ChunkFile {
        let root = Element::new("Root")
            .attr("xmlns:android", ANDROID_URI)
            .attr("android:w", "-1");
        XmlCompiler::default().compile(&XmlDocument::from(root)).unwrap()
    }

    fn sample_bytes() -> Vec<u8> {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(bytes.len(), 256);
        bytes
    }

    fn set_u16(bytes: &mut [u8], at: usize, value: u16) {
        bytes[at..at + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn set_u32(bytes: &mut [u8], at: usize, value: u32) {
        bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Insert raw chunk bytes after the string pool and fix the file size.
    fn splice_after_pool(chunk: &[u8]) -> Vec<u8> {
        let mut bytes = sample_bytes();
        bytes.splice(POOL_END..POOL_END, chunk.iter().copied());
        let total = bytes.len() as u32;
        set_u32(&mut bytes, 4, total);
        bytes
    }

    #[test]
    fn test_round_trip_chunks() {
        let file = sample();
        let decoded = ChunkFile::parse(&file.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.chunks(), file.chunks());
    }

    #[test]
    fn test_round_trip_utf16() {
        let root = Element::new("Wurzel").attr("grüße", "日本語");
        let compiler = XmlCompiler::new(CompileOptions {
            encoding: StringEncoding::Utf16,
            ..CompileOptions::default()
        });
        let file = compiler.compile(&XmlDocument::from(root)).unwrap();
        let decoded = ChunkFile::parse(&file.to_bytes().unwrap()).unwrap();

        assert_eq!(decoded.chunks(), file.chunks());
        assert_eq!(decoded.string(2).unwrap(), "日本語");
    }

    #[test]
    fn test_decode_namespace_example() {
        let decoded = ChunkFile::parse(&sample_bytes()).unwrap();

        let namespaces: Vec<_> = decoded.namespaces().collect();
        assert_eq!(namespaces.len(), 1);
        assert_eq!(decoded.string(namespaces[0].uri).unwrap(), ANDROID_URI);
        assert_eq!(decoded.string(namespaces[0].prefix.unwrap()).unwrap(), "android");

        let tags: Vec<_> = decoded.start_tags().collect();
        assert_eq!(tags.len(), 1);
        assert_eq!(decoded.string(tags[0].name).unwrap(), "Root");

        let attr = &tags[0].attributes[0];
        assert_eq!(decoded.string(attr.name).unwrap(), "w");
        assert_eq!(attr.namespace, Some(namespaces[0].uri));
        assert_eq!(decoded.string(attr.raw_value.unwrap()).unwrap(), "-1");

        assert!(matches!(decoded.chunks()[3], Chunk::EndTag(ref end) if end.name == tags[0].name));
        assert!(matches!(decoded.chunks()[4], Chunk::EndNamespace(_)));
    }

    #[test]
    fn test_unknown_chunk_is_skipped() {
        let unknown = [0x77, 0x07, 0x08, 0x00, 0x0C, 0x00, 0x00, 0x00, 1, 2, 3, 4];
        let decoded = ChunkFile::parse(&splice_after_pool(&unknown)).unwrap();

        assert_eq!(decoded.chunks().len(), 6);
        assert_eq!(
            decoded.chunks()[1],
            Chunk::Unknown(UnknownChunk {
                chunk_type: 0x0777,
                header_size: 8,
                body: vec![1, 2, 3, 4],
            })
        );
        assert_eq!(decoded.start_tags().count(), 1);

        // Unknown chunks survive re-encoding
        let again = ChunkFile::parse(&decoded.to_bytes().unwrap()).unwrap();
        assert_eq!(again.chunks(), decoded.chunks());
    }

    #[test]
    fn test_resource_map() {
        let map = [
            0x80, 0x01, 0x08, 0x00, 0x10, 0x00, 0x00, 0x00, // header
            0x00, 0x00, 0x01, 0x01, // 0x01010000
            0xF4, 0x00, 0x01, 0x01, // 0x010100f4
        ];
        let decoded = ChunkFile::parse(&splice_after_pool(&map)).unwrap();
        assert_eq!(decoded.chunks()[1], Chunk::ResourceMap(vec![0x0101_0000, 0x0101_00F4]));
    }

    #[test]
    fn test_truncated_chunk() {
        let mut bytes = sample_bytes();
        set_u32(&mut bytes, START_TAG + 4, 0x1000);

        let result = ChunkFile::parse(&bytes);
        assert!(matches!(
            result,
            Err(Error::TruncatedChunk { offset: START_TAG, declared: 0x1000, available: 104 })
        ));
    }

    #[test]
    fn test_every_truncation_is_an_error() {
        let bytes = sample_bytes();
        for len in 0..bytes.len() {
            let result = ChunkFile::parse(&bytes[..len]);
            assert!(
                matches!(result, Err(Error::TruncatedChunk { .. })),
                "length {len}: {result:?}"
            );
        }
        assert!(ChunkFile::parse(&bytes).is_ok());
    }

    #[test]
    fn test_corrupted_bytes_never_panic() {
        let bytes = sample_bytes();
        for at in 0..bytes.len() {
            for value in [0x00, 0x7F, 0x80, 0xFF] {
                let mut corrupted = bytes.clone();
                corrupted[at] = value;
                let _ = ChunkFile::parse(&corrupted);
            }
        }
    }

    #[test]
    fn test_partial_read_keeps_earlier_chunks() {
        let bytes = sample_bytes();
        // Cut the start tag short
        let mut reader = ChunkReader::new(&bytes[8..200]);

        assert!(matches!(reader.next(), Some(Ok(Chunk::StringPool(_)))));
        assert!(matches!(reader.next(), Some(Ok(Chunk::StartNamespace(_)))));
        assert!(matches!(
            reader.next(),
            Some(Err(Error::TruncatedChunk { offset: 144, declared: 56, available: 48 }))
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_unexpected_file_chunk_type() {
        let mut bytes = sample_bytes();
        set_u16(&mut bytes, 0, chunk_type::STRING_POOL);

        assert!(matches!(
            ChunkFile::parse(&bytes),
            Err(Error::UnexpectedChunkType { offset: 0, expected: 0x0003, actual: 0x0001 })
        ));
    }

    #[test]
    fn test_invalid_header_size() {
        let mut bytes = sample_bytes();
        set_u16(&mut bytes, START_TAG + 2, 4);

        assert!(matches!(
            ChunkFile::parse(&bytes),
            Err(Error::InvalidChunkHeader { offset: START_TAG, header_size: 4, size: 56 })
        ));
    }

    #[test]
    fn test_string_index_out_of_range() {
        let mut bytes = sample_bytes();
        // Start tag name: node header (16) + namespace (4)
        set_u32(&mut bytes, START_TAG + 20, 99);

        assert!(matches!(
            ChunkFile::parse(&bytes),
            Err(Error::StringIndexOutOfRange { index: 99, count: 5 })
        ));
    }

    #[test]
    fn test_short_attribute_stride() {
        let mut bytes = sample_bytes();
        // attribute_size lives at ext + 10
        set_u16(&mut bytes, START_TAG + 16 + 10, 8);

        assert!(matches!(
            ChunkFile::parse(&bytes),
            Err(Error::MalformedChunk { offset: START_TAG, .. })
        ));
    }

    #[test]
    fn test_start_tag_shorter_than_node_header() {
        let start = [0x02, 0x01, 0x08, 0x00, 0x08, 0x00, 0x00, 0x00];

        assert!(matches!(
            ChunkFile::parse(&splice_after_pool(&start)),
            Err(Error::MalformedChunk { offset: POOL_END, .. })
        ));
    }

    #[test]
    fn test_start_tag_missing_extension() {
        let start = [
            0x02, 0x01, 0x10, 0x00, 0x18, 0x00, 0x00, 0x00, // header, size 24
            0x01, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, // line 1, no comment
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // 8 of 20 ext bytes
        ];

        assert!(matches!(
            ChunkFile::parse(&splice_after_pool(&start)),
            Err(Error::MalformedChunk { offset: POOL_END, .. })
        ));
    }

    #[test]
    fn test_end_namespace_missing_extension() {
        let mut bytes = sample_bytes();
        // Shrink the trailing namespace end to its node header
        set_u32(&mut bytes, 232 + 4, 16);
        bytes.truncate(248);
        set_u32(&mut bytes, 4, 248);

        assert!(matches!(
            ChunkFile::parse(&bytes),
            Err(Error::MalformedChunk { offset: 232, .. })
        ));
    }

    #[test]
    fn test_attributes_past_chunk_end() {
        let mut bytes = sample_bytes();
        // attribute_count lives at ext + 12
        set_u16(&mut bytes, START_TAG + 16 + 12, 5);

        assert!(matches!(
            ChunkFile::parse(&bytes),
            Err(Error::MalformedChunk { offset: START_TAG, .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_are_ignored() {
        let mut bytes = sample_bytes();
        bytes.extend_from_slice(&[0xEE; 12]);
        let decoded = ChunkFile::parse(&bytes).unwrap();
        assert_eq!(decoded.chunks(), sample().chunks());
    }
}
