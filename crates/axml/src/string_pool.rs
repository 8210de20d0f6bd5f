//! Deduplicated string pool.
//!
//! Every string a document references (tag names, attribute names, values,
//! namespace prefixes and uris) is stored once. Indices are handed out in
//! first-seen order and each entry's byte offset is the encoded size of all
//! entries before it.

use std::collections::HashMap;
use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use zerocopy::byteorder::little_endian::U32;
use zerocopy::IntoBytes;

use crate::header::{chunk_type, ChunkHeader, StringPoolHeader};
use crate::{Error, Result};

/// Character encoding of the string data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StringEncoding {
    /// UTF-8 data with UTF-16 and UTF-8 length prefixes.
    #[default]
    Utf8,
    /// UTF-16LE data with a UTF-16 length prefix.
    Utf16,
}

/// Longest string a one- or two-byte UTF-8 length prefix can describe.
const MAX_UTF8_LEN: usize = 0x7FFF;

/// Longest string a one- or two-unit UTF-16 length prefix can describe.
const MAX_UTF16_LEN: usize = 0x7FFF_FFFF;

/// An ordered, deduplicated string table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringPool {
    encoding: StringEncoding,
    strings: Vec<String>,
    offsets: Vec<u32>,
    indices: HashMap<String, u32>,
    data_size: u32,
}

impl StringPool {
    /// Create an empty pool with the given encoding.
    pub fn new(encoding: StringEncoding) -> Self {
        Self {
            encoding,
            ..Self::default()
        }
    }

    /// Add a string if not already present and return its index.
    ///
    /// Adding a string that is already in the pool returns the index it was
    /// first given and leaves the pool unchanged.
    pub fn add(&mut self, s: &str) -> Result<u32> {
        if let Some(&index) = self.indices.get(s) {
            return Ok(index);
        }
        let index = self.push(s.to_owned())?;
        self.indices.insert(s.to_owned(), index);
        Ok(index)
    }

    /// Append a decoded entry, keeping duplicates so indices match the source.
    pub(crate) fn push_decoded(&mut self, s: String) -> Result<u32> {
        let index = self.push(s.clone())?;
        self.indices.entry(s).or_insert(index);
        Ok(index)
    }

    fn push(&mut self, s: String) -> Result<u32> {
        let index = u32::try_from(self.strings.len()).map_err(|_| Error::ChunkTooLarge)?;
        let size = encoded_len(&s, self.encoding)?;
        let offset = self.data_size;
        self.data_size = offset.checked_add(size).ok_or(Error::ChunkTooLarge)?;
        self.offsets.push(offset);
        self.strings.push(s);
        Ok(index)
    }

    /// Index of a string, if it has been added.
    pub fn index_of(&self, s: &str) -> Option<u32> {
        self.indices.get(s).copied()
    }

    /// String at an index.
    pub fn get(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }

    /// Byte offset of a string within the string data.
    pub fn offset(&self, index: u32) -> Option<u32> {
        self.offsets.get(index as usize).copied()
    }

    /// `(offset, string)` pairs in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (u32, &str)> + '_ {
        self.offsets
            .iter()
            .copied()
            .zip(self.strings.iter().map(String::as_str))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Check if the pool holds no strings.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Encoding used for the string data.
    pub fn encoding(&self) -> StringEncoding {
        self.encoding
    }

    /// Size of the encoded string data, before alignment padding.
    pub fn data_size(&self) -> u32 {
        self.data_size
    }

    /// Offset from the chunk start to the string data, 0 for an empty pool.
    fn strings_start(&self) -> u32 {
        if self.strings.is_empty() {
            0
        } else {
            (StringPoolHeader::SIZE + 4 * self.strings.len()) as u32
        }
    }

    /// Total size of the string pool chunk.
    pub fn chunk_size(&self) -> Result<u32> {
        let table = 4u64 * self.strings.len() as u64;
        let data = u64::from(align4(self.data_size)?);
        u32::try_from(StringPoolHeader::SIZE as u64 + table + data).map_err(|_| Error::ChunkTooLarge)
    }

    /// Write the string pool chunk.
    pub fn write_chunk<W: Write>(&self, writer: &mut W) -> Result<()> {
        let flags = match self.encoding {
            StringEncoding::Utf8 => StringPoolHeader::UTF8_FLAG,
            StringEncoding::Utf16 => 0,
        };
        let header = StringPoolHeader {
            header: ChunkHeader::new(
                chunk_type::STRING_POOL,
                StringPoolHeader::SIZE as u16,
                self.chunk_size()?,
            ),
            string_count: U32::new(self.strings.len() as u32),
            style_count: U32::new(0),
            flags: U32::new(flags),
            strings_start: U32::new(self.strings_start()),
            styles_start: U32::new(0),
        };
        writer.write_all(header.as_bytes())?;

        for &offset in &self.offsets {
            writer.write_u32::<LittleEndian>(offset)?;
        }
        for s in &self.strings {
            write_entry(writer, s, self.encoding)?;
        }
        for _ in self.data_size..align4(self.data_size)? {
            writer.write_u8(0)?;
        }
        Ok(())
    }
}

fn align4(size: u32) -> Result<u32> {
    size.checked_add(3).map(|s| s & !3).ok_or(Error::ChunkTooLarge)
}

/// Encoded size of one pool entry, including length prefixes and terminator.
pub(crate) fn encoded_len(s: &str, encoding: StringEncoding) -> Result<u32> {
    let units = s.encode_utf16().count();
    let size = match encoding {
        StringEncoding::Utf8 => {
            if units > MAX_UTF8_LEN || s.len() > MAX_UTF8_LEN {
                return Err(Error::StringTooLong { length: units.max(s.len()) });
            }
            utf8_prefix_len(units) + utf8_prefix_len(s.len()) + s.len() + 1
        }
        StringEncoding::Utf16 => {
            if units > MAX_UTF16_LEN {
                return Err(Error::StringTooLong { length: units });
            }
            let prefix = if units > 0x7FFF { 4 } else { 2 };
            units
                .checked_mul(2)
                .and_then(|data| data.checked_add(prefix + 2))
                .ok_or(Error::StringTooLong { length: units })?
        }
    };
    u32::try_from(size).map_err(|_| Error::StringTooLong { length: units })
}

fn utf8_prefix_len(len: usize) -> usize {
    if len > 0x7F {
        2
    } else {
        1
    }
}

fn write_utf8_len<W: Write>(writer: &mut W, len: usize) -> std::io::Result<()> {
    if len > 0x7F {
        writer.write_u8((((len >> 8) & 0x7F) | 0x80) as u8)?;
    }
    writer.write_u8((len & 0xFF) as u8)
}

fn write_entry<W: Write>(writer: &mut W, s: &str, encoding: StringEncoding) -> Result<()> {
    match encoding {
        StringEncoding::Utf8 => {
            write_utf8_len(writer, s.encode_utf16().count())?;
            write_utf8_len(writer, s.len())?;
            writer.write_all(s.as_bytes())?;
            writer.write_u8(0)?;
        }
        StringEncoding::Utf16 => {
            let units: Vec<u16> = s.encode_utf16().collect();
            if units.len() > 0x7FFF {
                writer.write_u16::<LittleEndian>((((units.len() >> 16) & 0x7FFF) | 0x8000) as u16)?;
            }
            writer.write_u16::<LittleEndian>((units.len() & 0xFFFF) as u16)?;
            for unit in units {
                writer.write_u16::<LittleEndian>(unit)?;
            }
            writer.write_u16::<LittleEndian>(0)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent() {
        let mut pool = StringPool::new(StringEncoding::Utf8);
        let a = pool.add("Root").unwrap();
        let b = pool.add("android").unwrap();
        let again = pool.add("Root").unwrap();

        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(again, a);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_offsets_follow_encoded_sizes() {
        let mut pool = StringPool::new(StringEncoding::Utf8);
        pool.add("Root").unwrap(); // 1 + 1 + 4 + 1
        pool.add("w").unwrap(); // 1 + 1 + 1 + 1
        pool.add("").unwrap(); // 1 + 1 + 0 + 1

        let entries: Vec<_> = pool.entries().collect();
        assert_eq!(entries, vec![(0, "Root"), (7, "w"), (11, "")]);
        assert_eq!(pool.data_size(), 14);
        // Entries are re-iterable
        assert_eq!(pool.entries().count(), 3);
    }

    #[test]
    fn test_utf16_offsets() {
        let mut pool = StringPool::new(StringEncoding::Utf16);
        pool.add("ab").unwrap(); // 2 + 4 + 2
        pool.add("c").unwrap();
        assert_eq!(pool.offset(1), Some(8));
        assert_eq!(pool.data_size(), 14);
    }

    #[test]
    fn test_long_utf8_uses_two_byte_lengths() {
        let long = "x".repeat(200);
        assert_eq!(encoded_len(&long, StringEncoding::Utf8).unwrap(), 2 + 2 + 200 + 1);

        let mut out = Vec::new();
        write_entry(&mut out, &long, StringEncoding::Utf8).unwrap();
        assert_eq!(&out[..4], &[0x80, 0xC8, 0x80, 0xC8]);
        assert_eq!(out.len(), 205);
    }

    #[test]
    fn test_non_ascii_lengths() {
        // 'é' is one UTF-16 unit and two UTF-8 bytes
        let mut out = Vec::new();
        write_entry(&mut out, "é", StringEncoding::Utf8).unwrap();
        assert_eq!(out, vec![0x01, 0x02, 0xC3, 0xA9, 0x00]);
    }

    #[test]
    fn test_string_too_long() {
        let huge = "x".repeat(MAX_UTF8_LEN + 1);
        let mut pool = StringPool::new(StringEncoding::Utf8);
        assert!(matches!(pool.add(&huge), Err(Error::StringTooLong { .. })));
        assert!(pool.is_empty());

        let mut pool = StringPool::new(StringEncoding::Utf16);
        assert!(pool.add(&huge).is_ok());
    }

    #[test]
    fn test_chunk_is_padded() {
        let mut pool = StringPool::new(StringEncoding::Utf8);
        pool.add("Root").unwrap();

        let mut out = Vec::new();
        pool.write_chunk(&mut out).unwrap();

        // header + one offset + 7 bytes of data padded to 8
        assert_eq!(pool.chunk_size().unwrap(), 28 + 4 + 8);
        assert_eq!(out.len(), 40);
        assert_eq!(&out[0..2], &[0x01, 0x00]);
        assert_eq!(&out[8..12], &[1, 0, 0, 0]); // string count
        assert_eq!(&out[16..20], &[0x00, 0x01, 0, 0]); // UTF-8 flag
        assert_eq!(&out[20..24], &[32, 0, 0, 0]); // strings start
        assert_eq!(&out[32..40], &[4, 4, b'R', b'o', b'o', b't', 0, 0]);
    }

    #[test]
    fn test_empty_pool_chunk() {
        let pool = StringPool::new(StringEncoding::Utf8);
        let mut out = Vec::new();
        pool.write_chunk(&mut out).unwrap();
        assert_eq!(out.len(), StringPoolHeader::SIZE);
        assert_eq!(&out[20..24], &[0, 0, 0, 0]);
    }
}
