//! Error types for binary XML compiling and decoding.

use thiserror::Error;

/// Errors that can occur when compiling, encoding or decoding binary XML.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] axml_common::Error),

    /// A qualified attribute uses a prefix that no `xmlns:` attribute declares.
    #[error("namespace prefix '{prefix}' used on <{element}> is not declared")]
    UnboundPrefix { prefix: String, element: String },

    /// The destination buffer cannot hold the encoded document.
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// A chunk declares more bytes than remain in the buffer.
    #[error("chunk at {offset:#x} declares {declared} bytes but only {available} remain")]
    TruncatedChunk {
        offset: usize,
        declared: usize,
        available: usize,
    },

    /// A specific chunk kind was required at a fixed position.
    #[error("expected chunk type {expected:#06x} at {offset:#x}, got {actual:#06x}")]
    UnexpectedChunkType { offset: usize, expected: u16, actual: u16 },

    /// A chunk header is internally inconsistent.
    #[error("invalid chunk header at {offset:#x}: header size {header_size}, total size {size}")]
    InvalidChunkHeader {
        offset: usize,
        header_size: u16,
        size: u32,
    },

    /// A chunk's payload layout is inconsistent with its header.
    #[error("malformed chunk at {offset:#x}: {reason}")]
    MalformedChunk { offset: usize, reason: &'static str },

    /// A string reference points past the end of the string pool.
    #[error("string index {index} out of range (string pool size: {count})")]
    StringIndexOutOfRange { index: u32, count: usize },

    /// A string pool entry could not be decoded.
    #[error("malformed string pool entry {index}")]
    MalformedString { index: usize },

    /// A string is too long for the pool's length prefix.
    #[error("string of {length} code units exceeds the string pool length limit")]
    StringTooLong { length: usize },

    /// An element has more attributes than the start tag count field holds.
    #[error("<{element}> has {count} attributes, at most 65535 are supported")]
    TooManyAttributes { element: String, count: usize },

    /// The encoded document does not fit the 32-bit size fields.
    #[error("chunk exceeds the 4 GiB size limit")]
    ChunkTooLarge,

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// UTF-16 decoding error.
    #[error("UTF-16 error: {0}")]
    Utf16(#[from] std::string::FromUtf16Error),

    /// XML parsing or writing error.
    #[error("XML error: {0}")]
    Xml(String),
}

/// Result type for binary XML operations.
pub type Result<T> = std::result::Result<T, Error>;
