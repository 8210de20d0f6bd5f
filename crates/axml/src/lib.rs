//! Android binary XML (AXML) compiler and decoder.
//!
//! Android packages ship their manifest and layout resources as binary XML:
//! a flat sequence of little-endian chunks holding a deduplicated string
//! pool, namespace scope records and element records whose attributes refer
//! to pool strings by index.
//!
//! This crate compiles an XML tree into that form with [`XmlCompiler`],
//! decodes binary documents into a [`ChunkFile`], and renders decoded
//! documents back to XML text.
//!
//! # Example
//!
//! ```
//! use axml::{ChunkFile, XmlCompiler};
//!
//! let xml = r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android"
//!     android:versionCode="1"/>"#;
//!
//! let bytes = XmlCompiler::default().compile_str(xml)?.to_bytes()?;
//! assert!(ChunkFile::is_axml(&bytes));
//!
//! let decoded = ChunkFile::parse(&bytes)?;
//! println!("{}", decoded.to_xml_string()?);
//! # Ok::<(), axml::Error>(())
//! ```

mod error;
mod header;
mod node;
mod attribute;
mod string_pool;
mod namespace;
mod chunk;
mod file;
mod walker;
mod compiler;
mod parser;
#[cfg(feature = "xml")]
mod from_xml;
#[cfg(feature = "xml")]
mod to_xml;

pub use error::{Error, Result};
pub use header::{chunk_type, ChunkHeader, StringPoolHeader, NO_INDEX};
pub use node::{CDataExt, EndElementExt, NamespaceExt, NodeHeader, StartElementExt};
pub use attribute::{Attribute, RawAttribute, RawValue, Value};
pub use string_pool::{StringEncoding, StringPool};
pub use namespace::{
    NamespaceBinding, NamespaceTable, UnboundPrefix, XML_NAMESPACE_URI, XML_PREFIX,
};
pub use chunk::{CData, Chunk, EndTag, Namespace, StartTag, UnknownChunk};
pub use file::ChunkFile;
pub use walker::{walk, AttributeKind, CloseTag, Element, OpenTag, Visitor, XmlDocument, XmlNode};
pub use compiler::{CompileOptions, XmlCompiler};
pub use parser::ChunkReader;
