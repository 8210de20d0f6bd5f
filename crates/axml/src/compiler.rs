//! Two-pass XML to binary XML compiler.
//!
//! Pass 1 walks the tree and fills a fresh [`StringPool`] and
//! [`NamespaceTable`]. Pass 2 walks the same tree again and builds the tag
//! chunks against the now frozen pool. Both passes share one traversal
//! ([`walk`]), so every string pass 2 looks up was registered by pass 1.

use tracing::{debug, warn};

use crate::attribute::{Attribute, Value};
use crate::chunk::{Chunk, EndTag, Namespace, StartTag};
use crate::file::ChunkFile;
use crate::namespace::{
    NamespaceBinding, NamespaceTable, UnboundPrefix, XML_NAMESPACE_URI, XML_PREFIX,
};
use crate::string_pool::{StringEncoding, StringPool};
use crate::walker::{walk, CloseTag, OpenTag, Visitor, XmlDocument};
use crate::{Error, Result};

/// Compiler configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Encoding of the string pool.
    pub encoding: StringEncoding,
    /// Handling of undeclared attribute prefixes.
    pub unbound_prefix: UnboundPrefix,
}

/// Compiles XML trees into binary XML chunk files.
///
/// # Example
///
/// ```
/// use axml::{Element, XmlCompiler, XmlDocument};
///
/// let root = Element::new("manifest")
///     .attr("xmlns:android", "http://schemas.android.com/apk/res/android")
///     .attr("android:versionCode", "1");
///
/// let file = XmlCompiler::default().compile(&XmlDocument::from(root))?;
/// let bytes = file.to_bytes()?;
/// assert_eq!(bytes.len(), file.size()? as usize);
/// # Ok::<(), axml::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct XmlCompiler {
    options: CompileOptions,
}

impl XmlCompiler {
    /// Create a compiler with the given options.
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    /// The options this compiler was created with.
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile a document into a chunk file.
    pub fn compile(&self, document: &XmlDocument) -> Result<ChunkFile> {
        // Pass 1: collect strings and namespace bindings
        let mut collector = Collector {
            pool: StringPool::new(self.options.encoding),
            namespaces: NamespaceTable::new(),
        };
        walk(document, &mut collector)?;
        let Collector { pool, namespaces } = collector;
        debug!(
            strings = pool.len(),
            namespaces = namespaces.len(),
            "collected string pool"
        );

        // Pass 2: build tag chunks
        let mut builder = Builder {
            pool: &pool,
            namespaces: &namespaces,
            unbound_prefix: self.options.unbound_prefix,
            tags: Vec::new(),
        };
        walk(document, &mut builder)?;
        let tags = builder.tags;
        debug!(tags = tags.len(), "built tag chunks");

        let namespace_chunk = |binding: &NamespaceBinding| Namespace {
            line_number: 0,
            comment: None,
            prefix: Some(binding.prefix),
            uri: binding.uri,
        };

        let mut chunks = Vec::with_capacity(1 + 2 * namespaces.len() + tags.len());
        chunks.push(Chunk::StringPool(pool));
        chunks.extend(
            namespaces
                .bindings()
                .map(|binding| Chunk::StartNamespace(namespace_chunk(binding))),
        );
        chunks.extend(tags);
        chunks.extend(
            namespaces
                .bindings()
                .rev()
                .map(|binding| Chunk::EndNamespace(namespace_chunk(binding))),
        );

        Ok(ChunkFile::new(chunks))
    }

    /// Parse XML text and compile it.
    #[cfg(feature = "xml")]
    pub fn compile_str(&self, xml: &str) -> Result<ChunkFile> {
        self.compile(&XmlDocument::from_xml(xml)?)
    }
}

/// Pass 1 visitor.
struct Collector {
    pool: StringPool,
    namespaces: NamespaceTable,
}

impl Visitor for Collector {
    fn on_start_tag(&mut self, tag: &OpenTag<'_>) -> Result<()> {
        self.pool.add(tag.name)?;

        for (prefix, uri) in tag.declarations() {
            self.pool.add(prefix)?;
            self.pool.add(uri)?;
        }

        for (prefix, name, value) in tag.ordinary() {
            self.pool.add(name)?;
            if let Some(prefix) = prefix {
                self.pool.add(prefix)?;
            }
            self.pool.add(value)?;
            if prefix == Some(XML_PREFIX) {
                let uri = self.pool.add(XML_NAMESPACE_URI)?;
                self.namespaces.bind_xml_prefix(uri);
            }
        }
        Ok(())
    }

    fn on_namespace_declaration(&mut self, prefix: &str, uri: &str) -> Result<()> {
        let binding = NamespaceBinding {
            prefix: self.pool.add(prefix)?,
            uri: self.pool.add(uri)?,
        };
        self.namespaces.declare(prefix, binding);
        Ok(())
    }

    fn on_end_tag(&mut self, tag: &CloseTag<'_>) -> Result<()> {
        self.pool.add(tag.name)?;
        Ok(())
    }
}

/// Pass 2 visitor.
struct Builder<'p> {
    pool: &'p StringPool,
    namespaces: &'p NamespaceTable,
    unbound_prefix: UnboundPrefix,
    tags: Vec<Chunk>,
}

impl Builder<'_> {
    fn index(&self, s: &str) -> u32 {
        match self.pool.index_of(s) {
            Some(index) => index,
            None => unreachable!("string {s:?} was not collected before the build pass"),
        }
    }

    fn resolve_prefix(&self, prefix: &str, element: &str) -> Result<u32> {
        if let Some(uri) = self.namespaces.resolve(prefix) {
            return Ok(uri);
        }
        match self.unbound_prefix {
            UnboundPrefix::Reject => Err(Error::UnboundPrefix {
                prefix: prefix.to_owned(),
                element: element.to_owned(),
            }),
            UnboundPrefix::Sentinel => {
                warn!(prefix, element, "undeclared namespace prefix");
                Ok(UnboundPrefix::SENTINEL_INDEX)
            }
        }
    }
}

impl Visitor for Builder<'_> {
    fn on_start_tag(&mut self, tag: &OpenTag<'_>) -> Result<()> {
        let mut attributes = Vec::new();
        for (prefix, name, value) in tag.ordinary() {
            let namespace = match prefix {
                Some(prefix) => Some(self.resolve_prefix(prefix, tag.name)?),
                None => None,
            };
            let value = self.index(value);
            attributes.push(Attribute {
                namespace,
                name: self.index(name),
                raw_value: Some(value),
                typed_value: Value::string(value),
            });
        }

        if attributes.len() > usize::from(u16::MAX) {
            return Err(Error::TooManyAttributes {
                element: tag.name.to_owned(),
                count: attributes.len(),
            });
        }

        self.tags.push(Chunk::StartTag(StartTag {
            line_number: tag.line,
            comment: None,
            namespace: None,
            name: self.index(tag.name),
            attributes,
            id_index: 0,
            class_index: 0,
            style_index: 0,
        }));
        Ok(())
    }

    fn on_namespace_declaration(&mut self, _prefix: &str, _uri: &str) -> Result<()> {
        // Namespace chunks are emitted once for the whole document
        Ok(())
    }

    fn on_end_tag(&mut self, tag: &CloseTag<'_>) -> Result<()> {
        self.tags.push(Chunk::EndTag(EndTag {
            line_number: tag.line,
            comment: None,
            namespace: None,
            name: self.index(tag.name),
        }));
        Ok(())
    }
}
