//! Namespace bindings collected from `xmlns` declarations.
//!
//! Declarations are flattened: every binding found anywhere in the document
//! becomes one namespace start/end pair wrapping the whole element tree, no
//! matter which element declared it.

/// Prefix bound to [`XML_NAMESPACE_URI`] without any declaration.
pub const XML_PREFIX: &str = "xml";

/// Namespace of the reserved `xml` prefix.
pub const XML_NAMESPACE_URI: &str = "http://www.w3.org/XML/1998/namespace";

/// What to do with a qualified attribute whose prefix is never declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnboundPrefix {
    /// Fail the compile with [`Error::UnboundPrefix`](crate::Error::UnboundPrefix).
    #[default]
    Reject,
    /// Use namespace index 0, matching what older tooling emitted.
    Sentinel,
}

impl UnboundPrefix {
    /// Namespace index written under [`UnboundPrefix::Sentinel`].
    pub const SENTINEL_INDEX: u32 = 0;
}

/// A `prefix -> uri` binding, both as string pool indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceBinding {
    pub prefix: u32,
    pub uri: u32,
}

/// Bindings in the order they were declared.
#[derive(Debug, Clone, Default)]
pub struct NamespaceTable {
    bindings: Vec<(String, NamespaceBinding)>,
    /// Pool index of [`XML_NAMESPACE_URI`] once an `xml:` attribute is seen.
    xml_uri: Option<u32>,
}

impl NamespaceTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a binding. Declaring the same prefix and uri again is a no-op.
    pub fn declare(&mut self, prefix: &str, binding: NamespaceBinding) {
        if !self.bindings.iter().any(|(_, b)| *b == binding) {
            self.bindings.push((prefix.to_owned(), binding));
        }
    }

    /// Record the pool index of [`XML_NAMESPACE_URI`].
    ///
    /// The `xml` prefix is implicitly bound and never emits namespace chunks.
    pub fn bind_xml_prefix(&mut self, uri: u32) {
        self.xml_uri = Some(uri);
    }

    /// Uri string index bound to `prefix`.
    ///
    /// When a prefix was bound to several uris, the first binding wins. The
    /// reserved `xml` prefix always resolves to its fixed namespace.
    pub fn resolve(&self, prefix: &str) -> Option<u32> {
        if prefix == XML_PREFIX {
            return self.xml_uri;
        }
        self.bindings
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, binding)| binding.uri)
    }

    /// Bindings in declaration order.
    pub fn bindings(&self) -> impl DoubleEndedIterator<Item = &NamespaceBinding> + '_ {
        self.bindings.iter().map(|(_, binding)| binding)
    }

    /// Number of distinct bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if no namespace was declared.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
