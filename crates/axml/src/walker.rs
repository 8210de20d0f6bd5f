//! Input tree and the depth-first traversal shared by both compiler passes.
//!
//! The compiler walks the tree twice. Both walks go through [`walk`] so they
//! visit elements, declarations and attributes in exactly the same order.

use crate::Result;

/// Attribute name prefix that declares a namespace.
pub const XMLNS_PREFIX: &str = "xmlns:";

/// Attribute name that declares the default namespace.
pub const XMLNS: &str = "xmlns";

/// A parsed XML document: the top-level nodes in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlDocument {
    pub nodes: Vec<XmlNode>,
}

/// A node of the input tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(Element),
    Text(String),
    Comment(String),
}

/// An element with its attributes in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified tag name as written.
    pub name: String,
    /// `(qualified name, value)` pairs, declarations included.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
    /// 1-based source line of the start tag, 0 if unknown.
    pub line: u32,
}

impl Element {
    /// Create an element with no attributes or children.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            line: 0,
        }
    }

    /// Add an attribute.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Add a child element.
    pub fn child(mut self, child: Element) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    /// Add any child node.
    pub fn node(mut self, node: XmlNode) -> Self {
        self.children.push(node);
        self
    }

    /// Set the source line.
    pub fn line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }
}

impl From<Element> for XmlDocument {
    fn from(root: Element) -> Self {
        Self {
            nodes: vec![XmlNode::Element(root)],
        }
    }
}

/// An attribute after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind<'a> {
    /// `xmlns:prefix="uri"`, or `xmlns="uri"` with an empty prefix.
    NamespaceDeclaration { prefix: &'a str, uri: &'a str },
    /// Any other attribute, split at the first `:`.
    Ordinary {
        prefix: Option<&'a str>,
        name: &'a str,
        value: &'a str,
    },
}

impl<'a> AttributeKind<'a> {
    /// Classify one attribute.
    pub fn classify(name: &'a str, value: &'a str) -> Self {
        if let Some(prefix) = name.strip_prefix(XMLNS_PREFIX) {
            return Self::NamespaceDeclaration { prefix, uri: value };
        }
        if name == XMLNS {
            return Self::NamespaceDeclaration { prefix: "", uri: value };
        }
        match name.split_once(':') {
            // A leading `:` is not a prefix; keep the name unqualified
            Some((prefix, local)) if !prefix.is_empty() => Self::Ordinary {
                prefix: Some(prefix),
                name: local,
                value,
            },
            _ => Self::Ordinary {
                prefix: None,
                name,
                value,
            },
        }
    }
}

/// A start tag as seen by a [`Visitor`].
#[derive(Debug, Clone)]
pub struct OpenTag<'a> {
    pub name: &'a str,
    pub line: u32,
    /// Every attribute, classified, in source order.
    pub attributes: Vec<AttributeKind<'a>>,
}

impl<'a> OpenTag<'a> {
    /// Namespace declarations in source order.
    pub fn declarations(&self) -> impl Iterator<Item = (&'a str, &'a str)> + '_ {
        self.attributes.iter().filter_map(|attr| match *attr {
            AttributeKind::NamespaceDeclaration { prefix, uri } => Some((prefix, uri)),
            AttributeKind::Ordinary { .. } => None,
        })
    }

    /// Ordinary attributes as `(prefix, name, value)` in source order.
    pub fn ordinary(&self) -> impl Iterator<Item = (Option<&'a str>, &'a str, &'a str)> + '_ {
        self.attributes.iter().filter_map(|attr| match *attr {
            AttributeKind::Ordinary { prefix, name, value } => Some((prefix, name, value)),
            AttributeKind::NamespaceDeclaration { .. } => None,
        })
    }
}

/// An end tag as seen by a [`Visitor`].
#[derive(Debug, Clone, Copy)]
pub struct CloseTag<'a> {
    pub name: &'a str,
    pub line: u32,
}

/// Callbacks invoked by [`walk`].
pub trait Visitor {
    /// Called when an element is entered, before its declarations.
    fn on_start_tag(&mut self, tag: &OpenTag<'_>) -> Result<()>;

    /// Called once per namespace declaration of the element just entered.
    fn on_namespace_declaration(&mut self, prefix: &str, uri: &str) -> Result<()>;

    /// Called after all children of an element have been visited.
    fn on_end_tag(&mut self, tag: &CloseTag<'_>) -> Result<()>;
}

/// Walk the document depth first, skipping text and comment nodes.
pub fn walk<V: Visitor + ?Sized>(document: &XmlDocument, visitor: &mut V) -> Result<()> {
    walk_nodes(&document.nodes, visitor)
}

fn walk_nodes<V: Visitor + ?Sized>(nodes: &[XmlNode], visitor: &mut V) -> Result<()> {
    for node in nodes {
        let element = match node {
            XmlNode::Element(element) => element,
            XmlNode::Text(_) | XmlNode::Comment(_) => continue,
        };

        let tag = OpenTag {
            name: &element.name,
            line: element.line,
            attributes: element
                .attributes
                .iter()
                .map(|(name, value)| AttributeKind::classify(name, value))
                .collect(),
        };
        visitor.on_start_tag(&tag)?;
        for (prefix, uri) in tag.declarations() {
            visitor.on_namespace_declaration(prefix, uri)?;
        }

        walk_nodes(&element.children, visitor)?;

        visitor.on_end_tag(&CloseTag {
            name: &element.name,
            line: element.line,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl Visitor for Recorder {
        fn on_start_tag(&mut self, tag: &OpenTag<'_>) -> Result<()> {
            self.events.push(format!("start {} ({} attrs)", tag.name, tag.attributes.len()));
            Ok(())
        }

        fn on_namespace_declaration(&mut self, prefix: &str, uri: &str) -> Result<()> {
            self.events.push(format!("ns {prefix}={uri}"));
            Ok(())
        }

        fn on_end_tag(&mut self, tag: &CloseTag<'_>) -> Result<()> {
            self.events.push(format!("end {}", tag.name));
            Ok(())
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            AttributeKind::classify("xmlns:android", "http://a"),
            AttributeKind::NamespaceDeclaration {
                prefix: "android",
                uri: "http://a"
            }
        );
        assert_eq!(
            AttributeKind::classify("xmlns", "http://d"),
            AttributeKind::NamespaceDeclaration { prefix: "", uri: "http://d" }
        );
        assert_eq!(
            AttributeKind::classify("android:layout_width", "-1"),
            AttributeKind::Ordinary {
                prefix: Some("android"),
                name: "layout_width",
                value: "-1"
            }
        );
        assert_eq!(
            AttributeKind::classify("xmlnsfoo", "1"),
            AttributeKind::Ordinary {
                prefix: None,
                name: "xmlnsfoo",
                value: "1"
            }
        );
        assert_eq!(
            AttributeKind::classify(":x", "1"),
            AttributeKind::Ordinary {
                prefix: None,
                name: ":x",
                value: "1"
            }
        );
    }

    #[test]
    fn test_walk_order_skips_text_and_comments() {
        let document = XmlDocument {
            nodes: vec![
                XmlNode::Comment("header".into()),
                XmlNode::Element(
                    Element::new("A")
                        .attr("xmlns:x", "urn:x")
                        .attr("x:k", "v")
                        .node(XmlNode::Text("hello".into()))
                        .child(Element::new("B"))
                        .node(XmlNode::Comment("note".into()))
                        .child(Element::new("C").attr("k", "1")),
                ),
            ],
        };

        let mut recorder = Recorder::default();
        walk(&document, &mut recorder).unwrap();

        assert_eq!(
            recorder.events,
            vec![
                "start A (2 attrs)",
                "ns x=urn:x",
                "start B (0 attrs)",
                "end B",
                "start C (1 attrs)",
                "end C",
                "end A",
            ]
        );
    }

    #[test]
    fn test_open_tag_partitions_attributes() {
        let tag = OpenTag {
            name: "A",
            line: 1,
            attributes: vec![
                AttributeKind::classify("a", "1"),
                AttributeKind::classify("xmlns:p", "urn:p"),
                AttributeKind::classify("p:b", "2"),
            ],
        };
        let ordinary: Vec<_> = tag.ordinary().collect();
        assert_eq!(ordinary, vec![(None, "a", "1"), (Some("p"), "b", "2")]);
        assert_eq!(tag.declarations().collect::<Vec<_>>(), vec![("p", "urn:p")]);
    }
}
