//! Parse XML text into the compiler's input tree.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::walker::{Element, XmlDocument, XmlNode};
use crate::{Error, Result};

impl XmlDocument {
    /// Parse XML text.
    ///
    /// Elements record the 1-based line their start tag begins on.
    /// Whitespace-only text is dropped; other text, CDATA sections and
    /// comments are kept as nodes.
    ///
    /// # Example
    ///
    /// ```
    /// use axml::{XmlDocument, XmlNode};
    ///
    /// let xml = r#"<?xml version="1.0" encoding="utf-8"?>
    /// <LinearLayout xmlns:android="http://schemas.android.com/apk/res/android">
    ///     <TextView android:text="hi"/>
    /// </LinearLayout>"#;
    ///
    /// let document = XmlDocument::from_xml(xml)?;
    /// let XmlNode::Element(root) = &document.nodes[0] else { unreachable!() };
    /// assert_eq!(root.name, "LinearLayout");
    /// assert_eq!(root.line, 2);
    /// # Ok::<(), axml::Error>(())
    /// ```
    pub fn from_xml(xml: &str) -> Result<Self> {
        parse_document(xml)
    }

    /// Parse XML bytes, which must be UTF-8.
    pub fn from_xml_bytes(xml: &[u8]) -> Result<Self> {
        let xml_str = std::str::from_utf8(xml).map_err(Error::Utf8)?;
        Self::from_xml(xml_str)
    }
}

/// Incremental byte offset to line number mapping.
struct LineCounter<'a> {
    text: &'a [u8],
    scanned: usize,
    line: u32,
}

impl<'a> LineCounter<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text: text.as_bytes(),
            scanned: 0,
            line: 1,
        }
    }

    /// Line of `offset`. Offsets must not decrease between calls.
    fn line_at(&mut self, offset: usize) -> u32 {
        let end = offset.min(self.text.len());
        if end > self.scanned {
            let newlines = self.text[self.scanned..end].iter().filter(|&&b| b == b'\n').count();
            self.line += newlines as u32;
            self.scanned = end;
        }
        self.line
    }
}

fn element_from(start: &BytesStart<'_>, line: u32) -> Result<Element> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = Element::new(name).line(line);

    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| Error::Xml(e.to_string()))?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn push_node(stack: &mut [Element], nodes: &mut Vec<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => nodes.push(node),
    }
}

fn parse_document(xml: &str) -> Result<XmlDocument> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut lines = LineCounter::new(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut nodes: Vec<XmlNode> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::Xml(format!("XML parse error at byte {}: {e}", reader.error_position())))?;
        let end = reader.buffer_position() as usize;

        match event {
            Event::Start(e) => {
                // `<` + name and attributes + `>`
                let line = lines.line_at(end.saturating_sub(e.len() + 2));
                stack.push(element_from(&e, line)?);
            }
            Event::Empty(e) => {
                // `<` + name and attributes + `/>`
                let line = lines.line_at(end.saturating_sub(e.len() + 3));
                let element = element_from(&e, line)?;
                push_node(&mut stack, &mut nodes, XmlNode::Element(element));
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    push_node(&mut stack, &mut nodes, XmlNode::Element(element));
                }
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(|e| Error::Xml(e.to_string()))?;
                if !text.trim().is_empty() {
                    push_node(&mut stack, &mut nodes, XmlNode::Text(text.into_owned()));
                }
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                push_node(&mut stack, &mut nodes, XmlNode::Text(text));
            }
            Event::Comment(e) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                push_node(&mut stack, &mut nodes, XmlNode::Comment(text));
            }
            Event::Eof => break,
            _ => {} // declarations, processing instructions, doctype
        }
    }

    if let Some(open) = stack.last() {
        return Err(Error::Xml(format!("unclosed element <{}>", open.name)));
    }
    if !nodes.iter().any(|node| matches!(node, XmlNode::Element(_))) {
        return Err(Error::Xml("no root element found in XML".to_string()));
    }
    Ok(XmlDocument { nodes })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(document: &XmlDocument) -> &Element {
        document
            .nodes
            .iter()
            .find_map(|node| match node {
                XmlNode::Element(element) => Some(element),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_attributes_in_source_order() {
        let document = XmlDocument::from_xml(
            r#"<Root xmlns:android="http://schemas.android.com/apk/res/android" android:w="-1" id="a"/>"#,
        )
        .unwrap();
        let root = root(&document);

        assert_eq!(root.name, "Root");
        let names: Vec<_> = root.attributes.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["xmlns:android", "android:w", "id"]);
        assert_eq!(root.attributes[1].1, "-1");
    }

    #[test]
    fn test_nested_elements() {
        let xml = r#"<A>
            <B attr="1">
                <C/>
                <D attr="2"/>
            </B>
        </A>"#;
        let document = XmlDocument::from_xml(xml).unwrap();
        let a = root(&document);

        assert_eq!(a.children.len(), 1);
        let XmlNode::Element(b) = &a.children[0] else {
            panic!("expected element");
        };
        assert_eq!(b.name, "B");
        assert_eq!(b.children.len(), 2);
    }

    #[test]
    fn test_line_numbers() {
        let xml = "<?xml version=\"1.0\"?>\n<A>\n\n  <B\n    x=\"1\"/>\n  <C></C>\n</A>\n";
        let document = XmlDocument::from_xml(xml).unwrap();
        let a = root(&document);
        assert_eq!(a.line, 2);

        let lines: Vec<u32> = a
            .children
            .iter()
            .map(|node| match node {
                XmlNode::Element(element) => element.line,
                _ => 0,
            })
            .collect();
        assert_eq!(lines, vec![4, 6]);
    }

    #[test]
    fn test_entities_are_unescaped() {
        let document = XmlDocument::from_xml(r#"<A v="a &amp; b &lt;c&gt;"/>"#).unwrap();
        assert_eq!(root(&document).attributes[0].1, "a & b <c>");
    }

    #[test]
    fn test_text_and_comments_are_kept() {
        let xml = "<!-- top --><A>hello<!-- note --><![CDATA[raw <data>]]>\n  </A>";
        let document = XmlDocument::from_xml(xml).unwrap();

        assert_eq!(document.nodes[0], XmlNode::Comment(" top ".to_string()));
        assert_eq!(
            root(&document).children,
            vec![
                XmlNode::Text("hello".to_string()),
                XmlNode::Comment(" note ".to_string()),
                XmlNode::Text("raw <data>".to_string()),
            ]
        );
    }

    #[test]
    fn test_errors() {
        assert!(matches!(XmlDocument::from_xml(""), Err(Error::Xml(_))));
        assert!(matches!(XmlDocument::from_xml("<!-- only -->"), Err(Error::Xml(_))));
        assert!(matches!(XmlDocument::from_xml("<A><B></A>"), Err(Error::Xml(_))));
        assert!(matches!(XmlDocument::from_xml("<A>"), Err(Error::Xml(_))));
        assert!(matches!(XmlDocument::from_xml(r#"<A x="1" x="2"/>"#), Err(Error::Xml(_))));
    }

    #[test]
    fn test_from_bytes_rejects_invalid_utf8() {
        assert!(matches!(
            XmlDocument::from_xml_bytes(&[b'<', 0xFF, b'/', b'>']),
            Err(Error::Utf8(_))
        ));
    }
}
