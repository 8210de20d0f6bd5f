//! Render a binary XML document back to XML text.

use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::debug;

use crate::attribute::{Attribute, Value};
use crate::chunk::Chunk;
use crate::file::ChunkFile;
use crate::namespace::{XML_NAMESPACE_URI, XML_PREFIX};
use crate::{Error, Result};

/// Dimension units, indexed by the low four bits of a complex value.
const DIMENSION_UNITS: [&str; 6] = ["px", "dip", "sp", "pt", "in", "mm"];

/// Fraction units, indexed by the low four bits of a complex value.
const FRACTION_UNITS: [&str; 2] = ["%", "%p"];

const RADIX_MULTIPLIERS: [f32; 4] = [
    1.0 / (1u32 << 8) as f32,
    1.0 / (1u32 << 15) as f32,
    1.0 / (1u32 << 23) as f32,
    1.0 / (1u32 << 31) as f32,
];

fn complex_to_float(data: u32) -> f32 {
    let mantissa = (data & 0xFFFF_FF00) as i32;
    mantissa as f32 * RADIX_MULTIPLIERS[((data >> 4) & 0x3) as usize]
}

fn complex_unit(data: u32, units: &[&'static str]) -> &'static str {
    units.get((data & 0xF) as usize).copied().unwrap_or("")
}

/// Text form of a value that does not reference the string pool.
fn format_typed(value: Value) -> String {
    let data = value.data;
    match value.data_type {
        Value::TYPE_NULL => String::new(),
        Value::TYPE_REFERENCE => format!("@0x{data:08x}"),
        Value::TYPE_ATTRIBUTE => format!("?0x{data:08x}"),
        Value::TYPE_FLOAT => f32::from_bits(data).to_string(),
        Value::TYPE_DIMENSION => {
            format!("{}{}", complex_to_float(data), complex_unit(data, &DIMENSION_UNITS))
        }
        Value::TYPE_FRACTION => {
            format!("{}{}", complex_to_float(data) * 100.0, complex_unit(data, &FRACTION_UNITS))
        }
        Value::TYPE_INT_DEC => (data as i32).to_string(),
        Value::TYPE_INT_HEX => format!("0x{data:x}"),
        Value::TYPE_INT_BOOLEAN => (data != 0).to_string(),
        Value::TYPE_FIRST_COLOR_INT..=Value::TYPE_LAST_COLOR_INT => format!("#{data:08x}"),
        other => format!("0x{data:08x} (type {other:#04x})"),
    }
}

/// Namespace bindings in scope while rendering.
#[derive(Default)]
struct Scopes {
    /// `(prefix, uri)` string indices, innermost last.
    bindings: Vec<(Option<u32>, u32)>,
    /// Started since the last start tag, written as `xmlns` attributes on it.
    pending: Vec<(Option<u32>, u32)>,
}

impl Scopes {
    fn start(&mut self, prefix: Option<u32>, uri: u32) {
        self.bindings.push((prefix, uri));
        self.pending.push((prefix, uri));
    }

    fn end(&mut self, prefix: Option<u32>, uri: u32) {
        if let Some(pos) = self.bindings.iter().rposition(|&b| b == (prefix, uri)) {
            self.bindings.remove(pos);
        }
    }

    fn prefix_for(&self, uri: u32) -> Option<u32> {
        self.bindings
            .iter()
            .rev()
            .find(|&&(_, bound)| bound == uri)
            .and_then(|&(prefix, _)| prefix)
    }
}

impl ChunkFile {
    /// Render the document as indented XML text.
    ///
    /// Namespace declarations are written on the element that follows their
    /// start chunk. A prefix is declared at most once per element; for a
    /// prefix bound to several uris only the first binding is kept.
    pub fn to_xml_string(&self) -> Result<String> {
        let mut output = Vec::new();
        self.write_xml(&mut output)?;
        String::from_utf8(output).map_err(|e| Error::Xml(e.to_string()))
    }

    /// Write the document as indented XML text.
    ///
    /// Namespace chunks become `xmlns` attributes on the next start tag and
    /// attribute names get the prefix bound to their namespace uri. Values
    /// come from the raw value string when present, otherwise from the typed
    /// value.
    pub fn write_xml<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut xml_writer = Writer::new_with_indent(writer, b' ', 4);

        xml_writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(|e| Error::Xml(e.to_string()))?;

        let mut scopes = Scopes::default();
        let mut chunks = self.chunks().iter().peekable();

        while let Some(chunk) = chunks.next() {
            match chunk {
                Chunk::StartNamespace(ns) => scopes.start(ns.prefix, ns.uri),
                Chunk::EndNamespace(ns) => scopes.end(ns.prefix, ns.uri),
                Chunk::StartTag(tag) => {
                    let name = self.qualified_name(&scopes, tag.namespace, tag.name)?;
                    let mut elem = BytesStart::new(name);

                    // One declaration per prefix; later rebindings of a
                    // prefix already declared on this tag are dropped
                    let mut declared: Vec<String> = Vec::new();
                    for (prefix, uri) in scopes.pending.drain(..) {
                        let key = match prefix.map(|p| self.string(p)).transpose()? {
                            Some(prefix) if !prefix.is_empty() => format!("xmlns:{prefix}"),
                            _ => "xmlns".to_string(),
                        };
                        if declared.contains(&key) {
                            debug!("dropping repeated {key} declaration");
                            continue;
                        }
                        elem.push_attribute((key.as_str(), self.string(uri)?));
                        declared.push(key);
                    }
                    for attr in &tag.attributes {
                        let key = self.qualified_name(&scopes, attr.namespace, attr.name)?;
                        let value = self.attribute_value(attr)?;
                        elem.push_attribute((key.as_str(), value.as_str()));
                    }

                    // A start tag directly followed by its end tag is self-closing
                    let event = if matches!(chunks.peek(), Some(Chunk::EndTag(_))) {
                        chunks.next();
                        Event::Empty(elem)
                    } else {
                        Event::Start(elem)
                    };
                    xml_writer
                        .write_event(event)
                        .map_err(|e| Error::Xml(e.to_string()))?;
                }
                Chunk::EndTag(tag) => {
                    let name = self.qualified_name(&scopes, tag.namespace, tag.name)?;
                    xml_writer
                        .write_event(Event::End(BytesEnd::new(name)))
                        .map_err(|e| Error::Xml(e.to_string()))?;
                }
                Chunk::CData(cdata) => {
                    let text = self.string(cdata.data)?;
                    xml_writer
                        .write_event(Event::Text(BytesText::new(text)))
                        .map_err(|e| Error::Xml(e.to_string()))?;
                }
                Chunk::StringPool(_) | Chunk::ResourceMap(_) => {}
                Chunk::Unknown(unknown) => {
                    debug!("not rendering chunk type {:#06x}", unknown.chunk_type);
                }
            }
        }

        Ok(())
    }

    fn qualified_name(&self, scopes: &Scopes, namespace: Option<u32>, name: u32) -> Result<String> {
        let local = self.string(name)?;
        let prefix = match namespace {
            Some(uri) => match scopes.prefix_for(uri) {
                Some(prefix) => self.string(prefix)?,
                None if self.string(uri)? == XML_NAMESPACE_URI => XML_PREFIX,
                None => "",
            },
            None => "",
        };
        Ok(if prefix.is_empty() {
            local.to_string()
        } else {
            format!("{prefix}:{local}")
        })
    }

    fn attribute_value(&self, attr: &Attribute) -> Result<String> {
        if let Some(raw) = attr.raw_value {
            return Ok(self.string(raw)?.to_string());
        }
        match attr.typed_value.string_index() {
            Some(index) => Ok(self.string(index)?.to_string()),
            None => Ok(format_typed(attr.typed_value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{CData, EndTag, StartTag};
    use crate::string_pool::{StringEncoding, StringPool};
    use crate::walker::{XmlDocument, XmlNode};
    use crate::XmlCompiler;

    fn clear_lines(nodes: &mut [XmlNode]) {
        for node in nodes {
            if let XmlNode::Element(element) = node {
                element.line = 0;
                clear_lines(&mut element.children);
            }
        }
    }

    #[test]
    fn test_renders_namespace_example() {
        let file = XmlCompiler::default()
            .compile_str(
                r#"<Root xmlns:android="http://schemas.android.com/apk/res/android" android:w="-1"/>"#,
            )
            .unwrap();
        let xml = file.to_xml_string().unwrap();

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="utf-8"?>"#));
        assert!(xml.contains(
            r#"<Root xmlns:android="http://schemas.android.com/apk/res/android" android:w="-1"/>"#
        ));
    }

    #[test]
    fn test_xml_round_trip() {
        let source = r#"<LinearLayout xmlns:android="http://schemas.android.com/apk/res/android" android:orientation="vertical">
    <TextView android:text="a &amp; b" style="@style/Big"/>
    <FrameLayout>
        <Button android:id="@+id/ok"/>
    </FrameLayout>
</LinearLayout>"#;
        let file = XmlCompiler::default().compile_str(source).unwrap();
        let decoded = ChunkFile::parse(&file.to_bytes().unwrap()).unwrap();
        let rendered = decoded.to_xml_string().unwrap();

        let mut expected = XmlDocument::from_xml(source).unwrap();
        let mut actual = XmlDocument::from_xml(&rendered).unwrap();
        clear_lines(&mut expected.nodes);
        clear_lines(&mut actual.nodes);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_xml_prefix_is_rendered() {
        let file = XmlCompiler::default()
            .compile_str(r#"<A xml:lang="en" xml:space="preserve"/>"#)
            .unwrap();
        let xml = file.to_xml_string().unwrap();
        assert!(xml.contains(r#"<A xml:lang="en" xml:space="preserve"/>"#), "{xml}");
    }

    #[test]
    fn test_rebound_prefix_is_declared_once() {
        let source = r#"<A xmlns:a="urn:1"><B xmlns:a="urn:2" a:x="1"/></A>"#;
        let file = XmlCompiler::default().compile_str(source).unwrap();
        assert_eq!(file.namespaces().count(), 2);

        let rendered = file.to_xml_string().unwrap();
        let document = XmlDocument::from_xml(&rendered).unwrap();
        let XmlNode::Element(root) = &document.nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(root.attributes, vec![("xmlns:a".to_string(), "urn:1".to_string())]);
    }

    #[test]
    fn test_cdata_is_rendered_as_text() {
        let mut pool = StringPool::new(StringEncoding::Utf8);
        let name = pool.add("Label").unwrap();
        let text = pool.add("x < y").unwrap();
        let file = ChunkFile::new(vec![
            Chunk::StringPool(pool),
            Chunk::StartTag(StartTag {
                line_number: 1,
                comment: None,
                namespace: None,
                name,
                attributes: Vec::new(),
                id_index: 0,
                class_index: 0,
                style_index: 0,
            }),
            Chunk::CData(CData {
                line_number: 1,
                comment: None,
                data: text,
                typed_value: Value::string(text),
            }),
            Chunk::EndTag(EndTag {
                line_number: 1,
                comment: None,
                namespace: None,
                name,
            }),
        ]);

        let xml = file.to_xml_string().unwrap();
        assert!(xml.contains("x &lt; y"), "{xml}");
        assert!(xml.contains("</Label>"));
    }

    #[test]
    fn test_typed_values() {
        let value = |data_type, data| Value { data_type, data };

        assert_eq!(format_typed(value(Value::TYPE_INT_DEC, -5i32 as u32)), "-5");
        assert_eq!(format_typed(value(Value::TYPE_INT_HEX, 0x30)), "0x30");
        assert_eq!(format_typed(value(Value::TYPE_INT_BOOLEAN, 0xFFFF_FFFF)), "true");
        assert_eq!(format_typed(value(Value::TYPE_INT_BOOLEAN, 0)), "false");
        assert_eq!(format_typed(value(Value::TYPE_REFERENCE, 0x7f01_0000)), "@0x7f010000");
        assert_eq!(format_typed(value(0x1d, 0xff00_ff00)), "#ff00ff00");
        assert_eq!(format_typed(value(Value::TYPE_FLOAT, 1.5f32.to_bits())), "1.5");
        // 16dip: mantissa 16, radix 0, unit 1
        assert_eq!(format_typed(value(Value::TYPE_DIMENSION, (16 << 8) | 1)), "16dip");
        assert_eq!(format_typed(value(Value::TYPE_NULL, 0)), "");
    }
}
