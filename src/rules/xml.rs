//! Minimal XML element tree over quick-xml
//!
//! Rule files are small enough to hold in memory, and extraction needs to
//! look at sibling fields of a rule, so events are folded into a tree.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// An XML element with its attributes, concatenated text and children
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
    /// Byte offset of the start tag in the source
    pub offset: usize,
}

/// Local part of a possibly prefixed name (`i:type` → `type`)
fn local(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

impl Element {
    fn open(start: &BytesStart<'_>, offset: usize) -> Result<Self, XmlError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| XmlError::new(e.to_string(), offset))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| XmlError::new(e.to_string(), offset))?
                .into_owned();
            attrs.push((key, value));
        }
        Ok(Self {
            name,
            attrs,
            text: String::new(),
            children: Vec::new(),
            offset,
        })
    }

    /// Local element name
    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    /// Whether this element's local name matches (ASCII case-insensitive)
    pub fn is(&self, name: &str) -> bool {
        self.local_name().eq_ignore_ascii_case(name)
    }

    /// First direct child with the given local name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(name))
    }

    /// All direct children with the given local name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.is(name))
    }

    /// Attribute value by local name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| local(key) == name)
            .map(|(_, value)| value.as_str())
    }

    /// Trimmed text content
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Trimmed text of a direct child, if present and non-empty
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(Element::text).filter(|t| !t.is_empty())
    }

    /// Depth-first search over all descendants
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        let mut stack: Vec<&Element> = self.children.iter().rev().collect();
        while let Some(el) = stack.pop() {
            out.push(el);
            stack.extend(el.children.iter().rev());
        }
        out
    }
}

/// XML that could not be read into a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlError {
    pub message: String,
    pub offset: usize,
}

impl XmlError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// Parse a whole document and return its root element
pub fn parse_document(xml: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let offset = reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(Element::open(&e, offset)?),
            Ok(Event::Empty(e)) => {
                let el = Element::open(&e, offset)?;
                attach(&mut stack, &mut root, el)?;
            }
            Ok(Event::End(_)) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| XmlError::new("closing tag without opening tag", offset))?;
                attach(&mut stack, &mut root, el)?;
            }
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    let text = t.unescape().map_err(|e| XmlError::new(e.to_string(), offset))?;
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(XmlError::new(
                    e.to_string(),
                    reader.buffer_position() as usize,
                ))
            }
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::new(
            format!("unexpected end of document: <{}> is never closed", open.name),
            open.offset,
        ));
    }
    root.ok_or_else(|| XmlError::new("document has no root element", 0))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(el);
        Ok(())
    } else if root.is_none() {
        *root = Some(el);
        Ok(())
    } else {
        Err(XmlError::new("more than one root element", el.offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_document() {
        let xml = r#"<?xml version="1.0"?>
<ItemFilter xmlns:i="http://www.w3.org/2001/XMLSchema-instance">
  <rules>
    <Rule>
      <conditions>
        <Condition i:type="AffixCondition"><affixes><int>140</int></affixes></Condition>
      </conditions>
      <nameOverride>Affix ID: 140</nameOverride>
      <emphasized/>
    </Rule>
  </rules>
</ItemFilter>"#;
        let root = parse_document(xml).unwrap();
        assert!(root.is("itemfilter"));
        let rule = root.child("rules").unwrap().child("Rule").unwrap();
        assert_eq!(rule.child_text("nameOverride"), Some("Affix ID: 140"));
        assert!(rule.child("emphasized").is_some());

        let condition = rule.child("conditions").unwrap().child("Condition").unwrap();
        assert_eq!(condition.attr("type"), Some("AffixCondition"));
        let ints: Vec<_> = condition
            .descendants()
            .into_iter()
            .filter(|e| e.is("int"))
            .map(|e| e.text().to_string())
            .collect();
        assert_eq!(ints, vec!["140"]);
    }

    #[test]
    fn test_unescapes_text() {
        let root = parse_document("<a><b>Fire &amp; Ice</b></a>").unwrap();
        assert_eq!(root.child_text("b"), Some("Fire & Ice"));
    }

    #[test]
    fn test_unclosed_element_is_error() {
        assert!(parse_document("<a><b>text</b>").is_err());
    }

    #[test]
    fn test_mismatched_tag_is_error() {
        assert!(parse_document("<a><b></c></a>").is_err());
    }

    #[test]
    fn test_empty_document_is_error() {
        assert!(parse_document("   ").is_err());
    }
}
