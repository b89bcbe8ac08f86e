//! Generic DOM tree for parsed GenICam XML.
//!
//! This is the materialized tree described by the data model: ordered
//! children, a flat name-keyed attribute map, and an accumulated text child
//! per element. It is immutable once built and carries no GenICam semantics
//! of its own — [`crate::NodeDecl`] interpretation is layered on top.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::XmlError;

/// One XML element with ordered children and a flat attribute map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attributes: HashMap<String, String>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    /// First child with the given tag name, if any.
    pub fn child(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// All children with the given tag name, in document order.
    pub fn children(&self, tag: &str) -> impl Iterator<Item = &Element> {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Attribute value by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Accumulated text content, trimmed.
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Text content of a named child, trimmed, if the child exists and is
    /// non-empty.
    pub fn child_text(&self, tag: &str) -> Option<&str> {
        self.child(tag).map(Element::text).filter(|s| !s.is_empty())
    }
}

/// Parse `xml` into a DOM tree rooted at the document's single root element.
pub fn parse_dom(xml: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let mut attributes = HashMap::new();
                for attr in e.attributes() {
                    let attr = attr.map_err(|err| XmlError::Xml(err.to_string()))?;
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    let value = attr
                        .unescape_value()
                        .map_err(|err| XmlError::Xml(err.to_string()))?
                        .into_owned();
                    attributes.insert(key, value);
                }
                stack.push(Element {
                    tag,
                    attributes,
                    children: Vec::new(),
                    text: String::new(),
                });
            }
            Ok(Event::Empty(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let mut attributes = HashMap::new();
                for attr in e.attributes() {
                    let attr = attr.map_err(|err| XmlError::Xml(err.to_string()))?;
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    let value = attr
                        .unescape_value()
                        .map_err(|err| XmlError::Xml(err.to_string()))?
                        .into_owned();
                    attributes.insert(key, value);
                }
                let elem = Element {
                    tag,
                    attributes,
                    children: Vec::new(),
                    text: String::new(),
                };
                push_completed(&mut stack, &mut root, elem);
            }
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    let text = t
                        .unescape()
                        .map_err(|err| XmlError::Xml(err.to_string()))?;
                    top.text.push_str(&text);
                }
            }
            Ok(Event::End(_)) => {
                let Some(elem) = stack.pop() else {
                    return Err(XmlError::Invalid("unbalanced end tag".into()));
                };
                push_completed(&mut stack, &mut root, elem);
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(XmlError::Xml(err.to_string())),
            _ => {}
        }
        buf.clear();
    }

    root.ok_or_else(|| XmlError::Invalid("document has no root element".into()))
}

fn push_completed(stack: &mut Vec<Element>, root: &mut Option<Element>, elem: Element) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(elem);
    } else {
        *root = Some(elem);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_tree_with_attributes_and_text() {
        let xml = r#"<Root a="1"><Child b="2">hello</Child><Empty/></Root>"#;
        let root = parse_dom(xml).expect("parse");
        assert_eq!(root.tag, "Root");
        assert_eq!(root.attr("a"), Some("1"));
        assert_eq!(root.children.len(), 2);
        let child = root.child("Child").expect("child");
        assert_eq!(child.attr("b"), Some("2"));
        assert_eq!(child.text(), "hello");
        assert!(root.child("Empty").is_some());
    }

    #[test]
    fn multiple_children_same_tag_preserve_order() {
        let xml = r#"<Root><Item v="1"/><Item v="2"/><Item v="3"/></Root>"#;
        let root = parse_dom(xml).expect("parse");
        let values: Vec<&str> = root.children("Item").filter_map(|e| e.attr("v")).collect();
        assert_eq!(values, vec!["1", "2", "3"]);
    }
}
