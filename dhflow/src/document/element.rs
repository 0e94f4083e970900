//! Owned element tree with XML parsing and serialization.

use crate::errors::MergeError;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// A child of an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Node {
    /// A nested element.
    Element(Element),
    /// Character data.
    Text(String),
}

impl Node {
    /// Returns the element, if this node is one.
    #[must_use]
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(el) => Some(el),
            Self::Text(_) => None,
        }
    }

    fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Self::Element(el) => Some(el),
            Self::Text(_) => None,
        }
    }
}

/// An element in a tree-shaped document.
///
/// A document is represented by its root element. Attributes keep their
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Element {
    /// Element name, including any namespace prefix.
    pub name: String,
    /// Attributes in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<(String, String)>,
    /// Child nodes in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Element {
    /// Creates an empty element.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Adds a child element.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Adds a text child.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Appends a child element.
    pub fn append(&mut self, child: Self) {
        self.children.push(Node::Element(child));
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates over child elements with their child index.
    pub fn child_elements(&self) -> impl Iterator<Item = (usize, &Self)> {
        self.children
            .iter()
            .enumerate()
            .filter_map(|(i, node)| node.as_element().map(|el| (i, el)))
    }

    /// Concatenated text of this element's direct text children.
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Resolves a node address (child indices from this element).
    #[must_use]
    pub fn at(&self, address: &[usize]) -> Option<&Self> {
        let mut current = self;
        for &idx in address {
            current = current.children.get(idx)?.as_element()?;
        }
        Some(current)
    }

    /// Resolves a node address mutably.
    pub fn at_mut(&mut self, address: &[usize]) -> Option<&mut Self> {
        let mut current = self;
        for &idx in address {
            current = current.children.get_mut(idx)?.as_element_mut()?;
        }
        Some(current)
    }

    /// Parses an XML document into its root element.
    ///
    /// Whitespace-only text nodes are dropped; any other text is kept as
    /// written, surrounding spaces included. Comments, processing
    /// instructions and the declaration are ignored.
    pub fn parse(xml: &str) -> Result<Self, MergeError> {
        let mut reader = Reader::from_str(xml);

        let mut stack: Vec<Self> = Vec::new();
        let mut root: Option<Self> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| MergeError::Parse(format!("at byte {}: {e}", reader.buffer_position())))?;

            match event {
                Event::Start(start) => stack.push(element_from_start(&start)?),
                Event::Empty(start) => {
                    let el = element_from_start(&start)?;
                    attach(&mut stack, &mut root, el)?;
                }
                Event::End(_) => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| MergeError::Parse("unbalanced closing tag".to_string()))?;
                    attach(&mut stack, &mut root, el)?;
                }
                Event::Text(text) => {
                    let value = text
                        .unescape()
                        .map_err(|e| MergeError::Parse(e.to_string()))?;
                    if !value.trim().is_empty() {
                        push_text(&mut stack, &value)?;
                    }
                }
                Event::CData(data) => {
                    let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    push_text(&mut stack, &value)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(MergeError::Parse("unexpected end of document".to_string()));
        }
        root.ok_or_else(|| MergeError::Parse("document has no root element".to_string()))
    }

    /// Serializes this element as compact XML.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            let _ = write!(out, " {key}=\"{}\"", escape(value.as_str()));
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                Node::Element(el) => el.write_xml(out),
                Node::Text(text) => out.push_str(&escape(text.as_str())),
            }
        }
        let _ = write!(out, "</{}>", self.name);
    }
}

impl std::fmt::Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_xml())
    }
}

impl std::str::FromStr for Element {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element, MergeError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut el = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| MergeError::Parse(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| MergeError::Parse(e.to_string()))?
            .into_owned();
        el.attributes.push((key, value));
    }
    Ok(el)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> Result<(), MergeError> {
    if let Some(parent) = stack.last_mut() {
        parent.append(el);
        Ok(())
    } else if root.is_none() {
        *root = Some(el);
        Ok(())
    } else {
        Err(MergeError::Parse("multiple root elements".to_string()))
    }
}

fn push_text(stack: &mut [Element], value: &str) -> Result<(), MergeError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Text(value.to_string()));
            Ok(())
        }
        None if value.trim().is_empty() => Ok(()),
        None => Err(MergeError::Parse("text outside of root element".to_string())),
    }
}
