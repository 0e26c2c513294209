//! Minimal XML tree on top of quick-xml
//!
//! OPF, XMP and ComicInfo documents are small; codecs parse them into this
//! tree, edit it, and serialize it back.

use crate::error::{ParseError, WriteError};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fmt::Display;

/// One node of a parsed document
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    /// Markup kept verbatim (already escaped)
    Raw(String),
}

/// An element with its attributes and children, names kept qualified
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn push_child(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    /// Parse the root element of a document
    pub fn parse(xml: &str) -> Result<XmlElement, ParseError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<XmlElement> = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(start) => stack.push(element_from_start(&start)?),
                Event::Empty(start) => {
                    let element = element_from_start(&start)?;
                    match stack.last_mut() {
                        Some(parent) => parent.push_child(element),
                        None => return Ok(element),
                    }
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| {
                        ParseError::InvalidXml("unbalanced closing tag".to_string())
                    })?;
                    match stack.last_mut() {
                        Some(parent) => parent.push_child(element),
                        None => return Ok(element),
                    }
                }
                Event::Text(text) => {
                    if let Some(parent) = stack.last_mut() {
                        let value = text
                            .unescape()
                            .map(|t| t.into_owned())
                            .unwrap_or_else(|_| String::from_utf8_lossy(&text).into_owned());
                        parent.children.push(XmlNode::Text(value));
                    }
                }
                Event::CData(data) => {
                    if let Some(parent) = stack.last_mut() {
                        let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                        parent.children.push(XmlNode::Text(value));
                    }
                }
                Event::Eof => {
                    return Err(ParseError::InvalidXml(
                        "document ended before the root element closed".to_string(),
                    ))
                }
                _ => {}
            }
        }
    }

    /// Element name without its namespace prefix
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(p, _)| p)
    }

    /// Attribute by exact (qualified) name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute by local name, ignoring any prefix
    pub fn attribute_local(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| local_name(k) == local)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    /// Child elements in document order
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|node| match node {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    /// First child element with the given local name
    pub fn find(&self, local: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.local_name() == local)
    }

    pub fn find_mut(&mut self, local: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|e| e.local_name() == local)
    }

    /// First descendant (depth-first) with the given local name
    pub fn find_descendant(&self, local: &str) -> Option<&XmlElement> {
        for child in self.elements() {
            if child.local_name() == local {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(local) {
                return Some(found);
            }
        }
        None
    }

    /// Every descendant with the given local name, depth-first
    pub fn descendants<'a>(&'a self, local: &str, out: &mut Vec<&'a XmlElement>) {
        for child in self.elements() {
            if child.local_name() == local {
                out.push(child);
            }
            child.descendants(local, out);
        }
    }

    /// Concatenated descendant text, trimmed
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out.trim().to_string()
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(e) => e.collect_text(out),
                XmlNode::Raw(_) => {}
            }
        }
    }

    /// Serialize the children of this element (the element's own tags excluded)
    pub fn inner_xml(&self) -> Result<String, WriteError> {
        let mut writer = Writer::new(Vec::new());
        for child in &self.children {
            write_node(&mut writer, child)?;
        }
        into_string(writer.into_inner())
    }

    /// Serialize this element, optionally preceded by an XML declaration
    pub fn to_xml(&self, declaration: bool, indent: bool) -> Result<String, WriteError> {
        let mut writer = if indent {
            Writer::new_with_indent(Vec::new(), b' ', 2)
        } else {
            Writer::new(Vec::new())
        };
        if declaration {
            writer
                .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
                .map_err(write_failed)?;
        }
        self.write_to(&mut writer)?;
        into_string(writer.into_inner())
    }

    pub fn write_to(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), WriteError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() {
            return writer.write_event(Event::Empty(start)).map_err(write_failed);
        }

        writer.write_event(Event::Start(start)).map_err(write_failed)?;
        for child in &self.children {
            write_node(writer, child)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(write_failed)
    }
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &XmlNode) -> Result<(), WriteError> {
    match node {
        XmlNode::Element(e) => e.write_to(writer),
        XmlNode::Text(t) => writer
            .write_event(Event::Text(BytesText::new(t)))
            .map_err(write_failed),
        XmlNode::Raw(raw) => writer
            .write_event(Event::Text(BytesText::from_escaped(raw.as_str())))
            .map_err(write_failed),
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement, ParseError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = XmlElement::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseError::InvalidXml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn into_string(bytes: Vec<u8>) -> Result<String, WriteError> {
    String::from_utf8(bytes).map_err(|e| WriteError::EncodingFailed(e.to_string()))
}

pub(crate) fn write_failed(err: impl Display) -> WriteError {
    WriteError::EncodingFailed(format!("XML serialization failed: {}", err))
}

/// Strip the namespace prefix of a qualified name
pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name)
}

/// Check that a byte buffer is a well-formed XML document
pub fn check_well_formed(data: &[u8]) -> Result<(), ParseError> {
    let text = std::str::from_utf8(data).map_err(|e| ParseError::InvalidXml(e.to_string()))?;
    let mut reader = Reader::from_str(text);
    let mut depth = 0usize;
    let mut seen_root = false;
    loop {
        match reader.read_event()? {
            Event::Start(_) => {
                depth += 1;
                seen_root = true;
            }
            Event::Empty(_) => seen_root = true,
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }
    if !seen_root || depth != 0 {
        return Err(ParseError::InvalidXml("document is not well formed".to_string()));
    }
    Ok(())
}
