//! Owned, mutable XML tree built on quick-xml events
//!
//! Parts are small enough to hold in memory, and substitution needs to clone,
//! reorder and re-attribute elements freely, which a streaming rewrite cannot do.

use crate::error::{Result, TemplateError};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
}

/// An element with its attributes in document order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

/// A parsed part: optional XML declaration plus the root element
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub declaration: bool,
    pub root: XmlElement,
}

impl XmlDocument {
    pub fn new(root: XmlElement) -> Self {
        Self {
            declaration: true,
            root,
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(false);
        let mut buf = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root = None;
        let mut declaration = false;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Decl(_) => declaration = true,
                Event::Start(e) => stack.push(element_from_start(&e)?),
                Event::Empty(e) => {
                    let element = element_from_start(&e)?;
                    attach(&mut stack, &mut root, element);
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| TemplateError::structural("unbalanced XML end tag"))?;
                    attach(&mut stack, &mut root, element);
                }
                Event::Text(e) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = e.unescape()?.into_owned();
                        if !text.is_empty() {
                            parent.children.push(XmlNode::Text(text));
                        }
                    }
                }
                Event::CData(e) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                        parent.children.push(XmlNode::CData(text));
                    }
                }
                Event::Comment(e) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                        parent.children.push(XmlNode::Comment(text));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        let root = root.ok_or_else(|| TemplateError::structural("XML part has no root element"))?;
        Ok(Self { declaration, root })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        if self.declaration {
            writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
            writer.write_event(Event::Text(BytesText::from_escaped("\r\n")))?;
        }
        write_element(&mut writer, &self.root)?;
        Ok(writer.into_inner().into_inner())
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement> {
    let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None => *root = Some(element),
    }
}

fn write_element<W: std::io::Write>(writer: &mut Writer<W>, element: &XmlElement) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        match child {
            XmlNode::Element(child) => write_element(writer, child)?,
            XmlNode::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
            XmlNode::CData(text) => writer.write_event(Event::CData(BytesCData::new(text.as_str())))?,
            XmlNode::Comment(text) => {
                writer.write_event(Event::Comment(BytesText::from_escaped(text.as_str())))?
            }
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}

/// One step of a path query: `tag`, `tag[2]` or `tag[@attr='value']`
#[derive(Debug)]
struct Selector<'a> {
    tag: &'a str,
    position: Option<usize>,
    attr: Option<(&'a str, &'a str)>,
}

impl<'a> Selector<'a> {
    fn parse(step: &'a str) -> Self {
        let Some((tag, rest)) = step.split_once('[') else {
            return Self {
                tag: step,
                position: None,
                attr: None,
            };
        };
        let predicate = rest.trim_end_matches(']');
        if let Some(expr) = predicate.strip_prefix('@') {
            let attr = expr.split_once('=').map(|(key, value)| {
                (key.trim(), value.trim().trim_matches(|c| c == '\'' || c == '"'))
            });
            Self {
                tag,
                position: None,
                attr,
            }
        } else {
            Self {
                tag,
                position: predicate.trim().parse().ok(),
                attr: None,
            }
        }
    }

    fn matches_tag(&self, element: &XmlElement) -> bool {
        if self.tag == "*" {
            return true;
        }
        // Unprefixed steps match on local name so `row` finds `x:row` too.
        if self.tag.contains(':') {
            element.name == self.tag
        } else {
            element.local_name() == self.tag
        }
    }

    fn matches(&self, element: &XmlElement) -> bool {
        self.matches_tag(element)
            && self
                .attr
                .is_none_or(|(key, value)| element.attr(key) == Some(value))
    }

    /// Indexes into `parent.children` selected by this step
    fn select(&self, parent: &XmlElement) -> Vec<usize> {
        let hits = parent
            .children
            .iter()
            .enumerate()
            .filter_map(|(idx, node)| match node {
                XmlNode::Element(e) if self.matches(e) => Some(idx),
                _ => None,
            });
        match self.position {
            Some(pos) if pos >= 1 => hits.skip(pos - 1).take(1).collect(),
            Some(_) => Vec::new(),
            None => hits.collect(),
        }
    }
}

fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.split_once('/') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.push(child);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.set_text(text);
        self
    }

    /// Tag name without namespace prefix
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    /// Namespace prefix including the colon, or "" (used to name new siblings)
    pub fn prefix(&self) -> &str {
        match self.name.rfind(':') {
            Some(pos) => &self.name[..=pos],
            None => "",
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, key: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|(k, _)| k == key)?;
        Some(self.attributes.remove(pos).1)
    }

    /// Concatenated text of direct text children
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(t) | XmlNode::CData(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Replace all children with one text node
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![XmlNode::Text(text.into())];
    }

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

    /// First direct child matching a single path step
    pub fn child(&self, step: &str) -> Option<&XmlElement> {
        self.find(step)
    }

    pub fn child_mut(&mut self, step: &str) -> Option<&mut XmlElement> {
        self.find_mut(step)
    }

    /// First descendant matching a `/`-separated path relative to this element
    pub fn find(&self, path: &str) -> Option<&XmlElement> {
        let (head, rest) = split_path(path);
        let selector = Selector::parse(head);
        selector.select(self).into_iter().find_map(|idx| {
            let XmlNode::Element(child) = &self.children[idx] else {
                return None;
            };
            match rest {
                None => Some(child),
                Some(rest) => child.find(rest),
            }
        })
    }

    pub fn find_mut(&mut self, path: &str) -> Option<&mut XmlElement> {
        let (head, rest) = split_path(path);
        let selector = Selector::parse(head);
        let idx = selector
            .select(self)
            .into_iter()
            .find(|&idx| match (&self.children[idx], rest) {
                (XmlNode::Element(_), None) => true,
                (XmlNode::Element(child), Some(rest)) => child.find(rest).is_some(),
                _ => false,
            })?;
        let XmlNode::Element(child) = &mut self.children[idx] else {
            return None;
        };
        match rest {
            None => Some(child),
            Some(rest) => child.find_mut(rest),
        }
    }

    /// Every descendant matching a path
    pub fn find_all(&self, path: &str) -> Vec<&XmlElement> {
        let (head, rest) = split_path(path);
        let selector = Selector::parse(head);
        let mut found = Vec::new();
        for idx in selector.select(self) {
            if let XmlNode::Element(child) = &self.children[idx] {
                match rest {
                    None => found.push(child),
                    Some(rest) => found.extend(child.find_all(rest)),
                }
            }
        }
        found
    }

    /// Apply `f` to every descendant matching a path
    pub fn for_each_mut(&mut self, path: &str, f: &mut dyn FnMut(&mut XmlElement)) {
        let (head, rest) = split_path(path);
        let selector = Selector::parse(head);
        for idx in selector.select(self) {
            if let XmlNode::Element(child) = &mut self.children[idx] {
                match rest {
                    None => f(child),
                    Some(rest) => child.for_each_mut(rest, f),
                }
            }
        }
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    pub fn insert(&mut self, index: usize, child: XmlElement) {
        let index = index.min(self.children.len());
        self.children.insert(index, XmlNode::Element(child));
    }

    /// Remove direct children whose local name matches, returning them
    pub fn remove_children(&mut self, local_name: &str) -> Vec<XmlElement> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.children.len());
        for node in self.children.drain(..) {
            match node {
                XmlNode::Element(e) if e.local_name() == local_name => removed.push(e),
                other => kept.push(other),
            }
        }
        self.children = kept;
        removed
    }

    /// Detach all child elements, dropping whitespace and comments between them
    pub fn take_elements(&mut self) -> Vec<XmlElement> {
        self.children
            .drain(..)
            .filter_map(|node| match node {
                XmlNode::Element(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    pub fn set_elements(&mut self, elements: Vec<XmlElement>) {
        self.children = elements.into_iter().map(XmlNode::Element).collect();
    }

    /// Copy of this element with attributes but no children
    pub fn shallow_clone(&self) -> XmlElement {
        XmlElement {
            name: self.name.clone(),
            attributes: self.attributes.clone(),
            children: Vec::new(),
        }
    }

    /// Insert `child` before the first sibling that must follow it in `order`.
    /// Tags missing from `order` are appended.
    pub fn insert_ordered(&mut self, child: XmlElement, order: &[&str]) -> usize {
        let index = self.ordered_index(child.local_name(), order);
        self.insert(index, child);
        index
    }

    fn ordered_index(&self, local_name: &str, order: &[&str]) -> usize {
        let Some(rank) = order.iter().position(|t| *t == local_name) else {
            return self.children.len();
        };
        self.children
            .iter()
            .position(|node| match node {
                XmlNode::Element(e) => order
                    .iter()
                    .position(|t| *t == e.local_name())
                    .is_some_and(|r| r > rank),
                _ => false,
            })
            .unwrap_or(self.children.len())
    }

    /// Existing child with this local name, or a new one placed by `order`
    pub fn ensure_child(&mut self, local_name: &str, order: &[&str]) -> Result<&mut XmlElement> {
        let existing = self
            .children
            .iter()
            .position(|node| matches!(node, XmlNode::Element(e) if e.local_name() == local_name));
        let index = match existing {
            Some(index) => index,
            None => {
                let name = format!("{}{}", self.prefix(), local_name);
                self.insert_ordered(XmlElement::new(name), order)
            }
        };
        match self.children.get_mut(index) {
            Some(XmlNode::Element(e)) => Ok(e),
            _ => Err(TemplateError::structural(format!("<{local_name}> could not be placed"))),
        }
    }
}

/// Child order of `<worksheet>` from the SpreadsheetML schema
pub const WORKSHEET_ORDER: &[&str] = &[
    "sheetPr",
    "dimension",
    "sheetViews",
    "sheetFormatPr",
    "cols",
    "sheetData",
    "sheetCalcPr",
    "sheetProtection",
    "protectedRanges",
    "scenarios",
    "autoFilter",
    "sortState",
    "dataConsolidate",
    "customSheetViews",
    "mergeCells",
    "phoneticPr",
    "conditionalFormatting",
    "dataValidations",
    "hyperlinks",
    "printOptions",
    "pageMargins",
    "pageSetup",
    "headerFooter",
    "rowBreaks",
    "colBreaks",
    "customProperties",
    "cellWatches",
    "ignoredErrors",
    "smartTags",
    "drawing",
    "legacyDrawing",
    "legacyDrawingHF",
    "drawingHF",
    "picture",
    "oleObjects",
    "controls",
    "webPublishItems",
    "tableParts",
    "extLst",
];
