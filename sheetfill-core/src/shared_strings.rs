//! Shared-string pool backing `xl/sharedStrings.xml`

use crate::error::Result;
use crate::xml::{XmlDocument, XmlElement};
use std::collections::HashMap;

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

#[derive(Debug, Clone)]
struct Entry {
    text: String,
    /// Original `<si>` for entries never rewritten, so rich text runs survive
    source: Option<XmlElement>,
}

/// Append-only string table with a reverse lookup to the first index of each string
#[derive(Debug, Clone, Default)]
pub struct SharedStrings {
    entries: Vec<Entry>,
    lookup: HashMap<String, usize>,
    root: Option<XmlElement>,
}

impl SharedStrings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let doc = XmlDocument::parse(bytes)?;
        let mut pool = Self {
            root: Some(doc.root.shallow_clone()),
            ..Self::default()
        };
        for si in doc.root.elements().filter(|e| e.local_name() == "si") {
            let text = si_text(si);
            pool.lookup.entry(text.clone()).or_insert(pool.entries.len());
            pool.entries.push(Entry {
                text,
                source: Some(si.clone()),
            });
        }
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.entries.get(idx).map(|e| e.text.as_str())
    }

    /// Lowest index holding `text`
    pub fn position(&self, text: &str) -> Option<usize> {
        self.lookup.get(text).copied()
    }

    /// Index of `text`, appending it when it is new
    pub fn index(&mut self, text: &str) -> usize {
        match self.lookup.get(text) {
            Some(&idx) => idx,
            None => self.add(text),
        }
    }

    /// Unconditional append
    pub fn add(&mut self, text: &str) -> usize {
        let idx = self.entries.len();
        self.entries.push(Entry {
            text: text.to_string(),
            source: None,
        });
        self.lookup.entry(text.to_string()).or_insert(idx);
        idx
    }

    /// Overwrite the slot holding `old` with `new`, or append `new` when `old` is not pooled
    pub fn replace(&mut self, old: &str, new: &str) -> usize {
        let Some(idx) = self.lookup.remove(old) else {
            return self.add(new);
        };
        self.entries[idx] = Entry {
            text: new.to_string(),
            source: None,
        };
        self.lookup.entry(new.to_string()).or_insert(idx);
        idx
    }

    pub fn to_document(&self) -> XmlDocument {
        let mut root = self
            .root
            .clone()
            .unwrap_or_else(|| XmlElement::new("sst").with_attr("xmlns", MAIN_NS));
        root.set_attr("count", self.entries.len().to_string());
        root.set_attr("uniqueCount", self.entries.len().to_string());
        root.children.clear();
        for entry in &self.entries {
            let si = match &entry.source {
                Some(si) => si.clone(),
                None => plain_si(&root, &entry.text),
            };
            root.push(si);
        }
        XmlDocument::new(root)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.to_document().to_bytes()
    }
}

/// Flatten `<t>` and rich-text runs `<r><t>`; phonetic runs are not part of the value
fn si_text(si: &XmlElement) -> String {
    let mut text = String::new();
    for child in si.elements() {
        match child.local_name() {
            "t" => text.push_str(&child.text()),
            "r" => {
                for t in child.elements().filter(|e| e.local_name() == "t") {
                    text.push_str(&t.text());
                }
            }
            _ => {}
        }
    }
    text
}

fn plain_si(root: &XmlElement, text: &str) -> XmlElement {
    let prefix = root.prefix();
    let mut t = XmlElement::new(format!("{prefix}t"));
    if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
        t.set_attr("xml:space", "preserve");
    }
    t.set_text(text);
    XmlElement::new(format!("{prefix}si")).with_child(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SST: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="3" uniqueCount="3"><si><t>Hello</t></si><si><r><rPr><b/></rPr><t>Bold</t></r><r><t xml:space="preserve"> run</t></r></si><si><t>${name}</t></si></sst>"#;

    #[test]
    fn test_parse_flattens_rich_text() {
        let pool = SharedStrings::parse(SST.as_bytes()).unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.get(1), Some("Bold run"));
        assert_eq!(pool.position("${name}"), Some(2));
    }

    #[test]
    fn test_index_is_idempotent() {
        let mut pool = SharedStrings::parse(SST.as_bytes()).unwrap();
        assert_eq!(pool.index("Hello"), 0);
        let fresh = pool.index("World");
        assert_eq!(fresh, 3);
        assert_eq!(pool.index("World"), 3);
        assert_eq!(pool.index("Again"), 4);
    }

    #[test]
    fn test_add_always_appends() {
        let mut pool = SharedStrings::new();
        assert_eq!(pool.add("x"), 0);
        assert_eq!(pool.add("x"), 1);
        assert_eq!(pool.index("x"), 0);
    }

    #[test]
    fn test_replace_unpooled_behaves_like_add() {
        let mut a = SharedStrings::parse(SST.as_bytes()).unwrap();
        let mut b = a.clone();
        assert_eq!(a.replace("missing", "new"), b.add("new"));
        assert_eq!(a.len(), b.len());
    }

    #[test]
    fn test_replace_pooled_keeps_index() {
        let mut pool = SharedStrings::parse(SST.as_bytes()).unwrap();
        assert_eq!(pool.replace("${name}", "Alice"), 2);
        assert_eq!(pool.get(2), Some("Alice"));
        assert_eq!(pool.position("${name}"), None);
        assert_eq!(pool.position("Alice"), Some(2));
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_serialize_keeps_rich_runs_and_counts() {
        let mut pool = SharedStrings::parse(SST.as_bytes()).unwrap();
        pool.add(" padded ");
        let doc = pool.to_document();
        assert_eq!(doc.root.attr("count"), Some("4"));
        assert_eq!(doc.root.attr("uniqueCount"), Some("4"));
        let sis = doc.root.find_all("si");
        assert_eq!(sis[1].find_all("r").len(), 2);
        assert_eq!(sis[3].child("t").unwrap().attr("xml:space"), Some("preserve"));

        let again = SharedStrings::parse(&pool.to_bytes().unwrap()).unwrap();
        assert_eq!(again.get(3), Some(" padded "));
    }
}
