//! `.rels` parts and part-name arithmetic

use crate::error::Result;
use crate::xml::{XmlDocument, XmlElement};

const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// Relationship type URIs used by the engine
pub mod rel_types {
    /// Namespace bound to the `r:` prefix in SpreadsheetML parts
    pub const OFFICE_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

    pub const OFFICE_DOCUMENT: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
    pub const WORKSHEET: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
    pub const SHARED_STRINGS: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
    pub const CALC_CHAIN: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain";
    pub const DRAWING: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing";
    pub const IMAGE: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
    pub const HYPERLINK: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";
    pub const SHEET_METADATA: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sheetMetadata";
    pub const RD_RICH_VALUE: &str =
        "http://schemas.microsoft.com/office/2017/06/relationships/rdRichValue";
    pub const RD_RICH_VALUE_STRUCTURE: &str =
        "http://schemas.microsoft.com/office/2017/06/relationships/rdRichValueStructure";
    pub const RICH_VALUE_REL: &str =
        "http://schemas.microsoft.com/office/2022/10/relationships/richValueRel";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

impl Relationship {
    fn from_element(element: &XmlElement) -> Option<Self> {
        Some(Self {
            id: element.attr("Id")?.to_string(),
            rel_type: element.attr("Type")?.to_string(),
            target: element.attr("Target")?.to_string(),
            external: element.attr("TargetMode") == Some("External"),
        })
    }
}

/// A relationships part
#[derive(Debug, Clone)]
pub struct Relationships {
    doc: XmlDocument,
}

impl Default for Relationships {
    fn default() -> Self {
        Self::new()
    }
}

impl Relationships {
    pub fn new() -> Self {
        Self {
            doc: XmlDocument::new(XmlElement::new("Relationships").with_attr("xmlns", RELS_NS)),
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            doc: XmlDocument::parse(bytes)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Relationship> + '_ {
        self.doc
            .root
            .elements()
            .filter(|e| e.local_name() == "Relationship")
            .filter_map(Relationship::from_element)
    }

    pub fn get(&self, id: &str) -> Option<Relationship> {
        self.iter().find(|rel| rel.id == id)
    }

    pub fn find_by_type(&self, rel_type: &str) -> Option<Relationship> {
        self.iter().find(|rel| rel.rel_type == rel_type)
    }

    pub fn next_id(&self) -> String {
        let max = self
            .iter()
            .filter_map(|rel| rel.id.strip_prefix("rId")?.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        format!("rId{}", max + 1)
    }

    /// Add an internal relationship and return its id
    pub fn add(&mut self, rel_type: &str, target: &str) -> String {
        let id = self.next_id();
        let prefix = self.doc.root.prefix().to_string();
        self.doc.root.push(
            XmlElement::new(format!("{prefix}Relationship"))
                .with_attr("Id", id.clone())
                .with_attr("Type", rel_type)
                .with_attr("Target", target),
        );
        id
    }

    pub fn set_target(&mut self, id: &str, target: &str) -> bool {
        match self
            .doc
            .root
            .elements_mut()
            .find(|e| e.attr("Id") == Some(id))
        {
            Some(element) => {
                element.set_attr("Target", target);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.doc.root.children.len();
        self.doc.root.children.retain(|node| match node {
            crate::xml::XmlNode::Element(e) => e.attr("Id") != Some(id),
            _ => true,
        });
        before != self.doc.root.children.len()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.doc.to_bytes()
    }
}

/// `xl/worksheets/sheet1.xml` -> `xl/worksheets/_rels/sheet1.xml.rels`
pub fn rels_for_part(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file_name)) => format!("{dir}/_rels/{file_name}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target against the part that owns the `.rels`
pub fn resolve_target(source_part: &str, target: &str) -> String {
    let target = target.split('#').next().unwrap_or(target);
    if let Some(absolute) = target.strip_prefix('/') {
        return normalize(absolute);
    }
    let base_dir = source_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    normalize(&format!("{base_dir}/{target}"))
}

/// Relative target from `source_part` to `target_part`, as Excel writes it
pub fn relative_target(source_part: &str, target_part: &str) -> String {
    let source_dir: Vec<&str> = source_part
        .rsplit_once('/')
        .map(|(dir, _)| dir.split('/').collect())
        .unwrap_or_default();
    let target: Vec<&str> = target_part.split('/').collect();
    let (target_dir, file) = target.split_at(target.len().saturating_sub(1));

    let common = source_dir
        .iter()
        .zip(target_dir)
        .take_while(|(a, b)| a == b)
        .count();
    let mut parts: Vec<&str> = vec![".."; source_dir.len() - common];
    parts.extend(&target_dir[common..]);
    parts.extend(file);
    parts.join("/")
}

fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rels_for_part() {
        assert_eq!(rels_for_part("xl/workbook.xml"), "xl/_rels/workbook.xml.rels");
        assert_eq!(rels_for_part("workbook.xml"), "_rels/workbook.xml.rels");
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(
            resolve_target("xl/worksheets/sheet1.xml", "../drawings/drawing1.xml"),
            "xl/drawings/drawing1.xml"
        );
        assert_eq!(resolve_target("xl/workbook.xml", "/xl/styles.xml"), "xl/styles.xml");
    }

    #[test]
    fn test_relative_target() {
        assert_eq!(
            relative_target("xl/worksheets/sheet1.xml", "xl/drawings/drawing1.xml"),
            "../drawings/drawing1.xml"
        );
        assert_eq!(relative_target("xl/workbook.xml", "xl/metadata.xml"), "metadata.xml");
        assert_eq!(
            relative_target("xl/workbook.xml", "xl/richData/rdrichvalue.xml"),
            "richData/rdrichvalue.xml"
        );
    }

    #[test]
    fn test_add_uses_next_free_id() {
        let xml = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId3" Type="t" Target="a.xml"/><Relationship Id="rId7" Type="t" Target="b.xml" TargetMode="External"/></Relationships>"#;
        let mut rels = Relationships::parse(xml.as_bytes()).unwrap();
        assert!(rels.get("rId7").unwrap().external);
        let id = rels.add(rel_types::IMAGE, "../media/image1.png");
        assert_eq!(id, "rId8");
        assert_eq!(rels.find_by_type(rel_types::IMAGE).unwrap().target, "../media/image1.png");
        assert!(rels.remove("rId3"));
        assert_eq!(rels.iter().count(), 2);
    }
}
