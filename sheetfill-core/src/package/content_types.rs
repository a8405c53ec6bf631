//! `[Content_Types].xml` maintenance

use crate::error::Result;
use crate::xml::{XmlDocument, XmlElement};

pub const DRAWING: &str = "application/vnd.openxmlformats-officedocument.drawing+xml";
pub const SHARED_STRINGS: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";
pub const SHEET_METADATA: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheetMetadata+xml";
pub const RD_RICH_VALUE: &str = "application/vnd.ms-excel.rdrichvalue+xml";
pub const RD_RICH_VALUE_STRUCTURE: &str = "application/vnd.ms-excel.rdrichvaluestructure+xml";
pub const RICH_VALUE_REL: &str = "application/vnd.ms-excel.richvaluerel+xml";

/// MIME type for a media extension
pub fn image_content_type(extension: &str) -> String {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "tif" | "tiff" => "image/tiff".to_string(),
        other => format!("image/{other}"),
    }
}

#[derive(Debug, Clone)]
pub struct ContentTypes {
    doc: XmlDocument,
}

impl ContentTypes {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            doc: XmlDocument::parse(bytes)?,
        })
    }

    pub fn has_default(&self, extension: &str) -> bool {
        self.doc.root.elements().any(|e| {
            e.local_name() == "Default"
                && e.attr("Extension")
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
    }

    pub fn has_override(&self, part: &str) -> bool {
        let part_name = format!("/{part}");
        self.doc
            .root
            .elements()
            .any(|e| e.local_name() == "Override" && e.attr("PartName") == Some(part_name.as_str()))
    }

    /// `<Default>` entries precede `<Override>` entries
    pub fn ensure_default(&mut self, extension: &str, content_type: &str) {
        if self.has_default(extension) {
            return;
        }
        let element = XmlElement::new(format!("{}Default", self.doc.root.prefix()))
            .with_attr("Extension", extension)
            .with_attr("ContentType", content_type);
        let index = self
            .doc
            .root
            .children
            .iter()
            .position(|node| matches!(node, crate::xml::XmlNode::Element(e) if e.local_name() == "Override"))
            .unwrap_or(self.doc.root.children.len());
        self.doc.root.insert(index, element);
    }

    pub fn ensure_override(&mut self, part: &str, content_type: &str) {
        if self.has_override(part) {
            return;
        }
        let element = XmlElement::new(format!("{}Override", self.doc.root.prefix()))
            .with_attr("PartName", format!("/{part}"))
            .with_attr("ContentType", content_type);
        self.doc.root.push(element);
    }

    pub fn remove_override(&mut self, part: &str) {
        let part_name = format!("/{part}");
        self.doc.root.children.retain(|node| match node {
            crate::xml::XmlNode::Element(e) => {
                !(e.local_name() == "Override" && e.attr("PartName") == Some(part_name.as_str()))
            }
            _ => true,
        });
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.doc.to_bytes()
    }
}
