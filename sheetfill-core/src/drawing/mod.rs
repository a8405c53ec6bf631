//! Drawing anchors: image placement, media naming and anchor shifting

pub mod geometry;
pub mod image;
pub mod rich_value;
pub mod units;

use crate::error::{Result, TemplateError};
use crate::package::content_types::{self, image_content_type};
use crate::package::relationships::{rel_types, relative_target, rels_for_part, resolve_target};
use crate::package::{ContentTypes, PendingParts, Relationships};
use crate::reference::CellRef;
use crate::xml::{WORKSHEET_ORDER, XmlDocument, XmlElement};
use regex::Regex;
use std::sync::OnceLock;

const XDR_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing";
const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";

fn drawing_part_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^xl/drawings/drawing(\d+)\.xml$").expect("drawing regex is valid"))
}

fn media_part_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^xl/media/image(\d+)\.\w+$").expect("media regex is valid"))
}

/// One past the highest numeric suffix among parts matching `pattern`
fn next_suffix(parts: &PendingParts<'_>, pattern: &Regex) -> u32 {
    parts
        .list_matching(pattern)
        .iter()
        .filter_map(|name| pattern.captures(name)?.get(1)?.as_str().parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        + 1
}

/// Next free `xl/media/imageN.ext`
pub fn next_media_part(parts: &PendingParts<'_>, extension: &str) -> String {
    format!("xl/media/image{}.{extension}", next_suffix(parts, media_part_regex()))
}

/// Store media bytes and register the extension's content type
pub fn store_media(
    parts: &mut PendingParts<'_>,
    content_types: &mut ContentTypes,
    part: &str,
    extension: &str,
    bytes: Vec<u8>,
) {
    parts.put(part, bytes);
    content_types.ensure_default(extension, &image_content_type(extension));
}

/// A sheet's drawing part plus its relationships
#[derive(Debug, Clone)]
pub struct DrawingPart {
    pub part: String,
    pub doc: XmlDocument,
    pub rels: Relationships,
}

impl DrawingPart {
    pub fn new(part: &str) -> Self {
        let root = XmlElement::new("xdr:wsDr")
            .with_attr("xmlns:xdr", XDR_NS)
            .with_attr("xmlns:a", A_NS);
        Self {
            part: part.to_string(),
            doc: XmlDocument::new(root),
            rels: Relationships::new(),
        }
    }

    pub fn parse(part: &str, bytes: &[u8], rels: Option<&[u8]>) -> Result<Self> {
        let rels = match rels {
            Some(bytes) => Relationships::parse(bytes)?,
            None => Relationships::new(),
        };
        Ok(Self {
            part: part.to_string(),
            doc: XmlDocument::parse(bytes)?,
            rels,
        })
    }

    /// Resolve the sheet's `<drawing r:id>`, or create a drawing and wire it to the sheet
    pub fn load_or_create(
        sheet_part: &str,
        sheet: &mut XmlDocument,
        sheet_rels: &mut Relationships,
        parts: &PendingParts<'_>,
        content_types: &mut ContentTypes,
    ) -> Result<Self> {
        if let Some(id) = sheet.root.find("drawing").and_then(|d| d.attr("r:id")) {
            let rel = sheet_rels
                .get(id)
                .ok_or_else(|| TemplateError::structural(format!("drawing relationship {id} missing")))?;
            let part = resolve_target(sheet_part, &rel.target);
            let bytes = parts
                .get(&part)
                .ok_or_else(|| TemplateError::structural(format!("drawing part {part} missing")))?;
            return Self::parse(&part, bytes, parts.get(&rels_for_part(&part)));
        }

        let part = format!("xl/drawings/drawing{}.xml", next_suffix(parts, drawing_part_regex()));
        let id = sheet_rels.add(rel_types::DRAWING, &relative_target(sheet_part, &part));
        if sheet.root.attr("xmlns:r").is_none() {
            sheet.root.set_attr("xmlns:r", rel_types::OFFICE_NS);
        }
        let prefix = sheet.root.prefix().to_string();
        sheet.root.insert_ordered(
            XmlElement::new(format!("{prefix}drawing")).with_attr("r:id", id),
            WORKSHEET_ORDER,
        );
        content_types.ensure_override(&part, content_types::DRAWING);
        log::debug!("created drawing part {part} for {sheet_part}");
        Ok(Self::new(&part))
    }

    fn prefix(&self) -> String {
        self.doc.root.prefix().to_string()
    }

    fn next_shape_id(&self) -> u32 {
        fn max_id(element: &XmlElement) -> u32 {
            let own = if element.local_name() == "cNvPr" {
                element.attr("id").and_then(|id| id.parse().ok()).unwrap_or(0)
            } else {
                0
            };
            element.elements().map(max_id).fold(own, u32::max)
        }
        max_id(&self.doc.root) + 1
    }

    /// Add a one-cell anchored picture at `cell` with an EMU extent
    pub fn add_picture(&mut self, cell: &CellRef, cx: i64, cy: i64, media_part: &str) -> String {
        let rel_id = self
            .rels
            .add(rel_types::IMAGE, &relative_target(&self.part, media_part));
        if self.doc.root.attr("xmlns:a").is_none() {
            self.doc.root.set_attr("xmlns:a", A_NS);
        }
        let anchor = picture_anchor(&self.prefix(), cell, cx, cy, self.next_shape_id(), &rel_id);
        self.doc.root.push(anchor);
        rel_id
    }

    /// Shift two-cell anchors starting below `at_row` (or on it, with `same_line`)
    pub fn move_anchors(&mut self, at_row: u32, count: u32, same_line: bool) -> usize {
        let mut moved = 0;
        for anchor in self
            .doc
            .root
            .elements_mut()
            .filter(|e| e.local_name() == "twoCellAnchor")
        {
            let Some(from_row) = anchor
                .find("from/row")
                .and_then(|r| r.text().trim().parse::<u32>().ok())
            else {
                continue;
            };
            // anchor rows are 0-based
            let starts_at = from_row + 1;
            if starts_at > at_row || (same_line && starts_at >= at_row) {
                for path in ["from/row", "to/row"] {
                    if let Some(row) = anchor.find_mut(path) {
                        if let Ok(value) = row.text().trim().parse::<u32>() {
                            row.set_text((value + count).to_string());
                        }
                    }
                }
                moved += 1;
            }
        }
        moved
    }

    pub fn write(&self, parts: &mut PendingParts<'_>) -> Result<()> {
        parts.put(&self.part, self.doc.to_bytes()?);
        parts.put(&rels_for_part(&self.part), self.rels.to_bytes()?);
        Ok(())
    }
}

fn picture_anchor(prefix: &str, cell: &CellRef, cx: i64, cy: i64, id: u32, rel_id: &str) -> XmlElement {
    let x = |name: &str| XmlElement::new(format!("{prefix}{name}"));
    let a = |name: &str| XmlElement::new(format!("a:{name}"));

    let from = x("from")
        .with_child(x("col").with_text((cell.col - 1).to_string()))
        .with_child(x("colOff").with_text("0"))
        .with_child(x("row").with_text((cell.row - 1).to_string()))
        .with_child(x("rowOff").with_text("0"));

    let nv_pic_pr = x("nvPicPr")
        .with_child(
            x("cNvPr")
                .with_attr("id", id.to_string())
                .with_attr("name", format!("Picture {id}")),
        )
        .with_child(x("cNvPicPr").with_child(a("picLocks").with_attr("noChangeAspect", "1")));

    let blip_fill = x("blipFill")
        .with_child(
            a("blip")
                .with_attr("xmlns:r", rel_types::OFFICE_NS)
                .with_attr("r:embed", rel_id),
        )
        .with_child(a("stretch").with_child(a("fillRect")));

    let sp_pr = x("spPr")
        .with_child(
            a("xfrm")
                .with_child(a("off").with_attr("x", "0").with_attr("y", "0"))
                .with_child(
                    a("ext")
                        .with_attr("cx", cx.to_string())
                        .with_attr("cy", cy.to_string()),
                ),
        )
        .with_child(a("prstGeom").with_attr("prst", "rect").with_child(a("avLst")));

    x("oneCellAnchor")
        .with_child(from)
        .with_child(
            x("ext")
                .with_attr("cx", cx.to_string())
                .with_attr("cy", cy.to_string()),
        )
        .with_child(x("pic").with_child(nv_pic_pr).with_child(blip_fill).with_child(sp_pr))
        .with_child(x("clientData"))
}
