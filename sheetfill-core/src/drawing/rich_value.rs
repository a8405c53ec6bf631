//! Image-in-cell through rich values: `metadata.xml` plus the `xl/richData` parts
//!
//! Each image needs a coordinated entry in the media folder, the rich value
//! relationship list and its `.rels`, the rich value table, and both metadata
//! blocks. [`RichData::insert_image`] is the only place that advances any of them.

use super::{image::ImageData, next_media_part, store_media};
use crate::error::{Result, TemplateError};
use crate::package::content_types;
use crate::package::relationships::{rel_types, relative_target, rels_for_part, resolve_target};
use crate::package::{ContentTypes, PendingParts, Relationships};
use crate::xml::{XmlDocument, XmlElement};

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const RICHDATA_NS: &str = "http://schemas.microsoft.com/office/spreadsheetml/2017/richdata";
const RICHVALUEREL_NS: &str = "http://schemas.microsoft.com/office/spreadsheetml/2022/richvaluerel";
const RICH_VALUE_BLOCK_URI: &str = "{3e2802c4-a4d2-4d8b-9148-e3be6c30e623}";

const METADATA_PART: &str = "xl/metadata.xml";
const VALUES_PART: &str = "xl/richData/rdrichvalue.xml";
const STRUCTURES_PART: &str = "xl/richData/rdrichvaluestructure.xml";
const REL_LIST_PART: &str = "xl/richData/richValueRel.xml";

const LOCAL_IMAGE: &str = "_localImage";
const LOCAL_IMAGE_KEY: &str = "_rvRel:LocalImageIdentifier";
const CALC_ORIGIN_KEY: &str = "CalcOrigin";
/// CalcOrigin Excel writes for pictures placed in cells
const CALC_ORIGIN_PLACED: &str = "5";
const RICH_VALUE_TYPE: &str = "XLRICHVALUE";

const METADATA_ORDER: &[&str] = &[
    "metadataTypes",
    "metadataStrings",
    "mdxMetadata",
    "futureMetadata",
    "cellMetadata",
    "valueMetadata",
    "extLst",
];

/// Indices reserved for one image-in-cell value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RichValueSlot {
    pub media_part: String,
    /// Relationship id in `richValueRel.xml.rels`
    pub media_rel_id: String,
    /// Position in `richValueRel.xml`
    pub rel_index: usize,
    /// Position in `rdrichvalue.xml`
    pub value_index: usize,
    /// Position among the `XLRICHVALUE` future metadata blocks
    pub future_index: usize,
    /// 1-based `vm` attribute for the cell
    pub value_metadata: usize,
}

/// The rich-data parts of a workbook, loaded or created on first use
#[derive(Debug, Clone)]
pub struct RichData {
    metadata_part: String,
    values_part: String,
    structures_part: String,
    rel_list_part: String,
    metadata: XmlDocument,
    values: XmlDocument,
    structures: XmlDocument,
    rel_list: XmlDocument,
    rel_list_rels: Relationships,
}

impl RichData {
    pub fn load(
        parts: &PendingParts<'_>,
        workbook_part: &str,
        workbook_rels: &Relationships,
    ) -> Result<Self> {
        let locate = |rel_type: &str, default: &str| {
            workbook_rels
                .find_by_type(rel_type)
                .map(|rel| resolve_target(workbook_part, &rel.target))
                .unwrap_or_else(|| default.to_string())
        };
        let metadata_part = locate(rel_types::SHEET_METADATA, METADATA_PART);
        let values_part = locate(rel_types::RD_RICH_VALUE, VALUES_PART);
        let structures_part = locate(rel_types::RD_RICH_VALUE_STRUCTURE, STRUCTURES_PART);
        let rel_list_part = locate(rel_types::RICH_VALUE_REL, REL_LIST_PART);

        let parse_or = |part: &str, fallback: fn() -> XmlElement| -> Result<XmlDocument> {
            match parts.get(part) {
                Some(bytes) => XmlDocument::parse(bytes),
                None => Ok(XmlDocument::new(fallback())),
            }
        };
        let metadata = parse_or(&metadata_part, || {
            XmlElement::new("metadata")
                .with_attr("xmlns", MAIN_NS)
                .with_attr("xmlns:xlrd", RICHDATA_NS)
        })?;
        let values = parse_or(&values_part, || {
            XmlElement::new("rvData")
                .with_attr("xmlns", RICHDATA_NS)
                .with_attr("count", "0")
        })?;
        let structures = parse_or(&structures_part, || {
            XmlElement::new("rvStructures")
                .with_attr("xmlns", RICHDATA_NS)
                .with_attr("count", "0")
        })?;
        let rel_list = parse_or(&rel_list_part, || {
            XmlElement::new("richValueRels")
                .with_attr("xmlns", RICHVALUEREL_NS)
                .with_attr("xmlns:r", rel_types::OFFICE_NS)
        })?;
        let rel_list_rels = match parts.get(&rels_for_part(&rel_list_part)) {
            Some(bytes) => Relationships::parse(bytes)?,
            None => Relationships::new(),
        };

        Ok(Self {
            metadata_part,
            values_part,
            structures_part,
            rel_list_part,
            metadata,
            values,
            structures,
            rel_list,
            rel_list_rels,
        })
    }

    /// Store the image and register it as a new rich value; returns the cell's `vm`
    pub fn insert_image(
        &mut self,
        parts: &mut PendingParts<'_>,
        content_types: &mut ContentTypes,
        image: ImageData,
    ) -> Result<usize> {
        let structure = self.ensure_local_image_structure();
        let type_index = self.ensure_metadata_type()?;
        let slot = self.allocate(parts, &image.info.extension);
        let extension = image.info.extension.clone();
        store_media(parts, content_types, &slot.media_part, &extension, image.bytes);
        self.commit(&slot, structure, type_index)?;
        log::debug!("image-in-cell {} stored as rich value {}", slot.media_part, slot.value_index);
        Ok(slot.value_metadata)
    }

    /// Compute the next free index in every part without touching any of them
    fn allocate(&self, parts: &PendingParts<'_>, extension: &str) -> RichValueSlot {
        let count = |root: &XmlElement, name: &str| root.elements().filter(|e| e.local_name() == name).count();
        RichValueSlot {
            media_part: next_media_part(parts, extension),
            media_rel_id: self.rel_list_rels.next_id(),
            rel_index: count(&self.rel_list.root, "rel"),
            value_index: count(&self.values.root, "rv"),
            future_index: self
                .future_block()
                .map(|block| count(block, "bk"))
                .unwrap_or(0),
            value_metadata: self
                .metadata
                .root
                .find("valueMetadata")
                .map(|block| count(block, "bk"))
                .unwrap_or(0)
                + 1,
        }
    }

    fn commit(&mut self, slot: &RichValueSlot, structure: usize, type_index: usize) -> Result<()> {
        let rel_id = self.rel_list_rels.add(
            rel_types::IMAGE,
            &relative_target(&self.rel_list_part, &slot.media_part),
        );
        debug_assert_eq!(rel_id, slot.media_rel_id);

        let prefix = self.rel_list.root.prefix().to_string();
        self.rel_list
            .root
            .push(XmlElement::new(format!("{prefix}rel")).with_attr("r:id", rel_id));

        let keys: Vec<String> = self
            .structures
            .root
            .elements()
            .filter(|e| e.local_name() == "s")
            .nth(structure)
            .map(|s| {
                s.elements()
                    .filter_map(|k| k.attr("n").map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let mut rv = XmlElement::new("rv").with_attr("s", structure.to_string());
        for key in keys {
            let value = match key.as_str() {
                LOCAL_IMAGE_KEY => slot.rel_index.to_string(),
                CALC_ORIGIN_KEY => CALC_ORIGIN_PLACED.to_string(),
                _ => "0".to_string(),
            };
            rv.push(XmlElement::new("v").with_text(value));
        }
        self.values.root.push(rv);
        let rv_count = self.values.root.elements().filter(|e| e.local_name() == "rv").count();
        self.values.root.set_attr("count", rv_count.to_string());

        let order = METADATA_ORDER;
        let future = self.future_block_mut(order)?;
        future.push(
            XmlElement::new("bk").with_child(
                XmlElement::new("extLst").with_child(
                    XmlElement::new("ext")
                        .with_attr("uri", RICH_VALUE_BLOCK_URI)
                        .with_child(XmlElement::new("xlrd:rvb").with_attr("i", slot.value_index.to_string())),
                ),
            ),
        );
        let future_count = future.elements().filter(|e| e.local_name() == "bk").count();
        future.set_attr("count", future_count.to_string());

        let value_metadata = self.metadata.root.ensure_child("valueMetadata", order)?;
        value_metadata.push(
            XmlElement::new("bk").with_child(
                XmlElement::new("rc")
                    .with_attr("t", type_index.to_string())
                    .with_attr("v", slot.future_index.to_string()),
            ),
        );
        let value_count = value_metadata.elements().filter(|e| e.local_name() == "bk").count();
        value_metadata.set_attr("count", value_count.to_string());
        Ok(())
    }

    /// Index of the `_localImage` structure, appending it when absent
    fn ensure_local_image_structure(&mut self) -> usize {
        let existing = self
            .structures
            .root
            .elements()
            .filter(|e| e.local_name() == "s")
            .position(|s| {
                s.attr("t") == Some(LOCAL_IMAGE)
                    && s.elements().any(|k| k.attr("n") == Some(LOCAL_IMAGE_KEY))
            });
        if let Some(index) = existing {
            return index;
        }
        let index = self
            .structures
            .root
            .elements()
            .filter(|e| e.local_name() == "s")
            .count();
        self.structures.root.push(
            XmlElement::new("s")
                .with_attr("t", LOCAL_IMAGE)
                .with_child(XmlElement::new("k").with_attr("n", LOCAL_IMAGE_KEY).with_attr("t", "i"))
                .with_child(XmlElement::new("k").with_attr("n", CALC_ORIGIN_KEY).with_attr("t", "i")),
        );
        self.structures.root.set_attr("count", (index + 1).to_string());
        index
    }

    /// 1-based index of the `XLRICHVALUE` metadata type, adding it when absent
    fn ensure_metadata_type(&mut self) -> Result<usize> {
        if self.metadata.root.attr("xmlns:xlrd").is_none() {
            self.metadata.root.set_attr("xmlns:xlrd", RICHDATA_NS);
        }
        let types = self.metadata.root.ensure_child("metadataTypes", METADATA_ORDER)?;
        let existing = types
            .elements()
            .filter(|e| e.local_name() == "metadataType")
            .position(|t| t.attr("name") == Some(RICH_VALUE_TYPE));
        if let Some(index) = existing {
            return Ok(index + 1);
        }
        let mut rich_type = XmlElement::new("metadataType")
            .with_attr("name", RICH_VALUE_TYPE)
            .with_attr("minSupportedVersion", "120000");
        for flag in [
            "copy",
            "pasteAll",
            "pasteValues",
            "merge",
            "splitFirst",
            "rowColShift",
            "clearFormats",
            "clearComments",
            "assign",
            "coerce",
        ] {
            rich_type.set_attr(flag, "1");
        }
        types.push(rich_type);
        let count = types
            .elements()
            .filter(|e| e.local_name() == "metadataType")
            .count();
        types.set_attr("count", count.to_string());
        Ok(count)
    }

    fn future_block(&self) -> Option<&XmlElement> {
        self.metadata
            .root
            .elements()
            .find(|e| e.local_name() == "futureMetadata" && e.attr("name") == Some(RICH_VALUE_TYPE))
    }

    fn future_block_mut(&mut self, order: &[&str]) -> Result<&mut XmlElement> {
        let root = &mut self.metadata.root;
        let exists = root
            .elements()
            .any(|e| e.local_name() == "futureMetadata" && e.attr("name") == Some(RICH_VALUE_TYPE));
        if !exists {
            root.insert_ordered(
                XmlElement::new("futureMetadata").with_attr("name", RICH_VALUE_TYPE),
                order,
            );
        }
        match root
            .elements_mut()
            .find(|e| e.local_name() == "futureMetadata" && e.attr("name") == Some(RICH_VALUE_TYPE))
        {
            Some(block) => Ok(block),
            None => Err(TemplateError::structural("futureMetadata block could not be placed")),
        }
    }

    /// Write all parts and make sure the workbook relationships and content types point at them
    pub fn write(
        &self,
        parts: &mut PendingParts<'_>,
        workbook_part: &str,
        workbook_rels: &mut Relationships,
        content_types: &mut ContentTypes,
    ) -> Result<()> {
        let entries = [
            (&self.metadata_part, &self.metadata, rel_types::SHEET_METADATA, content_types::SHEET_METADATA),
            (&self.values_part, &self.values, rel_types::RD_RICH_VALUE, content_types::RD_RICH_VALUE),
            (
                &self.structures_part,
                &self.structures,
                rel_types::RD_RICH_VALUE_STRUCTURE,
                content_types::RD_RICH_VALUE_STRUCTURE,
            ),
            (&self.rel_list_part, &self.rel_list, rel_types::RICH_VALUE_REL, content_types::RICH_VALUE_REL),
        ];
        for (part, doc, rel_type, content_type) in entries {
            parts.put(part, doc.to_bytes()?);
            if workbook_rels.find_by_type(rel_type).is_none() {
                workbook_rels.add(rel_type, &relative_target(workbook_part, part));
            }
            content_types.ensure_override(part, content_type);
        }
        parts.put(&rels_for_part(&self.rel_list_part), self.rel_list_rels.to_bytes()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawing::image::{ImageInfo, tests::PNG_2X1};
    use crate::package::Package;
    use base64::Engine;

    fn image() -> ImageData {
        ImageData {
            bytes: base64::engine::general_purpose::STANDARD.decode(PNG_2X1).unwrap(),
            info: ImageInfo {
                width: 2,
                height: 1,
                extension: "png".to_string(),
            },
        }
    }

    fn content_types() -> ContentTypes {
        ContentTypes::parse(br#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#)
            .unwrap()
    }

    #[test]
    fn test_first_image_creates_all_parts() {
        let package = Package::default();
        let mut parts = PendingParts::new(&package);
        let mut rels = Relationships::new();
        let mut types = content_types();
        let mut rich = RichData::load(&parts, "xl/workbook.xml", &rels).unwrap();

        assert_eq!(rich.insert_image(&mut parts, &mut types, image()).unwrap(), 1);
        assert_eq!(rich.insert_image(&mut parts, &mut types, image()).unwrap(), 2);
        rich.write(&mut parts, "xl/workbook.xml", &mut rels, &mut types).unwrap();

        assert!(parts.contains("xl/media/image1.png"));
        assert!(parts.contains("xl/media/image2.png"));
        assert_eq!(rels.iter().count(), 4);
        assert_eq!(rels.find_by_type(rel_types::SHEET_METADATA).unwrap().target, "metadata.xml");
        assert!(types.has_override("xl/richData/rdrichvalue.xml"));
        assert!(types.has_default("png"));

        let values = XmlDocument::parse(parts.get(VALUES_PART).unwrap()).unwrap();
        assert_eq!(values.root.attr("count"), Some("2"));
        let second: Vec<String> = values.root.find_all("rv[2]/v").iter().map(|v| v.text()).collect();
        assert_eq!(second, vec!["1", "5"]);

        let metadata = XmlDocument::parse(parts.get(METADATA_PART).unwrap()).unwrap();
        let order: Vec<&str> = metadata.root.elements().map(|e| e.local_name()).collect();
        assert_eq!(order, vec!["metadataTypes", "futureMetadata", "valueMetadata"]);
        assert_eq!(metadata.root.find("futureMetadata/bk[2]/extLst/ext/rvb").unwrap().attr("i"), Some("1"));
        assert_eq!(metadata.root.find("valueMetadata/bk[2]/rc").unwrap().attr("v"), Some("1"));
        assert_eq!(metadata.root.find("valueMetadata/bk/rc").unwrap().attr("t"), Some("1"));

        let rel_list_rels = Relationships::parse(parts.get("xl/richData/_rels/richValueRel.xml.rels").unwrap()).unwrap();
        assert_eq!(rel_list_rels.get("rId2").unwrap().target, "../media/image2.png");
    }

    #[test]
    fn test_allocation_continues_existing_parts() {
        let mut package = Package::default();
        package.put("xl/media/image4.png", vec![]);
        package.put(
            METADATA_PART,
            br#"<metadata xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><metadataTypes count="2"><metadataType name="XLDAPR"/><metadataType name="XLRICHVALUE"/></metadataTypes><futureMetadata name="XLRICHVALUE" count="1"><bk/></futureMetadata><valueMetadata count="1"><bk><rc t="2" v="0"/></bk></valueMetadata></metadata>"#.to_vec(),
        );
        let parts = PendingParts::new(&package);
        let rels = Relationships::new();
        let mut rich = RichData::load(&parts, "xl/workbook.xml", &rels).unwrap();
        assert_eq!(rich.ensure_metadata_type().unwrap(), 2);

        let slot = rich.allocate(&parts, "png");
        assert_eq!(slot.media_part, "xl/media/image5.png");
        assert_eq!(slot.future_index, 1);
        assert_eq!(slot.value_metadata, 2);
        assert_eq!(slot.rel_index, 0);
        assert_eq!(slot.media_rel_id, "rId1");
    }
}
