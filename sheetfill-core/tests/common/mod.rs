#![allow(dead_code)]

use sheetfill_core::package::Package;
use sheetfill_core::xml::XmlDocument;
use std::io::{Cursor, Write};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

pub const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
pub const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub const HYPERLINK_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";
pub const TABLE_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/table";
pub const DRAWING_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing";

/// 2x1 and 40x20 transparent PNGs
pub const PNG_2X1: &str = "iVBORw0KGgoAAAANSUhEUgAAAAIAAAABCAYAAAD0In+KAAAAC0lEQVR4nGNggAIAAAkAAftSuKkAAAAASUVORK5CYII=";
pub const PNG_40X20: &str = "iVBORw0KGgoAAAANSUhEUgAAACgAAAAUCAYAAAD/Rn+7AAAAGklEQVR4nO3BMQEAAADCoPVPbQwfoAAAAH4GDJQAAXzgqvAAAAAASUVORK5CYII=";

struct MockSheet {
    name: String,
    xml: String,
    rels: Vec<(String, String, String, bool)>,
}

struct MockPart {
    name: String,
    content: String,
    content_type: Option<String>,
}

/// Builder for minimal xlsx templates
pub struct MockTemplate {
    strings: Vec<String>,
    sheets: Vec<MockSheet>,
    defined_names: Vec<String>,
    calc_chain: bool,
    parts: Vec<MockPart>,
}

impl MockTemplate {
    pub fn new(strings: &[&str]) -> Self {
        Self {
            strings: strings.iter().map(|s| s.to_string()).collect(),
            sheets: Vec::new(),
            defined_names: Vec::new(),
            calc_chain: false,
            parts: Vec::new(),
        }
    }

    /// Add a sheet; `body` is the content of `<worksheet>`
    pub fn sheet(mut self, name: &str, body: &str) -> Self {
        self.sheets.push(MockSheet {
            name: name.to_string(),
            xml: worksheet(body),
            rels: Vec::new(),
        });
        self
    }

    /// Relationship on the last added sheet
    pub fn sheet_rel(mut self, id: &str, rel_type: &str, target: &str, external: bool) -> Self {
        if let Some(sheet) = self.sheets.last_mut() {
            sheet
                .rels
                .push((id.to_string(), rel_type.to_string(), target.to_string(), external));
        }
        self
    }

    /// Raw `<definedName>` element
    pub fn defined_name(mut self, xml: &str) -> Self {
        self.defined_names.push(xml.to_string());
        self
    }

    pub fn with_calc_chain(mut self) -> Self {
        self.calc_chain = true;
        self
    }

    pub fn part(mut self, name: &str, content: &str, content_type: Option<&str>) -> Self {
        self.parts.push(MockPart {
            name: name.to_string(),
            content: content.to_string(),
            content_type: content_type.map(str::to_string),
        });
        self
    }

    pub fn build(&self) -> anyhow::Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

        let mut content_types = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
        );
        for i in 1..=self.sheets.len() {
            content_types.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{i}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
            ));
        }
        if self.calc_chain {
            content_types.push_str(
                r#"<Override PartName="/xl/calcChain.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml"/>"#,
            );
        }
        for part in &self.parts {
            if let Some(content_type) = &part.content_type {
                content_types.push_str(&format!(
                    r#"<Override PartName="/{}" ContentType="{content_type}"/>"#,
                    part.name
                ));
            }
        }
        content_types.push_str("</Types>");
        zip.start_file("[Content_Types].xml", options)?;
        zip.write_all(content_types.as_bytes())?;

        zip.start_file("_rels/.rels", options)?;
        zip.write_all(
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#,
        )?;

        let mut workbook = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheets>"#
        );
        for (i, sheet) in self.sheets.iter().enumerate() {
            workbook.push_str(&format!(
                r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                sheet.name,
                i + 1,
                i + 1
            ));
        }
        workbook.push_str("</sheets>");
        if !self.defined_names.is_empty() {
            workbook.push_str("<definedNames>");
            for name in &self.defined_names {
                workbook.push_str(name);
            }
            workbook.push_str("</definedNames>");
        }
        workbook.push_str("</workbook>");
        zip.start_file("xl/workbook.xml", options)?;
        zip.write_all(workbook.as_bytes())?;

        let n = self.sheets.len();
        let mut rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for i in 1..=n {
            rels.push_str(&format!(
                r#"<Relationship Id="rId{i}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{i}.xml"/>"#
            ));
        }
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>"#,
            n + 1
        ));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
            n + 2
        ));
        if self.calc_chain {
            rels.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain" Target="calcChain.xml"/>"#,
                n + 3
            ));
        }
        rels.push_str("</Relationships>");
        zip.start_file("xl/_rels/workbook.xml.rels", options)?;
        zip.write_all(rels.as_bytes())?;

        let mut sst = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="{MAIN_NS}" count="{len}" uniqueCount="{len}">"#,
            len = self.strings.len()
        );
        for s in &self.strings {
            sst.push_str(&format!("<si><t>{}</t></si>", escape(s)));
        }
        sst.push_str("</sst>");
        zip.start_file("xl/sharedStrings.xml", options)?;
        zip.write_all(sst.as_bytes())?;

        zip.start_file("xl/styles.xml", options)?;
        zip.write_all(
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="{MAIN_NS}"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="1"><fill><patternFill patternType="none"/></fill></fills><borders count="1"><border/></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs></styleSheet>"#
            )
            .as_bytes(),
        )?;

        for (i, sheet) in self.sheets.iter().enumerate() {
            zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
            zip.write_all(sheet.xml.as_bytes())?;
            if sheet.rels.is_empty() {
                continue;
            }
            let mut rels = String::from(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
            );
            for (id, rel_type, target, external) in &sheet.rels {
                let mode = if *external { r#" TargetMode="External""# } else { "" };
                rels.push_str(&format!(
                    r#"<Relationship Id="{id}" Type="{rel_type}" Target="{}"{mode}/>"#,
                    escape(target)
                ));
            }
            rels.push_str("</Relationships>");
            zip.start_file(format!("xl/worksheets/_rels/sheet{}.xml.rels", i + 1), options)?;
            zip.write_all(rels.as_bytes())?;
        }

        if self.calc_chain {
            zip.start_file("xl/calcChain.xml", options)?;
            zip.write_all(
                format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><calcChain xmlns="{MAIN_NS}"><c r="A1" i="1"/></calcChain>"#)
                    .as_bytes(),
            )?;
        }

        for part in &self.parts {
            zip.start_file(part.name.as_str(), options)?;
            zip.write_all(part.content.as_bytes())?;
        }

        Ok(zip.finish()?.into_inner())
    }
}

pub fn worksheet(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="{MAIN_NS}" xmlns:r="{REL_NS}">{body}</worksheet>"#
    )
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

/// Parse one part of a generated package
pub fn part_xml(package: &Package, name: &str) -> XmlDocument {
    let bytes = package
        .get(name)
        .unwrap_or_else(|| panic!("part {name} missing"));
    XmlDocument::parse(bytes).unwrap()
}

pub fn part_text(package: &Package, name: &str) -> String {
    let bytes = package
        .get(name)
        .unwrap_or_else(|| panic!("part {name} missing"));
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// The `<c>` element at `reference`
pub fn cell<'a>(sheet: &'a XmlDocument, reference: &str) -> Option<&'a sheetfill_core::xml::XmlElement> {
    sheet
        .root
        .find_all("sheetData/row/c")
        .into_iter()
        .find(|c| c.attr("r") == Some(reference))
}

/// Text the cell displays: pooled string, raw value or formula
pub fn cell_text(package: &Package, sheet: &XmlDocument, reference: &str) -> Option<String> {
    let c = cell(sheet, reference)?;
    if let Some(f) = c.child("f") {
        return Some(format!("={}", f.text()));
    }
    let value = c.child("v")?.text();
    if c.attr("t") == Some("s") {
        let sst = part_xml(package, "xl/sharedStrings.xml");
        let idx: usize = value.parse().ok()?;
        let si = sst.root.find_all("si").into_iter().nth(idx)?;
        return Some(si.find_all("t").iter().map(|t| t.text()).collect());
    }
    Some(value)
}
