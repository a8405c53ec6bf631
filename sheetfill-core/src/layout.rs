//! Structural references rebased when the engine inserts rows or columns
//!
//! Everything is parsed into typed ranges once per sheet, shifted in memory,
//! and written back to the XML when the sheet is finished.

use crate::error::{Result, TemplateError};
use crate::reference::{Area, CellRef, Range};
use crate::xml::{XmlDocument, XmlElement};

/// A defined name that points into the sheet being substituted
#[derive(Debug, Clone)]
pub struct DefinedName {
    /// Position among the workbook's `<definedName>` elements
    pub index: usize,
    pub area: Area,
    original: Area,
}

/// A structured table part owned by the sheet
#[derive(Debug, Clone)]
pub struct TablePart {
    pub part: String,
    pub doc: XmlDocument,
    pub range: Range,
    pub auto_filter: Option<Range>,
}

impl TablePart {
    pub fn parse(part: &str, bytes: &[u8]) -> Result<Self> {
        let doc = XmlDocument::parse(bytes)?;
        let range = parse_range(doc.root.attr("ref"), part)?;
        let auto_filter = match doc.root.find("autoFilter") {
            Some(filter) => Some(parse_range(filter.attr("ref"), part)?),
            None => None,
        };
        Ok(Self {
            part: part.to_string(),
            doc,
            range,
            auto_filter,
        })
    }

    /// Copy the in-memory ranges back into the table XML
    pub fn sync(&mut self) {
        self.doc.root.set_attr("ref", self.range.to_string());
        if let (Some(filter), Some(range)) = (self.doc.root.find_mut("autoFilter"), &self.auto_filter) {
            filter.set_attr("ref", range.to_string());
        }
    }

    /// `tableColumn` elements, for header-name substitution
    pub fn columns_mut(&mut self) -> Vec<&mut XmlElement> {
        let mut columns = Vec::new();
        if let Some(list) = self.doc.root.find_mut("tableColumns") {
            columns.extend(list.elements_mut().filter(|e| e.local_name() == "tableColumn"));
        }
        columns
    }
}

/// Merges, names, hyperlinks, tables, filters and page breaks of one sheet
#[derive(Debug, Clone, Default)]
pub struct SheetLayout {
    pub merges: Vec<Range>,
    pub hyperlinks: Vec<Area>,
    pub names: Vec<DefinedName>,
    pub tables: Vec<TablePart>,
    pub auto_filter: Option<Range>,
    pub row_breaks: Vec<u32>,
    merges_changed: bool,
}

impl SheetLayout {
    pub fn load(
        sheet: &XmlDocument,
        workbook: &XmlDocument,
        sheet_name: &str,
        sheet_index: usize,
        tables: Vec<TablePart>,
    ) -> Result<Self> {
        let merges = sheet
            .root
            .find_all("mergeCells/mergeCell")
            .into_iter()
            .map(|m| parse_range(m.attr("ref"), "mergeCell"))
            .collect::<Result<Vec<_>>>()?;

        let hyperlinks = sheet
            .root
            .find_all("hyperlinks/hyperlink")
            .into_iter()
            .map(|h| {
                h.attr("ref")
                    .ok_or_else(|| TemplateError::structural("hyperlink without ref"))?
                    .parse::<Area>()
                    .map_err(|e| TemplateError::structural(format!("hyperlink ref: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let auto_filter = match sheet.root.find("autoFilter") {
            Some(filter) => Some(parse_range(filter.attr("ref"), "autoFilter")?),
            None => None,
        };

        let row_breaks = sheet
            .root
            .find_all("rowBreaks/brk")
            .into_iter()
            .filter_map(|b| b.attr("id")?.parse().ok())
            .collect();

        Ok(Self {
            merges,
            hyperlinks,
            names: load_names(workbook, sheet_name, sheet_index),
            tables,
            auto_filter,
            row_breaks,
            merges_changed: false,
        })
    }

    /// Merge region containing `cell`, if any
    pub fn merge_containing(&self, cell: &CellRef) -> Option<&Range> {
        self.merges.iter().find(|m| m.contains(cell))
    }

    /// Shift structures right of `at` after `count` columns were inserted on its row
    pub fn push_right(&mut self, at: &CellRef, count: u32) {
        if count == 0 {
            return;
        }
        for merge in &mut self.merges {
            if merge.start.row == at.row && merge.start.col > at.col {
                merge.shift_cols(count);
                self.merges_changed = true;
            }
        }
        for name in &mut self.names {
            let start = name.area.start();
            if start.row == at.row && start.col > at.col {
                name.area.shift_cols(count);
            }
        }
        for link in &mut self.hyperlinks {
            if link.start().col > at.col {
                link.shift_cols(count);
            }
        }
    }

    /// Shift or grow structures after `count` rows were inserted below `at_row`
    pub fn push_down(&mut self, at_row: u32, count: u32, extend_names: bool) {
        if count == 0 {
            return;
        }

        let mut replicated = Vec::new();
        for merge in &mut self.merges {
            if merge.start.row > at_row {
                merge.shift_rows(count);
            } else if merge.start.row == at_row {
                for offset in 1..=count {
                    let mut copy = merge.clone();
                    copy.shift_rows(offset);
                    replicated.push(copy);
                }
            }
        }
        self.merges_changed |= !self.merges.is_empty();
        self.merges.extend(replicated);

        for table in &mut self.tables {
            if table.range.start.row > at_row {
                table.range.shift_rows(count);
                if let Some(filter) = &mut table.auto_filter {
                    filter.shift_rows(count);
                }
            } else if table.range.end.row >= at_row {
                table.range.end.row += count;
                if let Some(filter) = &mut table.auto_filter {
                    if filter.end.row >= at_row {
                        filter.end.row += count;
                    }
                }
            }
        }

        if let Some(filter) = &mut self.auto_filter {
            if filter.start.row > at_row {
                filter.shift_rows(count);
            } else if filter.end.row >= at_row {
                filter.end.row += count;
            }
        }

        for name in &mut self.names {
            if name.area.start().row > at_row {
                name.area.shift_rows(count);
            } else if extend_names {
                if let Area::Range(range) = &mut name.area {
                    if range.end.row >= at_row {
                        range.end.row += count;
                    }
                }
            }
        }

        for link in &mut self.hyperlinks {
            if link.start().row > at_row {
                link.shift_rows(count);
            }
        }

        if extend_names {
            for brk in &mut self.row_breaks {
                if *brk >= at_row {
                    *brk += count;
                }
            }
        }
    }

    /// Write merges, hyperlinks, filter and page breaks back into the sheet
    pub fn write_sheet(&self, sheet: &mut XmlDocument) {
        if self.merges_changed {
            if let Some(merge_cells) = sheet.root.find_mut("mergeCells") {
                let prefix = merge_cells.prefix().to_string();
                merge_cells.set_elements(
                    self.merges
                        .iter()
                        .map(|m| XmlElement::new(format!("{prefix}mergeCell")).with_attr("ref", m.to_string()))
                        .collect(),
                );
                merge_cells.set_attr("count", self.merges.len().to_string());
            }
        }

        if let Some(list) = sheet.root.find_mut("hyperlinks") {
            for (link, area) in list
                .elements_mut()
                .filter(|e| e.local_name() == "hyperlink")
                .zip(&self.hyperlinks)
            {
                link.set_attr("ref", area.to_string());
            }
        }

        if let (Some(filter), Some(range)) = (sheet.root.find_mut("autoFilter"), &self.auto_filter) {
            filter.set_attr("ref", range.to_string());
        }

        if let Some(breaks) = sheet.root.find_mut("rowBreaks") {
            for (brk, id) in breaks
                .elements_mut()
                .filter(|e| e.local_name() == "brk")
                .zip(&self.row_breaks)
            {
                brk.set_attr("id", id.to_string());
            }
        }
    }

    /// Write rebased names back into `workbook.xml`
    pub fn write_names(&self, workbook: &mut XmlDocument) {
        let Some(defined) = workbook.root.find_mut("definedNames") else {
            return;
        };
        let mut elements: Vec<&mut XmlElement> = defined
            .elements_mut()
            .filter(|e| e.local_name() == "definedName")
            .collect();
        for name in &self.names {
            if name.area == name.original {
                continue;
            }
            if let Some(element) = elements.get_mut(name.index) {
                element.set_text(name.area.to_string());
            }
        }
    }
}

fn parse_range(value: Option<&str>, what: &str) -> Result<Range> {
    let value = value.ok_or_else(|| TemplateError::structural(format!("{what} without ref")))?;
    match value.parse::<Area>() {
        Ok(Area::Range(range)) => Ok(range),
        Ok(Area::Cell(cell)) => Ok(Range::new(cell.clone(), cell)),
        Err(e) => Err(TemplateError::structural(format!("{what} ref {value:?}: {e}"))),
    }
}

/// Names pointing into this sheet: explicit `Sheet!` prefix, or unprefixed with a
/// matching `localSheetId`
fn load_names(workbook: &XmlDocument, sheet_name: &str, sheet_index: usize) -> Vec<DefinedName> {
    let Some(defined) = workbook.root.find("definedNames") else {
        return Vec::new();
    };
    defined
        .elements()
        .filter(|e| e.local_name() == "definedName")
        .enumerate()
        .filter_map(|(index, element)| {
            let text = element.text();
            let area = match text.trim().trim_start_matches('=').parse::<Area>() {
                Ok(area) => area,
                Err(_) => {
                    log::warn!("skipping defined name {:?} = {text:?}", element.attr("name"));
                    return None;
                }
            };
            let applies = match area.sheet() {
                Some(sheet) => sheet == sheet_name,
                None => element
                    .attr("localSheetId")
                    .and_then(|id| id.parse::<usize>().ok())
                    == Some(sheet_index),
            };
            applies.then(|| DefinedName {
                index,
                original: area.clone(),
                area,
            })
        })
        .collect()
}
