//! The cell walk: resolve placeholders row by row and grow the sheet as arrays expand
//!
//! A sheet is loaded from the staged parts, its rows are detached and rebuilt one
//! at a time, and every structure that refers to rows or columns (merges, names,
//! tables, hyperlinks, anchors) is rebased as rows and columns are inserted.
//! Nothing is written back until the whole sheet succeeded.

mod cells;
mod dispatch;
mod images;
mod table;

use crate::config::FillOptions;
use crate::data::DataValue;
use crate::drawing::DrawingPart;
use crate::drawing::geometry::SheetGeometry;
use crate::drawing::image::ImageResolver;
use crate::drawing::rich_value::RichData;
use crate::error::{Result, TemplateError};
use crate::layout::{SheetLayout, TablePart};
use crate::package::PendingParts;
use crate::package::relationships::{Relationships, rels_for_part, resolve_target};
use crate::reference::{Area, CellRef};
use crate::report::SubstitutionReport;
use crate::workbook::{SheetInfo, WorkbookState};
use crate::xml::{XmlDocument, XmlElement};
use std::collections::BTreeSet;

pub(crate) use dispatch::render_text;

/// Inputs of one sheet substitution
pub(crate) struct SheetJob<'a> {
    pub sheet: &'a SheetInfo,
    pub data: &'a DataValue,
    pub options: &'a FillOptions,
    pub images: &'a ImageResolver,
    pub workbook_part: &'a str,
}

/// Substitute one sheet. Workbook-wide state is updated in `state`, parts are staged in `parts`.
pub(crate) fn substitute_sheet(
    job: SheetJob<'_>,
    state: &mut WorkbookState,
    parts: &mut PendingParts<'_>,
) -> Result<SubstitutionReport> {
    let sheet_part = job.sheet.part.as_str();
    let bytes = parts
        .get(sheet_part)
        .ok_or_else(|| TemplateError::structural(format!("worksheet part {sheet_part} missing")))?;
    let doc = XmlDocument::parse(bytes)?;
    let rels = match parts.get(&rels_for_part(sheet_part)) {
        Some(bytes) => Some(Relationships::parse(bytes)?),
        None => None,
    };
    let tables = load_tables(&doc, sheet_part, rels.as_ref(), parts)?;
    let layout = SheetLayout::load(&doc, &state.workbook, &job.sheet.name, job.sheet.index, tables)?;
    let geometry = SheetGeometry::from_sheet(&doc);
    let report = SubstitutionReport::new(&job.sheet.name);

    let mut engine = SheetEngine {
        job,
        state,
        parts,
        doc,
        rels,
        rels_dirty: false,
        layout,
        geometry,
        drawing: None,
        rich_data: None,
        report,
        rows_inserted: 0,
        columns_inserted: 0,
    };
    engine.walk_rows()?;
    engine.finish()
}

fn load_tables(
    sheet: &XmlDocument,
    sheet_part: &str,
    rels: Option<&Relationships>,
    parts: &PendingParts<'_>,
) -> Result<Vec<TablePart>> {
    let ids: Vec<&str> = sheet
        .root
        .find_all("tableParts/tablePart")
        .into_iter()
        .filter_map(|t| t.attr("r:id"))
        .collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rels = rels.ok_or_else(|| TemplateError::structural(format!("{sheet_part} has tables but no relationships")))?;
    ids.into_iter()
        .map(|id| {
            let rel = rels
                .get(id)
                .ok_or_else(|| TemplateError::structural(format!("table relationship {id} missing")))?;
            let part = resolve_target(sheet_part, &rel.target);
            let bytes = parts
                .get(&part)
                .ok_or_else(|| TemplateError::structural(format!("table part {part} missing")))?;
            TablePart::parse(&part, bytes)
        })
        .collect()
}

/// Bookkeeping for one template row while its cells are substituted
struct RowExpansion {
    number: u32,
    cells_inserted: u32,
    template: XmlElement,
    template_cells: Vec<XmlElement>,
    new_rows: Vec<XmlElement>,
    table_columns: BTreeSet<u32>,
}

impl RowExpansion {
    /// Row `offset` below the template row, created from the template row on demand
    fn new_row(&mut self, offset: usize) -> &mut XmlElement {
        while self.new_rows.len() < offset {
            let number = self.number + self.new_rows.len() as u32 + 1;
            let mut row = self.template.shallow_clone();
            row.set_attr("r", number.to_string());
            self.new_rows.push(row);
        }
        &mut self.new_rows[offset - 1]
    }

    /// Copy the non-table cells of the finished row onto every new row
    fn copy_row_cells(&mut self, row: &XmlElement) {
        let extra: Vec<&XmlElement> = row
            .elements()
            .filter(|c| c.local_name() == "c" && !self.table_columns.contains(&cells::cell_col(c)))
            .collect();
        for (idx, new_row) in self.new_rows.iter_mut().enumerate() {
            let number = self.number + idx as u32 + 1;
            for cell in &extra {
                let col = cells::cell_col(cell);
                if new_row.elements().any(|c| cells::cell_col(c) == col) {
                    continue;
                }
                let mut copy = (*cell).clone();
                copy.set_attr("r", CellRef::new(col, number).to_string());
                new_row.push(copy);
            }
        }
    }
}

struct SheetEngine<'a, 'p> {
    job: SheetJob<'a>,
    state: &'a mut WorkbookState,
    parts: &'a mut PendingParts<'p>,
    doc: XmlDocument,
    rels: Option<Relationships>,
    rels_dirty: bool,
    layout: SheetLayout,
    geometry: SheetGeometry,
    drawing: Option<DrawingPart>,
    rich_data: Option<RichData>,
    report: SubstitutionReport,
    rows_inserted: u32,
    columns_inserted: u32,
}

impl SheetEngine<'_, '_> {
    fn walk_rows(&mut self) -> Result<()> {
        let template_rows = match self.doc.root.find_mut("sheetData") {
            Some(sheet_data) => sheet_data.take_elements(),
            None => return Ok(()),
        };

        let mut rows = Vec::with_capacity(template_rows.len());
        let mut previous = 0;
        for mut row in template_rows {
            if row.local_name() != "row" {
                rows.push(row);
                continue;
            }
            let original = match row.attr("r") {
                Some(r) => r.trim().parse::<u32>().map_err(|_| TemplateError::Parse(r.to_string()))?,
                None => previous + 1,
            };
            previous = original;
            let number = original + self.rows_inserted;
            row.set_attr("r", number.to_string());
            self.geometry.place_row(&row, number);

            let mut expansion = self.substitute_row(&mut row, number)?;
            if expansion.new_rows.is_empty() {
                rows.push(row);
                continue;
            }

            let count = expansion.new_rows.len() as u32;
            let options = self.job.options;
            if options.substitute_all_table_row {
                expansion.copy_row_cells(&row);
            }
            if options.move_images {
                if let Some(drawing) = self.existing_drawing()? {
                    let moved = drawing.move_anchors(number, count, options.move_same_line_images);
                    log::trace!("moved {moved} anchors below row {number}");
                }
            }

            rows.push(row);
            for (idx, mut new_row) in expansion.new_rows.into_iter().enumerate() {
                cells::sort_cells(&mut new_row);
                self.geometry.place_row(&new_row, number + idx as u32 + 1);
                rows.push(new_row);
            }
            self.layout
                .push_down(number, count, options.push_down_page_break_on_table_substitution);
            self.rows_inserted += count;
            log::debug!("{}: inserted {count} rows after row {number}", self.job.sheet.name);
        }

        if let Some(sheet_data) = self.doc.root.find_mut("sheetData") {
            sheet_data.set_elements(rows);
        }
        Ok(())
    }

    fn substitute_row(&mut self, row: &mut XmlElement, number: u32) -> Result<RowExpansion> {
        let (row_cells, trailing): (Vec<_>, Vec<_>) = row
            .take_elements()
            .into_iter()
            .partition(|e| e.local_name() == "c");

        let mut expansion = RowExpansion {
            number,
            cells_inserted: 0,
            template: row.shallow_clone(),
            template_cells: row_cells.clone(),
            new_rows: Vec::new(),
            table_columns: BTreeSet::new(),
        };

        let mut out = Vec::with_capacity(row_cells.len());
        let mut previous = 0;
        for cell in row_cells {
            let original = match cell.attr("r") {
                Some(r) => r.parse::<CellRef>()?.col,
                None => previous + 1,
            };
            previous = original;
            self.substitute_cell(cell, original, &mut expansion, &mut out)?;
        }

        out.sort_by_key(cells::cell_col);
        if expansion.cells_inserted > 0 {
            cells::extend_spans(row, expansion.cells_inserted);
            self.columns_inserted = self.columns_inserted.max(expansion.cells_inserted);
        }
        out.extend(trailing);
        row.set_elements(out);
        Ok(expansion)
    }

    fn finish(mut self) -> Result<SubstitutionReport> {
        self.substitute_table_headers();
        self.substitute_hyperlinks();
        self.update_dimension()?;
        self.doc.root.for_each_mut("sheetData/row/c", &mut |cell| {
            if cell.child("f").is_some() {
                cell.remove_children("v");
            }
        });

        self.layout.write_sheet(&mut self.doc);
        self.layout.write_names(&mut self.state.workbook);
        for table in &mut self.layout.tables {
            table.sync();
            self.parts.put(&table.part, table.doc.to_bytes()?);
        }

        let sheet_part = self.job.sheet.part.as_str();
        self.parts.put(sheet_part, self.doc.to_bytes()?);
        if let Some(rels) = self.rels.as_ref().filter(|_| self.rels_dirty) {
            self.parts.put(&rels_for_part(sheet_part), rels.to_bytes()?);
        }
        if let Some(drawing) = &self.drawing {
            drawing.write(self.parts)?;
        }
        if let Some(rich_data) = &self.rich_data {
            rich_data.write(
                self.parts,
                self.job.workbook_part,
                &mut self.state.workbook_rels,
                &mut self.state.content_types,
            )?;
        }

        self.report.rows_inserted = self.rows_inserted;
        self.report.columns_inserted = self.columns_inserted;
        Ok(self.report)
    }

    fn substitute_table_headers(&mut self) {
        let data = self.job.data;
        for table in &mut self.layout.tables {
            for column in table.columns_mut() {
                let Some(name) = column.attr("name").and_then(|n| render_text(n, data)) else {
                    continue;
                };
                column.set_attr("name", name);
            }
        }
    }

    /// Hyperlink targets live in the sheet relationships, internal locations on the element
    fn substitute_hyperlinks(&mut self) {
        let data = self.job.data;
        let mut ids = Vec::new();
        if let Some(list) = self.doc.root.find_mut("hyperlinks") {
            for link in list.elements_mut().filter(|e| e.local_name() == "hyperlink") {
                if let Some(location) = link.attr("location").and_then(|l| render_text(l, data)) {
                    link.set_attr("location", location);
                }
                if let Some(id) = link.attr("r:id") {
                    ids.push(id.to_string());
                }
            }
        }

        let Some(rels) = &mut self.rels else {
            return;
        };
        for id in ids {
            let Some(target) = rels.get(&id).and_then(|rel| render_text(&rel.target, data)) else {
                continue;
            };
            rels.set_target(&id, &target);
            self.rels_dirty = true;
        }
    }

    fn update_dimension(&mut self) -> Result<()> {
        if self.rows_inserted == 0 && self.columns_inserted == 0 {
            return Ok(());
        }
        let Some(dimension) = self.doc.root.find_mut("dimension") else {
            return Ok(());
        };
        let Some(reference) = dimension.attr("ref") else {
            return Ok(());
        };
        let mut area: Area = reference
            .parse()
            .map_err(|e| TemplateError::structural(format!("dimension {reference:?}: {e}")))?;
        area.extend(self.columns_inserted, self.rows_inserted);
        dimension.set_attr("ref", area.to_string());
        Ok(())
    }
}
