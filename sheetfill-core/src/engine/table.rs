//! Table placeholders: one row per array element

use super::cells::{blank_cell, cell_col, extend_spans};
use super::dispatch::CellRender;
use super::{RowExpansion, SheetEngine};
use crate::data::DataValue;
use crate::error::Result;
use crate::reference::CellRef;
use crate::xml::XmlElement;

static EMPTY: DataValue = DataValue::String(String::new());

/// Element value for a table cell; a missing key renders as an empty string
fn element_value<'d>(element: &'d DataValue, key: Option<&str>) -> &'d DataValue {
    match key {
        Some(key) => element.lookup_path(key).unwrap_or(&EMPTY),
        None => element,
    }
}

impl SheetEngine<'_, '_> {
    /// Render `rows` down from `cell_ref`. Element 0 goes into the placeholder cell,
    /// the rest into new rows below it. Returns whether the placeholder cell is kept.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn expand_table(
        &mut self,
        cell: &mut XmlElement,
        cell_ref: &CellRef,
        rows: &[DataValue],
        key: Option<&str>,
        render: CellRender,
        row: &mut RowExpansion,
        out: &mut Vec<XmlElement>,
    ) -> Result<bool> {
        row.table_columns.insert(cell_ref.col);
        if rows.is_empty() {
            blank_cell(cell);
            return Ok(true);
        }

        let template = cell.clone();
        let companions = self.merge_companions(cell_ref, row);
        let mut keep = true;
        let mut inserted = 0;
        let mut row_widths = vec![0; rows.len()];

        for (idx, element) in rows.iter().enumerate() {
            let value = element_value(element, key);
            if idx == 0 {
                match value {
                    DataValue::Array(items) => {
                        inserted = self.expand_columns(&template, cell_ref, items, out);
                        keep = false;
                    }
                    value => self.render_table_value(cell, cell_ref, value, render)?,
                }
                continue;
            }

            let target = CellRef::new(cell_ref.col, cell_ref.row + idx as u32);
            let mut new_cell = template.clone();
            new_cell.set_attr("r", target.to_string());
            let new_cells = match value {
                DataValue::Array(items) => {
                    let mut clones = Vec::with_capacity(items.len());
                    row_widths[idx] = self.expand_columns(&new_cell, &target, items, &mut clones);
                    clones
                }
                value => {
                    self.render_table_value(&mut new_cell, &target, value, render)?;
                    vec![new_cell]
                }
            };

            let new_row = row.new_row(idx);
            for new_cell in new_cells {
                new_row.push(new_cell);
            }
            for (col, companion) in &companions {
                if new_row.elements().any(|c| cell_col(c) == *col) {
                    continue;
                }
                let mut copy = companion.clone();
                copy.set_attr("r", CellRef::new(*col, target.row).to_string());
                new_row.push(copy);
            }
        }

        // new rows, including those of longer tables on this row, widen with the placeholder row
        for offset in 1..=row.new_rows.len() {
            let width = row_widths.get(offset).copied().unwrap_or(0).max(inserted);
            if width > 0 {
                extend_spans(row.new_row(offset), width);
            }
        }

        if inserted > 0 {
            row.table_columns.extend(cell_ref.col..=cell_ref.col + inserted);
            row.cells_inserted += inserted;
            self.layout.push_right(cell_ref, inserted);
        }
        Ok(keep)
    }

    fn render_table_value(
        &mut self,
        cell: &mut XmlElement,
        cell_ref: &CellRef,
        value: &DataValue,
        render: CellRender,
    ) -> Result<()> {
        match render {
            CellRender::Value => self.write_value(cell, value, None),
            CellRender::Image => {
                blank_cell(cell);
                self.place_image(cell_ref, value)?;
            }
            CellRender::ImageInCell => self.place_image_in_cell(cell, value)?,
        }
        Ok(())
    }

    /// Other cells of a merge starting at `cell_ref`, at their current columns, so new
    /// rows carry the same merged look
    fn merge_companions(&self, cell_ref: &CellRef, row: &RowExpansion) -> Vec<(u32, XmlElement)> {
        let Some(merge) = self
            .layout
            .merge_containing(cell_ref)
            .filter(|m| m.start.row == cell_ref.row)
        else {
            return Vec::new();
        };
        row.template_cells
            .iter()
            .map(|c| (cell_col(c) + row.cells_inserted, c))
            .filter(|(col, _)| *col != cell_ref.col && (merge.start.col..=merge.end.col).contains(col))
            .map(|(col, c)| {
                let mut copy = c.clone();
                blank_cell(&mut copy);
                (col, copy)
            })
            .collect()
    }
}
