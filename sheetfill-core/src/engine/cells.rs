//! Writing values into `<c>` elements

use super::dispatch::Substitution;
use super::{RowExpansion, SheetEngine};
use crate::data::{DataValue, date_serial, format_number};
use crate::error::Result;
use crate::placeholder::extract_placeholders;
use crate::reference::CellRef;
use crate::report::UnresolvedPlaceholder;
use crate::xml::XmlElement;

/// Column of a cell from its `r` attribute; cells without one sort first
pub(super) fn cell_col(cell: &XmlElement) -> u32 {
    cell.attr("r")
        .and_then(|r| r.parse::<CellRef>().ok())
        .map_or(0, |r| r.col)
}

pub(super) fn sort_cells(row: &mut XmlElement) {
    let mut cells = row.take_elements();
    cells.sort_by_key(cell_col);
    row.set_elements(cells);
}

/// Widen `spans="first:last"` by `count` columns
pub(super) fn extend_spans(row: &mut XmlElement, count: u32) {
    let Some(spans) = row.attr("spans") else {
        return;
    };
    let Some((first, last)) = spans.split_once(':') else {
        return;
    };
    let Ok(last) = last.parse::<u32>() else {
        return;
    };
    let spans = format!("{first}:{}", last + count);
    row.set_attr("spans", spans);
}

/// Cell with no type and no value
pub(super) fn blank_cell(cell: &mut XmlElement) {
    cell.remove_attr("t");
    cell.remove_children("f");
    cell.remove_children("v");
    cell.remove_children("is");
}

fn set_cell_value(cell: &mut XmlElement, value: String) {
    cell.remove_children("is");
    match cell.child_mut("v") {
        Some(v) => v.set_text(value),
        None => {
            let name = format!("{}v", cell.prefix());
            cell.push(XmlElement::new(name).with_text(value));
        }
    }
}

impl SheetEngine<'_, '_> {
    pub(super) fn substitute_cell(
        &mut self,
        mut cell: XmlElement,
        original_col: u32,
        row: &mut RowExpansion,
        out: &mut Vec<XmlElement>,
    ) -> Result<()> {
        let cell_ref = CellRef::new(original_col + row.cells_inserted, row.number);
        cell.set_attr("r", cell_ref.to_string());

        // only shared-string cells can carry placeholders
        let template = match (cell.attr("t"), cell.child("v")) {
            (Some("s"), Some(v)) => v
                .text()
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|idx| self.state.shared_strings.get(idx))
                .map(str::to_string),
            _ => None,
        };
        let Some(template) = template else {
            out.push(cell);
            return Ok(());
        };

        let data = self.job.data;
        let mut current = template.clone();
        let mut partial = false;
        let mut keep = true;
        for placeholder in extract_placeholders(&template) {
            let Some(substitution) = Substitution::resolve(&placeholder, data) else {
                self.report.unresolved.push(UnresolvedPlaceholder {
                    cell: cell_ref.to_string(),
                    placeholder: placeholder.placeholder.clone(),
                });
                continue;
            };
            self.report.placeholders_substituted += 1;
            log::trace!("{cell_ref}: {}", placeholder.placeholder);

            match substitution {
                Substitution::Scalar(value) => self.write_value(&mut cell, value, Some(&template)),
                Substitution::PartialScalar(value) => {
                    current = current.replacen(&placeholder.placeholder, &value.stringify(), 1);
                    partial = true;
                }
                Substitution::ColumnArray(items) => {
                    let inserted = self.expand_columns(&cell, &cell_ref, items, out);
                    keep = false;
                    if inserted > 0 {
                        row.cells_inserted += inserted;
                        self.layout.push_right(&cell_ref, inserted);
                    }
                }
                Substitution::TableArray { rows, render } => {
                    keep = self.expand_table(
                        &mut cell,
                        &cell_ref,
                        rows,
                        placeholder.key.as_deref(),
                        render,
                        row,
                        out,
                    )?;
                }
                Substitution::Image(value) => {
                    blank_cell(&mut cell);
                    self.place_image(&cell_ref, value)?;
                }
                Substitution::ImageInCell(value) => self.place_image_in_cell(&mut cell, value)?,
            }
        }

        if partial {
            let idx = self.state.shared_strings.index(&current);
            cell.set_attr("t", "s");
            set_cell_value(&mut cell, idx.to_string());
        }
        if keep {
            out.push(cell);
        }
        Ok(())
    }

    /// Write a resolved value into `cell`. A `template` string is replaced in the
    /// pool in place; without one the value is interned.
    pub(super) fn write_value(&mut self, cell: &mut XmlElement, value: &DataValue, template: Option<&str>) {
        match value {
            DataValue::Number(n) => {
                cell.remove_attr("t");
                set_cell_value(cell, format_number(*n));
            }
            DataValue::Date(dt) => {
                cell.remove_attr("t");
                set_cell_value(cell, format_number(date_serial(dt)));
            }
            DataValue::Bool(b) => {
                cell.set_attr("t", "b");
                set_cell_value(cell, if *b { "1" } else { "0" }.to_string());
            }
            DataValue::String(s) if s.len() > 1 && s.starts_with('=') => {
                cell.remove_attr("t");
                cell.remove_children("is");
                cell.remove_children("v");
                cell.remove_children("f");
                let name = format!("{}f", cell.prefix());
                cell.insert(0, XmlElement::new(name).with_text(&s[1..]));
            }
            other => {
                let text = other.stringify();
                let idx = match template {
                    Some(template) => self.state.shared_strings.replace(template, &text),
                    None => self.state.shared_strings.index(&text),
                };
                cell.set_attr("t", "s");
                set_cell_value(cell, idx.to_string());
            }
        }
    }

    /// One clone of `source` per item, rightwards from `at`. Returns the number of
    /// columns added beyond the source cell.
    pub(super) fn expand_columns(
        &mut self,
        source: &XmlElement,
        at: &CellRef,
        items: &[DataValue],
        out: &mut Vec<XmlElement>,
    ) -> u32 {
        if items.is_empty() {
            let mut cell = source.clone();
            blank_cell(&mut cell);
            out.push(cell);
            return 0;
        }
        for (i, item) in items.iter().enumerate() {
            let mut cell = source.clone();
            cell.set_attr("r", CellRef::new(at.col + i as u32, at.row).to_string());
            self.write_value(&mut cell, item, None);
            out.push(cell);
        }
        items.len() as u32 - 1
    }
}
