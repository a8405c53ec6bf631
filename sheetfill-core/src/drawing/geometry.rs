//! Column widths and row heights of a sheet, in pixels

use super::units::{
    DEFAULT_COLUMN_WIDTH, DEFAULT_ROW_HEIGHT, column_width_to_pixels, row_height_to_pixels,
};
use crate::reference::Range;
use crate::xml::{XmlDocument, XmlElement};
use std::collections::BTreeMap;

/// Sizes read from `<cols>`, `<sheetFormatPr>` and row `ht` attributes.
///
/// Row heights are keyed by their current row number once the engine has placed a
/// row; rows not yet reached are looked up at their template position.
#[derive(Debug, Clone)]
pub struct SheetGeometry {
    default_col_width: f64,
    default_row_height: f64,
    col_widths: Vec<(u32, u32, f64)>,
    template_row_heights: BTreeMap<u32, f64>,
    placed_row_heights: BTreeMap<u32, f64>,
    last_placed_row: u32,
}

impl SheetGeometry {
    pub fn from_sheet(sheet: &XmlDocument) -> Self {
        let format = sheet.root.find("sheetFormatPr");
        let default_col_width = format
            .and_then(|f| f.attr("defaultColWidth")?.parse().ok())
            .unwrap_or(DEFAULT_COLUMN_WIDTH);
        let default_row_height = format
            .and_then(|f| f.attr("defaultRowHeight")?.parse().ok())
            .unwrap_or(DEFAULT_ROW_HEIGHT);

        let col_widths = sheet
            .root
            .find_all("cols/col")
            .into_iter()
            .filter_map(|col| {
                Some((
                    col.attr("min")?.parse().ok()?,
                    col.attr("max")?.parse().ok()?,
                    col.attr("width")?.parse().ok()?,
                ))
            })
            .collect();

        let template_row_heights = sheet
            .root
            .find_all("sheetData/row")
            .into_iter()
            .filter_map(|row| Some((row.attr("r")?.parse().ok()?, row.attr("ht")?.parse().ok()?)))
            .collect();

        Self {
            default_col_width,
            default_row_height,
            col_widths,
            template_row_heights,
            placed_row_heights: BTreeMap::new(),
            last_placed_row: 0,
        }
    }

    /// Record a row at its final position
    pub fn place_row(&mut self, row: &XmlElement, row_number: u32) {
        if let Some(height) = row.attr("ht").and_then(|h| h.parse().ok()) {
            self.placed_row_heights.insert(row_number, height);
        }
        self.last_placed_row = self.last_placed_row.max(row_number);
    }

    pub fn column_width(&self, col: u32) -> f64 {
        self.col_widths
            .iter()
            .find(|(min, max, _)| (*min..=*max).contains(&col))
            .map(|(_, _, width)| *width)
            .unwrap_or(self.default_col_width)
    }

    /// Height in points of a row given the rows inserted so far
    pub fn row_height(&self, row: u32, rows_inserted: u32) -> f64 {
        let height = if row <= self.last_placed_row {
            self.placed_row_heights.get(&row)
        } else {
            self.template_row_heights.get(&(row.saturating_sub(rows_inserted)))
        };
        height.copied().unwrap_or(self.default_row_height)
    }

    /// Pixel size of a merged region
    pub fn range_pixels(&self, range: &Range, rows_inserted: u32) -> (f64, f64) {
        let width = (range.start.col..=range.end.col)
            .map(|c| column_width_to_pixels(self.column_width(c)))
            .sum();
        let height = (range.start.row..=range.end.row)
            .map(|r| row_height_to_pixels(self.row_height(r, rows_inserted)))
            .sum();
        (width, height)
    }
}
