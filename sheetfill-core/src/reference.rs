//! Cell reference algebra: column letters, `[sheet!][$]COL[$]ROW` references and ranges

use crate::error::{Result, TemplateError};
use std::fmt;
use std::str::FromStr;

/// Convert column letters to their 1-based number (`A` = 1, `AA` = 27)
pub fn char_to_num(letters: &str) -> Result<u32> {
    if letters.is_empty() {
        return Err(TemplateError::Parse(letters.to_string()));
    }
    let mut num = 0u32;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return Err(TemplateError::Parse(letters.to_string()));
        }
        let digit = ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
        num = num
            .checked_mul(26)
            .and_then(|n| n.checked_add(digit))
            .ok_or_else(|| TemplateError::Parse(letters.to_string()))?;
    }
    Ok(num)
}

/// Convert a 1-based column number to letters (bijective base 26, no zero digit)
pub fn num_to_char(mut num: u32) -> String {
    let mut letters = Vec::new();
    while num > 0 {
        let rem = num % 26;
        if rem == 0 {
            letters.push('Z');
            num = num / 26 - 1;
        } else {
            letters.push((b'A' + (rem - 1) as u8) as char);
            num /= 26;
        }
    }
    letters.iter().rev().collect()
}

/// Split `A1:B2` on the colon. A single reference yields `None`.
pub fn split_range(range: &str) -> Option<(&str, &str)> {
    range.split_once(':')
}

pub fn join_range(start: &str, end: &str) -> String {
    format!("{start}:{end}")
}

/// Parse `[sheet!][$]COL[$]ROW`
pub fn split_ref(reference: &str) -> Result<CellRef> {
    reference.parse()
}

pub fn join_ref(reference: &CellRef) -> String {
    reference.to_string()
}

/// Reference one column to the right, upper-cased
pub fn next_col(reference: &str) -> Result<String> {
    let mut cell = split_ref(reference)?;
    cell.col += 1;
    Ok(cell.to_string())
}

/// Reference one row down, upper-cased
pub fn next_row(reference: &str) -> Result<String> {
    let mut cell = split_ref(reference)?;
    cell.row += 1;
    Ok(cell.to_string())
}

/// True when `cell` lies inside the rectangle spanned by `start` and `end`
pub fn is_within(cell: &CellRef, start: &CellRef, end: &CellRef) -> bool {
    cell.row >= start.row && cell.row <= end.row && cell.col >= start.col && cell.col <= end.col
}

/// A single cell address. Columns and rows are 1-based.
#[derive(Debug, Clone, Eq)]
pub struct CellRef {
    pub sheet: Option<String>,
    pub col: u32,
    pub row: u32,
    pub col_absolute: bool,
    pub row_absolute: bool,
}

impl CellRef {
    pub fn new(col: u32, row: u32) -> Self {
        Self {
            sheet: None,
            col,
            row,
            col_absolute: false,
            row_absolute: false,
        }
    }

    pub fn col_letters(&self) -> String {
        num_to_char(self.col)
    }

    /// Same absolute markers and sheet, different coordinates
    pub fn moved_to(&self, col: u32, row: u32) -> Self {
        Self {
            col,
            row,
            ..self.clone()
        }
    }
}

impl PartialEq for CellRef {
    fn eq(&self, other: &Self) -> bool {
        self.col == other.col && self.row == other.row && self.sheet == other.sheet
    }
}

impl std::hash::Hash for CellRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.sheet.hash(state);
        self.col.hash(state);
        self.row.hash(state);
    }
}

impl FromStr for CellRef {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self> {
        let err = || TemplateError::Parse(s.to_string());
        let (sheet, address) = match s.rfind('!') {
            Some(pos) => (Some(unquote_sheet(&s[..pos])), &s[pos + 1..]),
            None => (None, s),
        };

        let bytes = address.as_bytes();
        let mut pos = 0;
        let col_absolute = bytes.first() == Some(&b'$');
        if col_absolute {
            pos += 1;
        }
        let letters_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
            pos += 1;
        }
        let letters = &address[letters_start..pos];
        let row_absolute = bytes.get(pos) == Some(&b'$');
        if row_absolute {
            pos += 1;
        }
        let digits = &address[pos..];
        if letters.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }

        let col = char_to_num(letters).map_err(|_| err())?;
        let row: u32 = digits.parse().map_err(|_| err())?;
        if row == 0 {
            return Err(err());
        }

        Ok(Self {
            sheet,
            col,
            row,
            col_absolute,
            row_absolute,
        })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.sheet {
            write!(f, "{}!", quote_sheet(sheet))?;
        }
        if self.col_absolute {
            f.write_str("$")?;
        }
        f.write_str(&num_to_char(self.col))?;
        if self.row_absolute {
            f.write_str("$")?;
        }
        write!(f, "{}", self.row)
    }
}

fn unquote_sheet(name: &str) -> String {
    match name.strip_prefix('\'').and_then(|n| n.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => name.to_string(),
    }
}

fn quote_sheet(name: &str) -> String {
    let plain = !name.is_empty()
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

/// A rectangular `START:END` range. The sheet prefix, if any, lives on `start`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: CellRef,
    pub end: CellRef,
}

impl Range {
    pub fn new(start: CellRef, end: CellRef) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, cell: &CellRef) -> bool {
        is_within(cell, &self.start, &self.end)
    }

    pub fn sheet(&self) -> Option<&str> {
        self.start.sheet.as_deref()
    }

    pub fn shift_rows(&mut self, rows: u32) {
        self.start.row += rows;
        self.end.row += rows;
    }

    pub fn shift_cols(&mut self, cols: u32) {
        self.start.col += cols;
        self.end.col += cols;
    }
}

impl FromStr for Range {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self> {
        let (start, end) = split_range(s).ok_or_else(|| TemplateError::Parse(s.to_string()))?;
        let start: CellRef = start.parse()?;
        let mut end: CellRef = end.parse()?;
        // `Sheet1!A1:Sheet1!B2` is legal but rare; keep a single prefix.
        if end.sheet.is_some() && end.sheet == start.sheet {
            end.sheet = None;
        }
        Ok(Self { start, end })
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_range(&self.start.to_string(), &self.end.to_string()))
    }
}

/// Either a single cell or a range, as found in names, hyperlinks and dimensions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Area {
    Cell(CellRef),
    Range(Range),
}

impl Area {
    pub fn start(&self) -> &CellRef {
        match self {
            Area::Cell(cell) => cell,
            Area::Range(range) => &range.start,
        }
    }

    pub fn end(&self) -> &CellRef {
        match self {
            Area::Cell(cell) => cell,
            Area::Range(range) => &range.end,
        }
    }

    pub fn sheet(&self) -> Option<&str> {
        self.start().sheet.as_deref()
    }

    pub fn shift_rows(&mut self, rows: u32) {
        match self {
            Area::Cell(cell) => cell.row += rows,
            Area::Range(range) => range.shift_rows(rows),
        }
    }

    pub fn shift_cols(&mut self, cols: u32) {
        match self {
            Area::Cell(cell) => cell.col += cols,
            Area::Range(range) => range.shift_cols(cols),
        }
    }

    /// Grow the bottom-right corner. A single cell becomes a range.
    pub fn extend(&mut self, cols: u32, rows: u32) {
        if cols == 0 && rows == 0 {
            return;
        }
        match self {
            Area::Cell(cell) => {
                let mut end = cell.moved_to(cell.col + cols, cell.row + rows);
                end.sheet = None;
                *self = Area::Range(Range::new(cell.clone(), end));
            }
            Area::Range(range) => {
                range.end.col += cols;
                range.end.row += rows;
            }
        }
    }
}

impl FromStr for Area {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self> {
        if split_range(s).is_some() {
            Ok(Area::Range(s.parse()?))
        } else {
            Ok(Area::Cell(s.parse()?))
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Area::Cell(cell) => cell.fmt(f),
            Area::Range(range) => range.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_to_char() {
        assert_eq!(num_to_char(1), "A");
        assert_eq!(num_to_char(26), "Z");
        assert_eq!(num_to_char(27), "AA");
        assert_eq!(num_to_char(52), "AZ");
        assert_eq!(num_to_char(703), "AAA");
        assert_eq!(num_to_char(0), "");
    }

    #[test]
    fn test_char_to_num() {
        assert_eq!(char_to_num("A").unwrap(), 1);
        assert_eq!(char_to_num("AZ").unwrap(), 52);
        assert_eq!(char_to_num("BZ").unwrap(), 78);
        assert_eq!(char_to_num("az").unwrap(), 52);
        assert!(char_to_num("").is_err());
        assert!(char_to_num("A1").is_err());
    }

    #[test]
    fn test_column_round_trip() {
        for n in 1..=20_000 {
            assert_eq!(char_to_num(&num_to_char(n)).unwrap(), n);
        }
    }

    #[test]
    fn test_split_ref_absolute_and_sheet() {
        let cell = split_ref("'My Sheet'!$B$12").unwrap();
        assert_eq!(cell.sheet.as_deref(), Some("My Sheet"));
        assert_eq!((cell.col, cell.row), (2, 12));
        assert!(cell.col_absolute && cell.row_absolute);
        assert_eq!(join_ref(&cell), "'My Sheet'!$B$12");

        let cell = split_ref("Sheet1!C$3").unwrap();
        assert!(!cell.col_absolute);
        assert!(cell.row_absolute);
        assert_eq!(cell.to_string(), "Sheet1!C$3");
    }

    #[test]
    fn test_split_ref_rejects_malformed() {
        for bad in ["", "A", "12", "A0", "1A", "A1B", "$$A1"] {
            assert!(split_ref(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_next_col_and_row() {
        assert_eq!(next_col("Z12").unwrap(), "AA12");
        assert_eq!(next_col("AZ12").unwrap(), "BA12");
        assert_eq!(next_col("a1").unwrap(), "B1");
        assert_eq!(next_row("b9").unwrap(), "B10");
    }

    #[test]
    fn test_is_within() {
        let start = split_ref("B2").unwrap();
        let end = split_ref("D5").unwrap();
        assert!(is_within(&split_ref("C3").unwrap(), &start, &end));
        assert!(is_within(&split_ref("D5").unwrap(), &start, &end));
        assert!(!is_within(&split_ref("A3").unwrap(), &start, &end));
        assert!(!is_within(&split_ref("C6").unwrap(), &start, &end));
    }

    #[test]
    fn test_equality_ignores_absolute_markers() {
        assert_eq!(split_ref("$A$1").unwrap(), split_ref("A1").unwrap());
        assert_ne!(split_ref("S!A1").unwrap(), split_ref("A1").unwrap());
    }

    #[test]
    fn test_range_and_area() {
        let mut range: Range = "Sheet1!$A$1:$C$4".parse().unwrap();
        assert_eq!(range.sheet(), Some("Sheet1"));
        range.shift_rows(2);
        assert_eq!(range.to_string(), "Sheet1!$A$3:$C$6");

        let mut area: Area = "B2".parse().unwrap();
        area.extend(1, 3);
        assert_eq!(area.to_string(), "B2:C5");
        assert_eq!(split_range("A1:B2"), Some(("A1", "B2")));
        assert_eq!(join_range("A1", "B2"), "A1:B2");
    }
}
