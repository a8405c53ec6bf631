//! Per-sheet substitution summaries

use serde::Serialize;

/// A placeholder left in place because its name had no value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedPlaceholder {
    pub cell: String,
    pub placeholder: String,
}

/// What one `substitute` call did to a sheet
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubstitutionReport {
    pub sheet: String,
    pub rows_inserted: u32,
    pub columns_inserted: u32,
    pub placeholders_substituted: usize,
    pub images_placed: usize,
    pub unresolved: Vec<UnresolvedPlaceholder>,
}

impl SubstitutionReport {
    pub fn new(sheet: &str) -> Self {
        Self {
            sheet: sheet.to_string(),
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty()
    }
}
