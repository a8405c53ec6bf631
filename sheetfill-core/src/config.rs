//! Fill options with per-sheet overrides loaded from `sheetfill.toml`

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Template configuration: global options plus per-sheet overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(default)]
    pub global: FillOptions,
    #[serde(default)]
    pub sheets: HashMap<String, SheetOverrides>,
}

/// Options consulted while substituting one sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillOptions {
    /// Shift two-cell image anchors below inserted rows
    pub move_images: bool,
    /// Also shift anchors that start on the insertion row
    pub move_same_line_images: bool,
    /// Copy every non-table cell of a template row onto its inserted rows
    pub substitute_all_table_row: bool,
    /// Percentage applied to images placed outside merged cells
    pub image_ratio: f64,
    /// Grow straddling sheet names and shift manual row breaks on row insertion
    pub push_down_page_break_on_table_substitution: bool,
    /// Directory for resolving string image sources as file paths
    pub image_root_path: Option<PathBuf>,
}

impl Default for FillOptions {
    fn default() -> Self {
        Self {
            move_images: false,
            move_same_line_images: false,
            substitute_all_table_row: false,
            image_ratio: 100.0,
            push_down_page_break_on_table_substitution: false,
            image_root_path: None,
        }
    }
}

impl FillOptions {
    /// Scale factor for unmerged images; non-positive ratios mean 100%
    pub fn image_scale(&self) -> f64 {
        if self.image_ratio > 0.0 {
            self.image_ratio / 100.0
        } else {
            1.0
        }
    }
}

/// Sheet-level overrides; unset fields fall back to the global options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SheetOverrides {
    pub move_images: Option<bool>,
    pub move_same_line_images: Option<bool>,
    pub substitute_all_table_row: Option<bool>,
    pub image_ratio: Option<f64>,
    pub push_down_page_break_on_table_substitution: Option<bool>,
    pub image_root_path: Option<PathBuf>,
}

impl TemplateConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Options for a sheet: sheet override first, then global
    pub fn options_for_sheet(&self, sheet_name: &str) -> FillOptions {
        let global = &self.global;
        let Some(sheet) = self.sheets.get(sheet_name) else {
            return global.clone();
        };
        FillOptions {
            move_images: sheet.move_images.unwrap_or(global.move_images),
            move_same_line_images: sheet
                .move_same_line_images
                .unwrap_or(global.move_same_line_images),
            substitute_all_table_row: sheet
                .substitute_all_table_row
                .unwrap_or(global.substitute_all_table_row),
            image_ratio: sheet.image_ratio.unwrap_or(global.image_ratio),
            push_down_page_break_on_table_substitution: sheet
                .push_down_page_break_on_table_substitution
                .unwrap_or(global.push_down_page_break_on_table_substitution),
            image_root_path: sheet
                .image_root_path
                .clone()
                .or_else(|| global.image_root_path.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let options = FillOptions::default();
        assert!(!options.move_images);
        assert_eq!(options.image_ratio, 100.0);
        assert_eq!(options.image_scale(), 1.0);
    }

    #[test]
    fn test_non_positive_ratio_means_full_size() {
        let options = FillOptions {
            image_ratio: 0.0,
            ..FillOptions::default()
        };
        assert_eq!(options.image_scale(), 1.0);
        let half = FillOptions {
            image_ratio: 50.0,
            ..FillOptions::default()
        };
        assert_eq!(half.image_scale(), 0.5);
    }

    #[test]
    fn test_sheet_fallback_chain() {
        let config = TemplateConfig::from_toml(
            r#"
[global]
move_images = true
image_ratio = 80.0

[sheets."Report"]
image_ratio = 50.0
substitute_all_table_row = true
"#,
        )
        .unwrap();

        let report = config.options_for_sheet("Report");
        assert!(report.move_images);
        assert!(report.substitute_all_table_row);
        assert_eq!(report.image_ratio, 50.0);

        let other = config.options_for_sheet("Other");
        assert_eq!(other.image_ratio, 80.0);
        assert!(!other.substitute_all_table_row);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[global]\nmove_same_line_images = true").unwrap();
        let config = TemplateConfig::from_file(file.path()).unwrap();
        assert!(config.global.move_same_line_images);
        assert!(config.sheets.is_empty());
    }
}
