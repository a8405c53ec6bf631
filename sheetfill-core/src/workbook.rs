//! The template workbook and its public substitution API
//!
//! Every mutating call works on a copy of the workbook-level state and on a
//! staged view of the package. The package and state are only replaced when the
//! call succeeds, so a failed substitution leaves the template untouched.

use crate::config::TemplateConfig;
use crate::data::DataValue;
use crate::drawing::image::{ImageErrorHandler, ImageProbe, ImageResolver};
use crate::engine::{self, SheetJob};
use crate::error::{Result, TemplateError};
use crate::package::relationships::{rels_for_part, relative_target, resolve_target};
use crate::package::{
    CONTENT_TYPES_PART, ContentTypes, GenerateOptions, Generated, Package, PendingParts,
    Relationships, content_types, rel_types,
};
use crate::report::SubstitutionReport;
use crate::shared_strings::SharedStrings;
use crate::xml::XmlDocument;
use std::fmt;
use std::fs;
use std::path::Path;

const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";
const DEFAULT_SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const DEFAULT_CALC_CHAIN_PART: &str = "xl/calcChain.xml";

/// Identifies a sheet by 1-based position or by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetId {
    Index(usize),
    Name(String),
}

impl fmt::Display for SheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetId::Index(n) => write!(f, "#{n}"),
            SheetId::Name(name) => write!(f, "{name:?}"),
        }
    }
}

impl From<usize> for SheetId {
    fn from(n: usize) -> Self {
        SheetId::Index(n)
    }
}

impl From<&str> for SheetId {
    fn from(name: &str) -> Self {
        SheetId::Name(name.to_string())
    }
}

impl From<String> for SheetId {
    fn from(name: String) -> Self {
        SheetId::Name(name)
    }
}

impl From<&String> for SheetId {
    fn from(name: &String) -> Self {
        SheetId::Name(name.clone())
    }
}

/// A `<sheet>` entry of `workbook.xml` resolved to its part
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SheetInfo {
    pub name: String,
    /// 0-based position, as used by `localSheetId`
    pub index: usize,
    pub part: String,
}

/// Workbook-level documents shared by every sheet substitution
#[derive(Debug, Clone)]
pub(crate) struct WorkbookState {
    pub workbook: XmlDocument,
    pub workbook_rels: Relationships,
    pub content_types: ContentTypes,
    pub shared_strings: SharedStrings,
}

impl WorkbookState {
    /// Drop the calculation chain so Excel rebuilds it for the moved formulas
    fn remove_calc_chain(&mut self, parts: &mut PendingParts<'_>, workbook_part: &str) {
        let rel = self.workbook_rels.find_by_type(rel_types::CALC_CHAIN);
        let part = rel
            .as_ref()
            .map(|rel| resolve_target(workbook_part, &rel.target))
            .unwrap_or_else(|| DEFAULT_CALC_CHAIN_PART.to_string());
        if let Some(rel) = rel {
            self.workbook_rels.remove(&rel.id);
        }
        if parts.contains(&part) {
            parts.remove(&part);
            log::debug!("removed {part}");
        }
        self.content_types.remove_override(&part);
    }

    /// Stage the workbook-level documents
    fn flush(&mut self, parts: &mut PendingParts<'_>, workbook_part: &str, shared_strings_part: &str) -> Result<()> {
        if !self.shared_strings.is_empty() || parts.contains(shared_strings_part) {
            if self.workbook_rels.find_by_type(rel_types::SHARED_STRINGS).is_none() {
                self.workbook_rels
                    .add(rel_types::SHARED_STRINGS, &relative_target(workbook_part, shared_strings_part));
            }
            self.content_types
                .ensure_override(shared_strings_part, content_types::SHARED_STRINGS);
            parts.put(shared_strings_part, self.shared_strings.to_bytes()?);
        }
        parts.put(workbook_part, self.workbook.to_bytes()?);
        parts.put(&rels_for_part(workbook_part), self.workbook_rels.to_bytes()?);
        parts.put(CONTENT_TYPES_PART, self.content_types.to_bytes()?);
        Ok(())
    }
}

/// An xlsx template loaded in memory
#[derive(Debug)]
pub struct Workbook {
    package: Package,
    workbook_part: String,
    shared_strings_part: String,
    sheets: Vec<SheetInfo>,
    state: WorkbookState,
    config: TemplateConfig,
    images: ImageResolver,
    pool_dirty: bool,
}

impl Workbook {
    /// Load a template from a file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_package(Package::open(path)?)
    }

    /// Load a template from the bytes of an xlsx file
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_package(Package::from_bytes(bytes)?)
    }

    pub fn from_package(package: Package) -> Result<Self> {
        let root_rels = match package.get("_rels/.rels") {
            Some(bytes) => Relationships::parse(bytes)?,
            None => Relationships::new(),
        };
        let workbook_part = root_rels
            .find_by_type(rel_types::OFFICE_DOCUMENT)
            .map(|rel| resolve_target("", &rel.target))
            .unwrap_or_else(|| DEFAULT_WORKBOOK_PART.to_string());

        let workbook = XmlDocument::parse(
            package
                .get(&workbook_part)
                .ok_or_else(|| TemplateError::structural(format!("workbook part {workbook_part} missing")))?,
        )?;
        let workbook_rels = match package.get(&rels_for_part(&workbook_part)) {
            Some(bytes) => Relationships::parse(bytes)?,
            None => Relationships::new(),
        };
        let content_types = ContentTypes::parse(
            package
                .get(CONTENT_TYPES_PART)
                .ok_or_else(|| TemplateError::structural("[Content_Types].xml missing"))?,
        )?;

        let shared_strings_part = workbook_rels
            .find_by_type(rel_types::SHARED_STRINGS)
            .map(|rel| resolve_target(&workbook_part, &rel.target))
            .unwrap_or_else(|| DEFAULT_SHARED_STRINGS_PART.to_string());
        let shared_strings = match package.get(&shared_strings_part) {
            Some(bytes) => SharedStrings::parse(bytes)?,
            None => SharedStrings::new(),
        };

        let sheets = workbook
            .root
            .find_all("sheets/sheet")
            .into_iter()
            .enumerate()
            .map(|(index, sheet)| {
                let name = sheet
                    .attr("name")
                    .ok_or_else(|| TemplateError::structural("sheet without a name"))?;
                let id = sheet
                    .attr("r:id")
                    .ok_or_else(|| TemplateError::structural(format!("sheet {name:?} has no relationship id")))?;
                let rel = workbook_rels
                    .get(id)
                    .ok_or_else(|| TemplateError::structural(format!("sheet {name:?}: relationship {id} missing")))?;
                Ok(SheetInfo {
                    name: name.to_string(),
                    index,
                    part: resolve_target(&workbook_part, &rel.target),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "loaded template: {} sheets, {} shared strings",
            sheets.len(),
            shared_strings.len()
        );

        Ok(Self {
            package,
            workbook_part,
            shared_strings_part,
            sheets,
            state: WorkbookState {
                workbook,
                workbook_rels,
                content_types,
                shared_strings,
            },
            config: TemplateConfig::default(),
            images: ImageResolver::default(),
            pool_dirty: false,
        })
    }

    pub fn with_config(mut self, config: TemplateConfig) -> Self {
        self.config = config;
        self
    }

    /// Called when image data cannot be decoded. Returning a value retries with it;
    /// returning `None` skips the image.
    pub fn set_image_error_handler<F>(&mut self, handler: F)
    where
        F: Fn(&DataValue, &TemplateError) -> Option<DataValue> + Send + Sync + 'static,
    {
        let handler: ImageErrorHandler = Box::new(handler);
        self.images.set_error_handler(handler);
    }

    /// Replace the decoder used to read image dimensions
    pub fn set_image_probe<P: ImageProbe + 'static>(&mut self, probe: P) {
        self.images.set_probe(Box::new(probe));
    }

    /// Sheet names in workbook order
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    fn sheet(&self, id: &SheetId) -> Result<&SheetInfo> {
        let found = match id {
            SheetId::Index(n) => n.checked_sub(1).and_then(|i| self.sheets.get(i)),
            SheetId::Name(name) => self.sheets.iter().find(|s| &s.name == name),
        };
        found.ok_or_else(|| TemplateError::Lookup(id.clone()))
    }

    /// Fill one sheet with `data`. On error nothing is changed.
    pub fn substitute(&mut self, sheet: impl Into<SheetId>, data: &DataValue) -> Result<SubstitutionReport> {
        let id = sheet.into();
        let info = self.sheet(&id)?.clone();
        let options = self.config.options_for_sheet(&info.name);
        let mut state = self.state.clone();

        let (report, writes) = {
            let mut parts = PendingParts::new(&self.package);
            let job = SheetJob {
                sheet: &info,
                data,
                options: &options,
                images: &self.images,
                workbook_part: &self.workbook_part,
            };
            let report = engine::substitute_sheet(job, &mut state, &mut parts)?;
            state.remove_calc_chain(&mut parts, &self.workbook_part);
            state.flush(&mut parts, &self.workbook_part, &self.shared_strings_part)?;
            (report, parts.into_writes())
        };

        self.package.apply(writes);
        self.state = state;
        self.pool_dirty = false;
        log::info!(
            "substituted sheet {:?}: {} placeholders, {} rows and {} columns inserted",
            info.name,
            report.placeholders_substituted,
            report.rows_inserted,
            report.columns_inserted
        );
        for unresolved in &report.unresolved {
            log::warn!(
                "{}!{}: no value for {}",
                info.name,
                unresolved.cell,
                unresolved.placeholder
            );
        }
        Ok(report)
    }

    /// Fill every sheet in workbook order. Stops at the first failing sheet; sheets
    /// filled before it stay filled.
    pub fn substitute_all(&mut self, data: &DataValue) -> Result<Vec<SubstitutionReport>> {
        (1..=self.sheets.len())
            .map(|n| self.substitute(n, data))
            .collect()
    }

    /// Index of `text` in the shared-string pool, appending it when absent
    pub fn string_index(&mut self, text: &str) -> usize {
        self.pool_dirty = true;
        self.state.shared_strings.index(text)
    }

    /// Overwrite the entry equal to `old` with `new`, keeping its index; appends when absent
    pub fn replace_string(&mut self, old: &str, new: &str) -> usize {
        self.pool_dirty = true;
        self.state.shared_strings.replace(old, new)
    }

    /// Append `text` to the pool even when an equal entry exists
    pub fn add_shared_string(&mut self, text: &str) -> usize {
        self.pool_dirty = true;
        self.state.shared_strings.add(text)
    }

    /// Write pool edits made outside `substitute` back into the package
    fn flush_pool(&mut self) -> Result<()> {
        if !self.pool_dirty {
            return Ok(());
        }
        let mut state = self.state.clone();
        let writes = {
            let mut parts = PendingParts::new(&self.package);
            state.flush(&mut parts, &self.workbook_part, &self.shared_strings_part)?;
            parts.into_writes()
        };
        self.package.apply(writes);
        self.state = state;
        self.pool_dirty = false;
        Ok(())
    }

    /// Serialize the filled workbook
    pub fn generate(&mut self, options: &GenerateOptions) -> Result<Generated> {
        self.flush_pool()?;
        self.package.generate(options)
    }

    /// Serialize and write the filled workbook to `path`
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let generated = self.generate(&GenerateOptions::default())?;
        fs::write(path.as_ref(), generated.as_bytes())?;
        log::info!("wrote {}", path.as_ref().display());
        Ok(())
    }

    pub fn package(&self) -> &Package {
        &self.package
    }
}
