//! sheetfill-core: fill Excel (xlsx) templates with structured data
//!
//! Templates carry `${...}` placeholders in shared-string cells. Scalars replace
//! the cell value, arrays grow the sheet right or down, and images become
//! drawing anchors or rich values embedded in cells.
//!
//! ```no_run
//! use sheetfill_core::{DataValue, Workbook};
//!
//! let mut workbook = Workbook::open("invoice-template.xlsx")?;
//! let data = DataValue::object()
//!     .with("customer", "ACME")
//!     .with("lines", vec![DataValue::object().with("qty", 3)]);
//! workbook.substitute(1, &data)?;
//! workbook.save("invoice.xlsx")?;
//! # Ok::<(), sheetfill_core::TemplateError>(())
//! ```

pub mod config;
pub mod data;
pub mod drawing;
mod engine;
pub mod error;
pub mod layout;
pub mod package;
pub mod placeholder;
pub mod reference;
pub mod report;
pub mod shared_strings;
pub mod workbook;
pub mod xml;

pub use config::{FillOptions, SheetOverrides, TemplateConfig};
pub use data::DataValue;
pub use drawing::image::{ImageInfo, ImageProbe, RasterProbe};
pub use error::{Result, TemplateError};
pub use package::{Compression, GenerateOptions, Generated, OutputEncoding, Package};
pub use placeholder::{Placeholder, PlaceholderKind, extract_placeholders};
pub use reference::{Area, CellRef, Range};
pub use report::{SubstitutionReport, UnresolvedPlaceholder};
pub use workbook::{SheetId, Workbook};
