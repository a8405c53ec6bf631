//! Error taxonomy for template substitution

use crate::workbook::SheetId;
use quick_xml::events::attributes::AttrError;

/// Errors raised while loading, filling or writing a template
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// A cell reference or range does not match the `[sheet!][$]COL[$]ROW` grammar
    #[error("invalid cell reference: {0:?}")]
    Parse(String),

    /// The requested sheet does not exist in the workbook
    #[error("sheet not found: {0}")]
    Lookup(SheetId),

    /// Image data could not be turned into a raster buffer
    #[error("image could not be decoded: {0}")]
    ImageDecode(String),

    /// The package contradicts itself (missing part, dangling relationship, bad range)
    #[error("inconsistent workbook structure: {0}")]
    Structural(String),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("xml attribute error: {0}")]
    XmlAttr(#[from] AttrError),

    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
}

impl TemplateError {
    pub(crate) fn structural(msg: impl Into<String>) -> Self {
        Self::Structural(msg.into())
    }

    /// True for errors a caller-supplied image fallback may recover from
    pub fn is_image_decode(&self) -> bool {
        matches!(self, Self::ImageDecode(_))
    }
}

pub type Result<T, E = TemplateError> = std::result::Result<T, E>;
