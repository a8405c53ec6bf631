//! Image sources: decoding caller values into raster bytes and probing their size

use crate::data::DataValue;
use crate::error::{Result, TemplateError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, ImageReader};
use std::fs;
use std::io::Cursor;
use std::path::{Component, Path};

/// Called with the original value and the decode error; `Some` supplies a replacement
pub type ImageErrorHandler = Box<dyn Fn(&DataValue, &TemplateError) -> Option<DataValue> + Send + Sync>;

/// Pixel size and media extension of an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub extension: String,
}

/// Dimension sniffing for raw image bytes
pub trait ImageProbe: Send + Sync {
    fn probe(&self, bytes: &[u8]) -> Result<ImageInfo>;
}

/// Probe backed by the `image` crate's format detection
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterProbe;

impl ImageProbe for RasterProbe {
    fn probe(&self, bytes: &[u8]) -> Result<ImageInfo> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| TemplateError::ImageDecode(e.to_string()))?;
        let format = reader
            .format()
            .ok_or_else(|| TemplateError::ImageDecode("unrecognized image format".to_string()))?;
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| TemplateError::ImageDecode(e.to_string()))?;
        Ok(ImageInfo {
            width,
            height,
            extension: extension_for(format).to_string(),
        })
    }
}

fn extension_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Gif => "gif",
        ImageFormat::Bmp => "bmp",
        ImageFormat::WebP => "webp",
        ImageFormat::Tiff => "tiff",
        other => other.extensions_str().first().copied().unwrap_or("bin"),
    }
}

/// Decoded image ready to be stored as media
#[derive(Debug, Clone)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub info: ImageInfo,
}

/// Turns placeholder values into images, applying the caller's fallback on failure
pub struct ImageResolver {
    probe: Box<dyn ImageProbe>,
    on_error: Option<ImageErrorHandler>,
}

impl Default for ImageResolver {
    fn default() -> Self {
        Self {
            probe: Box::new(RasterProbe),
            on_error: None,
        }
    }
}

impl std::fmt::Debug for ImageResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageResolver")
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl ImageResolver {
    pub fn set_probe(&mut self, probe: Box<dyn ImageProbe>) {
        self.probe = probe;
    }

    pub fn set_error_handler(&mut self, handler: ImageErrorHandler) {
        self.on_error = Some(handler);
    }

    /// `Ok(None)` means the fallback handler chose to skip the image
    pub fn resolve(&self, value: &DataValue, root: Option<&Path>) -> Result<Option<ImageData>> {
        let err = match self.load(value, root) {
            Ok(image) => return Ok(Some(image)),
            Err(err) if err.is_image_decode() => err,
            Err(err) => return Err(err),
        };
        let Some(handler) = &self.on_error else {
            return Err(err);
        };
        match handler(value, &err) {
            Some(replacement) => self.load(&replacement, root).map(Some),
            None => {
                log::warn!("image skipped after decode failure: {err}");
                Ok(None)
            }
        }
    }

    fn load(&self, value: &DataValue, root: Option<&Path>) -> Result<ImageData> {
        let bytes = source_bytes(value, root)?;
        let info = self.probe.probe(&bytes)?;
        Ok(ImageData { bytes, info })
    }
}

/// Bytes, data URI, file under `root`, or bare base64
fn source_bytes(value: &DataValue, root: Option<&Path>) -> Result<Vec<u8>> {
    let text = match value {
        DataValue::Bytes(bytes) => return Ok(bytes.clone()),
        DataValue::String(text) => text.trim(),
        other => {
            return Err(TemplateError::ImageDecode(format!(
                "unsupported image value: {other:?}"
            )));
        }
    };

    if let Some(rest) = text.strip_prefix("data:") {
        let (_, payload) = rest
            .split_once(',')
            .ok_or_else(|| TemplateError::ImageDecode("data URI without payload".to_string()))?;
        return decode_base64(payload);
    }

    if let Some(root) = root {
        if !is_relative_inside(Path::new(text)) {
            // base64 may start with '/', so only report the path once decoding fails too
            return decode_base64(text).map_err(|_| {
                TemplateError::ImageDecode(format!("image path {text:?} is outside the image root"))
            });
        }
        let path = root.join(text);
        if path.is_file() {
            let resolved = path.canonicalize()?;
            if !resolved.starts_with(root.canonicalize()?) {
                return Err(TemplateError::ImageDecode(format!(
                    "image path {text:?} resolves outside the image root"
                )));
            }
            return Ok(fs::read(resolved)?);
        }
    }

    decode_base64(text)
}

/// Only plain names below the root: no absolute paths, drive prefixes or `..`
fn is_relative_inside(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn decode_base64(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| TemplateError::ImageDecode(format!("invalid base64 image: {e}")))
}
