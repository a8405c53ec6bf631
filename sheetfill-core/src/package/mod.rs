//! Archive store: the xlsx zip as an ordered map of part names to bytes

pub mod content_types;
pub mod relationships;

pub use content_types::ContentTypes;
pub use relationships::{Relationship, Relationships, rel_types};

use crate::error::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// All parts of a package, kept in archive order
#[derive(Debug, Clone, Default)]
pub struct Package {
    parts: BTreeMap<String, Vec<u8>>,
    order: Vec<String>,
}

impl Package {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut package = Package::default();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().trim_start_matches('/').to_string();
            let mut buffer = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut buffer)?;
            package.put(&name, buffer);
        }
        Ok(package)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.parts.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parts.contains_key(name)
    }

    pub fn put(&mut self, name: &str, bytes: Vec<u8>) {
        if self.parts.insert(name.to_string(), bytes).is_none() {
            self.order.push(name.to_string());
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<u8>> {
        let removed = self.parts.remove(name)?;
        self.order.retain(|n| n != name);
        Some(removed)
    }

    /// Part names in archive order
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn list_matching(&self, pattern: &Regex) -> Vec<String> {
        self.part_names()
            .filter(|name| pattern.is_match(name))
            .map(str::to_string)
            .collect()
    }

    /// Apply writes staged by [`PendingParts`]
    pub(crate) fn apply(&mut self, writes: BTreeMap<String, Option<Vec<u8>>>) {
        for (name, bytes) in writes {
            match bytes {
                Some(bytes) => self.put(&name, bytes),
                None => {
                    self.remove(&name);
                }
            }
        }
    }

    /// Zip the package; `[Content_Types].xml` always comes first
    pub fn to_bytes(&self, compression: Compression) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        let names = std::iter::once(CONTENT_TYPES_PART)
            .filter(|name| self.contains(name))
            .chain(self.part_names().filter(|name| *name != CONTENT_TYPES_PART));
        for name in names {
            if let Some(bytes) = self.get(name) {
                zip.start_file(name, compression.file_options())?;
                zip.write_all(bytes)?;
            }
        }

        Ok(zip.finish()?.into_inner())
    }

    pub fn generate(&self, options: &GenerateOptions) -> Result<Generated> {
        let bytes = self.to_bytes(options.compression)?;
        Ok(match options.encoding {
            OutputEncoding::Bytes => Generated::Bytes(bytes),
            OutputEncoding::Base64 => Generated::Base64(STANDARD.encode(bytes)),
        })
    }
}

/// Copy-on-write view over a package; nothing reaches the package until [`Package::apply`]
#[derive(Debug)]
pub struct PendingParts<'a> {
    base: &'a Package,
    writes: BTreeMap<String, Option<Vec<u8>>>,
}

impl<'a> PendingParts<'a> {
    pub fn new(base: &'a Package) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        match self.writes.get(name) {
            Some(Some(bytes)) => Some(bytes),
            Some(None) => None,
            None => self.base.get(name),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn put(&mut self, name: &str, bytes: Vec<u8>) {
        self.writes.insert(name.to_string(), Some(bytes));
    }

    pub fn remove(&mut self, name: &str) {
        self.writes.insert(name.to_string(), None);
    }

    pub fn list_matching(&self, pattern: &Regex) -> Vec<String> {
        let mut names: Vec<String> = self
            .base
            .part_names()
            .filter(|name| !self.writes.contains_key(*name))
            .map(str::to_string)
            .collect();
        names.extend(
            self.writes
                .iter()
                .filter(|(_, bytes)| bytes.is_some())
                .map(|(name, _)| name.clone()),
        );
        names.retain(|name| pattern.is_match(name));
        names
    }

    pub fn into_writes(self) -> BTreeMap<String, Option<Vec<u8>>> {
        self.writes
    }
}

/// Zip entry compression
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    Deflated,
    Stored,
}

impl Compression {
    fn file_options(self) -> SimpleFileOptions {
        let method = match self {
            Compression::Deflated => CompressionMethod::Deflated,
            Compression::Stored => CompressionMethod::Stored,
        };
        SimpleFileOptions::default().compression_method(method)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputEncoding {
    #[default]
    Bytes,
    Base64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateOptions {
    pub encoding: OutputEncoding,
    pub compression: Compression,
}

/// Serialized package in the requested encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generated {
    Bytes(Vec<u8>),
    Base64(String),
}

impl Generated {
    /// Raw bytes of the output, whatever the encoding
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Generated::Bytes(bytes) => bytes,
            Generated::Base64(text) => text.as_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Package {
        let mut package = Package::default();
        package.put("xl/workbook.xml", b"<workbook/>".to_vec());
        package.put(CONTENT_TYPES_PART, b"<Types/>".to_vec());
        package.put("xl/media/image1.png", vec![1, 2, 3]);
        package
    }

    #[test]
    fn test_zip_round_trip_puts_content_types_first() {
        let bytes = sample().to_bytes(Compression::Stored).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        assert_eq!(archive.by_index(0).unwrap().name(), CONTENT_TYPES_PART);

        let reread = Package::from_bytes(&bytes).unwrap();
        assert_eq!(reread.get("xl/media/image1.png"), Some(&[1u8, 2, 3][..]));
        assert_eq!(reread.part_names().count(), 3);
    }

    #[test]
    fn test_list_matching() {
        let package = sample();
        let media = Regex::new(r"^xl/media/").unwrap();
        assert_eq!(package.list_matching(&media), vec!["xl/media/image1.png"]);
    }

    #[test]
    fn test_pending_parts_are_isolated_until_applied() {
        let mut package = sample();
        let writes = {
            let mut pending = PendingParts::new(&package);
            pending.put("xl/media/image2.png", vec![9]);
            pending.remove("xl/workbook.xml");
            assert!(!pending.contains("xl/workbook.xml"));
            let media = Regex::new(r"^xl/media/").unwrap();
            assert_eq!(pending.list_matching(&media).len(), 2);
            pending.into_writes()
        };
        assert!(package.contains("xl/workbook.xml"));
        package.apply(writes);
        assert!(!package.contains("xl/workbook.xml"));
        assert!(package.contains("xl/media/image2.png"));
    }

    #[test]
    fn test_generate_base64() {
        let options = GenerateOptions {
            encoding: OutputEncoding::Base64,
            compression: Compression::Deflated,
        };
        let Generated::Base64(text) = sample().generate(&options).unwrap() else {
            panic!("expected base64 output");
        };
        let bytes = STANDARD.decode(text).unwrap();
        assert!(Package::from_bytes(&bytes).is_ok());
    }
}
