//! Floating pictures and images embedded in cells

use super::SheetEngine;
use super::cells::blank_cell;
use crate::data::DataValue;
use crate::drawing::image::{ImageData, ImageInfo};
use crate::drawing::rich_value::RichData;
use crate::drawing::units::pixels_to_emus;
use crate::drawing::{DrawingPart, next_media_part, store_media};
use crate::error::{Result, TemplateError};
use crate::package::relationships::Relationships;
use crate::reference::CellRef;
use crate::xml::XmlElement;

impl SheetEngine<'_, '_> {
    fn resolve_image(&self, value: &DataValue) -> Result<Option<ImageData>> {
        if value.is_blank() {
            return Ok(None);
        }
        let root = self.job.options.image_root_path.as_deref();
        self.job.images.resolve(value, root)
    }

    /// Anchor a picture at `cell_ref`, sized to its merge region or scaled by the image ratio
    pub(super) fn place_image(&mut self, cell_ref: &CellRef, value: &DataValue) -> Result<()> {
        let Some(image) = self.resolve_image(value)? else {
            return Ok(());
        };
        let (cx, cy) = self.image_extent(cell_ref, &image.info);
        let media = next_media_part(self.parts, &image.info.extension);
        let extension = image.info.extension.clone();
        store_media(self.parts, &mut self.state.content_types, &media, &extension, image.bytes);

        self.drawing()?.add_picture(cell_ref, cx, cy, &media);
        self.report.images_placed += 1;
        log::debug!("{}: picture {media} at {cell_ref}", self.job.sheet.name);
        Ok(())
    }

    /// Store the image as a rich value and turn `cell` into its `#VALUE!` carrier
    pub(super) fn place_image_in_cell(&mut self, cell: &mut XmlElement, value: &DataValue) -> Result<()> {
        blank_cell(cell);
        let Some(image) = self.resolve_image(value)? else {
            return Ok(());
        };
        if self.rich_data.is_none() {
            let rich_data = RichData::load(self.parts, self.job.workbook_part, &self.state.workbook_rels)?;
            self.rich_data = Some(rich_data);
        }
        let rich_data = self
            .rich_data
            .as_mut()
            .ok_or_else(|| TemplateError::structural("rich value parts unavailable"))?;
        let vm = rich_data.insert_image(self.parts, &mut self.state.content_types, image)?;

        cell.set_attr("t", "e");
        cell.set_attr("vm", vm.to_string());
        let name = format!("{}v", cell.prefix());
        cell.push(XmlElement::new(name).with_text("#VALUE!"));
        self.report.images_placed += 1;
        Ok(())
    }

    /// Extent in EMUs. Inside a merge the image fills the merge box along its binding
    /// dimension, keeping aspect ratio: larger images shrink and smaller ones grow.
    /// Outside a merge the configured image ratio applies.
    fn image_extent(&self, cell_ref: &CellRef, info: &ImageInfo) -> (i64, i64) {
        let width = f64::from(info.width);
        let height = f64::from(info.height);
        let (width, height) = match self.layout.merge_containing(cell_ref) {
            Some(merge) => {
                let (merge_width, merge_height) = self.geometry.range_pixels(merge, self.rows_inserted);
                let rate = (width / merge_width).max(height / merge_height);
                if rate.is_finite() && rate > 0.0 {
                    ((width / rate).floor(), (height / rate).floor())
                } else {
                    (width, height)
                }
            }
            None => {
                let scale = self.job.options.image_scale();
                (width * scale, height * scale)
            }
        };
        (pixels_to_emus(width), pixels_to_emus(height))
    }

    fn load_drawing(&mut self) -> Result<()> {
        let rels = self.rels.get_or_insert_with(Relationships::new);
        let existing = self.doc.root.find("drawing").is_some();
        let drawing = DrawingPart::load_or_create(
            &self.job.sheet.part,
            &mut self.doc,
            rels,
            self.parts,
            &mut self.state.content_types,
        )?;
        self.rels_dirty |= !existing;
        self.drawing = Some(drawing);
        Ok(())
    }

    /// The sheet's drawing, created on first use
    pub(super) fn drawing(&mut self) -> Result<&mut DrawingPart> {
        if self.drawing.is_none() {
            self.load_drawing()?;
        }
        self.drawing
            .as_mut()
            .ok_or_else(|| TemplateError::structural("drawing part unavailable"))
    }

    /// The sheet's drawing if the template already has one
    pub(super) fn existing_drawing(&mut self) -> Result<Option<&mut DrawingPart>> {
        if self.drawing.is_none() && self.doc.root.find("drawing").is_some() {
            self.load_drawing()?;
        }
        Ok(self.drawing.as_mut())
    }
}
