//! Pixel conversions: EMUs, column widths and row heights
//!
//! Column width and row height factors are empirical approximations of what
//! Excel renders at 96 DPI with the default font, not exact OOXML semantics.

pub const EMU_PER_INCH: f64 = 914_400.0;
pub const PIXELS_PER_INCH: f64 = 96.0;

/// Pixels per character of column width
pub const COLUMN_WIDTH_PIXELS: f64 = 7.625_579_987_895_905;

pub const DEFAULT_COLUMN_WIDTH: f64 = 8.43;
pub const DEFAULT_ROW_HEIGHT: f64 = 15.0;

pub fn pixels_to_emus(pixels: f64) -> i64 {
    (pixels * EMU_PER_INCH / PIXELS_PER_INCH).round() as i64
}

pub fn column_width_to_pixels(width: f64) -> f64 {
    width * COLUMN_WIDTH_PIXELS
}

pub fn row_height_to_pixels(points: f64) -> f64 {
    points * PIXELS_PER_INCH / 72.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixels_to_emus() {
        assert_eq!(pixels_to_emus(96.0), 914_400);
        assert_eq!(pixels_to_emus(1.0), 9525);
        assert_eq!(pixels_to_emus(0.0), 0);
    }

    #[test]
    fn test_row_height() {
        // 15pt row is 20px
        assert_eq!(row_height_to_pixels(15.0), 20.0);
        assert_eq!(pixels_to_emus(row_height_to_pixels(15.0)), 190_500);
    }

    #[test]
    fn test_column_width_is_approximate() {
        let px = column_width_to_pixels(DEFAULT_COLUMN_WIDTH);
        assert!((px - 64.28).abs() < 0.01);
        assert!((column_width_to_pixels(10.0) - 76.2558).abs() < 0.001);
    }
}
