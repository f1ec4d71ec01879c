//! RGB to brightness conversion using the ITU-R BT.601 luminance formula.

use super::downsample::CellColor;

/// Normalized brightness of an RGB triple, in `[0, 1]`.
///
/// The luminance formula is: Y = 0.299*R + 0.587*G + 0.114*B, divided by 255.
///
/// The coefficients are applied scaled by 1000 in integer math before the
/// single division, so pure white is exactly `1.0` and a uniform gray `v`
/// is exactly `v / 255`.
///
/// # Example
/// ```
/// use ascii_recorder::ascii::brightness;
/// assert_eq!(brightness(0, 0, 0), 0.0);
/// assert_eq!(brightness(255, 255, 255), 1.0);
/// ```
pub fn brightness(r: u8, g: u8, b: u8) -> f64 {
    // Coefficients scaled by 1000: 299 + 587 + 114 = 1000
    let luminance = 299 * r as u32 + 587 * g as u32 + 114 * b as u32;
    luminance as f64 / 255_000.0
}

/// Brightness of a sampled cell.
pub fn cell_brightness(cell: &CellColor) -> f64 {
    brightness(cell.r, cell.g, cell.b)
}
