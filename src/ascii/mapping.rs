//! Brightness to glyph mapping.

use super::charset::GlyphRamp;

/// Index into a ramp of `levels` glyphs for a normalized brightness.
///
/// `index = floor(brightness * (levels - 1))`, clamped to `[0, levels - 1]`.
/// Out-of-range and NaN brightness values clamp to the nearest end; NaN
/// lands on the darkest glyph.
#[inline]
pub fn glyph_index(brightness: f64, levels: usize) -> usize {
    if levels == 0 {
        return 0;
    }
    let max = levels - 1;
    // Float to int casts saturate: negatives and NaN become 0.
    let idx = (brightness * max as f64).floor() as usize;
    idx.min(max)
}

/// Map a normalized brightness value to a glyph from the ramp.
///
/// Brightness `0.0` returns the darkest glyph and `1.0` the lightest.
///
/// # Example
/// ```
/// use ascii_recorder::ascii::{map_glyph, GlyphRamp};
/// let ramp = GlyphRamp::new("@%#*+=-:. ").unwrap();
/// assert_eq!(map_glyph(0.0, &ramp), '@');
/// assert_eq!(map_glyph(1.0, &ramp), ' ');
/// assert_eq!(map_glyph(128.0 / 255.0, &ramp), '+');
/// ```
pub fn map_glyph(brightness: f64, ramp: &GlyphRamp) -> char {
    let glyphs = ramp.glyphs();
    glyphs[glyph_index(brightness, glyphs.len())]
}
