//! Pixel-to-glyph conversion.
//!
//! The conversion runs in three steps:
//!
//! 1. **Sampling** - reduce the source frame to a cell grid ([`sample`])
//! 2. **Brightness** - BT.601 luma of each cell, normalized to `[0, 1]`
//! 3. **Glyph mapping** - quantize brightness onto a [`GlyphRamp`]
//!
//! Glyph shape encodes brightness; the cell's own color is kept alongside
//! so the renderer can ink each glyph in true color.

mod charset;
mod dimensions;
mod downsample;
mod grayscale;
mod mapping;

pub use charset::{
    GlyphRamp, BLOCKS_RAMP, DEFAULT_RAMP, MINIMAL_RAMP, MIN_RAMP_LEN, STANDARD_RAMP,
};
pub use dimensions::{
    cell_origin, grid_dimensions, surface_dimensions, CELL_HEIGHT, CELL_WIDTH,
};
pub use downsample::{sample, sample_into, CellColor, RenderedFrame, SamplingError};
pub use grayscale::{brightness, cell_brightness};
pub use mapping::{glyph_index, map_glyph};
