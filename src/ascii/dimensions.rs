//! Grid dimension calculation for the sampled cell grid.

/// Width in pixels of one glyph cell on the output surface.
pub const CELL_WIDTH: u32 = 8;

/// Height in pixels of one glyph cell on the output surface.
///
/// Cells are taller than wide, which is what corrects the vertical aspect
/// of the rendered grid: the grid keeps the source aspect ratio while each
/// cell is drawn 8x12.
pub const CELL_HEIGHT: u32 = 12;

/// Calculate the sampled grid size for a source frame.
///
/// The grid is `floor(width * scale)` by `floor(height * scale)`, clamped to
/// at least 1x1 so a tiny scale or a tiny source produces a degenerate but
/// valid grid.
///
/// # Example
/// ```
/// use ascii_recorder::ascii::grid_dimensions;
/// assert_eq!(grid_dimensions(640, 480, 0.12), (76, 57));
/// assert_eq!(grid_dimensions(4, 4, 0.1), (1, 1));
/// ```
pub fn grid_dimensions(width: u32, height: u32, scale: f64) -> (u32, u32) {
    (scaled_extent(width, scale), scaled_extent(height, scale))
}

fn scaled_extent(extent: u32, scale: f64) -> u32 {
    let scaled = (extent as f64 * scale).floor();
    // Saturating cast: NaN and negatives become 0 before the clamp.
    (scaled as u32).max(1)
}

/// Pixel size of the output surface for a grid.
pub fn surface_dimensions(grid_width: u32, grid_height: u32) -> (u32, u32) {
    (grid_width * CELL_WIDTH, grid_height * CELL_HEIGHT)
}

/// Top-left pixel position of a cell on the output surface.
#[inline]
pub fn cell_origin(x: u32, y: u32) -> (u32, u32) {
    (x * CELL_WIDTH, y * CELL_HEIGHT)
}
