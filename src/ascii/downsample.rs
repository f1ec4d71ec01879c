//! Frame sampling: reduce a source frame to the cell grid.

use crate::render_config::{RenderConfig, SamplingMode};
use crate::source::Frame;

use super::dimensions::grid_dimensions;

/// RGB color of one sampled cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl CellColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// One sampled frame: a row-major grid of cell colors.
///
/// Recomputed on every render tick and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFrame {
    pub width: u32,
    pub height: u32,
    pub cells: Vec<CellColor>,
}

impl RenderedFrame {
    /// Color of the cell at `(x, y)`, or `None` outside the grid.
    pub fn cell(&self, x: u32, y: u32) -> Option<CellColor> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get((y * self.width + x) as usize).copied()
    }

    /// Iterate over `(x, y, color)` in row-major order.
    pub fn iter_cells(&self) -> impl Iterator<Item = (u32, u32, CellColor)> + '_ {
        let width = self.width.max(1);
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, c)| (i as u32 % width, i as u32 / width, *c))
    }
}

/// Errors raised while sampling a single frame.
///
/// These are per-tick failures: the renderer logs them and moves on.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SamplingError {
    #[error("source frame has zero size ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },

    #[error("source frame buffer too small: expected {expected} bytes, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },

    #[error("no frame available from the source")]
    NoFrame,
}

/// Sample a source frame into a grid of cell colors.
///
/// The grid size is `max(1, floor(width * scale))` by
/// `max(1, floor(height * scale))`. Each cell reads the source region it
/// covers, either the single centre pixel (`SamplingMode::Nearest`) or the
/// average of the covered block (`SamplingMode::Area`).
///
/// # Errors
/// * `SamplingError::EmptyFrame` - the source reports a zero dimension
/// * `SamplingError::BufferTooSmall` - the pixel buffer is shorter than `width * height * 3`
pub fn sample(frame: &Frame, config: &RenderConfig) -> Result<RenderedFrame, SamplingError> {
    let (grid_w, grid_h) = grid_dimensions(frame.width, frame.height, config.scale);
    let mut cells = Vec::new();
    sample_into(frame, config.sampling, grid_w, grid_h, &mut cells)?;
    Ok(RenderedFrame {
        width: grid_w,
        height: grid_h,
        cells,
    })
}

/// Sample a frame into an existing cell buffer to avoid allocation.
///
/// # Returns
/// The number of cells written to the buffer.
pub fn sample_into(
    frame: &Frame,
    mode: SamplingMode,
    grid_w: u32,
    grid_h: u32,
    buffer: &mut Vec<CellColor>,
) -> Result<usize, SamplingError> {
    buffer.clear();

    if frame.width == 0 || frame.height == 0 {
        return Err(SamplingError::EmptyFrame {
            width: frame.width,
            height: frame.height,
        });
    }

    let expected = frame.width as usize * frame.height as usize * 3;
    if frame.data.len() < expected {
        return Err(SamplingError::BufferTooSmall {
            expected,
            actual: frame.data.len(),
        });
    }

    let grid_w = grid_w.max(1);
    let grid_h = grid_h.max(1);
    let output_size = grid_w as usize * grid_h as usize;
    buffer.reserve(output_size);

    match mode {
        SamplingMode::Nearest => sample_nearest(frame, grid_w, grid_h, buffer),
        SamplingMode::Area => sample_area(frame, grid_w, grid_h, buffer),
    }

    Ok(output_size)
}

fn sample_nearest(frame: &Frame, grid_w: u32, grid_h: u32, buffer: &mut Vec<CellColor>) {
    let cell_w = frame.width as f64 / grid_w as f64;
    let cell_h = frame.height as f64 / grid_h as f64;

    for cy in 0..grid_h {
        let py = (((cy as f64 + 0.5) * cell_h) as u32).min(frame.height - 1);
        for cx in 0..grid_w {
            let px = (((cx as f64 + 0.5) * cell_w) as u32).min(frame.width - 1);
            buffer.push(pixel_at(frame, px, py));
        }
    }
}

fn sample_area(frame: &Frame, grid_w: u32, grid_h: u32, buffer: &mut Vec<CellColor>) {
    let cell_w = frame.width as f64 / grid_w as f64;
    let cell_h = frame.height as f64 / grid_h as f64;

    for cy in 0..grid_h {
        let start_y = ((cy as f64 * cell_h) as u32).min(frame.height - 1);
        let end_y = (((cy + 1) as f64 * cell_h) as u32).clamp(start_y + 1, frame.height);

        for cx in 0..grid_w {
            let start_x = ((cx as f64 * cell_w) as u32).min(frame.width - 1);
            let end_x = (((cx + 1) as f64 * cell_w) as u32).clamp(start_x + 1, frame.width);

            let mut sum_r = 0u64;
            let mut sum_g = 0u64;
            let mut sum_b = 0u64;
            let mut count = 0u64;

            for py in start_y..end_y {
                for px in start_x..end_x {
                    let c = pixel_at(frame, px, py);
                    sum_r += c.r as u64;
                    sum_g += c.g as u64;
                    sum_b += c.b as u64;
                    count += 1;
                }
            }

            // count >= 1: every cell covers at least one pixel
            buffer.push(CellColor {
                r: (sum_r / count) as u8,
                g: (sum_g / count) as u8,
                b: (sum_b / count) as u8,
            });
        }
    }
}

#[inline]
fn pixel_at(frame: &Frame, x: u32, y: u32) -> CellColor {
    let idx = (y as usize * frame.width as usize + x as usize) * 3;
    CellColor {
        r: frame.data[idx],
        g: frame.data[idx + 1],
        b: frame.data[idx + 2],
    }
}
