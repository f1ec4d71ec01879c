//! Off-screen RGB output surface.
//!
//! The renderer composes each frame here and the capture session reads it
//! back as snapshots.

use std::sync::{Arc, Mutex};

use font8x8::{UnicodeFonts, BASIC_FONTS, BLOCK_FONTS, BOX_FONTS, LATIN_FONTS};

use crate::ascii::CELL_HEIGHT;
use crate::render_config::Rgb;

/// Glyph bitmaps are 8x8; the rest of the 8x12 cell is padding.
const GLYPH_SIZE: u32 = 8;

/// Rows left blank above a glyph inside its cell.
const GLYPH_TOP_PADDING: u32 = (CELL_HEIGHT - GLYPH_SIZE) / 2;

/// Surface shared between the renderer and capture.
pub type SharedSurface = Arc<Mutex<Surface>>;

/// An RGB24 pixel buffer with simple draw primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

/// An owned copy of a surface's pixels at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceSnapshot {
    pub width: u32,
    pub height: u32,
    /// RGB24, row-major
    pub data: Vec<u8>,
}

impl Surface {
    /// Create a black surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 3],
        }
    }

    /// Wrap a new surface for sharing.
    pub fn shared(width: u32, height: u32) -> SharedSurface {
        Arc::new(Mutex::new(Self::new(width, height)))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Change the surface size. Contents are reset to black when it changes.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == self.width && height == self.height {
            return;
        }
        self.width = width;
        self.height = height;
        self.data.clear();
        self.data.resize(width as usize * height as usize * 3, 0);
    }

    /// Fill the whole surface with one color.
    pub fn fill(&mut self, color: Rgb) {
        for px in self.data.chunks_exact_mut(3) {
            px[0] = color.r;
            px[1] = color.g;
            px[2] = color.b;
        }
    }

    /// Fill a rectangle, clipped to the surface bounds.
    pub fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, color: Rgb) {
        let x_end = x.saturating_add(width).min(self.width);
        let y_end = y.saturating_add(height).min(self.height);
        for py in y.min(y_end)..y_end {
            for px in x.min(x_end)..x_end {
                self.put(px, py, color);
            }
        }
    }

    /// Draw a glyph into the cell whose top-left corner is `(x, y)`.
    ///
    /// Only the glyph's set pixels are inked; the cell background is left
    /// untouched.
    ///
    /// # Returns
    /// `false` if no bitmap exists for the character (nothing is drawn).
    pub fn draw_glyph(&mut self, glyph: char, x: u32, y: u32, color: Rgb) -> bool {
        let Some(bitmap) = glyph_bitmap(glyph) else {
            return false;
        };

        let top = y + GLYPH_TOP_PADDING;
        for (row, bits) in bitmap.iter().enumerate() {
            if *bits == 0 {
                continue;
            }
            let py = top + row as u32;
            if py >= self.height {
                break;
            }
            for col in 0..GLYPH_SIZE {
                // Bit 0 is the leftmost pixel
                if bits & (1 << col) != 0 {
                    let px = x + col;
                    if px < self.width {
                        self.put(px, py, color);
                    }
                }
            }
        }
        true
    }

    /// Read back one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.offset(x, y);
        Some(Rgb::new(self.data[i], self.data[i + 1], self.data[i + 2]))
    }

    /// Copy the current pixels out.
    pub fn snapshot(&self) -> SurfaceSnapshot {
        SurfaceSnapshot {
            width: self.width,
            height: self.height,
            data: self.data.clone(),
        }
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 3
    }

    #[inline]
    fn put(&mut self, x: u32, y: u32, color: Rgb) {
        let i = self.offset(x, y);
        self.data[i] = color.r;
        self.data[i + 1] = color.g;
        self.data[i + 2] = color.b;
    }
}

impl SurfaceSnapshot {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Look up the 8x8 bitmap for a character across the font tables.
fn glyph_bitmap(glyph: char) -> Option<[u8; 8]> {
    BASIC_FONTS
        .get(glyph)
        .or_else(|| BLOCK_FONTS.get(glyph))
        .or_else(|| BOX_FONTS.get(glyph))
        .or_else(|| LATIN_FONTS.get(glyph))
}

/// Whether a character has a bitmap and can be drawn.
pub fn is_drawable(glyph: char) -> bool {
    glyph_bitmap(glyph).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ascii::CELL_WIDTH;

    const RED: Rgb = Rgb::new(255, 0, 0);

    #[test]
    fn test_fill_and_read_back() {
        let mut surface = Surface::new(4, 3);
        assert_eq!(surface.pixel(0, 0), Some(Rgb::BLACK));
        surface.fill(RED);
        assert_eq!(surface.pixel(3, 2), Some(RED));
        assert_eq!(surface.pixel(4, 0), None);
    }

    #[test]
    fn test_fill_rect_is_clipped() {
        let mut surface = Surface::new(4, 4);
        surface.fill_rect(2, 2, 10, 10, RED);
        assert_eq!(surface.pixel(1, 1), Some(Rgb::BLACK));
        assert_eq!(surface.pixel(3, 3), Some(RED));
        // Entirely outside: no panic, no change
        surface.fill_rect(9, 9, 2, 2, Rgb::WHITE);
        assert_eq!(surface.pixel(3, 3), Some(RED));
    }

    #[test]
    fn test_space_has_bitmap_but_no_ink() {
        let mut surface = Surface::new(CELL_WIDTH, CELL_HEIGHT);
        assert!(surface.draw_glyph(' ', 0, 0, RED));
        assert!(surface.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_glyph_ink_stays_inside_padded_cell() {
        let mut surface = Surface::new(CELL_WIDTH, CELL_HEIGHT);
        assert!(surface.draw_glyph('@', 0, 0, RED));

        let inked: Vec<(u32, u32)> = (0..CELL_HEIGHT)
            .flat_map(|y| (0..CELL_WIDTH).map(move |x| (x, y)))
            .filter(|&(x, y)| surface.pixel(x, y) == Some(RED))
            .collect();
        assert!(!inked.is_empty());
        assert!(inked
            .iter()
            .all(|&(_, y)| y >= GLYPH_TOP_PADDING && y < GLYPH_TOP_PADDING + GLYPH_SIZE));
    }

    #[test]
    fn test_block_glyphs_are_drawable() {
        for c in "░▒▓█".chars() {
            assert!(is_drawable(c), "missing bitmap for {:?}", c);
        }
        let mut surface = Surface::new(CELL_WIDTH, CELL_HEIGHT);
        assert!(surface.draw_glyph('█', 0, 0, RED));
        assert_eq!(surface.pixel(0, GLYPH_TOP_PADDING), Some(RED));
    }

    #[test]
    fn test_unknown_glyph_draws_nothing() {
        let mut surface = Surface::new(CELL_WIDTH, CELL_HEIGHT);
        assert!(!surface.draw_glyph('\u{1F600}', 0, 0, RED));
        assert!(surface.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_resize_resets_contents() {
        let mut surface = Surface::new(2, 2);
        surface.fill(RED);
        surface.resize(3, 1);
        assert_eq!(surface.as_bytes().len(), 9);
        assert_eq!(surface.pixel(2, 0), Some(Rgb::BLACK));
        assert_eq!(surface.snapshot().width, 3);
    }
}
