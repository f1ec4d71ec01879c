//! Unit tests for the ASCII conversion path.
//!
//! These tests verify the core conversion rules end to end:
//! - Brightness and glyph quantization
//! - Grid dimensions
//! - Sampling a frame into cells
//! - Composing cells onto the output surface

use ascii_recorder::ascii::*;
use ascii_recorder::render_config::{RenderConfig, Rgb, SamplingMode};
use ascii_recorder::renderer::{compose, render_tick, TickOutcome};
use ascii_recorder::source::{Frame, FrameSource, PlaybackState};
use ascii_recorder::surface::Surface;

fn config_with(scale: f64, ramp: &str) -> RenderConfig {
    RenderConfig {
        scale,
        ramp: GlyphRamp::new(ramp).unwrap(),
        ..RenderConfig::default()
    }
}

fn glyph_grid(rendered: &RenderedFrame, ramp: &GlyphRamp) -> Vec<char> {
    rendered
        .cells
        .iter()
        .map(|cell| map_glyph(cell_brightness(cell), ramp))
        .collect()
}

struct Still(Frame);

impl FrameSource for Still {
    fn playback_state(&self) -> PlaybackState {
        PlaybackState::Playing
    }

    fn current_frame(&self) -> Option<Frame> {
        Some(self.0.clone())
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.0.width, self.0.height)
    }
}

// ==================== Brightness Tests ====================

#[test]
fn test_brightness_extremes() {
    assert_eq!(brightness(0, 0, 0), 0.0);
    assert!((brightness(255, 255, 255) - 1.0).abs() < 1e-12);
}

#[test]
fn test_brightness_weights() {
    assert!((brightness(255, 0, 0) - 0.299).abs() < 1e-9);
    assert!((brightness(0, 255, 0) - 0.587).abs() < 1e-9);
    assert!((brightness(0, 0, 255) - 0.114).abs() < 1e-9);
}

#[test]
fn test_brightness_is_monotonic_in_each_channel() {
    let mut last = -1.0;
    for v in 0..=255u8 {
        let b = brightness(v, 10, 10);
        assert!(b > last);
        last = b;
    }
}

// ==================== Glyph Mapping Tests ====================

#[test]
fn test_ramp_endpoints() {
    let ramp = GlyphRamp::new(DEFAULT_RAMP).unwrap();
    assert_eq!(map_glyph(0.0, &ramp), '@');
    assert_eq!(map_glyph(1.0, &ramp), ' ');
}

#[test]
fn test_mid_gray_maps_to_plus() {
    let ramp = GlyphRamp::new(DEFAULT_RAMP).unwrap();
    assert_eq!(map_glyph(brightness(128, 128, 128), &ramp), '+');
}

#[test]
fn test_out_of_range_brightness_clamps() {
    let ramp = GlyphRamp::new(DEFAULT_RAMP).unwrap();
    assert_eq!(map_glyph(-0.5, &ramp), '@');
    assert_eq!(map_glyph(2.0, &ramp), ' ');
    assert_eq!(map_glyph(f64::NAN, &ramp), '@');
}

#[test]
fn test_glyph_index_is_monotonic() {
    let mut last = 0;
    for i in 0..=1000 {
        let idx = glyph_index(i as f64 / 1000.0, 10);
        assert!(idx >= last);
        assert!(idx < 10);
        last = idx;
    }
    assert_eq!(last, 9);
}

#[test]
fn test_two_glyph_ramp() {
    let ramp = GlyphRamp::new("#.").unwrap();
    assert_eq!(map_glyph(0.99, &ramp), '#');
    assert_eq!(map_glyph(1.0, &ramp), '.');
}

#[test]
fn test_short_ramp_rejected() {
    assert!(GlyphRamp::new("").is_err());
    assert!(GlyphRamp::new("@").is_err());
}

#[test]
fn test_presets_resolve() {
    for name in ["default", "standard", "blocks", "minimal", "BLOCKS"] {
        assert!(GlyphRamp::preset(name).is_some(), "{}", name);
    }
    assert!(GlyphRamp::preset("braille").is_none());
}

// ==================== Grid Dimension Tests ====================

#[test]
fn test_grid_dimensions_default_scale() {
    assert_eq!(grid_dimensions(640, 480, 0.12), (76, 57));
    assert_eq!(grid_dimensions(1920, 1080, 0.12), (230, 129));
}

#[test]
fn test_grid_dimensions_never_zero() {
    assert_eq!(grid_dimensions(1, 1, 0.01), (1, 1));
    assert_eq!(grid_dimensions(5, 500, 0.1), (1, 50));
}

#[test]
fn test_surface_dimensions_use_cell_size() {
    assert_eq!(surface_dimensions(76, 57), (76 * CELL_WIDTH, 57 * CELL_HEIGHT));
}

// ==================== Sampling Tests ====================

#[test]
fn test_sample_mid_gray_frame_is_uniform_plus_grid() {
    let config = RenderConfig::default();
    let frame = Frame::solid(640, 480, [128, 128, 128]);
    let rendered = sample(&frame, &config).unwrap();

    assert_eq!((rendered.width, rendered.height), (76, 57));
    assert_eq!(rendered.cells.len(), 76 * 57);
    let glyphs = glyph_grid(&rendered, &config.ramp);
    assert!(glyphs.iter().all(|&g| g == '+'));
}

#[test]
fn test_sample_preserves_cell_color() {
    let config = config_with(0.5, DEFAULT_RAMP);
    let frame = Frame::solid(8, 8, [200, 40, 10]);
    let rendered = sample(&frame, &config).unwrap();
    assert!(rendered
        .cells
        .iter()
        .all(|&c| c == CellColor::new(200, 40, 10)));
}

#[test]
fn test_sample_gradient_runs_dark_to_light() {
    let width = 100;
    let mut data = Vec::with_capacity(width * 3);
    for x in 0..width {
        let v = (x * 255 / (width - 1)) as u8;
        data.extend_from_slice(&[v, v, v]);
    }
    let frame = Frame::new(width as u32, 1, data);
    let config = RenderConfig {
        sampling: SamplingMode::Nearest,
        ..config_with(0.1, DEFAULT_RAMP)
    };
    let rendered = sample(&frame, &config).unwrap();
    let glyphs = glyph_grid(&rendered, &config.ramp);

    assert_eq!(glyphs.len(), 10);
    assert_eq!(glyphs[0], '@');
    let ramp = config.ramp.glyphs();
    let positions: Vec<usize> = glyphs
        .iter()
        .map(|g| ramp.iter().position(|r| r == g).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_sample_rejects_bad_frames() {
    let config = RenderConfig::default();
    let empty = Frame::new(0, 10, Vec::new());
    assert!(matches!(
        sample(&empty, &config),
        Err(SamplingError::EmptyFrame { .. })
    ));
    let short = Frame::new(4, 4, vec![0; 10]);
    assert!(matches!(
        sample(&short, &config),
        Err(SamplingError::BufferTooSmall { .. })
    ));
}

// ==================== Surface Composition Tests ====================

#[test]
fn test_compose_fills_background_and_sizes_surface() {
    let config = RenderConfig {
        background: Rgb::new(1, 2, 3),
        ..config_with(1.0, "@ ")
    };
    // A white cell maps to ' ', so only background is drawn.
    let rendered = RenderedFrame {
        width: 2,
        height: 1,
        cells: vec![CellColor::new(255, 255, 255); 2],
    };
    let mut surface = Surface::new(0, 0);
    compose(&rendered, &config, &mut surface);

    assert_eq!(surface.width(), 2 * CELL_WIDTH);
    assert_eq!(surface.height(), CELL_HEIGHT);
    for y in 0..surface.height() {
        for x in 0..surface.width() {
            assert_eq!(surface.pixel(x, y), Some(Rgb::new(1, 2, 3)));
        }
    }
}

#[test]
fn test_compose_inks_glyph_in_cell_color() {
    let config = config_with(1.0, "@ ");
    let red = CellColor::new(90, 0, 0);
    let rendered = RenderedFrame {
        width: 1,
        height: 1,
        cells: vec![red],
    };
    let mut surface = Surface::new(0, 0);
    compose(&rendered, &config, &mut surface);

    let mut inked = 0;
    for y in 0..surface.height() {
        for x in 0..surface.width() {
            match surface.pixel(x, y) {
                Some(p) if p == Rgb::new(90, 0, 0) => inked += 1,
                Some(p) => assert_eq!(p, Rgb::BLACK),
                None => panic!("pixel out of range"),
            }
        }
    }
    assert!(inked > 0, "glyph '@' should ink some pixels");
}

#[test]
fn test_render_tick_publishes_full_frame() {
    let source = Still(Frame::solid(640, 480, [128, 128, 128]));
    let config = RenderConfig::default();
    let shared = Surface::shared(0, 0);
    let mut back = Surface::new(0, 0);

    let outcome = render_tick(&source, &config, &shared, &mut back).unwrap();
    assert_eq!(outcome, TickOutcome::Rendered);

    let front = shared.lock().unwrap();
    assert_eq!(front.width(), 76 * CELL_WIDTH);
    assert_eq!(front.height(), 57 * CELL_HEIGHT);
    assert_eq!(back.width(), 0);
}
