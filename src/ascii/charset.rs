//! Glyph ramp definitions for ASCII rendering.

use std::fmt;

use crate::config::ConfigError;

/// Default ramp, ordered from the darkest glyph to the lightest.
pub const DEFAULT_RAMP: &str = "@%#*+=-:. ";

/// Classic terminal density ramp (10 levels), darkest to lightest.
pub const STANDARD_RAMP: &str = " .:-=+*#%@";

/// Block character ramp (5 levels) using Unicode shading blocks.
pub const BLOCKS_RAMP: &str = " ░▒▓█";

/// Minimal ramp (4 levels) for a clean look.
pub const MINIMAL_RAMP: &str = " .:#";

/// Minimum number of glyphs a ramp must contain.
///
/// A single glyph would map every brightness to the same character.
pub const MIN_RAMP_LEN: usize = 2;

/// An ordered, validated glyph ramp (darkest first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphRamp {
    glyphs: Vec<char>,
}

impl GlyphRamp {
    /// Build a ramp from a string, one glyph per Unicode scalar value.
    ///
    /// # Errors
    /// * `ConfigError::RampTooShort` - if the string has fewer than two glyphs
    pub fn new(ramp: &str) -> Result<Self, ConfigError> {
        let glyphs: Vec<char> = ramp.chars().collect();
        if glyphs.len() < MIN_RAMP_LEN {
            return Err(ConfigError::RampTooShort { len: glyphs.len() });
        }
        Ok(Self { glyphs })
    }

    /// Look up a named preset ramp.
    ///
    /// Accepts `default`, `standard`, `blocks` and `minimal`.
    pub fn preset(name: &str) -> Option<Self> {
        let ramp = match name.to_ascii_lowercase().as_str() {
            "default" => DEFAULT_RAMP,
            "standard" => STANDARD_RAMP,
            "blocks" => BLOCKS_RAMP,
            "minimal" => MINIMAL_RAMP,
            _ => return None,
        };
        Some(Self {
            glyphs: ramp.chars().collect(),
        })
    }

    /// Number of glyphs in the ramp.
    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    /// Always false: a constructed ramp holds at least two glyphs.
    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    pub fn glyphs(&self) -> &[char] {
        &self.glyphs
    }

    /// The darkest glyph (first in the ramp).
    pub fn darkest(&self) -> char {
        self.glyphs[0]
    }

    /// The lightest glyph (last in the ramp).
    pub fn lightest(&self) -> char {
        self.glyphs[self.glyphs.len() - 1]
    }
}

impl Default for GlyphRamp {
    fn default() -> Self {
        Self {
            glyphs: DEFAULT_RAMP.chars().collect(),
        }
    }
}

impl fmt::Display for GlyphRamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for glyph in &self.glyphs {
            write!(f, "{}", glyph)?;
        }
        Ok(())
    }
}
