//! Glyph-metrics resource consumed by text widgets.
//!
//! Shaping and rasterization belong to the font backend; the core only needs
//! per-character horizontal extents. The measurer is owned by the GUI
//! controller as an explicit resource, so independent GUI instances can use
//! different backends (or a deterministic one in tests).

/// Horizontal extent of one glyph on the line, in logical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphPos {
    pub left: f32,
    pub right: f32,
}

/// Per-character metrics provider. One entry is returned per input `char`;
/// the caller treats a length mismatch as an invariant breach.
pub trait TextMeasure {
    /// Glyph extents for `text` at `font_size`, left to right from x = 0.
    fn glyph_positions(&self, text: &[char], font_size: f32) -> Vec<GlyphPos>;
}

/// Fixed-advance measurer: every glyph is `advance_em * font_size` wide.
/// Deterministic stand-in for a real font backend.
#[derive(Debug, Clone, Copy)]
pub struct FixedAdvance {
    /// Glyph advance as a fraction of the font size.
    pub advance_em: f32,
}

impl Default for FixedAdvance {
    fn default() -> Self {
        Self { advance_em: 0.5 }
    }
}

impl TextMeasure for FixedAdvance {
    fn glyph_positions(&self, text: &[char], font_size: f32) -> Vec<GlyphPos> {
        let advance = self.advance_em * font_size;
        (0..text.len())
            .map(|i| GlyphPos {
                left: i as f32 * advance,
                right: (i as f32 + 1.0) * advance,
            })
            .collect()
    }
}
