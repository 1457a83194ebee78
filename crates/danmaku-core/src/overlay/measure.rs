//! Text width seam. The renderer owns the real fonts; the engine only needs a
//! width to do its kinematics.

use unicode_width::UnicodeWidthChar;

/// Measures rendered text width in pixels.
pub trait TextMeasure: Send {
    fn width(&self, text: &str, font_size_px: f32) -> f32;
}

/// Column-class approximation from East Asian width: wide glyphs are 1 em,
/// narrow ones 0.55 em, zero-width marks and controls take no space.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxMeasure;

impl TextMeasure for ApproxMeasure {
    fn width(&self, text: &str, font_size_px: f32) -> f32 {
        let ems: f32 = text
            .chars()
            .map(|c| match UnicodeWidthChar::width(c).unwrap_or(0) {
                0 => 0.0,
                1 => 0.55,
                _ => 1.0,
            })
            .sum();
        ems * font_size_px
    }
}
