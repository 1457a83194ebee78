//! Style parameters and the lane/kinematics math derived from them.

/// Speed multipliers for levels 1..=10.
pub const SPEED_TABLE: [f32; 10] = [0.6, 0.75, 0.9, 1.0, 1.15, 1.3, 1.5, 1.8, 2.2, 2.6];

/// Scroll duration at multiplier 1.0.
pub const BASE_DURATION_MS: f32 = 6000.0;
pub const MIN_DURATION_MS: i32 = 2000;
pub const MAX_DURATION_MS: i32 = 20000;

/// Minimum lane height in pixels.
pub const MIN_LANE_HEIGHT: f32 = 18.0;
/// Minimum horizontal gap between lines in one lane.
pub const MIN_MARGIN: f32 = 12.0;

/// Drawing surface size in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// User-facing overlay style.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StyleParams {
    pub font_size_px: f32,
    /// 1 (slowest) ..= 10 (fastest); out-of-range values are clamped.
    pub speed_level: u8,
    /// Fraction of the viewport height used for lanes, (0, 1].
    pub coverage: f32,
    /// Multiplied into each item's alpha channel, [0, 1].
    pub opacity: f32,
    pub min_weight: i32,
}

impl Default for StyleParams {
    fn default() -> Self {
        Self {
            font_size_px: 25.0,
            speed_level: 4,
            coverage: 1.0,
            opacity: 1.0,
            min_weight: 0,
        }
    }
}

impl StyleParams {
    pub fn speed_multiplier(&self) -> f32 {
        let idx = usize::from(self.speed_level.clamp(1, 10) - 1);
        SPEED_TABLE.get(idx).copied().unwrap_or(1.0)
    }

    /// Time a scrolling line takes to cross the viewport.
    pub fn scroll_duration_ms(&self) -> i32 {
        let ms = (BASE_DURATION_MS / self.speed_multiplier()).round() as i32;
        ms.clamp(MIN_DURATION_MS, MAX_DURATION_MS)
    }

    pub fn lane_height(&self) -> f32 {
        (self.font_size_px * 6.0 / 5.0).max(MIN_LANE_HEIGHT)
    }

    pub fn margin(&self) -> f32 {
        (self.font_size_px * 3.0 / 5.0).max(MIN_MARGIN)
    }

    /// Scale an ARGB colour's alpha by `opacity`.
    pub fn apply_opacity(&self, argb: u32) -> u32 {
        let alpha = ((argb >> 24) as f32 * self.opacity.clamp(0.0, 1.0)).round() as u32;
        (alpha.min(255) << 24) | (argb & 0x00FF_FFFF)
    }
}

/// Lane geometry for one viewport/style pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneLayout {
    pub lane_height: f32,
    pub lane_count: usize,
    pub margin: f32,
}

impl LaneLayout {
    pub fn compute(viewport: Viewport, style: &StyleParams) -> Self {
        let lane_height = style.lane_height();
        let usable = viewport.height.max(0.0) * style.coverage.clamp(0.0, 1.0);
        // Tolerate float noise so 150 / 30 stays 5 lanes.
        let lane_count = ((usable / lane_height + 1e-4).floor() as usize).max(1);
        Self {
            lane_height,
            lane_count,
            margin: style.margin(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(l: u8) -> StyleParams {
        StyleParams {
            speed_level: l,
            ..StyleParams::default()
        }
    }

    #[test]
    fn durations_follow_speed_table() {
        assert_eq!(level(4).scroll_duration_ms(), 6000);
        assert_eq!(level(1).scroll_duration_ms(), 10000);
        assert_eq!(level(10).scroll_duration_ms(), 2308);
        assert_eq!(level(0).scroll_duration_ms(), 10000);
        assert_eq!(level(42).scroll_duration_ms(), 2308);
    }

    #[test]
    fn never_zero_lanes() {
        let s = StyleParams::default();
        assert_eq!(LaneLayout::compute(Viewport::new(100.0, 0.0), &s).lane_count, 1);
        assert_eq!(LaneLayout::compute(Viewport::new(100.0, 150.0), &s).lane_count, 5);
        let half = StyleParams {
            coverage: 0.5,
            ..s
        };
        assert_eq!(LaneLayout::compute(Viewport::new(100.0, 300.0), &half).lane_count, 5);
    }

    #[test]
    fn small_fonts_keep_min_geometry() {
        let s = StyleParams {
            font_size_px: 8.0,
            ..StyleParams::default()
        };
        assert_eq!(s.lane_height(), MIN_LANE_HEIGHT);
        assert_eq!(s.margin(), MIN_MARGIN);
    }

    #[test]
    fn opacity_scales_alpha_only() {
        let s = StyleParams {
            opacity: 0.5,
            ..StyleParams::default()
        };
        assert_eq!(s.apply_opacity(0xFF11_2233), 0x8011_2233);
    }
}
