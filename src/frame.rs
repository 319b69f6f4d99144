//! Frame buffer and pixel-color matching.
//!
//! A [`Frame`] is an immutable RGB8 snapshot of the capture device plus the
//! instant it was taken. State inference never looks at more than single
//! pixels: a [`ColorSpec`] defines an inclusive per-channel tolerance band
//! around a target color, and a [`PixelCondition`] ties a coordinate, a band
//! and a match polarity together.

use std::time::Instant;

/// One captured video frame: packed RGB8 samples plus the capture instant.
///
/// Frames are cloned out of the capture slot before any long-lived retention,
/// so a retained frame never aliases the device's reusable buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
    captured_at: Instant,
}

impl Frame {
    /// Wrap a packed RGB8 buffer. `data.len()` must be `width * height * 3`.
    pub fn from_rgb8(width: u32, height: u32, data: Vec<u8>, captured_at: Instant) -> Self {
        assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * 3,
            "RGB8 buffer size does not match {width}x{height}"
        );
        Self {
            width,
            height,
            data,
            captured_at,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Raw packed RGB8 samples, row-major.
    pub fn rgb_data(&self) -> &[u8] {
        &self.data
    }

    /// The `[r, g, b]` sample at `(x, y)`.
    ///
    /// Panics on out-of-range coordinates. Stage coordinates are constants,
    /// so an out-of-range read is a programming error, not a soft failure.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) out of range for {}x{} frame",
            self.width,
            self.height
        );
        let idx = ((y * self.width + x) * 3) as usize;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }
}

/// Target color plus inclusive per-channel tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorSpec {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    /// Per-channel slack: a sample matches when every channel lies within
    /// `[target - tolerance, target + tolerance]`, clamped to `[0, 255]`.
    pub tolerance: u8,
}

impl ColorSpec {
    pub const fn new(r: u8, g: u8, b: u8, tolerance: u8) -> Self {
        Self { r, g, b, tolerance }
    }

    /// Pure white with no slack — the game's dialogue and flash indicator.
    pub const fn white() -> Self {
        Self::new(255, 255, 255, 0)
    }

    /// Whether `sample` falls inside the tolerance band on every channel.
    pub fn contains(&self, sample: [u8; 3]) -> bool {
        channel_in_band(sample[0], self.r, self.tolerance)
            && channel_in_band(sample[1], self.g, self.tolerance)
            && channel_in_band(sample[2], self.b, self.tolerance)
    }
}

fn channel_in_band(sample: u8, target: u8, tolerance: u8) -> bool {
    let low = target.saturating_sub(tolerance);
    let high = target.saturating_add(tolerance);
    sample >= low && sample <= high
}

/// A single-pixel condition: coordinate, color band and match polarity.
///
/// The condition is satisfied when the sampled pixel's in-band status equals
/// `expect_match` — so a white target with `expect_match = false` reads as
/// "this pixel is *not* white".
#[derive(Debug, Clone, Copy)]
pub struct PixelCondition {
    pub x: u32,
    pub y: u32,
    pub color: ColorSpec,
    pub expect_match: bool,
}

impl PixelCondition {
    pub const fn new(x: u32, y: u32, color: ColorSpec, expect_match: bool) -> Self {
        Self {
            x,
            y,
            color,
            expect_match,
        }
    }

    /// Evaluate the condition against one frame. Pure and deterministic.
    pub fn matches(&self, frame: &Frame) -> bool {
        self.color.contains(frame.pixel(self.x, self.y)) == self.expect_match
    }
}

/// True when every condition in `conditions` holds on `frame`.
///
/// The appearance stage checks two pixels at once; everything else passes a
/// single-element slice.
pub fn all_match(frame: &Frame, conditions: &[PixelCondition]) -> bool {
    conditions.iter().all(|c| c.matches(frame))
}


#[cfg(test)]
mod tests {
    use super::test_support::frame_with_pixels;
    use super::*;

    #[test]
    fn pixel_returns_sample_at_coordinate() {
        let frame = frame_with_pixels(8, 8, [0, 0, 0], &[(3, 5, [10, 20, 30])]);
        assert_eq!(frame.pixel(3, 5), [10, 20, 30]);
        assert_eq!(frame.pixel(0, 0), [0, 0, 0]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn pixel_out_of_range_panics() {
        let frame = frame_with_pixels(4, 4, [0, 0, 0], &[]);
        frame.pixel(4, 0);
    }

    #[test]
    fn tolerance_band_is_inclusive_at_the_edge() {
        let spec = ColorSpec::new(100, 150, 200, 10);
        // Exactly at target - t and target + t on each channel.
        assert!(spec.contains([90, 140, 190]));
        assert!(spec.contains([110, 160, 210]));
        assert!(spec.contains([100, 150, 200]));
    }

    #[test]
    fn tolerance_band_fails_just_outside() {
        let spec = ColorSpec::new(100, 150, 200, 10);
        // One past the band on a single channel is enough to fail.
        assert!(!spec.contains([89, 150, 200]));
        assert!(!spec.contains([100, 161, 200]));
        assert!(!spec.contains([100, 150, 211]));
    }

    #[test]
    fn tolerance_band_clamps_at_channel_limits() {
        let spec = ColorSpec::new(250, 5, 128, 10);
        // 250 + 10 clamps to 255, 5 - 10 clamps to 0.
        assert!(spec.contains([255, 0, 128]));
        assert!(!spec.contains([239, 0, 128]));
    }

    #[test]
    fn zero_tolerance_is_exact_match() {
        let spec = ColorSpec::new(42, 42, 42, 0);
        assert!(spec.contains([42, 42, 42]));
        assert!(!spec.contains([42, 42, 43]));
        assert!(!spec.contains([41, 42, 42]));
    }

    #[test]
    fn condition_polarity_inverts_band_check() {
        let frame = frame_with_pixels(8, 8, [0, 0, 0], &[(2, 2, [255, 255, 255])]);

        let white_there = PixelCondition::new(2, 2, ColorSpec::white(), true);
        let not_white_there = PixelCondition::new(2, 2, ColorSpec::white(), false);
        let white_elsewhere = PixelCondition::new(1, 1, ColorSpec::white(), true);

        assert!(white_there.matches(&frame));
        assert!(!not_white_there.matches(&frame));
        assert!(!white_elsewhere.matches(&frame));
    }

    #[test]
    fn all_match_requires_every_condition() {
        let frame = frame_with_pixels(8, 8, [0, 0, 0], &[(2, 2, [255, 255, 255])]);
        let both = [
            PixelCondition::new(2, 2, ColorSpec::white(), true),
            PixelCondition::new(1, 1, ColorSpec::white(), false),
        ];
        let contradiction = [
            PixelCondition::new(2, 2, ColorSpec::white(), true),
            PixelCondition::new(2, 2, ColorSpec::white(), false),
        ];
        assert!(all_match(&frame, &both));
        assert!(!all_match(&frame, &contradiction));
        assert!(all_match(&frame, &[]));
    }
}
