//! Resolution model
//!
//! Converts the device pixel ratio and the target document DPI into the
//! uniform scale applied to a capture. The bitmap's intrinsic pixel size,
//! displayed at `target_dpi`, reproduces the staging container's CSS size.

/// DPI the rasterization engine assumes natively.
pub const REFERENCE_DPI: f64 = 72.0;

/// DPI assumed for paste targets when the caller does not specify one.
pub const DEFAULT_TARGET_DPI: u32 = 96;

/// Lowest device pixel ratio considered; anything smaller is clamped.
pub const MIN_DEVICE_PIXEL_RATIO: f32 = 1.0;

/// Tolerance absorbed before rounding up, so `54 * 4/3` stays 72 and not 73.
const CEIL_EPSILON: f64 = 1e-6;

/// Pixel density of the capture surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceProfile {
    device_pixel_ratio: f32,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            device_pixel_ratio: MIN_DEVICE_PIXEL_RATIO,
        }
    }
}

impl DeviceProfile {
    /// Create a profile; ratios below 1 (or non-finite) are floor-clamped to 1.
    pub fn new(device_pixel_ratio: f32) -> Self {
        Self {
            device_pixel_ratio: clamp_ratio(device_pixel_ratio),
        }
    }

    /// The clamped device pixel ratio.
    pub fn device_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio
    }

    /// Scale for a capture destined for `target_dpi`.
    pub fn scale_for(&self, target_dpi: u32) -> f64 {
        scale_factor(self.device_pixel_ratio, target_dpi)
    }
}

fn clamp_ratio(ratio: f32) -> f32 {
    if ratio.is_finite() {
        ratio.max(MIN_DEVICE_PIXEL_RATIO)
    } else {
        MIN_DEVICE_PIXEL_RATIO
    }
}

/// `target_dpi / (REFERENCE_DPI * device_pixel_ratio)`.
///
/// The ratio is clamped to at least 1 and a zero DPI is treated as 1, so the
/// result is always finite and strictly positive.
pub fn scale_factor(device_pixel_ratio: f32, target_dpi: u32) -> f64 {
    let ratio = clamp_ratio(device_pixel_ratio) as f64;
    let dpi = target_dpi.max(1) as f64;
    dpi / (REFERENCE_DPI * ratio)
}

/// Capture size in pixels for a CSS length: `ceil(css_px * scale)`.
pub fn capture_dimension(css_px: f64, scale: f64) -> u32 {
    if !(css_px > 0.0) || !(scale > 0.0) {
        return 0;
    }
    let scaled = css_px * scale;
    (scaled - CEIL_EPSILON).ceil().max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_scale() {
        let scale = scale_factor(1.0, DEFAULT_TARGET_DPI);
        assert!((scale - 96.0 / 72.0).abs() < 1e-12);
    }

    #[test]
    fn test_ratio_is_floor_clamped() {
        assert_eq!(scale_factor(0.5, 96), scale_factor(1.0, 96));
        assert_eq!(scale_factor(0.0, 96), scale_factor(1.0, 96));
        assert_eq!(scale_factor(f32::NAN, 96), scale_factor(1.0, 96));
        assert_eq!(DeviceProfile::new(-3.0).device_pixel_ratio(), 1.0);
    }

    #[test]
    fn test_zero_dpi_does_not_divide_by_zero() {
        let scale = scale_factor(1.0, 0);
        assert!(scale > 0.0 && scale.is_finite());
    }

    #[test]
    fn test_high_density_device_shrinks_scale() {
        let profile = DeviceProfile::new(2.0);
        assert!((profile.scale_for(96) - 96.0 / 144.0).abs() < 1e-12);
    }

    #[test]
    fn test_capture_dimension_exact_multiple() {
        let scale = scale_factor(1.0, 96);
        assert_eq!(capture_dimension(54.0, scale), 72);
        assert_eq!(capture_dimension(54.5, scale), 73);
    }

    #[test]
    fn test_double_dpi_doubles_pixels() {
        let at_96 = scale_factor(1.0, 96);
        let at_192 = scale_factor(1.0, 192);
        for css in [27.0, 54.0, 90.0, 150.0] {
            assert_eq!(
                capture_dimension(css, at_192),
                2 * capture_dimension(css, at_96)
            );
        }
    }

    #[test]
    fn test_capture_dimension_of_empty_box() {
        assert_eq!(capture_dimension(0.0, 1.5), 0);
        assert_eq!(capture_dimension(f64::NAN, 1.5), 0);
    }

    proptest! {
        #[test]
        fn prop_scale_is_positive(dpr in 0.0f32..16.0, dpi in 1u32..2400) {
            let scale = scale_factor(dpr, dpi);
            prop_assert!(scale > 0.0);
            prop_assert!(scale.is_finite());
        }

        #[test]
        fn prop_capture_is_ceiling(css in 1.0f64..2000.0, dpr in 1.0f32..4.0, dpi in 36u32..600) {
            let scale = scale_factor(dpr, dpi);
            let px = capture_dimension(css, scale) as f64;
            let exact = css * scale;
            prop_assert!(px + 1e-6 >= exact);
            prop_assert!(px < exact + 1.0);
        }
    }
}
