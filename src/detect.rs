//! Three-stage statistical watermark detection.
//!
//! Decides whether the calibrated watermark is actually present before a
//! destructive removal, by fusing three independent signals:
//!
//! 1. **Spatial NCC** (weight 0.50): normalized cross-correlation between the
//!    region's luminance and the alpha mask.
//! 2. **Gradient NCC** (weight 0.30): correlation of Sobel gradient
//!    magnitudes, matching the watermark's edge signature independent of
//!    absolute brightness.
//! 3. **Variance dampening** (weight 0.20): translucent overlays flatten
//!    local texture, so the region's std-dev drops relative to the
//!    background directly above it.
//!
//! Stage 1 doubles as a circuit breaker: a spatial score below 0.25 ends the
//! pipeline early with a deliberately damped confidence of `spatial * 0.5`.
//! Downstream skip thresholds are calibrated against that exact formula.

use image::RgbImage;
use tracing::debug;

use crate::mask::AlphaMask;
use crate::placement::{MaskSize, Region};

/// Fusion weight: spatial NCC.
const SPATIAL_WEIGHT: f32 = 0.50;
/// Fusion weight: gradient NCC.
const GRADIENT_WEIGHT: f32 = 0.30;
/// Fusion weight: variance dampening.
const VARIANCE_WEIGHT: f32 = 0.20;
/// Circuit breaker: spatial NCC below this ends detection early.
const SPATIAL_CIRCUIT_BREAKER: f32 = 0.25;
/// Fused confidence at or above this means "detected".
const DETECTION_THRESHOLD: f32 = 0.35;
/// Minimum reference patch height for the variance stage.
const MIN_REF_HEIGHT: u32 = 8;
/// Noise floor for the reference std-dev, 5.0 on an 8-bit scale.
const MIN_REF_STDDEV: f32 = 5.0 / 255.0;

/// Outcome of a detection run.
///
/// `spatial_score` and `gradient_score` are raw correlation coefficients and
/// may be negative; `confidence` is clamped to `[0, 1]` after fusion (the
/// damped early-exit value is reported as-is).
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// Whether the fused confidence cleared the detection threshold.
    pub detected: bool,
    /// Fused confidence score.
    pub confidence: f32,
    /// Stage 1: spatial NCC against the alpha mask.
    pub spatial_score: f32,
    /// Stage 2: gradient-magnitude NCC (0 when short-circuited).
    pub gradient_score: f32,
    /// Stage 3: variance dampening score in `[0, 1]` (0 when the reference
    /// patch is too small or too flat, or when short-circuited).
    pub variance_score: f32,
    /// Which calibrated mask size was tested.
    pub mask_size_used: MaskSize,
    /// The rectangle actually tested, clipped to image bounds.
    pub region: Region,
}

impl DetectionResult {
    fn negative(size: MaskSize, region: Region) -> Self {
        Self {
            detected: false,
            confidence: 0.0,
            spatial_score: 0.0,
            gradient_score: 0.0,
            variance_score: 0.0,
            mask_size_used: size,
            region,
        }
    }
}

/// Run the detection pipeline for a mask expected at (`pos_x`, `pos_y`).
///
/// The tested rectangle is the mask's dimensions clipped to image bounds;
/// an empty intersection yields a neutral not-detected result rather than
/// an error.
#[must_use]
pub fn detect(
    image: &RgbImage,
    mask: &AlphaMask,
    size: MaskSize,
    pos_x: u32,
    pos_y: u32,
) -> DetectionResult {
    let x2 = (pos_x + mask.width()).min(image.width());
    let y2 = (pos_y + mask.height()).min(image.height());
    if pos_x >= x2 || pos_y >= y2 {
        debug!("detection region out of bounds, returning neutral result");
        return DetectionResult::negative(size, Region::new(pos_x, pos_y, 0, 0));
    }

    let roi_w = x2 - pos_x;
    let roi_h = y2 - pos_y;
    let region = Region::new(pos_x, pos_y, roi_w, roi_h);
    let mut result = DetectionResult::negative(size, region);

    let gray_region = luminance_plane(image, pos_x, pos_y, roi_w, roi_h);
    let alpha_region = mask.sub_plane(roi_w, roi_h);

    // Stage 1: spatial NCC, also the circuit breaker.
    let spatial = ncc(&gray_region, &alpha_region);
    result.spatial_score = spatial;

    if spatial < SPATIAL_CIRCUIT_BREAKER {
        // Damped, not zero: callers compare against skip thresholds tuned
        // for this formula.
        result.confidence = spatial * 0.5;
        debug!(
            "detection short-circuit: spatial={spatial:.3} < {SPATIAL_CIRCUIT_BREAKER}, \
             confidence={:.3}",
            result.confidence
        );
        return result;
    }

    // Stage 2: gradient-magnitude NCC.
    let w = roi_w as usize;
    let h = roi_h as usize;
    let img_grad = sobel_magnitude(&gray_region, w, h);
    let alpha_grad = sobel_magnitude(&alpha_region, w, h);
    let gradient = ncc(&img_grad, &alpha_grad);
    result.gradient_score = gradient;

    // Stage 3: variance dampening against the patch directly above.
    let mut variance = 0.0_f32;
    let ref_h = pos_y.min(mask.height());
    if ref_h > MIN_REF_HEIGHT {
        let ref_region = luminance_plane(image, pos_x, pos_y - ref_h, roi_w, ref_h);
        let region_sd = stddev(&gray_region);
        let ref_sd = stddev(&ref_region);
        if ref_sd > MIN_REF_STDDEV {
            variance = (1.0 - region_sd / ref_sd).clamp(0.0, 1.0);
        }
    }
    result.variance_score = variance;

    let fused =
        SPATIAL_WEIGHT * spatial + GRADIENT_WEIGHT * gradient + VARIANCE_WEIGHT * variance;
    result.confidence = fused.clamp(0.0, 1.0);
    result.detected = result.confidence >= DETECTION_THRESHOLD;

    debug!(
        "detection: spatial={spatial:.3} gradient={gradient:.3} variance={variance:.3} \
         -> confidence={:.3} ({})",
        result.confidence,
        if result.detected { "detected" } else { "not detected" }
    );

    result
}

/// Luminance of an image region as floats in `[0, 1]`, row-major.
///
/// Rec. 601 weights: `0.299 R + 0.587 G + 0.114 B`.
fn luminance_plane(img: &RgbImage, x: u32, y: u32, w: u32, h: u32) -> Vec<f32> {
    let mut plane = Vec::with_capacity((w * h) as usize);
    for dy in 0..h {
        for dx in 0..w {
            let px = img.get_pixel(x + dx, y + dy);
            let lum =
                0.299 * f32::from(px[0]) + 0.587 * f32::from(px[1]) + 0.114 * f32::from(px[2]);
            plane.push(lum / 255.0);
        }
    }
    plane
}

/// Normalized cross-correlation between two equal-length slices.
///
/// Zero-mean, unit-variance; degenerate (flat or empty) inputs score 0.
fn ncc(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    #[allow(clippy::cast_precision_loss)]
    let n = a.len() as f32;
    if n < 1.0 {
        return 0.0;
    }

    let mean_a = a.iter().sum::<f32>() / n;
    let mean_b = b.iter().sum::<f32>() / n;

    let mut numerator = 0.0_f32;
    let mut denom_a = 0.0_f32;
    let mut denom_b = 0.0_f32;
    for (va, vb) in a.iter().zip(b.iter()) {
        let da = va - mean_a;
        let db = vb - mean_b;
        numerator += da * db;
        denom_a += da * da;
        denom_b += db * db;
    }

    let denom = (denom_a * denom_b).sqrt();
    if denom < 1e-10 {
        0.0
    } else {
        numerator / denom
    }
}

/// 3x3 Sobel gradient magnitude of a row-major plane. Borders are 0.
fn sobel_magnitude(data: &[f32], width: usize, height: usize) -> Vec<f32> {
    let mut result = vec![0.0_f32; width * height];
    if width < 3 || height < 3 {
        return result;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
            let at = |dy: isize, dx: isize| -> f32 {
                data[((y as isize + dy) as usize) * width + (x as isize + dx) as usize]
            };

            let gx = -at(-1, -1) + at(-1, 1) - 2.0 * at(0, -1) + 2.0 * at(0, 1) - at(1, -1)
                + at(1, 1);
            let gy = -at(-1, -1) - 2.0 * at(-1, 0) - at(-1, 1)
                + at(1, -1)
                + 2.0 * at(1, 0)
                + at(1, 1);

            result[y * width + x] = (gx * gx + gy * gy).sqrt();
        }
    }

    result
}

/// Population standard deviation of a slice; 0 for empty input.
fn stddev(data: &[f32]) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = data.len() as f32;
    let mean = data.iter().sum::<f32>() / n;
    let variance = data.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ncc_returns_one_for_perfect_match() {
        let a = vec![0.1, 0.5, 0.9, 0.3, 0.7];
        let score = ncc(&a, &a);
        assert!((score - 1.0).abs() < 1e-5, "got {score}");
    }

    #[test]
    fn ncc_returns_negative_one_for_inverse() {
        let a = vec![0.1, 0.5, 0.9, 0.3, 0.7];
        let b: Vec<f32> = a.iter().map(|v| 1.0 - v).collect();
        let score = ncc(&a, &b);
        assert!((score + 1.0).abs() < 1e-5, "got {score}");
    }

    #[test]
    fn ncc_of_empty_or_flat_slices_is_zero() {
        assert!(ncc(&[], &[]).abs() < 1e-6);
        let flat = vec![0.5_f32; 16];
        let ramp: Vec<f32> = (0..16).map(|i| i as f32 / 16.0).collect();
        assert!(ncc(&flat, &ramp).abs() < 1e-6);
    }

    #[test]
    fn stddev_of_known_values() {
        assert!(stddev(&[]).abs() < 1e-6);
        assert!(stddev(&[0.42; 100]).abs() < 1e-6);
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((stddev(&data) - 2.0_f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn sobel_is_zero_for_flat_plane() {
        let grad = sobel_magnitude(&vec![0.5_f32; 100], 10, 10);
        for &g in &grad {
            assert!(g.abs() < 1e-6);
        }
    }

    #[test]
    fn sobel_detects_vertical_edge() {
        let mut data = vec![0.0_f32; 100];
        for y in 0..10 {
            for x in 5..10 {
                data[y * 10 + x] = 1.0;
            }
        }
        let grad = sobel_magnitude(&data, 10, 10);
        assert!(grad[5 * 10 + 5] > 0.1);
    }

    #[test]
    fn sobel_handles_degenerate_dimensions() {
        let grad = sobel_magnitude(&[0.1, 0.2], 2, 1);
        assert_eq!(grad, vec![0.0, 0.0]);
    }

    #[test]
    fn out_of_bounds_region_yields_neutral_result() {
        let img = RgbImage::new(20, 20);
        let mask = AlphaMask::from_plane(48, 48, vec![0.3; 48 * 48]);
        let result = detect(&img, &mask, MaskSize::Small, 50, 50);
        assert!(!result.detected);
        assert!(result.confidence.abs() < f32::EPSILON);
        assert_eq!(result.region.width, 0);
    }

    #[test]
    fn clipped_region_is_reported() {
        let img = RgbImage::new(30, 30);
        let mask = AlphaMask::from_plane(48, 48, vec![0.3; 48 * 48]);
        let result = detect(&img, &mask, MaskSize::Small, 10, 10);
        assert_eq!(result.region, Region::new(10, 10, 20, 20));
    }

    #[test]
    fn circuit_breaker_damps_confidence_exactly() {
        // Flat image: spatial NCC is 0, well under the breaker.
        let img = RgbImage::new(100, 100);
        #[allow(clippy::cast_precision_loss)]
        let values: Vec<f32> = (0..48 * 48).map(|i| (i % 5) as f32 / 10.0).collect();
        let mask = AlphaMask::from_plane(48, 48, values);

        let result = detect(&img, &mask, MaskSize::Small, 20, 20);

        assert!(!result.detected);
        assert!(result.spatial_score < SPATIAL_CIRCUIT_BREAKER);
        assert_eq!(result.confidence, result.spatial_score * 0.5);
        // Later stages never ran.
        assert!(result.gradient_score.abs() < f32::EPSILON);
        assert!(result.variance_score.abs() < f32::EPSILON);
    }
}
