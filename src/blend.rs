//! Forward and reverse alpha compositing over a flat-color foreground.
//!
//! Watermarking is standard "over" compositing with a constant logo
//! intensity: `watermarked = alpha * logo + (1 - alpha) * original`, applied
//! identically per channel with a single-channel alpha. Removal inverts it
//! in closed form: `original = (watermarked - alpha * logo) / (1 - alpha)`.
//!
//! Quantization uses round-to-nearest before clamping to `[0, 255]`. The
//! forward blend is therefore lossy and the round trip is only exact to
//! within a couple of counts per channel.

use image::RgbImage;

use crate::mask::AlphaMask;

/// Alpha noise floor: pixels with weaker opacity are left untouched.
const ALPHA_THRESHOLD: f32 = 0.002;

/// Alpha ceiling for the reverse blend; keeps the `1 - alpha` denominator
/// away from zero where the original pixel is numerically unrecoverable.
const MAX_ALPHA: f32 = 0.99;

/// Blend the watermark into `image` at (`pos_x`, `pos_y`), in place.
///
/// The rectangle is the mask's dimensions; any part extending past the
/// image's right or bottom edge is clipped along with the matching mask
/// sub-region. Out-of-bounds placement is a no-op, not an error.
pub fn apply(image: &mut RgbImage, mask: &AlphaMask, pos_x: u32, pos_y: u32, logo_value: f32) {
    blend_region(image, mask, pos_x, pos_y, |alpha, value| {
        alpha * logo_value + (1.0 - alpha) * value
    });
}

/// Recover pre-watermark pixels at (`pos_x`, `pos_y`), in place.
///
/// Where alpha saturates (>= 0.99) the denominator is floored, so the
/// result passes through close to the watermarked value rather than
/// exploding. Clipping policy matches [`apply`].
pub fn reverse(image: &mut RgbImage, mask: &AlphaMask, pos_x: u32, pos_y: u32, logo_value: f32) {
    blend_region(image, mask, pos_x, pos_y, |alpha, value| {
        let alpha = alpha.min(MAX_ALPHA);
        (value - alpha * logo_value) / (1.0 - alpha)
    });
}

/// Shared clipping, iteration, and quantization for both blend directions.
fn blend_region<F>(image: &mut RgbImage, mask: &AlphaMask, pos_x: u32, pos_y: u32, op: F)
where
    F: Fn(f32, f32) -> f32,
{
    let x2 = (pos_x + mask.width()).min(image.width());
    let y2 = (pos_y + mask.height()).min(image.height());
    if pos_x >= x2 || pos_y >= y2 {
        return;
    }

    for dy in 0..(y2 - pos_y) {
        for dx in 0..(x2 - pos_x) {
            let alpha = mask.get(dx, dy);
            if alpha < ALPHA_THRESHOLD {
                continue;
            }

            let px = image.get_pixel_mut(pos_x + dx, pos_y + dy);
            for ch in 0..3 {
                let value = op(alpha, f32::from(px[ch]));
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                {
                    px[ch] = value.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn ramp_mask(size: u32, max_alpha: f32) -> AlphaMask {
        #[allow(clippy::cast_precision_loss)]
        let values: Vec<f32> = (0..size * size)
            .map(|i| i as f32 / (size * size) as f32 * max_alpha)
            .collect();
        AlphaMask::from_plane(size, size, values)
    }

    #[test]
    fn apply_then_reverse_recovers_original_within_tolerance() {
        let original = RgbImage::from_pixel(100, 100, Rgb([128, 64, 200]));
        let mut img = original.clone();
        let mask = ramp_mask(10, 0.5);

        apply(&mut img, &mask, 50, 50, 255.0);
        reverse(&mut img, &mask, 50, 50, 255.0);

        for (restored, orig) in img.pixels().zip(original.pixels()) {
            for ch in 0..3 {
                let diff = (i32::from(restored[ch]) - i32::from(orig[ch])).abs();
                assert!(diff <= 2, "channel {ch} diff {diff}");
            }
        }
    }

    #[test]
    fn apply_moves_pixels_toward_logo_value() {
        let mut img = RgbImage::from_pixel(20, 20, Rgb([10, 10, 10]));
        let mask = AlphaMask::from_plane(4, 4, vec![0.5; 16]);

        apply(&mut img, &mask, 0, 0, 255.0);

        let blended = img.get_pixel(1, 1);
        // 0.5 * 255 + 0.5 * 10 = 132.5, rounds to 133
        assert_eq!(blended[0], 133);
        // Outside the mask rectangle: untouched.
        assert_eq!(img.get_pixel(10, 10)[0], 10);
    }

    #[test]
    fn reverse_guards_saturated_alpha() {
        let mut img = RgbImage::from_pixel(8, 8, Rgb([250, 250, 250]));
        let mask = AlphaMask::from_plane(4, 4, vec![1.0; 16]);

        reverse(&mut img, &mask, 0, 0, 255.0);

        // No NaN/panic; values stay in range.
        for px in img.pixels() {
            for ch in 0..3 {
                let _ = px[ch];
            }
        }
    }

    #[test]
    fn near_zero_alpha_is_a_no_op() {
        let mut img = RgbImage::from_pixel(8, 8, Rgb([100, 100, 100]));
        let mask = AlphaMask::from_plane(4, 4, vec![0.001; 16]);

        apply(&mut img, &mask, 0, 0, 255.0);

        assert_eq!(img.get_pixel(0, 0)[0], 100);
    }

    #[test]
    fn overhanging_rectangle_modifies_only_the_intersection() {
        let mut img = RgbImage::from_pixel(30, 30, Rgb([40, 40, 40]));
        let mask = AlphaMask::from_plane(10, 10, vec![0.8; 100]);

        // Mask bottom-right corner overhangs by 5px on both axes.
        apply(&mut img, &mask, 25, 25, 255.0);

        for y in 0..30 {
            for x in 0..30 {
                let px = img.get_pixel(x, y);
                if x >= 25 && y >= 25 {
                    assert_ne!(px[0], 40, "({x},{y}) should be blended");
                } else {
                    assert_eq!(px[0], 40, "({x},{y}) should be untouched");
                }
            }
        }
    }

    #[test]
    fn fully_out_of_bounds_placement_is_a_no_op() {
        let mut img = RgbImage::from_pixel(10, 10, Rgb([7, 7, 7]));
        let mask = AlphaMask::from_plane(4, 4, vec![0.9; 16]);

        apply(&mut img, &mask, 50, 50, 255.0);

        for px in img.pixels() {
            assert_eq!(px[0], 7);
        }
    }
}
