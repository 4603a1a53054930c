//! Calibrated alpha masks and resampling.
//!
//! A watermark is modeled as a per-pixel opacity plane in `[0, 1]`, derived
//! once from a calibration capture: the watermark rendered over a known dark
//! backdrop, so that sample intensity is proportional to opacity. Standard
//! masks are 48x48 (small) and 96x96 (large); arbitrary sizes are produced
//! by resampling the large mask.

use image::RgbImage;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Immutable per-pixel opacity plane.
///
/// Values are row-major, one `f32` in `[0, 1]` per pixel. Dimensions are
/// fixed at construction; the plane is never mutated afterwards, so shared
/// references are safe across threads.
#[derive(Debug, Clone)]
pub struct AlphaMask {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl AlphaMask {
    /// Wrap an existing opacity plane.
    ///
    /// # Panics
    ///
    /// Panics if `values.len() != width * height`.
    #[must_use]
    pub fn from_plane(width: u32, height: u32, values: Vec<f32>) -> Self {
        assert_eq!(
            values.len(),
            (width * height) as usize,
            "plane length must match dimensions"
        );
        Self {
            width,
            height,
            values,
        }
    }

    /// Derive a mask from encoded calibration capture data.
    ///
    /// The capture is decoded to RGB and each pixel's opacity is its
    /// channel-averaged intensity normalized to `[0, 1]`. A capture whose
    /// resolution differs from `expected` (square) is resampled to fit, with
    /// a warning; this is recoverable. A capture that fails to decode is not.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CalibrationDecode`] if `bytes` cannot be decoded.
    pub fn from_capture(bytes: &[u8], expected: u32, which: &'static str) -> Result<Self> {
        let img = image::load_from_memory(bytes)
            .map_err(|source| Error::CalibrationDecode { which, source })?
            .to_rgb8();

        let mask = Self::from_capture_image(&img);
        if mask.width == expected && mask.height == expected {
            return Ok(mask);
        }

        warn!(
            "{which} capture is {}x{}, expected {expected}x{expected}; resampling",
            mask.width, mask.height
        );
        Ok(mask.resample(expected, expected))
    }

    /// Derive a mask from a decoded calibration capture at its native size.
    #[must_use]
    pub fn from_capture_image(img: &RgbImage) -> Self {
        let mut values = Vec::with_capacity((img.width() * img.height()) as usize);
        for px in img.pixels() {
            let sum = f32::from(px[0]) + f32::from(px[1]) + f32::from(px[2]);
            values.push(sum / (3.0 * 255.0));
        }
        Self {
            width: img.width(),
            height: img.height(),
            values,
        }
    }

    /// Mask width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Mask height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The full opacity plane, row-major.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Opacity at (x, y).
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[(y * self.width + x) as usize]
    }

    /// Copy the top-left `w x h` sub-plane, used when the watermark
    /// rectangle is clipped by the image's right or bottom edge.
    #[must_use]
    pub fn sub_plane(&self, w: u32, h: u32) -> Vec<f32> {
        if w == self.width && h == self.height {
            return self.values.clone();
        }
        let mut sub = Vec::with_capacity((w * h) as usize);
        for dy in 0..h {
            for dx in 0..w {
                sub.push(self.get(dx, dy));
            }
        }
        sub
    }

    /// Resample this mask to an arbitrary resolution.
    ///
    /// Area averaging when shrinking, bilinear when either target dimension
    /// grows. Identical dimensions return a plain copy. Pure: the source
    /// mask is untouched and may be resampled concurrently.
    #[must_use]
    pub fn resample(&self, target_width: u32, target_height: u32) -> Self {
        if target_width == self.width && target_height == self.height {
            return self.clone();
        }

        let sw = self.width as usize;
        let sh = self.height as usize;
        let tw = target_width as usize;
        let th = target_height as usize;

        let upscale = target_width > self.width || target_height > self.height;
        let values = if upscale {
            resize_bilinear(&self.values, sw, sh, tw, th)
        } else {
            resize_area(&self.values, sw, sh, tw, th)
        };

        debug!(
            "resampled alpha mask {}x{} -> {target_width}x{target_height} ({})",
            self.width,
            self.height,
            if upscale { "bilinear" } else { "area" }
        );

        Self {
            width: target_width,
            height: target_height,
            values,
        }
    }
}

/// Area-average downscale of a row-major float plane.
///
/// Each destination pixel averages the source pixels its footprint covers,
/// weighting partially covered source pixels by overlap area.
fn resize_area(src: &[f32], sw: usize, sh: usize, tw: usize, th: usize) -> Vec<f32> {
    #[allow(clippy::cast_precision_loss)]
    let scale_x = sw as f32 / tw as f32;
    #[allow(clippy::cast_precision_loss)]
    let scale_y = sh as f32 / th as f32;

    let mut out = vec![0.0_f32; tw * th];

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    for ty in 0..th {
        let y0 = ty as f32 * scale_y;
        let y1 = (ty + 1) as f32 * scale_y;
        let yi0 = y0.floor() as usize;
        let yi1 = (y1.ceil() as usize).min(sh);

        for tx in 0..tw {
            let x0 = tx as f32 * scale_x;
            let x1 = (tx + 1) as f32 * scale_x;
            let xi0 = x0.floor() as usize;
            let xi1 = (x1.ceil() as usize).min(sw);

            let mut acc = 0.0_f32;
            let mut area = 0.0_f32;
            for yi in yi0..yi1 {
                let wy = (y1.min((yi + 1) as f32) - y0.max(yi as f32)).max(0.0);
                for xi in xi0..xi1 {
                    let wx = (x1.min((xi + 1) as f32) - x0.max(xi as f32)).max(0.0);
                    acc += src[yi * sw + xi] * wy * wx;
                    area += wy * wx;
                }
            }
            out[ty * tw + tx] = if area > 0.0 { acc / area } else { 0.0 };
        }
    }

    out
}

/// Bilinear upscale of a row-major float plane, half-pixel centers.
fn resize_bilinear(src: &[f32], sw: usize, sh: usize, tw: usize, th: usize) -> Vec<f32> {
    #[allow(clippy::cast_precision_loss)]
    let scale_x = sw as f32 / tw as f32;
    #[allow(clippy::cast_precision_loss)]
    let scale_y = sh as f32 / th as f32;

    let mut out = Vec::with_capacity(tw * th);

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    for ty in 0..th {
        let fy = ((ty as f32 + 0.5) * scale_y - 0.5).clamp(0.0, (sh - 1) as f32);
        let y0 = fy.floor() as usize;
        let y1 = (y0 + 1).min(sh - 1);
        let dy = fy - y0 as f32;

        for tx in 0..tw {
            let fx = ((tx as f32 + 0.5) * scale_x - 0.5).clamp(0.0, (sw - 1) as f32);
            let x0 = fx.floor() as usize;
            let x1 = (x0 + 1).min(sw - 1);
            let dx = fx - x0 as f32;

            let top = src[y0 * sw + x0] * (1.0 - dx) + src[y0 * sw + x1] * dx;
            let bottom = src[y1 * sw + x0] * (1.0 - dx) + src[y1 * sw + x1] * dx;
            out.push(top * (1.0 - dy) + bottom * dy);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient_mask(size: u32) -> AlphaMask {
        #[allow(clippy::cast_precision_loss)]
        let values: Vec<f32> = (0..size * size)
            .map(|i| (i % size) as f32 / size as f32)
            .collect();
        AlphaMask::from_plane(size, size, values)
    }

    #[test]
    fn capture_derivation_averages_channels() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([255, 255, 255]));

        let mask = AlphaMask::from_capture_image(&img);
        assert!((mask.get(0, 0) - 1.0 / 3.0).abs() < 1e-6);
        assert!((mask.get(1, 0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn capture_values_stay_in_unit_interval() {
        let img = RgbImage::from_pixel(8, 8, Rgb([200, 100, 50]));
        let mask = AlphaMask::from_capture_image(&img);
        for &v in mask.values() {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn resample_identity_returns_same_values() {
        let mask = gradient_mask(96);
        let copy = mask.resample(96, 96);
        assert_eq!(copy.width(), 96);
        assert_eq!(copy.height(), 96);
        for (a, b) in mask.values().iter().zip(copy.values()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn area_downscale_of_constant_plane_is_constant() {
        let mask = AlphaMask::from_plane(96, 96, vec![0.42; 96 * 96]);
        let down = mask.resample(30, 17);
        assert_eq!(down.values().len(), 30 * 17);
        for &v in down.values() {
            assert!((v - 0.42).abs() < 1e-5);
        }
    }

    #[test]
    fn area_downscale_halves_correctly() {
        // 2x2 blocks of a 4x4 checkerboard average to 0.5 exactly.
        let mut values = vec![0.0_f32; 16];
        for y in 0..4 {
            for x in 0..4 {
                values[y * 4 + x] = f32::from(u8::from((x + y) % 2 == 0));
            }
        }
        let mask = AlphaMask::from_plane(4, 4, values);
        let down = mask.resample(2, 2);
        for &v in down.values() {
            assert!((v - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn bilinear_upscale_preserves_range_and_monotonicity() {
        let mask = gradient_mask(48);
        let up = mask.resample(120, 120);
        assert_eq!(up.values().len(), 120 * 120);
        for &v in up.values() {
            assert!((0.0..=1.0).contains(&v));
        }
        // A left-to-right ramp stays non-decreasing along each row.
        for y in 0..120 {
            for x in 1..120 {
                assert!(up.get(x, y) >= up.get(x - 1, y) - 1e-5);
            }
        }
    }

    #[test]
    fn sub_plane_extracts_top_left() {
        let mask = gradient_mask(48);
        let sub = mask.sub_plane(10, 5);
        assert_eq!(sub.len(), 50);
        for dy in 0..5 {
            for dx in 0..10 {
                assert!((sub[dy * 10 + dx] - mask.get(dx as u32, dy as u32)).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn capture_with_wrong_resolution_is_resampled() {
        let img = RgbImage::from_pixel(64, 64, Rgb([128, 128, 128]));
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();

        let mask = AlphaMask::from_capture(&bytes, 48, "small").unwrap();
        assert_eq!(mask.width(), 48);
        assert_eq!(mask.height(), 48);
        for &v in mask.values() {
            assert!((v - 128.0 / 255.0).abs() < 1e-3);
        }
    }

    #[test]
    fn capture_with_garbage_bytes_fails() {
        let err = AlphaMask::from_capture(b"not an image", 48, "small").unwrap_err();
        assert!(err.to_string().contains("small"));
    }
}
