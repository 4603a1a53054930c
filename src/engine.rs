//! Engine handle tying masks, placement, blending, and detection together.

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, RgbImage};
use tracing::{debug, info};

use crate::blend;
use crate::detect::{self, DetectionResult};
use crate::error::{Error, Result};
use crate::mask::AlphaMask;
use crate::placement::{self, MaskSize, Region};

/// Smallest custom region edge the compositor accepts.
const MIN_CUSTOM_REGION: u32 = 4;

/// Processing direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Blend the watermark into the image.
    Add,
    /// Invert the blend to recover the original pixels.
    Remove,
}

/// Options controlling file processing behavior.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Whether to add or remove the watermark.
    pub mode: Mode,
    /// Skip detection and process unconditionally.
    pub force: bool,
    /// Skip threshold compared against detection confidence (0.0-1.0).
    pub threshold: f32,
    /// Force a specific mask size instead of deriving it from dimensions.
    pub force_size: Option<MaskSize>,
    /// Suppress non-error output (CLI concern, carried through results).
    pub quiet: bool,
    /// Enable verbose output.
    pub verbose: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Remove,
            force: false,
            threshold: 0.25,
            force_size: None,
            quiet: false,
            verbose: false,
        }
    }
}

/// Result of processing a single image file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the processed file.
    pub path: PathBuf,
    /// Whether processing succeeded (a skip counts as success).
    pub success: bool,
    /// Whether the file was skipped (no watermark detected, or too small).
    pub skipped: bool,
    /// Detection confidence, when detection ran.
    pub confidence: f32,
    /// Human-readable status message.
    pub message: String,
}

/// The watermark engine: two calibrated alpha masks plus the logo intensity.
///
/// Build once from calibration captures and reuse across images; the masks
/// are immutable after construction, so a shared reference is safe to use
/// from multiple threads.
pub struct WatermarkEngine {
    mask_small: AlphaMask,
    mask_large: AlphaMask,
    logo_value: f32,
}

impl WatermarkEngine {
    /// Build an engine from in-memory calibration captures.
    ///
    /// `small` and `large` are encoded images (any format the codec stack
    /// decodes) of the watermark over a known backdrop, nominally 48x48 and
    /// 96x96; other resolutions are resampled with a warning. `logo_value`
    /// is the calibrated constant foreground intensity (255.0 for white).
    ///
    /// # Errors
    ///
    /// Returns [`Error::CalibrationDecode`] if either capture cannot be
    /// decoded. The engine cannot operate without both masks.
    pub fn from_bytes(small: &[u8], large: &[u8], logo_value: f32) -> Result<Self> {
        let mask_small = AlphaMask::from_capture(small, 48, "small")?;
        let mask_large = AlphaMask::from_capture(large, 96, "large")?;
        info!("calibrated alpha masks loaded (48x48, 96x96)");
        Ok(Self {
            mask_small,
            mask_large,
            logo_value,
        })
    }

    /// Build an engine from calibration capture files.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CalibrationRead`] if a file cannot be read, or
    /// [`Error::CalibrationDecode`] if its content cannot be decoded.
    pub fn from_files(small: &Path, large: &Path, logo_value: f32) -> Result<Self> {
        let read = |path: &Path| {
            std::fs::read(path).map_err(|source| Error::CalibrationRead {
                path: path.to_path_buf(),
                source,
            })
        };
        Self::from_bytes(&read(small)?, &read(large)?, logo_value)
    }

    /// Classify the watermark size for an image.
    ///
    /// Large (96x96, 64px margin) only when both dimensions exceed 1024;
    /// small (48x48, 32px margin) otherwise, including exactly 1024x1024.
    #[must_use]
    #[allow(clippy::unused_self)] // method on `self` for API consistency
    pub fn size_for(&self, width: u32, height: u32) -> MaskSize {
        placement::size_for(width, height)
    }

    fn mask(&self, size: MaskSize) -> &AlphaMask {
        match size {
            MaskSize::Small => &self.mask_small,
            MaskSize::Large => &self.mask_large,
        }
    }

    fn geometry(
        &self,
        width: u32,
        height: u32,
        force_size: Option<MaskSize>,
    ) -> (MaskSize, u32, u32) {
        let size = force_size.unwrap_or_else(|| placement::size_for(width, height));
        let (x, y) = placement::placement_for(size).position(width, height);
        (size, x, y)
    }

    /// Blend the watermark into an image in-place at the standard position.
    pub fn add(&self, image: &mut RgbImage, force_size: Option<MaskSize>) {
        let (size, x, y) = self.geometry(image.width(), image.height(), force_size);
        debug!("adding {}x{} watermark at ({x}, {y})", size.edge(), size.edge());
        blend::apply(image, self.mask(size), x, y, self.logo_value);
    }

    /// Remove the watermark from an image in-place at the standard position.
    pub fn remove(&self, image: &mut RgbImage, force_size: Option<MaskSize>) {
        let (size, x, y) = self.geometry(image.width(), image.height(), force_size);
        debug!("removing {}x{} watermark at ({x}, {y})", size.edge(), size.edge());
        blend::reverse(image, self.mask(size), x, y, self.logo_value);
    }

    /// Blend the watermark into a caller-chosen rectangle.
    ///
    /// Rectangles matching a calibrated size exactly (48x48 or 96x96) use
    /// the stored mask; everything else gets a mask resampled from the
    /// large capture.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegionTooSmall`] if either edge is under 4px.
    pub fn add_custom(&self, image: &mut RgbImage, region: Region) -> Result<()> {
        let mask = self.custom_mask(region)?;
        blend::apply(image, &mask, region.x, region.y, self.logo_value);
        Ok(())
    }

    /// Invert the blend over a caller-chosen rectangle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegionTooSmall`] if either edge is under 4px.
    pub fn remove_custom(&self, image: &mut RgbImage, region: Region) -> Result<()> {
        let mask = self.custom_mask(region)?;
        blend::reverse(image, &mask, region.x, region.y, self.logo_value);
        Ok(())
    }

    fn custom_mask(&self, region: Region) -> Result<std::borrow::Cow<'_, AlphaMask>> {
        use std::borrow::Cow;

        if region.width < MIN_CUSTOM_REGION || region.height < MIN_CUSTOM_REGION {
            return Err(Error::RegionTooSmall {
                width: region.width,
                height: region.height,
                min: MIN_CUSTOM_REGION,
            });
        }

        // Exact calibrated sizes skip resampling entirely.
        if region.width == 48 && region.height == 48 {
            return Ok(Cow::Borrowed(&self.mask_small));
        }
        if region.width == 96 && region.height == 96 {
            return Ok(Cow::Borrowed(&self.mask_large));
        }

        debug!(
            "resampling custom {}x{} mask for region at ({}, {})",
            region.width, region.height, region.x, region.y
        );
        Ok(Cow::Owned(self.resample_mask(region.width, region.height)))
    }

    /// Resample the large calibrated mask to an arbitrary resolution.
    ///
    /// The 96x96 capture is always the source, even for targets under
    /// 48x48: resolution beats source-size matching.
    #[must_use]
    pub fn resample_mask(&self, width: u32, height: u32) -> AlphaMask {
        self.mask_large.resample(width, height)
    }

    /// Detect whether the watermark is present at the expected position.
    #[must_use]
    pub fn detect(&self, image: &RgbImage, force_size: Option<MaskSize>) -> DetectionResult {
        let (size, x, y) = self.geometry(image.width(), image.height(), force_size);
        detect::detect(image, self.mask(size), size, x, y)
    }

    /// Process a single image file: load, optionally detect, blend, save.
    ///
    /// Detection gates removal only: in [`Mode::Remove`] with `force` off,
    /// a below-threshold confidence skips the edit and reports success with
    /// `skipped = true`, protecting unwatermarked images. Output is written
    /// only after in-memory processing completes.
    #[must_use]
    pub fn process_file(&self, input: &Path, output: &Path, opts: &ProcessOptions) -> ProcessResult {
        let mut result = ProcessResult {
            path: input.to_path_buf(),
            success: false,
            skipped: false,
            confidence: 0.0,
            message: String::new(),
        };

        let dyn_img = match image::open(input) {
            Ok(img) => img,
            Err(e) => {
                result.message = format!("Failed to load: {e}");
                return result;
            }
        };

        let mut img = dyn_img.to_rgb8();
        let (w, h) = (img.width(), img.height());
        info!("processing {} ({w}x{h})", input.display());

        let size = opts
            .force_size
            .unwrap_or_else(|| placement::size_for(w, h));
        if w < size.edge() + size.margin() || h < size.edge() + size.margin() {
            result.skipped = true;
            result.success = true;
            result.message = format!(
                "Image too small ({w}x{h}) for {0}x{0} watermark",
                size.edge()
            );
            return result;
        }

        if opts.mode == Mode::Remove && !opts.force {
            let detection = self.detect(&img, opts.force_size);
            result.confidence = detection.confidence;

            if !detection.detected && detection.confidence < opts.threshold {
                result.skipped = true;
                result.success = true;
                result.message = format!(
                    "No watermark detected ({:.0}% confidence, spatial={:.2}, grad={:.2}, var={:.2})",
                    detection.confidence * 100.0,
                    detection.spatial_score,
                    detection.gradient_score,
                    detection.variance_score,
                );
                return result;
            }
        }

        match opts.mode {
            Mode::Add => self.add(&mut img, opts.force_size),
            Mode::Remove => self.remove(&mut img, opts.force_size),
        }

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    result.message = format!("Failed to create output directory: {e}");
                    return result;
                }
            }
        }

        match save_image(&img, output) {
            Ok(()) => {
                result.success = true;
                result.message = match opts.mode {
                    Mode::Add => "Watermark added".to_string(),
                    Mode::Remove => "Watermark removed".to_string(),
                };
            }
            Err(e) => {
                result.message = format!("Failed to save: {e}");
            }
        }

        result
    }

    /// Process all supported images in a directory, one result per file.
    ///
    /// Files are processed in parallel when the `cli` feature is enabled.
    /// Individual failures never abort the batch.
    ///
    /// # Panics
    ///
    /// Panics if a directory entry has no filename (not possible for
    /// regular files).
    #[must_use]
    pub fn process_directory(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        opts: &ProcessOptions,
    ) -> Vec<ProcessResult> {
        let entries: Vec<_> = match std::fs::read_dir(input_dir) {
            Ok(rd) => rd
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
                .filter(|e| is_supported_image(e.path().as_path()))
                .collect(),
            Err(e) => {
                return vec![ProcessResult {
                    path: input_dir.to_path_buf(),
                    success: false,
                    skipped: false,
                    confidence: 0.0,
                    message: format!("Failed to read directory: {e}"),
                }];
            }
        };

        if !output_dir.exists() {
            if let Err(e) = std::fs::create_dir_all(output_dir) {
                return vec![ProcessResult {
                    path: output_dir.to_path_buf(),
                    success: false,
                    skipped: false,
                    confidence: 0.0,
                    message: format!("Failed to create output directory: {e}"),
                }];
            }
        }

        let run = |entry: &std::fs::DirEntry| {
            let input_path = entry.path();
            let filename = input_path.file_name().unwrap();
            let output_path = output_dir.join(filename);
            self.process_file(&input_path, &output_path, opts)
        };

        #[cfg(feature = "cli")]
        {
            use rayon::prelude::*;
            entries.par_iter().map(run).collect()
        }

        #[cfg(not(feature = "cli"))]
        {
            entries.iter().map(run).collect()
        }
    }
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

/// Save an RGB image with format-specific quality settings.
///
/// JPEG is written at quality 100; PNG, WebP, and BMP use the codec
/// defaults (PNG default compression, WebP lossless).
///
/// # Errors
///
/// Returns an error if the format is unsupported or writing fails.
pub fn save_image(img: &RgbImage, path: &Path) -> Result<()> {
    let format =
        ImageFormat::from_path(path).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

    let dyn_img = DynamicImage::ImageRgb8(img.clone());

    match format {
        ImageFormat::Jpeg => {
            let file = std::fs::File::create(path)?;
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(file, 100);
            encoder.encode_image(&dyn_img)?;
        }
        ImageFormat::Png | ImageFormat::WebP | ImageFormat::Bmp => {
            dyn_img.save(path)?;
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!("{format:?}")));
        }
    }

    Ok(())
}

/// Generate a default output path from an input path.
///
/// Example: `"photo.jpg"` becomes `"photo_cleaned.jpg"`.
#[must_use]
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let ext = input.extension().unwrap_or_default().to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{stem}_cleaned.{ext}"))
}
