//! Watermark geometry: size classification and bottom-right anchoring.
//!
//! Placement is a pure function of image dimensions. Large watermarks
//! (96x96, 64px margins) are used only when BOTH dimensions exceed 1024;
//! everything else, including exactly 1024x1024, gets the small variant
//! (48x48, 32px margins). The boundary is load-bearing: it selects which
//! calibrated mask is applied, and therefore the entire pixel transform.

/// Watermark size classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskSize {
    /// 48x48 watermark, 32px margin (images where either dimension <= 1024).
    Small,
    /// 96x96 watermark, 64px margin (images where both dimensions > 1024).
    Large,
}

impl MaskSize {
    /// Edge length of the square mask in pixels.
    #[must_use]
    pub fn edge(self) -> u32 {
        match self {
            MaskSize::Small => 48,
            MaskSize::Large => 96,
        }
    }

    /// Standard margin from the right and bottom image edges.
    #[must_use]
    pub fn margin(self) -> u32 {
        match self {
            MaskSize::Small => 32,
            MaskSize::Large => 64,
        }
    }
}

/// Margins and mask size for a watermark placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Distance from the right image edge to the mask, in pixels.
    pub margin_right: u32,
    /// Distance from the bottom image edge to the mask, in pixels.
    pub margin_bottom: u32,
    /// Edge length of the square mask.
    pub mask_size: u32,
}

impl Placement {
    /// Top-left corner of the watermark rectangle for the given image size.
    ///
    /// Saturates at (0,0) when the image is smaller than mask + margin.
    /// Downstream clipping then trims the mask's right/bottom edge, so the
    /// top-left sub-region is the one applied; a negative-offset anchor
    /// would select the bottom-right sub-region instead. Only reachable on
    /// images the file pipeline already skips as too small.
    #[must_use]
    pub fn position(&self, img_w: u32, img_h: u32) -> (u32, u32) {
        let x = img_w.saturating_sub(self.mask_size + self.margin_right);
        let y = img_h.saturating_sub(self.mask_size + self.margin_bottom);
        (x, y)
    }
}

/// Classify the watermark size for an image.
#[must_use]
pub fn size_for(width: u32, height: u32) -> MaskSize {
    if width > 1024 && height > 1024 {
        MaskSize::Large
    } else {
        MaskSize::Small
    }
}

/// Placement config for a given mask size.
#[must_use]
pub fn placement_for(size: MaskSize) -> Placement {
    Placement {
        margin_right: size.margin(),
        margin_bottom: size.margin(),
        mask_size: size.edge(),
    }
}

/// Select size and placement from image dimensions.
#[must_use]
pub fn select(width: u32, height: u32) -> Placement {
    placement_for(size_for(width, height))
}

/// An axis-aligned rectangle in image pixel coordinates.
///
/// Used for caller-specified custom watermark regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// X coordinate of the top-left corner.
    pub x: u32,
    /// Y coordinate of the top-left corner.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Region {
    /// Construct a region from corner and dimensions.
    #[must_use]
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_when_either_dim_at_or_below_1024() {
        assert_eq!(size_for(800, 600), MaskSize::Small);
        assert_eq!(size_for(1024, 1024), MaskSize::Small);
        assert_eq!(size_for(1024, 2000), MaskSize::Small);
        assert_eq!(size_for(2000, 1024), MaskSize::Small);
    }

    #[test]
    fn large_only_when_both_dims_exceed_1024() {
        assert_eq!(size_for(1025, 1025), MaskSize::Large);
        assert_eq!(size_for(4096, 4096), MaskSize::Large);
    }

    #[test]
    fn select_maps_size_to_margins() {
        let small = select(512, 512);
        assert_eq!(small.mask_size, 48);
        assert_eq!(small.margin_right, 32);
        assert_eq!(small.margin_bottom, 32);

        let large = select(2000, 1500);
        assert_eq!(large.mask_size, 96);
        assert_eq!(large.margin_right, 64);
        assert_eq!(large.margin_bottom, 64);
    }

    #[test]
    fn position_anchors_bottom_right() {
        let p = select(2000, 1500);
        assert_eq!(p.position(2000, 1500), (2000 - 64 - 96, 1500 - 64 - 96));

        let p = select(512, 512);
        assert_eq!(p.position(512, 512), (512 - 32 - 48, 512 - 32 - 48));
    }

    #[test]
    fn position_saturates_for_tiny_images() {
        let p = select(20, 20);
        assert_eq!(p.position(20, 20), (0, 0));
    }
}
