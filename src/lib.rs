//! Add, remove, and detect fixed-pattern translucent watermarks.
//!
//! A watermark is modeled as a calibrated per-pixel alpha mask over a
//! constant-intensity logo. The engine blends it in with standard "over"
//! compositing, removes it by inverting that equation in closed form, and
//! verifies its presence first with a three-stage statistical detector
//! (spatial NCC, gradient NCC, variance dampening) so unwatermarked images
//! are never corrupted.
//!
//! # Quick Start
//!
//! ```no_run
//! use alphamark::WatermarkEngine;
//!
//! let engine = WatermarkEngine::from_files(
//!     "calib_48.png".as_ref(),
//!     "calib_96.png".as_ref(),
//!     255.0,
//! )
//! .expect("failed to load calibration captures");
//!
//! let mut img = image::open("photo.jpg").unwrap().to_rgb8();
//! engine.remove(&mut img, None);
//! img.save("cleaned.jpg").unwrap();
//! ```
//!
//! # Detection
//!
//! ```no_run
//! use alphamark::WatermarkEngine;
//!
//! # let engine = WatermarkEngine::from_files("a".as_ref(), "b".as_ref(), 255.0).unwrap();
//! let img = image::open("photo.jpg").unwrap().to_rgb8();
//! let result = engine.detect(&img, None);
//! println!("detected: {}, confidence: {:.0}%", result.detected, result.confidence * 100.0);
//! ```

#![deny(missing_docs)]

pub mod blend;
pub mod detect;
mod engine;
pub mod error;
pub mod mask;
pub mod placement;

pub use detect::DetectionResult;
pub use engine::{
    default_output_path, is_supported_image, save_image, Mode, ProcessOptions, ProcessResult,
    WatermarkEngine,
};
pub use error::{Error, Result};
pub use mask::AlphaMask;
pub use placement::{MaskSize, Placement, Region};
