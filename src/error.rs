//! Error types for the alphamark crate.

/// Errors that can occur during engine construction and image processing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A calibration capture failed to decode. Fatal: the engine cannot be
    /// built without both captures.
    #[error("failed to decode {which} calibration capture: {source}")]
    CalibrationDecode {
        /// Which capture failed ("small" or "large").
        which: &'static str,
        /// Underlying codec error.
        source: image::ImageError,
    },

    /// A calibration capture file could not be read.
    #[error("failed to read calibration capture {path}: {source}")]
    CalibrationRead {
        /// Path of the unreadable file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A custom region is below the minimum usable edge length.
    #[error("region {width}x{height} is below the {min}px minimum")]
    RegionTooSmall {
        /// Requested region width in pixels.
        width: u32,
        /// Requested region height in pixels.
        height: u32,
        /// Minimum accepted edge length.
        min: u32,
    },

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The output image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred during image decode or encode.
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let io_err = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(io_err.to_string().contains("gone"));

        let unsupported = Error::UnsupportedFormat("tiff".to_string());
        assert!(unsupported.to_string().contains("tiff"));

        let too_small = Error::RegionTooSmall {
            width: 2,
            height: 3,
            min: 4,
        };
        let msg = too_small.to_string();
        assert!(msg.contains("2x3"));
        assert!(msg.contains("4px"));
    }
}
