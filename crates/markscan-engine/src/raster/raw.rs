// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw captured image, as handed to the pipeline. Decoding is optional: callers
// that already hold pixels wrap them directly.

use std::path::Path;

use image::{DynamicImage, GrayImage};
use markscan_core::error::{MarkscanError, Result};
use tracing::{debug, info, instrument};

/// An immutable captured image. The pipeline only ever reads it.
#[derive(Debug, Clone)]
pub struct RawImage {
    image: DynamicImage,
}

impl RawImage {
    // -- Construction ---------------------------------------------------------

    /// Decode an image file (JPEG, PNG, TIFF, ...).
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let image = image::open(path.as_ref()).map_err(|err| {
            MarkscanError::Input(format!(
                "failed to open {}: {}",
                path.as_ref().display(),
                err
            ))
        })?;
        info!(
            width = image.width(),
            height = image.height(),
            "Answer sheet loaded"
        );
        Ok(Self { image })
    }

    /// Decode an image held in memory.
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(data).map_err(|err| {
            MarkscanError::Input(format!("failed to decode answer sheet: {}", err))
        })?;
        debug!(
            width = image.width(),
            height = image.height(),
            "Answer sheet decoded from bytes"
        );
        Ok(Self { image })
    }

    /// Wrap an already-decoded image.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn from_gray(gray: GrayImage) -> Self {
        Self {
            image: DynamicImage::ImageLuma8(gray),
        }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    /// Single-channel intensity copy of the image.
    pub fn to_gray(&self) -> GrayImage {
        self.image.to_luma8()
    }
}

impl From<DynamicImage> for RawImage {
    fn from(image: DynamicImage) -> Self {
        Self::from_dynamic(image)
    }
}

impl From<GrayImage> for RawImage {
    fn from(gray: GrayImage) -> Self {
        Self::from_gray(gray)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};
    use markscan_core::error::FailureKind;

    #[test]
    fn garbage_bytes_are_an_input_error() {
        let err = RawImage::from_bytes(b"definitely not an image").unwrap_err();
        assert_eq!(err.kind(), FailureKind::Input);
    }

    #[test]
    fn missing_file_is_an_input_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = RawImage::open(dir.path().join("absent.png")).unwrap_err();
        assert!(matches!(err, MarkscanError::Input(_)));
    }

    #[test]
    fn open_decodes_png_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sheet.png");
        GrayImage::from_pixel(30, 20, Luma([200u8]))
            .save(&path)
            .expect("save png");

        let raw = RawImage::open(&path).expect("open");
        assert_eq!((raw.width(), raw.height()), (30, 20));
        assert_eq!(raw.to_gray().get_pixel(3, 3).0[0], 200);
    }

    #[test]
    fn colour_input_converts_to_intensity() {
        let raw = RawImage::from_dynamic(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            4,
            4,
            Rgb([255, 255, 255]),
        )));
        assert_eq!(raw.to_gray().get_pixel(0, 0).0[0], 255);
    }
}
