// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Binarization for mark measurement and ruled-line detection. Output images
// use 255 for ink (foreground) and 0 for paper.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};
use tracing::debug;

use crate::raster::IntegralImage;

const INK: u8 = 255;
const PAPER: u8 = 0;

/// Adaptive local-mean threshold.
///
/// A pixel is ink when it is darker than the mean of its `block_radius`
/// neighbourhood minus `offset`, so a lighting gradient across the page does
/// not shift the decision.
pub fn adaptive_threshold(gray: &GrayImage, block_radius: u32, offset: i32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let integral = IntegralImage::new(gray);
    let mut output = GrayImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let local_mean = integral.region_mean(x, y, block_radius);
            let threshold = (local_mean as i32 - offset).clamp(0, 255);
            let value = gray.get_pixel(x, y).0[0] as i32;
            let class = if value < threshold { INK } else { PAPER };
            output.put_pixel(x, y, Luma([class]));
        }
    }

    debug!(width, height, block_radius, offset, "Adaptive threshold applied");
    output
}

/// Global inverted threshold: pixels at or below `level` are ink.
pub fn ink_mask(gray: &GrayImage, level: u8) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([if gray.get_pixel(x, y).0[0] <= level { INK } else { PAPER }])
    })
}

/// 3x3 close then open: bridge pinholes inside marks, then drop speckle.
pub fn clean(binary: &GrayImage) -> GrayImage {
    open(&close(binary, Norm::LInf, 1), Norm::LInf, 1)
}

/// Keep only horizontal ink runs at least `min_len` pixels long.
///
/// Equivalent to a morphological opening with a `min_len x 1` line element.
pub fn horizontal_runs(binary: &GrayImage, min_len: u32) -> GrayImage {
    let (width, height) = binary.dimensions();
    let mut output = GrayImage::new(width, height);
    for y in 0..height {
        let mut x = 0;
        while x < width {
            if binary.get_pixel(x, y).0[0] == PAPER {
                x += 1;
                continue;
            }
            let start = x;
            while x < width && binary.get_pixel(x, y).0[0] != PAPER {
                x += 1;
            }
            if x - start >= min_len {
                for xi in start..x {
                    output.put_pixel(xi, y, Luma([INK]));
                }
            }
        }
    }
    output
}

/// Keep only vertical ink runs at least `min_len` pixels long.
pub fn vertical_runs(binary: &GrayImage, min_len: u32) -> GrayImage {
    let (width, height) = binary.dimensions();
    let mut output = GrayImage::new(width, height);
    for x in 0..width {
        let mut y = 0;
        while y < height {
            if binary.get_pixel(x, y).0[0] == PAPER {
                y += 1;
                continue;
            }
            let start = y;
            while y < height && binary.get_pixel(x, y).0[0] != PAPER {
                y += 1;
            }
            if y - start >= min_len {
                for yi in start..y {
                    output.put_pixel(x, yi, Luma([INK]));
                }
            }
        }
    }
    output
}

/// Pixel-wise union of two masks of equal size.
pub fn union(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        Luma([a.get_pixel(x, y).0[0].max(b.get_pixel(x, y).0[0])])
    })
}
