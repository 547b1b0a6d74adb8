// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Summed-area table over a grayscale image. Backs both the adaptive threshold
// and the per-bubble window means.

use image::GrayImage;

/// Summed-area table with a zero-padded first row and column.
///
/// `table[y * (width + 1) + x]` holds the sum of all pixels in `[0, x) x [0, y)`.
#[derive(Debug, Clone)]
pub struct IntegralImage {
    table: Vec<u64>,
    width: u32,
    height: u32,
}

impl IntegralImage {
    pub fn new(gray: &GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        let stride = (width + 1) as usize;
        let mut table = vec![0u64; stride * (height + 1) as usize];

        for y in 0..height {
            let mut row_sum: u64 = 0;
            for x in 0..width {
                row_sum += gray.get_pixel(x, y).0[0] as u64;
                let idx = (y + 1) as usize * stride + (x + 1) as usize;
                let above = y as usize * stride + (x + 1) as usize;
                table[idx] = row_sum + table[above];
            }
        }

        Self {
            table,
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Sum over the half-open rectangle `[x0, x1) x [y0, y1)`, clamped to the
    /// image.
    pub fn sum(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> u64 {
        let stride = (self.width + 1) as usize;
        let x1 = x1.min(self.width) as usize;
        let y1 = y1.min(self.height) as usize;
        let x0 = (x0 as usize).min(x1);
        let y0 = (y0 as usize).min(y1);

        self.table[y1 * stride + x1] + self.table[y0 * stride + x0]
            - self.table[y0 * stride + x1]
            - self.table[y1 * stride + x0]
    }

    /// Mean over `[x0, x1) x [y0, y1)` after clamping; `None` if that leaves
    /// no pixels.
    pub fn rect_mean(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> Option<f64> {
        let x1c = x1.min(self.width);
        let y1c = y1.min(self.height);
        if x0 >= x1c || y0 >= y1c {
            return None;
        }
        let area = (x1c - x0) as f64 * (y1c - y0) as f64;
        Some(self.sum(x0, y0, x1c, y1c) as f64 / area)
    }

    /// Mean of the square neighbourhood of `radius` around `(cx, cy)`.
    pub fn region_mean(&self, cx: u32, cy: u32, radius: u32) -> f64 {
        let x0 = cx.saturating_sub(radius);
        let y0 = cy.saturating_sub(radius);
        let x1 = cx.saturating_add(radius).saturating_add(1);
        let y1 = cy.saturating_add(radius).saturating_add(1);
        self.rect_mean(x0, y0, x1, y1).unwrap_or(128.0)
    }
}
