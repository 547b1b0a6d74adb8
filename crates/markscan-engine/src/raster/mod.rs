// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster module: captured input images and summed-area tables.

pub mod integral;
pub mod raw;

pub use integral::IntegralImage;
pub use raw::RawImage;
