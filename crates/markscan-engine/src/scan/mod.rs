// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sheet scanning: boundary geometry, perspective normalization, binarization,
// and answer-zone extraction.

pub mod binarize;
pub mod geometry;
pub mod normalize;
pub mod zone;

pub use geometry::Quadrilateral;
pub use normalize::{NormalizedImage, Normalizer};
pub use zone::{AnswerZone, ZoneExtractor, ZoneRect};
