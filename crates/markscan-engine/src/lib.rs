// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// markscan-engine: answer extraction for photographed bubble-sheet forms.
//
// The pipeline rectifies the captured sheet (contour quadrilateral, hull
// corners, or an opt-in full-frame resize), crops the answer zone, locates
// each option bubble (computed grid, calibration map, or contour detection),
// measures a fill signal per bubble, and decides answered / blank / ambiguous
// per question.

pub mod decide;
pub mod detect;
pub mod grade;
pub mod locate;
pub mod measure;
pub mod pipeline;
pub mod raster;
pub mod scan;

#[cfg(test)]
mod testing;

pub use decide::DecisionEngine;
pub use detect::{BubbleDetector, DetectedLayout};
pub use grade::{GradeItem, GradeReport, grade};
pub use locate::{BubbleLocator, CalibratedLocator, ComputedGridLocator};
pub use measure::{FillMeasurer, MeasureSurface};
pub use pipeline::Extractor;
pub use raster::RawImage;
pub use scan::{
    AnswerZone, NormalizedImage, Normalizer, Quadrilateral, ZoneExtractor, ZoneRect,
};
