// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bubble locators. Both strategies produce the same `BubbleLocation` shape in
// answer-zone coordinates, so measurement never knows which one ran.

use std::ops::RangeInclusive;
use std::sync::Arc;

use markscan_core::config::{GridConfig, MeasureConfig};
use markscan_core::error::{MarkscanError, Result};
use markscan_core::{
    BubbleExtent, BubbleLocation, CalibrationMap, OptionLabel, Point2, QuestionId,
};

/// Maps a question to the bubbles of its options, in printed order.
pub trait BubbleLocator: Send + Sync {
    /// Locate every option bubble of `question` in an answer zone of
    /// `zone_size` (width, height) pixels.
    fn locate(
        &self,
        question: QuestionId,
        zone_size: (u32, u32),
    ) -> Result<Vec<BubbleLocation>>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

// -- Computed grid ------------------------------------------------------------

/// Uniform row/column arithmetic over the answer zone.
///
/// Questions run down each column before moving right: question
/// `column * rows_per_column + row + 1`.
#[derive(Debug, Clone)]
pub struct ComputedGridLocator {
    column_count: u32,
    rows_per_column: u32,
    option_count: u32,
    window_fraction: f32,
}

impl ComputedGridLocator {
    pub fn new(grid: &GridConfig, measure: &MeasureConfig) -> Self {
        Self {
            column_count: grid.column_count,
            rows_per_column: grid.rows_per_column,
            option_count: grid.option_count,
            window_fraction: measure.window_fraction,
        }
    }

    /// `(column_index, row_index)` of a question, or `None` outside the grid.
    pub fn cell(&self, question: QuestionId) -> Option<(u32, u32)> {
        let capacity = self.column_count.checked_mul(self.rows_per_column)?;
        if question == 0 || question > capacity {
            return None;
        }
        let index = question - 1;
        Some((index / self.rows_per_column, index % self.rows_per_column))
    }
}

impl BubbleLocator for ComputedGridLocator {
    fn locate(
        &self,
        question: QuestionId,
        (width, height): (u32, u32),
    ) -> Result<Vec<BubbleLocation>> {
        let (column, row) = self.cell(question).ok_or_else(|| {
            MarkscanError::Config(format!(
                "question {question} is outside the {}x{} grid",
                self.column_count, self.rows_per_column
            ))
        })?;

        let column_width = width as f32 / self.column_count as f32;
        let row_height = height as f32 / self.rows_per_column as f32;
        let option_width = column_width / self.option_count as f32;
        let radius = self.window_fraction * option_width.min(row_height) / 2.0;
        let y = (row as f32 + 0.5) * row_height;

        Ok(OptionLabel::all(self.option_count as usize)
            .map(|option| BubbleLocation {
                question,
                option,
                center: Point2::new(
                    column as f32 * column_width + (option.index() as f32 + 0.5) * option_width,
                    y,
                ),
                extent: BubbleExtent::Radius { radius },
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "computed_grid"
    }
}

// -- Calibrated ---------------------------------------------------------------

/// Direct lookup in a human-calibrated coordinate map.
///
/// The map is validated against the active range on construction, so an
/// incomplete map never reaches a run.
#[derive(Debug, Clone)]
pub struct CalibratedLocator {
    map: Arc<CalibrationMap>,
    option_count: usize,
    window_fraction: f32,
    default_radius: f32,
}

impl CalibratedLocator {
    pub fn new(
        map: Arc<CalibrationMap>,
        range: RangeInclusive<QuestionId>,
        grid: &GridConfig,
        measure: &MeasureConfig,
    ) -> Result<Self> {
        let option_count = grid.option_count as usize;
        map.validate(range, option_count)?;
        Ok(Self {
            map,
            option_count,
            window_fraction: measure.window_fraction,
            default_radius: measure.default_radius,
        })
    }

    pub fn map(&self) -> &CalibrationMap {
        &self.map
    }

}

/// Window radius from the distance to the nearest sibling option, or `None`
/// when no sibling sits apart from `center`.
pub(crate) fn sibling_radius(
    center: Point2,
    siblings: &[Point2],
    window_fraction: f32,
) -> Option<f32> {
    siblings
        .iter()
        .map(|s| s.distance(&center))
        .filter(|d| *d > 0.0)
        .min_by(f32::total_cmp)
        .map(|spacing| window_fraction * spacing / 2.0)
}

impl BubbleLocator for CalibratedLocator {
    fn locate(
        &self,
        question: QuestionId,
        _zone_size: (u32, u32),
    ) -> Result<Vec<BubbleLocation>> {
        let labels: Vec<OptionLabel> = OptionLabel::all(self.option_count).collect();
        let points = self.map.question(question);

        let missing: Vec<String> = labels
            .iter()
            .filter(|label| points.is_none_or(|p| !p.contains_key(*label)))
            .map(|label| label.to_string())
            .collect();
        let points = match points {
            Some(points) if missing.is_empty() => points,
            _ => return Err(MarkscanError::CalibrationIncomplete { question, missing }),
        };

        let centers: Vec<Point2> = labels
            .iter()
            .filter_map(|label| points.get(label))
            .map(|p| Point2::new(p.x, p.y))
            .collect();

        Ok(labels
            .iter()
            .zip(&centers)
            .filter_map(|(label, center)| {
                let point = points.get(label)?;
                let radius = point.radius.unwrap_or_else(|| {
                    sibling_radius(*center, &centers, self.window_fraction)
                        .unwrap_or(self.default_radius)
                });
                Some(BubbleLocation {
                    question,
                    option: *label,
                    center: *center,
                    extent: BubbleExtent::Radius { radius },
                })
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "calibrated"
    }
}
