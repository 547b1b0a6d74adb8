// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bubble detection: find the printed bubbles of an answer zone from their
// contours and rebuild the question grid from what was found.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use image::GrayImage;
use imageproc::contours::{BorderType, Contour, find_contours};
use imageproc::geometry::{arc_length, contour_area};
use markscan_core::config::{DetectConfig, GridConfig, MeasureConfig};
use markscan_core::error::{MarkscanError, Result};
use markscan_core::{BubbleExtent, BubbleLocation, OptionLabel, Point2, QuestionId};
use tracing::{debug, info, instrument};

use crate::locate::{BubbleLocator, sibling_radius};
use crate::scan::binarize::adaptive_threshold;

/// One round mark found in the zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedBubble {
    pub center: Point2,
    pub radius: f32,
}

/// Finds bubbles by contour shape and assigns them to questions.
///
/// Rows are formed from bubbles with nearly equal centre height. Every row
/// must hold `column_count * option_count` bubbles, read left to right in
/// groups of `option_count`, and there must be exactly `rows_per_column`
/// rows. Anything less is a failure: the grid is never guessed.
#[derive(Debug, Clone)]
pub struct BubbleDetector {
    column_count: u32,
    rows_per_column: u32,
    option_count: u32,
    block_radius: u32,
    threshold_offset: i32,
    window_fraction: f32,
    config: DetectConfig,
}

impl BubbleDetector {
    pub fn new(grid: &GridConfig, detect: &DetectConfig, measure: &MeasureConfig) -> Self {
        Self {
            column_count: grid.column_count,
            rows_per_column: grid.rows_per_column,
            option_count: grid.option_count,
            block_radius: measure.block_radius,
            threshold_offset: measure.threshold_offset,
            window_fraction: measure.window_fraction,
            config: detect.clone(),
        }
    }

    /// Round marks in `zone` whose size fits the configured grid pitch.
    pub fn find_bubbles(&self, zone: &GrayImage) -> Vec<DetectedBubble> {
        let (width, height) = zone.dimensions();
        let per_row = (self.column_count * self.option_count).max(1);
        let rows = self.rows_per_column.max(1);
        let pitch = (width as f32 / per_row as f32).min(height as f32 / rows as f32);
        let min_radius = self.config.min_radius_fraction * pitch;
        let max_radius = self.config.max_radius_fraction * pitch;

        let binary = adaptive_threshold(zone, self.block_radius, self.threshold_offset);
        let bubbles: Vec<DetectedBubble> = find_contours::<i32>(&binary)
            .iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .filter_map(|c| self.as_bubble(c, min_radius, max_radius))
            .collect();

        debug!(found = bubbles.len(), min_radius, max_radius, "Bubble contours filtered");
        bubbles
    }

    fn as_bubble(
        &self,
        contour: &Contour<i32>,
        min_radius: f32,
        max_radius: f32,
    ) -> Option<DetectedBubble> {
        let points = &contour.points;
        if points.len() < 5 {
            return None;
        }

        let (mut x0, mut y0, mut x1, mut y1) = (i32::MAX, i32::MAX, i32::MIN, i32::MIN);
        for p in points {
            x0 = x0.min(p.x);
            y0 = y0.min(p.y);
            x1 = x1.max(p.x);
            y1 = y1.max(p.y);
        }
        let radius = (x1 - x0 + 1).max(y1 - y0 + 1) as f32 / 2.0;
        if radius < min_radius || radius > max_radius {
            return None;
        }

        let area = contour_area(points);
        let perimeter = arc_length(points, true);
        if perimeter <= 0.0 {
            return None;
        }
        let circularity = 4.0 * PI * area / (perimeter * perimeter);
        if circularity < self.config.min_circularity as f64 {
            return None;
        }

        Some(DetectedBubble {
            center: Point2::new((x0 + x1) as f32 / 2.0, (y0 + y1) as f32 / 2.0),
            radius,
        })
    }

    /// Detect the bubbles of `zone` and number them column-major.
    #[instrument(skip_all, fields(width = zone.width(), height = zone.height()))]
    pub fn detect(&self, zone: &GrayImage) -> Result<DetectedLayout> {
        let mut bubbles = self.find_bubbles(zone);
        bubbles.sort_by(|a, b| a.center.y.total_cmp(&b.center.y));

        let tolerance = self.config.row_tolerance * zone.height() as f32;
        let mut rows: Vec<Vec<DetectedBubble>> = Vec::new();
        let mut previous_y = f32::NEG_INFINITY;
        for bubble in bubbles {
            match rows.last_mut() {
                Some(row) if bubble.center.y - previous_y < tolerance => row.push(bubble),
                _ => rows.push(vec![bubble]),
            }
            previous_y = bubble.center.y;
        }
        // Stray round specks form short rows of their own.
        let options = self.option_count as usize;
        rows.retain(|row| row.len() >= options);

        if rows.len() != self.rows_per_column as usize {
            return Err(MarkscanError::BubblesNotFound(format!(
                "found {} bubble row(s), expected {}",
                rows.len(),
                self.rows_per_column
            )));
        }

        let per_row = (self.column_count * self.option_count) as usize;
        let mut questions: BTreeMap<QuestionId, Vec<BubbleLocation>> = BTreeMap::new();
        for (row_index, row) in rows.iter_mut().enumerate() {
            if row.len() != per_row {
                return Err(MarkscanError::BubblesNotFound(format!(
                    "row {} holds {} bubble(s), expected {per_row}",
                    row_index + 1,
                    row.len()
                )));
            }
            row.sort_by(|a, b| a.center.x.total_cmp(&b.center.x));

            for (column, group) in row.chunks(options).enumerate() {
                let question = column as u32 * self.rows_per_column + row_index as u32 + 1;
                let centers: Vec<Point2> = group.iter().map(|b| b.center).collect();
                let located = group
                    .iter()
                    .zip(OptionLabel::all(options))
                    .map(|(bubble, option)| {
                        let radius = sibling_radius(bubble.center, &centers, self.window_fraction)
                            .map_or(bubble.radius, |r| r.min(bubble.radius));
                        BubbleLocation {
                            question,
                            option,
                            center: bubble.center,
                            extent: BubbleExtent::Radius { radius },
                        }
                    })
                    .collect();
                questions.insert(question, located);
            }
        }

        info!(questions = questions.len(), "Bubble grid detected");
        Ok(DetectedLayout { questions })
    }
}

/// Bubble positions detected in one answer zone.
#[derive(Debug, Clone, Default)]
pub struct DetectedLayout {
    questions: BTreeMap<QuestionId, Vec<BubbleLocation>>,
}

impl DetectedLayout {
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

impl BubbleLocator for DetectedLayout {
    fn locate(
        &self,
        question: QuestionId,
        _zone_size: (u32, u32),
    ) -> Result<Vec<BubbleLocation>> {
        self.questions.get(&question).cloned().ok_or_else(|| {
            MarkscanError::BubblesNotFound(format!("question {question} has no detected bubbles"))
        })
    }

    fn name(&self) -> &'static str {
        "detected"
    }
}
