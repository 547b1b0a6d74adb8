// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fill measurer: one scalar per bubble window, under exactly one metric per
// run.

use image::GrayImage;
use markscan_core::config::{FillMetric, MeasureConfig};
use markscan_core::BubbleLocation;
use tracing::{debug, instrument};

use crate::raster::IntegralImage;
use crate::scan::binarize::{adaptive_threshold, clean};

/// The answer zone prepared for window queries under one metric.
#[derive(Debug, Clone)]
pub struct MeasureSurface {
    metric: FillMetric,
    integral: IntegralImage,
}

impl MeasureSurface {
    pub fn metric(&self) -> FillMetric {
        self.metric
    }
}

#[derive(Debug, Clone)]
pub struct FillMeasurer {
    metric: FillMetric,
    block_radius: u32,
    threshold_offset: i32,
    morphology_cleanup: bool,
}

impl FillMeasurer {
    pub fn new(config: &MeasureConfig) -> Self {
        Self {
            metric: config.fill_metric,
            block_radius: config.block_radius,
            threshold_offset: config.threshold_offset,
            morphology_cleanup: config.morphology_cleanup,
        }
    }

    pub fn metric(&self) -> FillMetric {
        self.metric
    }

    /// Build the summed-area table the windows are read from: the binarized
    /// zone for foreground ratio, the raw intensities for mean darkness.
    #[instrument(skip_all, fields(metric = ?self.metric))]
    pub fn prepare(&self, zone: &GrayImage) -> MeasureSurface {
        let integral = match self.metric {
            FillMetric::ForegroundRatio => {
                let mut binary = adaptive_threshold(zone, self.block_radius, self.threshold_offset);
                if self.morphology_cleanup {
                    binary = clean(&binary);
                }
                IntegralImage::new(&binary)
            }
            FillMetric::MeanDarkness => IntegralImage::new(zone),
        };
        debug!(width = integral.width(), height = integral.height(), "Measure surface ready");
        MeasureSurface {
            metric: self.metric,
            integral,
        }
    }

    /// Fill signal of one bubble window.
    ///
    /// Foreground ratio is in `[0, 1]` (higher = marked); mean darkness is in
    /// `[0, 255]` (lower = marked). `None` when the window holds no pixels.
    pub fn measure(&self, surface: &MeasureSurface, bubble: &BubbleLocation) -> Option<f32> {
        let (half_w, half_h) = bubble.extent.half_extents();
        let (cx, cy) = (bubble.center.x, bubble.center.y);
        if ![cx, cy, half_w, half_h].iter().all(|v| v.is_finite()) {
            return None;
        }

        let x0 = (cx - half_w).floor().max(0.0) as u32;
        let y0 = (cy - half_h).floor().max(0.0) as u32;
        let x1 = (cx + half_w).ceil().max(0.0) as u32;
        let y1 = (cy + half_h).ceil().max(0.0) as u32;

        let mean = surface.integral.rect_mean(x0, y0, x1, y1)?;
        Some(match surface.metric {
            FillMetric::ForegroundRatio => (mean / 255.0) as f32,
            FillMetric::MeanDarkness => mean as f32,
        })
    }

    /// Signals for every option of one question, or `None` if any window is
    /// empty.
    pub fn measure_question(
        &self,
        surface: &MeasureSurface,
        bubbles: &[BubbleLocation],
    ) -> Option<Vec<f32>> {
        if bubbles.is_empty() {
            return None;
        }
        bubbles.iter().map(|b| self.measure(surface, b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut};
    use markscan_core::{BubbleExtent, OptionLabel, Point2};

    fn bubble(x: f32, y: f32, radius: f32) -> BubbleLocation {
        BubbleLocation {
            question: 1,
            option: OptionLabel::from_index(0).unwrap(),
            center: Point2::new(x, y),
            extent: BubbleExtent::Radius { radius },
        }
    }

    fn zone_with_marks() -> GrayImage {
        let mut zone = GrayImage::from_pixel(120, 60, Luma([245u8]));
        draw_filled_circle_mut(&mut zone, (30, 30), 12, Luma([15u8]));
        draw_hollow_circle_mut(&mut zone, (90, 30), 12, Luma([60u8]));
        zone
    }

    #[test]
    fn foreground_ratio_separates_filled_from_empty() {
        let measurer = FillMeasurer::new(&MeasureConfig::default());
        let surface = measurer.prepare(&zone_with_marks());
        let filled = measurer.measure(&surface, &bubble(30.0, 30.0, 9.0)).expect("filled");
        let empty = measurer.measure(&surface, &bubble(90.0, 30.0, 9.0)).expect("empty");
        assert!(filled > 0.5, "filled ratio {filled}");
        assert!(empty < 0.1, "empty ratio {empty}");
    }

    #[test]
    fn mean_darkness_is_lower_for_marks() {
        let config = MeasureConfig {
            fill_metric: FillMetric::MeanDarkness,
            ..MeasureConfig::default()
        };
        let measurer = FillMeasurer::new(&config);
        let surface = measurer.prepare(&zone_with_marks());
        assert_eq!(surface.metric(), FillMetric::MeanDarkness);
        let filled = measurer.measure(&surface, &bubble(30.0, 30.0, 9.0)).expect("filled");
        let empty = measurer.measure(&surface, &bubble(90.0, 30.0, 9.0)).expect("empty");
        assert!(filled < 60.0, "filled mean {filled}");
        assert!(empty > 220.0, "empty mean {empty}");
    }

    #[test]
    fn window_outside_zone_is_degenerate() {
        let measurer = FillMeasurer::new(&MeasureConfig::default());
        let surface = measurer.prepare(&zone_with_marks());
        assert!(measurer.measure(&surface, &bubble(500.0, 30.0, 9.0)).is_none());
        assert!(measurer.measure(&surface, &bubble(-40.0, 30.0, 9.0)).is_none());
        assert!(measurer.measure(&surface, &bubble(f32::NAN, 30.0, 9.0)).is_none());

        let bubbles = [bubble(30.0, 30.0, 9.0), bubble(500.0, 30.0, 9.0)];
        assert!(measurer.measure_question(&surface, &bubbles).is_none());
    }

    #[test]
    fn window_straddling_edge_is_clipped() {
        let measurer = FillMeasurer::new(&MeasureConfig::default());
        let surface = measurer.prepare(&zone_with_marks());
        assert!(measurer.measure(&surface, &bubble(118.0, 30.0, 9.0)).is_some());
    }
}
