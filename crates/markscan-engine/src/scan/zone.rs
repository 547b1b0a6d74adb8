// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Answer-zone extractor: cut the answer grid out of the normalized sheet,
// either by fixed fractions or from the block outlined by printed ruled lines.

use image::GrayImage;
use image::imageops;
use imageproc::contours::{BorderType, find_contours};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use markscan_core::ZoneSource;
use markscan_core::config::{ZoneConfig, ZoneFractions, ZonePolicy};
use markscan_core::error::{MarkscanError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::scan::binarize::{horizontal_runs, ink_mask, union, vertical_runs};

/// Axis-aligned rectangle in normalized-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ZoneRect {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// The cropped answer grid. All bubble coordinates are relative to `image`.
#[derive(Debug, Clone)]
pub struct AnswerZone {
    /// Where the crop sits in the normalized image.
    pub rect: ZoneRect,
    pub image: GrayImage,
    pub source: ZoneSource,
}

impl AnswerZone {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

pub struct ZoneExtractor<'a> {
    config: &'a ZoneConfig,
}

impl<'a> ZoneExtractor<'a> {
    pub fn new(config: &'a ZoneConfig) -> Self {
        Self { config }
    }

    #[instrument(skip_all, fields(policy = ?self.config.policy))]
    pub fn extract(&self, normalized: &GrayImage) -> Result<AnswerZone> {
        let (rect, source) = match self.config.policy {
            ZonePolicy::Fixed => (
                fixed_rect(&self.config.fixed, normalized)?,
                ZoneSource::FixedFractions,
            ),
            ZonePolicy::RuledLines => match self.ruled_rect(normalized) {
                Some(rect) => (rect, ZoneSource::RuledLines),
                None => {
                    warn!("No ruled answer block found; using the fixed zone");
                    (fixed_rect(&self.config.fixed, normalized)?, ZoneSource::FixedFractions)
                }
            },
        };

        info!(
            x = rect.x,
            y = rect.y,
            w = rect.width,
            h = rect.height,
            ?source,
            "Answer zone cropped"
        );
        let image = imageops::crop_imm(normalized, rect.x, rect.y, rect.width, rect.height);
        Ok(AnswerZone {
            rect,
            image: image.to_image(),
            source,
        })
    }

    /// The tallest qualifying region outlined by long printed strokes.
    fn ruled_rect(&self, normalized: &GrayImage) -> Option<ZoneRect> {
        let cfg = self.config;
        let (width, height) = normalized.dimensions();

        let ink = ink_mask(normalized, cfg.line_threshold);
        let min_h = ((width as f32 * cfg.min_line_fraction) as u32).max(1);
        let min_v = ((height as f32 * cfg.min_line_fraction) as u32).max(1);
        let lines = union(&horizontal_runs(&ink, min_h), &vertical_runs(&ink, min_v));
        let lines = dilate(&lines, Norm::LInf, 1);

        let page_area = width as f32 * height as f32;
        let mut regions: Vec<ZoneRect> = find_contours::<i32>(&lines)
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer)
            .filter_map(|c| bounding_rect(c.points.iter().map(|p| (p.x, p.y))))
            .filter(|r| {
                let aspect = r.width as f32 / r.height as f32;
                let keep = r.area() as f32 > cfg.min_area_fraction * page_area
                    && (cfg.min_aspect..=cfg.max_aspect).contains(&aspect)
                    && r.y as f32 > cfg.min_top_fraction * height as f32
                    && r.height as f32 > cfg.min_height_fraction * height as f32;
                debug!(?r, aspect, keep, "Ruled region candidate");
                keep
            })
            .collect();

        regions.sort_by(|a, b| b.height.cmp(&a.height).then(b.area().cmp(&a.area())));
        let best = regions.first()?;

        let pad = cfg.padding;
        if best.width <= 2 * pad || best.height <= 2 * pad {
            return None;
        }
        Some(ZoneRect {
            x: best.x + pad,
            y: best.y + pad,
            width: best.width - 2 * pad,
            height: best.height - 2 * pad,
        })
    }
}

fn fixed_rect(fractions: &ZoneFractions, normalized: &GrayImage) -> Result<ZoneRect> {
    let (width, height) = normalized.dimensions();
    let x0 = ((fractions.x_start * width as f32).round() as u32).min(width);
    let x1 = ((fractions.x_end * width as f32).round() as u32).min(width);
    let y0 = ((fractions.y_start * height as f32).round() as u32).min(height);
    let y1 = ((fractions.y_end * height as f32).round() as u32).min(height);

    if x1 <= x0 || y1 <= y0 {
        return Err(MarkscanError::Config(format!(
            "fixed answer zone is empty on a {width}x{height} image"
        )));
    }
    Ok(ZoneRect {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    })
}

fn bounding_rect(points: impl Iterator<Item = (i32, i32)>) -> Option<ZoneRect> {
    let mut bounds: Option<(i32, i32, i32, i32)> = None;
    for (x, y) in points {
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    let (x0, y0, x1, y1) = bounds?;
    if x0 < 0 || y0 < 0 {
        return None;
    }
    Some(ZoneRect {
        x: x0 as u32,
        y: y0 as u32,
        width: (x1 - x0 + 1) as u32,
        height: (y1 - y0 + 1) as u32,
    })
}
