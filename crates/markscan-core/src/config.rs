// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Extraction configuration. One explicit, versioned structure passed through
// the pipeline by value; every tunable lives here.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MarkscanError, Result};
use crate::types::{OptionLabel, QuestionId};

/// Current configuration schema version.
pub const CONFIG_VERSION: u32 = 1;

/// Complete set of knobs for one form template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub version: u32,
    pub normalize: NormalizeConfig,
    pub zone: ZoneConfig,
    pub grid: GridConfig,
    pub locator_strategy: LocatorStrategy,
    pub detect: DetectConfig,
    pub measure: MeasureConfig,
    pub decision: DecisionConfig,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            normalize: NormalizeConfig::default(),
            zone: ZoneConfig::default(),
            grid: GridConfig::default(),
            locator_strategy: LocatorStrategy::ComputedGrid,
            detect: DetectConfig::default(),
            measure: MeasureConfig::default(),
            decision: DecisionConfig::default(),
        }
    }
}

/// One step of the boundary fallback chain, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryStrategy {
    /// Simplify the largest contours to a 4-vertex polygon.
    ContourQuad,
    /// Pick the convex-hull points nearest the four image corners.
    HullCorners,
    /// Resize the whole frame; no boundary at all.
    FullFrame,
}

/// Geometric normalizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub canonical_width: u32,
    pub canonical_height: u32,
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Chebyshev radius used to thicken edges before contour search.
    pub edge_dilation: u8,
    /// How many of the largest contours are tried.
    pub max_candidates: usize,
    /// Polygon simplification tolerances, as fractions of the perimeter.
    pub approx_factors: Vec<f32>,
    /// Minimum polygon area relative to the whole image.
    pub min_area_fraction: f32,
    pub fallbacks: Vec<BoundaryStrategy>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            canonical_width: 800,
            canonical_height: 1100,
            blur_sigma: 1.4,
            canny_low: 50.0,
            canny_high: 150.0,
            edge_dilation: 2,
            max_candidates: 5,
            approx_factors: vec![0.02, 0.03, 0.04, 0.05, 0.01],
            min_area_fraction: 0.10,
            fallbacks: vec![BoundaryStrategy::ContourQuad, BoundaryStrategy::HullCorners],
        }
    }
}

/// How the answer zone is cut out of the normalized image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZonePolicy {
    Fixed,
    RuledLines,
}

/// Start/end fractions along each axis of the normalized image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneFractions {
    pub x_start: f32,
    pub x_end: f32,
    pub y_start: f32,
    pub y_end: f32,
}

impl Default for ZoneFractions {
    fn default() -> Self {
        Self {
            x_start: 0.04,
            x_end: 0.96,
            y_start: 0.38,
            y_end: 0.92,
        }
    }
}

/// Answer-zone extractor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    pub policy: ZonePolicy,
    pub fixed: ZoneFractions,
    /// Gray level below which a pixel counts as printed ink.
    pub line_threshold: u8,
    /// Minimum ruled-line length as a fraction of the page side.
    pub min_line_fraction: f32,
    pub min_area_fraction: f32,
    pub min_aspect: f32,
    pub max_aspect: f32,
    /// Candidate top edge must lie below this fraction of the page height.
    pub min_top_fraction: f32,
    pub min_height_fraction: f32,
    /// Inward padding applied to a detected region, in pixels.
    pub padding: u32,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            policy: ZonePolicy::Fixed,
            fixed: ZoneFractions::default(),
            line_threshold: 200,
            min_line_fraction: 0.125,
            min_area_fraction: 0.10,
            min_aspect: 0.5,
            max_aspect: 2.5,
            min_top_fraction: 0.20,
            min_height_fraction: 0.30,
            padding: 5,
        }
    }
}

/// Grid shape. Questions are numbered column-major: question
/// `column * rows_per_column + row + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub column_count: u32,
    pub rows_per_column: u32,
    pub option_count: u32,
    /// Size of the active range `1..=question_count`; defaults to the full grid.
    pub question_count: Option<u32>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            column_count: 5,
            rows_per_column: 10,
            option_count: 4,
            question_count: None,
        }
    }
}

impl GridConfig {
    /// Number of question slots, `None` if `column_count * rows_per_column`
    /// does not fit a question id.
    pub fn capacity(&self) -> Option<u32> {
        self.column_count.checked_mul(self.rows_per_column)
    }

    pub fn active_question_count(&self) -> u32 {
        self.question_count.or_else(|| self.capacity()).unwrap_or(0)
    }

    /// Active question ids, ascending.
    pub fn active_range(&self) -> std::ops::RangeInclusive<QuestionId> {
        1..=self.active_question_count()
    }

    /// Option labels in printed order.
    pub fn option_labels(&self) -> impl Iterator<Item = OptionLabel> {
        OptionLabel::all(self.option_count as usize)
    }
}

/// Bubble location strategy. Mutually exclusive per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    ComputedGrid,
    Calibrated,
    /// Find the printed bubbles in each answer zone and rebuild the grid
    /// from them.
    Detected,
}

/// Contour-based bubble detection settings. Radii are fractions of the
/// smaller of option pitch and row pitch of the configured grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    pub min_radius_fraction: f32,
    pub max_radius_fraction: f32,
    /// `4 * pi * area / perimeter^2`; 1 for a perfect circle.
    pub min_circularity: f32,
    /// Bubbles whose centres differ by less than this fraction of the zone
    /// height share a row.
    pub row_tolerance: f32,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            min_radius_fraction: 0.15,
            max_radius_fraction: 0.6,
            min_circularity: 0.6,
            row_tolerance: 0.03,
        }
    }
}

/// Fill measurement semantics. The two metrics point in opposite directions
/// (higher ratio = marked, lower intensity = marked) and are never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMetric {
    ForegroundRatio,
    MeanDarkness,
}

/// Fill measurer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureConfig {
    pub fill_metric: FillMetric,
    /// Radius of the local-mean neighbourhood for adaptive thresholding.
    pub block_radius: u32,
    /// Subtracted from the local mean before comparison.
    pub threshold_offset: i32,
    /// Close-then-open pass over the binarized zone.
    pub morphology_cleanup: bool,
    /// Window side relative to the smaller of option pitch and row pitch.
    pub window_fraction: f32,
    /// Window radius for calibrated bubbles that carry neither a radius nor
    /// a usable neighbour spacing.
    pub default_radius: f32,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            fill_metric: FillMetric::ForegroundRatio,
            block_radius: 7,
            threshold_offset: 3,
            morphology_cleanup: true,
            window_fraction: 0.5,
            default_radius: 10.0,
        }
    }
}

/// Decision thresholds. Fixed per template, never adapted per form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    // -- foreground-ratio semantics (signals in [0, 1]) --
    pub fill_threshold: f32,
    pub min_separation: f32,

    // -- mean-darkness semantics (signals in [0, 255]) --
    /// The darkest option must be below this intensity.
    pub darkness_threshold: f32,
    /// Lightest minus darkest must reach this before any mark is accepted.
    pub min_contrast: f32,
    /// Second-darkest minus darkest below this is ambiguous.
    pub min_darkness_gap: f32,
    /// Contrast at which confidence saturates to 1.
    pub contrast_scale: f32,

    /// Verdicts below this confidence are flagged for review.
    pub review_confidence: f32,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            fill_threshold: 0.20,
            min_separation: 0.10,
            darkness_threshold: 220.0,
            min_contrast: 5.0,
            min_darkness_gap: 5.0,
            contrast_scale: 80.0,
            review_confidence: 0.6,
        }
    }
}

impl ExtractionConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Reject configurations that would make the pipeline meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.version != CONFIG_VERSION {
            return Err(MarkscanError::Config(format!(
                "unsupported config version {} (expected {CONFIG_VERSION})",
                self.version
            )));
        }

        let n = &self.normalize;
        if n.canonical_width < 16 || n.canonical_height < 16 {
            return Err(MarkscanError::Config(format!(
                "canonical size {}x{} is too small",
                n.canonical_width, n.canonical_height
            )));
        }
        if n.fallbacks.is_empty() {
            return Err(MarkscanError::Config(
                "at least one boundary strategy is required".into(),
            ));
        }
        if !(n.canny_low >= 0.0 && n.canny_high.is_finite() && n.canny_low <= n.canny_high) {
            return Err(MarkscanError::Config(format!(
                "canny thresholds {}..{} must be non-negative and ordered low <= high",
                n.canny_low, n.canny_high
            )));
        }
        if n.max_candidates == 0 {
            return Err(MarkscanError::Config(
                "normalize.max_candidates must be positive".into(),
            ));
        }
        if n.approx_factors.is_empty() {
            return Err(MarkscanError::Config(
                "at least one approx factor is required".into(),
            ));
        }
        if n.approx_factors.iter().any(|f| !(*f > 0.0 && *f < 1.0)) {
            return Err(MarkscanError::Config(
                "approx_factors must lie in (0, 1)".into(),
            ));
        }
        check_unit("normalize.min_area_fraction", n.min_area_fraction)?;

        let f = &self.zone.fixed;
        check_span("zone.fixed x", f.x_start, f.x_end)?;
        check_span("zone.fixed y", f.y_start, f.y_end)?;
        if self.zone.min_aspect >= self.zone.max_aspect {
            return Err(MarkscanError::Config(
                "zone.min_aspect must be below zone.max_aspect".into(),
            ));
        }
        check_unit("zone.min_line_fraction", self.zone.min_line_fraction)?;

        let g = &self.grid;
        if g.column_count == 0 || g.rows_per_column == 0 {
            return Err(MarkscanError::Config("grid must have rows and columns".into()));
        }
        let capacity = g.capacity().ok_or_else(|| {
            MarkscanError::Config(format!(
                "grid {}x{} has more questions than fit a question id",
                g.column_count, g.rows_per_column
            ))
        })?;
        if g.option_count < 2 || g.option_count as usize > OptionLabel::MAX_OPTIONS {
            return Err(MarkscanError::Config(format!(
                "option_count {} outside 2..={}",
                g.option_count,
                OptionLabel::MAX_OPTIONS
            )));
        }
        if g.active_question_count() == 0 {
            return Err(MarkscanError::Config("question_count must be positive".into()));
        }
        if self.locator_strategy != LocatorStrategy::Calibrated
            && g.active_question_count() > capacity
        {
            return Err(MarkscanError::Config(format!(
                "question_count {} exceeds grid capacity {capacity}",
                g.active_question_count()
            )));
        }

        let t = &self.detect;
        if !(t.min_radius_fraction > 0.0 && t.min_radius_fraction < t.max_radius_fraction) {
            return Err(MarkscanError::Config(
                "detect radius fractions must satisfy 0 < min < max".into(),
            ));
        }
        check_unit("detect.min_circularity", t.min_circularity)?;
        if !(t.row_tolerance > 0.0 && t.row_tolerance <= 1.0) {
            return Err(MarkscanError::Config(
                "detect.row_tolerance must lie in (0, 1]".into(),
            ));
        }

        let m = &self.measure;
        if !(m.window_fraction > 0.0 && m.window_fraction <= 1.0) {
            return Err(MarkscanError::Config(
                "measure.window_fraction must lie in (0, 1]".into(),
            ));
        }
        if m.default_radius <= 0.0 {
            return Err(MarkscanError::Config(
                "measure.default_radius must be positive".into(),
            ));
        }

        let d = &self.decision;
        check_unit("decision.fill_threshold", d.fill_threshold)?;
        check_unit("decision.min_separation", d.min_separation)?;
        check_unit("decision.review_confidence", d.review_confidence)?;
        if !(0.0..=255.0).contains(&d.darkness_threshold)
            || d.min_contrast < 0.0
            || d.min_darkness_gap < 0.0
        {
            return Err(MarkscanError::Config(
                "darkness thresholds must lie in [0, 255]".into(),
            ));
        }
        if d.contrast_scale <= 0.0 {
            return Err(MarkscanError::Config(
                "decision.contrast_scale must be positive".into(),
            ));
        }

        Ok(())
    }
}

fn check_unit(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(MarkscanError::Config(format!("{name} = {value} outside [0, 1]")))
    }
}

fn check_span(name: &str, start: f32, end: f32) -> Result<()> {
    if (0.0..=1.0).contains(&start) && (0.0..=1.0).contains(&end) && start < end {
        Ok(())
    } else {
        Err(MarkscanError::Config(format!(
            "{name} span {start}..{end} is not an increasing range within [0, 1]"
        )))
    }
}
