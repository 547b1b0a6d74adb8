// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Markscan answer-sheet reader.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FailureKind, MarkscanError};

/// One-based question number, as printed on the sheet.
pub type QuestionId = u32;

/// An answer option, printed left-to-right as `A`, `B`, `C`, ...
///
/// Stored as a zero-based slot index; serialized as its letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct OptionLabel(u8);

impl OptionLabel {
    /// Upper bound on options per question (one per latin letter).
    pub const MAX_OPTIONS: usize = 26;

    pub fn from_index(index: usize) -> Option<Self> {
        (index < Self::MAX_OPTIONS).then_some(Self(index as u8))
    }

    /// Zero-based slot index (`A` = 0).
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn as_char(self) -> char {
        (b'A' + self.0) as char
    }

    /// The first `count` labels in printed order.
    pub fn all(count: usize) -> impl Iterator<Item = OptionLabel> {
        (0..count.min(Self::MAX_OPTIONS)).map(|i| Self(i as u8))
    }
}

impl fmt::Display for OptionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for OptionLabel {
    type Err = MarkscanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphabetic() => {
                Ok(Self(c.to_ascii_uppercase() as u8 - b'A'))
            }
            _ => Err(MarkscanError::Config(format!("invalid option label {s:?}"))),
        }
    }
}

impl From<OptionLabel> for String {
    fn from(label: OptionLabel) -> Self {
        label.to_string()
    }
}

impl TryFrom<String> for OptionLabel {
    type Error = MarkscanError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A 2-D point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl From<(f32, f32)> for Point2 {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

/// How far a bubble's measurement window reaches from its centre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "shape")]
pub enum BubbleExtent {
    /// Square window of side `2 * radius`.
    Radius { radius: f32 },
    /// Rectangular window.
    Box { half_width: f32, half_height: f32 },
}

impl BubbleExtent {
    /// Half-width and half-height of the measurement window.
    pub fn half_extents(&self) -> (f32, f32) {
        match *self {
            Self::Radius { radius } => (radius, radius),
            Self::Box {
                half_width,
                half_height,
            } => (half_width, half_height),
        }
    }
}

/// Where one option's bubble sits, in answer-zone coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BubbleLocation {
    pub question: QuestionId,
    pub option: OptionLabel,
    pub center: Point2,
    pub extent: BubbleExtent,
}

/// Terminal decision state for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// One option clearly dominates.
    Answered,
    /// Nothing is marked strongly enough.
    Blank,
    /// The top option does not dominate the rest; routed to human review.
    Ambiguous,
}

/// Per-verdict flags for review routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VerdictFlags {
    pub blank: bool,
    pub low_confidence: bool,
    pub multiple_marks: bool,
    /// No usable pixel data for at least one option window.
    pub degenerate: bool,
}

/// The decision for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerVerdict {
    pub question: QuestionId,
    pub outcome: Outcome,
    /// Best-effort option; `None` for blank questions.
    pub chosen_option: Option<OptionLabel>,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub flags: VerdictFlags,
    /// Raw fill signals, one per option in printed order.
    pub signals: Vec<f32>,
}

impl AnswerVerdict {
    /// A question whose windows held no usable pixels.
    pub fn degenerate(question: QuestionId) -> Self {
        Self {
            question,
            outcome: Outcome::Blank,
            chosen_option: None,
            confidence: 0.0,
            flags: VerdictFlags {
                blank: true,
                low_confidence: true,
                multiple_marks: false,
                degenerate: true,
            },
            signals: Vec::new(),
        }
    }

    pub fn is_answered(&self) -> bool {
        self.outcome == Outcome::Answered
    }

    /// Whether a human should double-check this question.
    pub fn needs_review(&self) -> bool {
        self.outcome == Outcome::Ambiguous
            || self.flags.low_confidence
            || self.flags.multiple_marks
    }
}

/// Which boundary strategy produced the normalized image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryKind {
    /// A true 4-vertex document contour.
    ContourQuad,
    /// Corners approximated from the convex hull of the largest contour.
    HullCorners,
    /// No boundary; the whole frame was resized.
    FullFrame,
}

/// Which policy produced the answer zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneSource {
    FixedFractions,
    RuledLines,
}

/// Why a run failed as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&MarkscanError> for FailureReason {
    fn from(err: &MarkscanError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Aggregate counts over a run's verdicts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultSummary {
    pub total: usize,
    pub answered: usize,
    pub ambiguous: usize,
    pub blank: usize,
    /// Mean confidence over verdicts that chose an option with non-zero
    /// confidence; 0 when there are none.
    pub average_confidence: f32,
}

impl ResultSummary {
    pub fn from_verdicts(verdicts: &[AnswerVerdict]) -> Self {
        let mut summary = Self {
            total: verdicts.len(),
            ..Self::default()
        };
        let mut confidence_sum = 0.0f32;
        let mut confidence_count = 0usize;

        for verdict in verdicts {
            match verdict.outcome {
                Outcome::Answered => summary.answered += 1,
                Outcome::Ambiguous => summary.ambiguous += 1,
                Outcome::Blank => summary.blank += 1,
            }
            if verdict.chosen_option.is_some() && verdict.confidence > 0.0 {
                confidence_sum += verdict.confidence;
                confidence_count += 1;
            }
        }

        if confidence_count > 0 {
            summary.average_confidence = confidence_sum / confidence_count as f32;
        }
        summary
    }
}

/// The externally visible output of one extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub success: bool,
    /// One verdict per question in the active range, ascending.
    pub verdicts: Vec<AnswerVerdict>,
    /// `true` only when a real document quadrilateral was found.
    pub zone_detected: bool,
    pub error: Option<FailureReason>,
    pub summary: ResultSummary,
    pub requires_review: bool,
    pub boundary: Option<BoundaryKind>,
    pub zone_source: Option<ZoneSource>,
}

impl ExtractionResult {
    /// Assemble a successful result and derive the summary and review flag.
    pub fn completed(
        verdicts: Vec<AnswerVerdict>,
        boundary: BoundaryKind,
        zone_source: ZoneSource,
        review_confidence: f32,
    ) -> Self {
        let summary = ResultSummary::from_verdicts(&verdicts);
        let zone_detected = boundary == BoundaryKind::ContourQuad;
        let requires_review = !zone_detected
            || verdicts.iter().any(AnswerVerdict::needs_review)
            || (summary.answered + summary.ambiguous > 0
                && summary.average_confidence < review_confidence);

        Self {
            success: true,
            verdicts,
            zone_detected,
            error: None,
            summary,
            requires_review,
            boundary: Some(boundary),
            zone_source: Some(zone_source),
        }
    }

    /// A whole-run structural failure.
    pub fn failed(err: &MarkscanError) -> Self {
        Self {
            success: false,
            verdicts: Vec::new(),
            zone_detected: false,
            error: Some(FailureReason::from(err)),
            summary: ResultSummary::default(),
            requires_review: true,
            boundary: None,
            zone_source: None,
        }
    }

    pub fn verdict(&self, question: QuestionId) -> Option<&AnswerVerdict> {
        self.verdicts.iter().find(|v| v.question == question)
    }

    /// Compact answer string, one character per question, `X` for no answer.
    pub fn answer_string(&self) -> String {
        self.verdicts
            .iter()
            .map(|v| match (v.outcome, v.chosen_option) {
                (Outcome::Answered, Some(label)) => label.as_char(),
                _ => 'X',
            })
            .collect()
    }
}
