// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Calibration map: per-question bubble coordinates captured by a human
// calibrator against one reference blank form. Coordinates are in the
// answer-zone frame. The map is read-only to the pipeline and may be shared
// between concurrent runs.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{MarkscanError, Result};
use crate::types::{OptionLabel, QuestionId};

/// One calibrated bubble centre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub x: f32,
    pub y: f32,
    #[serde(default, alias = "r", skip_serializing_if = "Option::is_none")]
    pub radius: Option<f32>,
}

impl CalibrationPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, radius: None }
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = Some(radius);
        self
    }
}

type QuestionPoints = BTreeMap<OptionLabel, CalibrationPoint>;

/// Question id -> option label -> reference coordinate.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(into = "BTreeMap<QuestionId, QuestionPoints>")]
pub struct CalibrationMap {
    questions: BTreeMap<QuestionId, QuestionPoints>,
}

/// Accepted on-disk shapes for one question.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawQuestion {
    /// `{"A": {"x": .., "y": ..}, "B": ..}`
    Keyed(BTreeMap<String, CalibrationPoint>),
    /// `[{"x": .., "y": .., "w": .., "h": ..}, ..]` in left-to-right order.
    Boxes(Vec<RawBox>),
}

#[derive(Deserialize)]
struct RawBox {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
}

impl CalibrationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a calibration document. Completeness is checked separately by
    /// [`CalibrationMap::validate`], against the active question range.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn insert(&mut self, question: QuestionId, option: OptionLabel, point: CalibrationPoint) {
        self.questions.entry(question).or_default().insert(option, point);
    }

    pub fn get(&self, question: QuestionId, option: OptionLabel) -> Option<&CalibrationPoint> {
        self.questions.get(&question)?.get(&option)
    }

    /// All calibrated options of one question, in printed order.
    pub fn question(
        &self,
        question: QuestionId,
    ) -> Option<&BTreeMap<OptionLabel, CalibrationPoint>> {
        self.questions.get(&question)
    }

    pub fn question_ids(&self) -> impl Iterator<Item = QuestionId> + '_ {
        self.questions.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Check that every question in `range` carries exactly the first
    /// `option_count` labels.
    ///
    /// Questions are checked in ascending order, so the error names the
    /// lowest incomplete question and every label it lacks.
    pub fn validate(&self, range: RangeInclusive<QuestionId>, option_count: usize) -> Result<()> {
        for question in range {
            let points = self.questions.get(&question);
            let missing: Vec<String> = OptionLabel::all(option_count)
                .filter(|label| points.is_none_or(|p| !p.contains_key(label)))
                .map(String::from)
                .collect();
            if !missing.is_empty() {
                return Err(MarkscanError::CalibrationIncomplete { question, missing });
            }

            if let Some(extra) = points
                .into_iter()
                .flat_map(|p| p.keys())
                .find(|label| label.index() >= option_count)
            {
                return Err(MarkscanError::Calibration(format!(
                    "question {question} has option {extra} beyond the {option_count}-option layout"
                )));
            }
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for CalibrationMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = BTreeMap::<String, RawQuestion>::deserialize(deserializer)?;
        Self::from_raw(raw).map_err(serde::de::Error::custom)
    }
}

impl CalibrationMap {
    fn from_raw(raw: BTreeMap<String, RawQuestion>) -> Result<Self> {
        let mut map = Self::new();

        for (key, entry) in raw {
            let question: QuestionId = key
                .trim()
                .parse()
                .ok()
                .filter(|q| *q > 0)
                .ok_or_else(|| {
                    MarkscanError::Calibration(format!(
                        "question key {key:?} is not a positive integer"
                    ))
                })?;

            match entry {
                RawQuestion::Keyed(points) => {
                    for (label, point) in points {
                        let option: OptionLabel = label.parse().map_err(|_| {
                            MarkscanError::Calibration(format!(
                                "question {question}: unknown option label {label:?}"
                            ))
                        })?;
                        check_point(question, option, &point)?;
                        map.insert(question, option, point);
                    }
                }
                RawQuestion::Boxes(boxes) => {
                    if boxes.len() > OptionLabel::MAX_OPTIONS {
                        return Err(MarkscanError::Calibration(format!(
                            "question {question} lists {} boxes",
                            boxes.len()
                        )));
                    }
                    for (index, b) in boxes.into_iter().enumerate() {
                        let option = OptionLabel::from_index(index).ok_or_else(|| {
                            MarkscanError::Calibration(format!(
                                "question {question}: too many boxes"
                            ))
                        })?;
                        if !(b.w > 0.0 && b.h > 0.0) {
                            return Err(MarkscanError::Calibration(format!(
                                "question {question} option {option}: box must have positive size"
                            )));
                        }
                        let point = CalibrationPoint::new(b.x + b.w / 2.0, b.y + b.h / 2.0)
                            .with_radius(b.w.min(b.h) / 2.0);
                        check_point(question, option, &point)?;
                        map.insert(question, option, point);
                    }
                }
            }
        }

        Ok(map)
    }
}

impl From<CalibrationMap> for BTreeMap<QuestionId, QuestionPoints> {
    fn from(map: CalibrationMap) -> Self {
        map.questions
    }
}

fn check_point(question: QuestionId, option: OptionLabel, point: &CalibrationPoint) -> Result<()> {
    let coords_ok = point.x.is_finite() && point.y.is_finite() && point.x >= 0.0 && point.y >= 0.0;
    let radius_ok = point.radius.is_none_or(|r| r.is_finite() && r > 0.0);
    if coords_ok && radius_ok {
        Ok(())
    } else {
        Err(MarkscanError::Calibration(format!(
            "question {question} option {option}: invalid coordinate ({}, {})",
            point.x, point.y
        )))
    }
}
