// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Answer key for grading extracted sheets. Question numbers follow the same
// column-major convention as the sheet itself.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{MarkscanError, Result};
use crate::types::{OptionLabel, QuestionId};

fn default_points() -> f32 {
    1.0
}

fn default_passing_percentage() -> f32 {
    60.0
}

/// The correct option for one question and what it is worth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KeyEntry {
    pub answer: OptionLabel,
    pub points: f32,
}

impl KeyEntry {
    pub fn new(answer: OptionLabel) -> Self {
        Self {
            answer,
            points: default_points(),
        }
    }
}

/// Either `"B"` or `{"answer": "B", "points": 2}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Bare(OptionLabel),
    Full {
        answer: OptionLabel,
        #[serde(default = "default_points")]
        points: f32,
    },
}

impl<'de> Deserialize<'de> for KeyEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(match RawEntry::deserialize(deserializer)? {
            RawEntry::Bare(answer) => Self::new(answer),
            RawEntry::Full { answer, points } => Self { answer, points },
        })
    }
}

/// Correct answers keyed by question number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerKey {
    pub answers: BTreeMap<QuestionId, KeyEntry>,
    #[serde(default = "default_passing_percentage")]
    pub passing_percentage: f32,
}

impl AnswerKey {
    pub fn from_json(json: &str) -> Result<Self> {
        let key: Self = serde_json::from_str(json)?;
        key.validate()?;
        Ok(key)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Build a one-point-per-question key from a compact string such as
    /// `"ABDC"`, question 1 first.
    pub fn from_letters(letters: &str) -> Result<Self> {
        let answers = letters
            .chars()
            .filter(|c| !c.is_whitespace())
            .enumerate()
            .map(|(i, c)| {
                let label: OptionLabel = c.to_string().parse()?;
                Ok((i as QuestionId + 1, KeyEntry::new(label)))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        let key = Self {
            answers,
            passing_percentage: default_passing_percentage(),
        };
        key.validate()?;
        Ok(key)
    }

    pub fn get(&self, question: QuestionId) -> Option<&KeyEntry> {
        self.answers.get(&question)
    }

    pub fn max_score(&self) -> f32 {
        self.answers.values().map(|e| e.points).sum()
    }

    fn validate(&self) -> Result<()> {
        if self.answers.is_empty() {
            return Err(MarkscanError::Config("answer key is empty".into()));
        }
        if self.answers.contains_key(&0) {
            return Err(MarkscanError::Config("answer key questions start at 1".into()));
        }
        let bad_points = |e: &KeyEntry| !(e.points.is_finite() && e.points >= 0.0);
        if let Some((q, _)) = self.answers.iter().find(|(_, e)| bad_points(e)) {
            return Err(MarkscanError::Config(format!(
                "question {q} has negative or non-finite points"
            )));
        }
        if !(0.0..=100.0).contains(&self.passing_percentage) {
            return Err(MarkscanError::Config(format!(
                "passing percentage {} outside [0, 100]",
                self.passing_percentage
            )));
        }
        Ok(())
    }
}
