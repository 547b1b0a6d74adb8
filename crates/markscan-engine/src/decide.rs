// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Answer decision engine. Each question goes from its measured signals to one
// terminal outcome (answered, blank, or ambiguous) with a confidence in [0, 1].
//
// Foreground-ratio signals: higher is more marked.
//   max < fill_threshold                  -> Blank,     confidence 1 - max / threshold
//   max - second < min_separation         -> Ambiguous, confidence <= 0.5
//   otherwise                             -> Answered,  confidence 0.5 + strength/4 + margin/4
//
// Mean-darkness signals: lower is more marked.
//   darkest >= darkness_threshold or
//   lightest - darkest < min_contrast     -> Blank
//   second - darkest < min_darkness_gap   -> Ambiguous
//   otherwise                             -> Answered,  confidence min(contrast / scale, 1)

use markscan_core::config::{DecisionConfig, FillMetric};
use markscan_core::{AnswerVerdict, OptionLabel, Outcome, QuestionId, VerdictFlags};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    metric: FillMetric,
    config: DecisionConfig,
}

/// Index of the best option and the runner-up value under an ordering.
struct Ranked {
    best: usize,
    best_value: f32,
    second_value: f32,
}

fn rank(signals: &[f32], better: impl Fn(f32, f32) -> bool, worst: f32) -> Ranked {
    let mut best = 0;
    for (i, &value) in signals.iter().enumerate().skip(1) {
        if better(value, signals[best]) {
            best = i;
        }
    }
    let second_value = signals
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != best)
        .map(|(_, v)| *v)
        .fold(worst, |acc, v| if better(v, acc) { v } else { acc });
    Ranked {
        best,
        best_value: signals[best],
        second_value,
    }
}

fn unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

impl DecisionEngine {
    pub fn new(metric: FillMetric, config: &DecisionConfig) -> Self {
        Self {
            metric,
            config: config.clone(),
        }
    }

    /// Decide one question from its per-option signals, in printed order.
    pub fn decide(&self, question: QuestionId, signals: Vec<f32>) -> AnswerVerdict {
        if signals.is_empty() || signals.iter().any(|s| !s.is_finite()) {
            return AnswerVerdict::degenerate(question);
        }

        let mut verdict = match self.metric {
            FillMetric::ForegroundRatio => self.decide_ratio(question, &signals),
            FillMetric::MeanDarkness => self.decide_darkness(question, &signals),
        };
        verdict.flags.low_confidence |= verdict.confidence < self.config.review_confidence;
        verdict.signals = signals;

        debug!(
            question,
            outcome = ?verdict.outcome,
            option = ?verdict.chosen_option.map(|o| o.as_char()),
            confidence = verdict.confidence,
            "Question decided"
        );
        verdict
    }

    fn decide_ratio(&self, question: QuestionId, signals: &[f32]) -> AnswerVerdict {
        let threshold = self.config.fill_threshold;
        let min_separation = self.config.min_separation;
        let ranked = rank(signals, |a, b| a > b, 0.0);
        let marked = signals.iter().filter(|s| **s >= threshold).count();

        if ranked.best_value < threshold {
            return blank(question, unit(1.0 - ranked.best_value / threshold));
        }

        let separation = ranked.best_value - ranked.second_value;
        if separation < min_separation {
            return ambiguous(
                question,
                ranked.best,
                0.5 * unit(separation / min_separation),
                marked > 1,
            );
        }

        let strength = if threshold < 1.0 {
            unit((ranked.best_value - threshold) / (1.0 - threshold))
        } else {
            1.0
        };
        let margin = if min_separation < 1.0 {
            unit((separation - min_separation) / (1.0 - min_separation))
        } else {
            1.0
        };
        answered(
            question,
            ranked.best,
            unit(0.5 + 0.25 * strength + 0.25 * margin),
            marked > 1,
        )
    }

    fn decide_darkness(&self, question: QuestionId, signals: &[f32]) -> AnswerVerdict {
        let cfg = &self.config;
        let ranked = rank(signals, |a, b| a < b, f32::INFINITY);
        let lightest = signals.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let contrast = lightest - ranked.best_value;
        let contrast_confidence = unit(contrast / cfg.contrast_scale);
        let marked = signals.iter().filter(|s| **s < cfg.darkness_threshold).count();

        if ranked.best_value >= cfg.darkness_threshold || contrast < cfg.min_contrast {
            return blank(question, unit(1.0 - contrast_confidence));
        }

        let gap = if ranked.second_value.is_finite() {
            ranked.second_value - ranked.best_value
        } else {
            contrast
        };
        if gap < cfg.min_darkness_gap {
            return ambiguous(
                question,
                ranked.best,
                0.5 * contrast_confidence * unit(gap / cfg.min_darkness_gap),
                marked > 1,
            );
        }

        answered(question, ranked.best, contrast_confidence, marked > 1)
    }
}

fn blank(question: QuestionId, confidence: f32) -> AnswerVerdict {
    AnswerVerdict {
        question,
        outcome: Outcome::Blank,
        chosen_option: None,
        confidence,
        flags: VerdictFlags {
            blank: true,
            ..VerdictFlags::default()
        },
        signals: Vec::new(),
    }
}

fn ambiguous(
    question: QuestionId,
    best: usize,
    confidence: f32,
    multiple_marks: bool,
) -> AnswerVerdict {
    AnswerVerdict {
        question,
        outcome: Outcome::Ambiguous,
        chosen_option: OptionLabel::from_index(best),
        confidence,
        flags: VerdictFlags {
            low_confidence: true,
            multiple_marks,
            ..VerdictFlags::default()
        },
        signals: Vec::new(),
    }
}

fn answered(
    question: QuestionId,
    best: usize,
    confidence: f32,
    multiple_marks: bool,
) -> AnswerVerdict {
    AnswerVerdict {
        question,
        outcome: Outcome::Answered,
        chosen_option: OptionLabel::from_index(best),
        confidence,
        flags: VerdictFlags {
            low_confidence: multiple_marks,
            multiple_marks,
            ..VerdictFlags::default()
        },
        signals: Vec::new(),
    }
}
