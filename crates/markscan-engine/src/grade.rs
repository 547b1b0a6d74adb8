// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Grading of an extraction result against an answer key.

use markscan_core::{AnswerKey, ExtractionResult, OptionLabel, Outcome, QuestionId};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One graded question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeItem {
    pub question: QuestionId,
    /// Only a confidently answered verdict counts as the student's answer.
    pub student_answer: Option<OptionLabel>,
    pub correct_answer: OptionLabel,
    pub is_correct: bool,
    pub points_awarded: f32,
    pub points_possible: f32,
    pub needs_review: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeReport {
    pub items: Vec<GradeItem>,
    pub correct: usize,
    pub incorrect: usize,
    pub blank: usize,
    pub total_score: f32,
    pub max_score: f32,
    /// `total_score / max_score * 100`, or 0 for a zero-point key.
    pub percentage: f32,
    pub passed: bool,
    /// Any item needs a human look, or the extraction itself did.
    pub requires_review: bool,
}

/// Grade every question of `key` against `result`.
///
/// Ambiguous and blank verdicts earn nothing. A key question with no verdict
/// at all (outside the extracted range, or a failed run) is graded blank and
/// marked for review.
pub fn grade(result: &ExtractionResult, key: &AnswerKey) -> GradeReport {
    let items: Vec<GradeItem> = key
        .answers
        .iter()
        .map(|(&question, entry)| {
            let verdict = result.verdict(question);
            let student_answer = verdict
                .filter(|v| v.outcome == Outcome::Answered)
                .and_then(|v| v.chosen_option);
            let is_correct = student_answer == Some(entry.answer);
            GradeItem {
                question,
                student_answer,
                correct_answer: entry.answer,
                is_correct,
                points_awarded: if is_correct { entry.points } else { 0.0 },
                points_possible: entry.points,
                needs_review: verdict.is_none_or(|v| v.needs_review()),
            }
        })
        .collect();

    let correct = items.iter().filter(|i| i.is_correct).count();
    let blank = items.iter().filter(|i| i.student_answer.is_none()).count();
    let incorrect = items.len() - correct - blank;
    let total_score: f32 = items.iter().map(|i| i.points_awarded).sum();
    let max_score = key.max_score();
    let percentage = if max_score > 0.0 {
        total_score / max_score * 100.0
    } else {
        0.0
    };
    let passed = percentage >= key.passing_percentage;
    let requires_review = result.requires_review || items.iter().any(|i| i.needs_review);

    info!(correct, incorrect, blank, total_score, max_score, percentage, passed, "Sheet graded");

    GradeReport {
        items,
        correct,
        incorrect,
        blank,
        total_score,
        max_score,
        percentage,
        passed,
        requires_review,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use markscan_core::{AnswerVerdict, BoundaryKind, VerdictFlags, ZoneSource};

    fn verdict(question: QuestionId, outcome: Outcome, option: Option<char>) -> AnswerVerdict {
        AnswerVerdict {
            question,
            outcome,
            chosen_option: option.map(|c| c.to_string().parse().unwrap()),
            confidence: 0.9,
            flags: VerdictFlags {
                blank: outcome == Outcome::Blank,
                low_confidence: outcome == Outcome::Ambiguous,
                ..VerdictFlags::default()
            },
            signals: Vec::new(),
        }
    }

    fn result() -> ExtractionResult {
        ExtractionResult::completed(
            vec![
                verdict(1, Outcome::Answered, Some('A')),
                verdict(2, Outcome::Answered, Some('C')),
                verdict(3, Outcome::Blank, None),
                verdict(4, Outcome::Ambiguous, Some('D')),
                verdict(5, Outcome::Answered, Some('B')),
            ],
            BoundaryKind::ContourQuad,
            ZoneSource::FixedFractions,
            0.6,
        )
    }

    #[test]
    fn counts_and_percentage() {
        let key = AnswerKey::from_letters("ABCDB").expect("key");
        let report = grade(&result(), &key);
        assert_eq!(report.correct, 2);
        assert_eq!(report.incorrect, 1);
        assert_eq!(report.blank, 2);
        assert_eq!(report.total_score, 2.0);
        assert_eq!(report.max_score, 5.0);
        assert!((report.percentage - 40.0).abs() < 1e-4);
        assert!(!report.passed);
    }

    #[test]
    fn ambiguous_answer_earns_nothing_but_is_flagged() {
        let key = AnswerKey::from_letters("ABCDB").expect("key");
        let report = grade(&result(), &key);
        let q4 = &report.items[3];
        assert_eq!(q4.question, 4);
        assert!(!q4.is_correct);
        assert!(q4.student_answer.is_none());
        assert!(q4.needs_review);
        assert!(report.requires_review);
    }

    #[test]
    fn weighted_points_and_missing_questions() {
        let key = AnswerKey::from_json(
            r#"{ "answers": { "1": { "answer": "A", "points": 3 }, "2": "C", "9": "A" },
                 "passing_percentage": 75 }"#,
        )
        .expect("key");
        let report = grade(&result(), &key);
        assert_eq!(report.total_score, 4.0);
        assert_eq!(report.max_score, 5.0);
        assert!(report.passed);
        let q9 = report.items.iter().find(|i| i.question == 9).expect("q9");
        assert!(q9.student_answer.is_none());
        assert!(q9.needs_review);
    }

    #[test]
    fn report_serializes_with_letter_answers() {
        let key = AnswerKey::from_letters("AB").expect("key");
        let report = grade(&result(), &key);
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["items"][0]["student_answer"], "A");
        assert_eq!(json["items"][1]["correct_answer"], "B");
        assert_eq!(json["correct"], 1);
    }
}
