// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Markscan.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for all Markscan operations.
#[derive(Debug, Error)]
pub enum MarkscanError {
    // -- Input --
    #[error("image could not be read: {0}")]
    Input(String),

    // -- Geometry --
    #[error("no document boundary found: {0}")]
    BoundaryNotFound(String),

    #[error("answer bubbles not found: {0}")]
    BubblesNotFound(String),

    // -- Calibration --
    #[error(
        "incomplete calibration: question {question} is missing option(s) {}",
        missing.join(", ")
    )]
    CalibrationIncomplete { question: u32, missing: Vec<String> },

    #[error("invalid calibration data: {0}")]
    Calibration(String),

    // -- Configuration --
    #[error("invalid configuration: {0}")]
    Config(String),

    // -- Storage / parsing --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Runtime --
    #[error("internal extraction failure: {0}")]
    Internal(String),
}

/// Coarse classification of a whole-run failure, carried in the result so a
/// caller can tell a structural failure apart from a blank sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The image could not be decoded or read. Retrying is pointless.
    Input,
    /// No plausible document quadrilateral, even after every fallback.
    BoundaryNotFound,
    /// Bubble detection found too few marks to rebuild the grid.
    BubblesNotFound,
    /// Calibrated mode with a map that does not cover the active range.
    CalibrationIncomplete,
    /// Any other configuration problem (bad config, bad calibration file).
    Configuration,
    /// A defect inside the extractor itself, such as a panicked worker.
    Internal,
}

impl MarkscanError {
    /// Classify this error for result reporting.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Input(_) => FailureKind::Input,
            Self::BoundaryNotFound(_) => FailureKind::BoundaryNotFound,
            Self::BubblesNotFound(_) => FailureKind::BubblesNotFound,
            Self::CalibrationIncomplete { .. } => FailureKind::CalibrationIncomplete,
            Self::Calibration(_) | Self::Config(_) | Self::Serialization(_) => {
                FailureKind::Configuration
            }
            Self::Io(_) => FailureKind::Input,
            Self::Internal(_) => FailureKind::Internal,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MarkscanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_calibration_message_lists_missing_labels() {
        let err = MarkscanError::CalibrationIncomplete {
            question: 7,
            missing: vec!["C".into(), "D".into()],
        };
        assert_eq!(
            err.to_string(),
            "incomplete calibration: question 7 is missing option(s) C, D"
        );
        assert_eq!(err.kind(), FailureKind::CalibrationIncomplete);
    }

    #[test]
    fn kinds_are_distinct_from_each_other() {
        assert_eq!(MarkscanError::Input("x".into()).kind(), FailureKind::Input);
        assert_eq!(
            MarkscanError::BoundaryNotFound("x".into()).kind(),
            FailureKind::BoundaryNotFound
        );
        assert_eq!(
            MarkscanError::Config("x".into()).kind(),
            FailureKind::Configuration
        );
        assert_eq!(
            MarkscanError::BubblesNotFound("x".into()).kind(),
            FailureKind::BubblesNotFound
        );
        assert_eq!(MarkscanError::Internal("x".into()).kind(), FailureKind::Internal);
    }

    #[test]
    fn internal_failure_serializes_with_its_own_kind() {
        let kind = MarkscanError::Internal("worker panicked".into()).kind();
        assert_eq!(serde_json::to_string(&kind).expect("serialize"), "\"internal\"");
    }
}
