// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// markscan-core: core types, configuration, and error definitions shared by the
// extraction engine and its callers.

pub mod answer_key;
pub mod calibration;
pub mod config;
pub mod error;
pub mod types;

pub use answer_key::AnswerKey;
pub use calibration::CalibrationMap;
pub use config::ExtractionConfig;
pub use error::MarkscanError;
pub use types::*;
