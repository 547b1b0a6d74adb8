// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline orchestrator: normalize, crop the answer zone, locate, measure, and
// decide, then assemble the result record.
//
// An `Extractor` is immutable once built and holds no per-run state, so one
// instance (and its calibration map) can serve any number of threads.

use std::path::Path;
use std::sync::Arc;
use std::thread;

use markscan_core::config::{ExtractionConfig, LocatorStrategy};
use markscan_core::error::{MarkscanError, Result};
use markscan_core::{AnswerVerdict, CalibrationMap, ExtractionResult};
use tracing::{debug, info, instrument, warn};

use crate::decide::DecisionEngine;
use crate::detect::BubbleDetector;
use crate::locate::{BubbleLocator, CalibratedLocator, ComputedGridLocator};
use crate::measure::FillMeasurer;
use crate::raster::RawImage;
use crate::scan::{Normalizer, ZoneExtractor};

/// Where bubble positions come from: fixed for every image, or detected
/// afresh in each answer zone.
enum LocatorSource {
    Fixed(Box<dyn BubbleLocator>),
    Detected(BubbleDetector),
}

impl LocatorSource {
    fn name(&self) -> &'static str {
        match self {
            Self::Fixed(locator) => locator.name(),
            Self::Detected(_) => "detected",
        }
    }
}

pub struct Extractor {
    config: ExtractionConfig,
    locator: LocatorSource,
    measurer: FillMeasurer,
    decider: DecisionEngine,
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("locator", &self.locator.name())
            .field("config", &self.config)
            .finish()
    }
}

impl Extractor {
    // -- Construction ---------------------------------------------------------

    /// Build a computed-grid or bubble-detecting extractor.
    pub fn new(config: ExtractionConfig) -> Result<Self> {
        config.validate()?;
        let locator = match config.locator_strategy {
            LocatorStrategy::ComputedGrid => LocatorSource::Fixed(Box::new(
                ComputedGridLocator::new(&config.grid, &config.measure),
            )),
            LocatorStrategy::Detected => LocatorSource::Detected(BubbleDetector::new(
                &config.grid,
                &config.detect,
                &config.measure,
            )),
            LocatorStrategy::Calibrated => {
                return Err(MarkscanError::Config(
                    "the calibrated strategy needs a calibration map; \
                     use Extractor::with_calibration"
                        .into(),
                ));
            }
        };
        Ok(Self::assemble(config, locator))
    }

    /// Build a calibrated extractor. The map is checked against the active
    /// question range here, before any image is seen.
    pub fn with_calibration(config: ExtractionConfig, map: Arc<CalibrationMap>) -> Result<Self> {
        config.validate()?;
        if config.locator_strategy != LocatorStrategy::Calibrated {
            return Err(MarkscanError::Config(
                "a calibration map was supplied but locator_strategy is not calibrated".into(),
            ));
        }
        let locator = CalibratedLocator::new(
            map,
            config.grid.active_range(),
            &config.grid,
            &config.measure,
        )?;
        Ok(Self::assemble(config, LocatorSource::Fixed(Box::new(locator))))
    }

    fn assemble(config: ExtractionConfig, locator: LocatorSource) -> Self {
        info!(
            locator = locator.name(),
            metric = ?config.measure.fill_metric,
            questions = config.grid.active_question_count(),
            "Extractor ready"
        );
        Self {
            measurer: FillMeasurer::new(&config.measure),
            decider: DecisionEngine::new(config.measure.fill_metric, &config.decision),
            locator,
            config,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    // -- Extraction -----------------------------------------------------------

    /// Run the full pipeline, surfacing whole-run failures as errors.
    #[instrument(skip_all, fields(width = raw.width(), height = raw.height()))]
    pub fn try_extract(&self, raw: &RawImage) -> Result<ExtractionResult> {
        let normalized = Normalizer::new(&self.config.normalize).normalize(raw)?;
        let zone = ZoneExtractor::new(&self.config.zone).extract(&normalized.gray)?;
        let detected;
        let locator: &dyn BubbleLocator = match &self.locator {
            LocatorSource::Fixed(locator) => &**locator,
            LocatorSource::Detected(detector) => {
                detected = detector.detect(&zone.image)?;
                &detected
            }
        };
        let surface = self.measurer.prepare(&zone.image);

        let mut verdicts: Vec<AnswerVerdict> = Vec::new();
        for question in self.config.grid.active_range() {
            let bubbles = locator.locate(question, zone.dimensions())?;
            let verdict = match self.measurer.measure_question(&surface, &bubbles) {
                Some(signals) => self.decider.decide(question, signals),
                None => {
                    warn!(question, "Bubble window outside the answer zone; left blank");
                    AnswerVerdict::degenerate(question)
                }
            };
            verdicts.push(verdict);
        }

        let result = ExtractionResult::completed(
            verdicts,
            normalized.boundary,
            zone.source,
            self.config.decision.review_confidence,
        );
        info!(
            answered = result.summary.answered,
            ambiguous = result.summary.ambiguous,
            blank = result.summary.blank,
            average_confidence = result.summary.average_confidence,
            zone_detected = result.zone_detected,
            requires_review = result.requires_review,
            "Extraction complete"
        );
        Ok(result)
    }

    /// Run the full pipeline; a whole-run failure becomes a failed result
    /// carrying its reason.
    pub fn extract(&self, raw: &RawImage) -> ExtractionResult {
        self.try_extract(raw).unwrap_or_else(|err| {
            warn!(%err, kind = ?err.kind(), "Extraction failed");
            ExtractionResult::failed(&err)
        })
    }

    /// Decode an image file and extract it.
    pub fn extract_path(&self, path: impl AsRef<Path>) -> ExtractionResult {
        match RawImage::open(path) {
            Ok(raw) => self.extract(&raw),
            Err(err) => {
                warn!(%err, "Answer sheet could not be read");
                ExtractionResult::failed(&err)
            }
        }
    }

    /// Extract many images in parallel, one image per worker. Results are in
    /// input order.
    #[instrument(skip_all, fields(images = images.len()))]
    pub fn extract_batch(&self, images: &[RawImage]) -> Vec<ExtractionResult> {
        let workers = thread::available_parallelism().map_or(1, |n| n.get()).max(1);
        debug!(workers, "Starting batch extraction");

        let mut results = Vec::with_capacity(images.len());
        for chunk in images.chunks(workers) {
            thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|raw| scope.spawn(move || self.extract(raw)))
                    .collect();
                for handle in handles {
                    results.push(handle.join().unwrap_or_else(|_| {
                        ExtractionResult::failed(&MarkscanError::Internal(
                            "extraction worker panicked".into(),
                        ))
                    }));
                }
            });
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use markscan_core::calibration::CalibrationPoint;
    use markscan_core::config::{BoundaryStrategy, FillMetric};
    use markscan_core::error::FailureKind;
    use markscan_core::{BoundaryKind, OptionLabel, Outcome, ZoneSource};

    use crate::testing::{SheetBuilder, photographed, skewed_photo};

    fn answers() -> Vec<Option<usize>> {
        // q1..q50: a fixed, varied pattern with a few blanks.
        (0..50)
            .map(|i| if i % 7 == 3 { None } else { Some((i * 3 + i / 4) % 4) })
            .collect()
    }

    fn letters(answers: &[Option<usize>]) -> String {
        answers
            .iter()
            .map(|a| a.and_then(OptionLabel::from_index).map_or('X', |l| l.as_char()))
            .collect()
    }

    #[test]
    fn reads_a_photographed_sheet() {
        let expected = answers();
        let photo = photographed(&SheetBuilder::new().answers(&expected).render());

        let extractor = Extractor::new(ExtractionConfig::default()).expect("extractor");
        let result = extractor.extract(&photo);

        assert!(result.success, "failed: {:?}", result.error);
        assert!(result.zone_detected);
        assert_eq!(result.boundary, Some(BoundaryKind::ContourQuad));
        assert_eq!(result.zone_source, Some(ZoneSource::FixedFractions));
        assert_eq!(result.verdicts.len(), 50);
        assert_eq!(result.answer_string(), letters(&expected));
        assert_eq!(result.summary.blank, expected.iter().filter(|a| a.is_none()).count());
    }

    #[test]
    fn reads_a_skewed_photo() {
        let expected = answers();
        let photo = skewed_photo(&SheetBuilder::new().answers(&expected).render());
        let result = Extractor::new(ExtractionConfig::default())
            .expect("extractor")
            .extract(&photo);
        assert!(result.success, "failed: {:?}", result.error);
        assert_eq!(result.answer_string(), letters(&expected));
    }

    #[test]
    fn extraction_is_idempotent() {
        let photo = photographed(&SheetBuilder::new().answers(&answers()).render());
        let extractor = Extractor::new(ExtractionConfig::default()).expect("extractor");
        let first = extractor.extract(&photo);
        let second = extractor.extract(&photo);
        assert_eq!(first, second);
    }

    #[test]
    fn blank_sheet_has_only_blank_verdicts() {
        let photo = photographed(&SheetBuilder::new().render());
        let result = Extractor::new(ExtractionConfig::default())
            .expect("extractor")
            .extract(&photo);
        assert!(result.success);
        assert!(result.verdicts.iter().all(|v| v.outcome == Outcome::Blank));
        assert_eq!(result.summary.average_confidence, 0.0);
        assert_eq!(result.answer_string(), "X".repeat(50));
    }

    #[test]
    fn double_mark_is_ambiguous() {
        let mut expected = answers();
        expected[4] = Some(1);
        let sheet = SheetBuilder::new().answers(&expected).extra_mark(5, 3);
        let photo = photographed(&sheet.render());
        let result = Extractor::new(ExtractionConfig::default())
            .expect("extractor")
            .extract(&photo);
        let q5 = result.verdict(5).expect("q5");
        assert_eq!(q5.outcome, Outcome::Ambiguous);
        assert!(q5.flags.multiple_marks);
        assert!(result.requires_review);
    }

    #[test]
    fn mean_darkness_reads_the_same_sheet() {
        let expected = answers();
        let photo = photographed(&SheetBuilder::new().answers(&expected).render());
        let mut config = ExtractionConfig::default();
        config.measure.fill_metric = FillMetric::MeanDarkness;
        let result = Extractor::new(config).expect("extractor").extract(&photo);
        assert_eq!(result.answer_string(), letters(&expected));
    }

    #[test]
    fn question_count_limits_the_range() {
        let mut config = ExtractionConfig::default();
        config.grid.question_count = Some(12);
        let photo = photographed(&SheetBuilder::new().answers(&answers()).render());
        let result = Extractor::new(config).expect("extractor").extract(&photo);
        assert_eq!(result.verdicts.len(), 12);
        assert_eq!(result.verdicts.last().map(|v| v.question), Some(12));
    }

    #[test]
    fn calibrated_mode_reads_the_sheet() {
        let expected = answers();
        let builder = SheetBuilder::new().answers(&expected);
        let photo = photographed(&builder.render());

        let mut map = CalibrationMap::new();
        for question in 1..=50 {
            for option in OptionLabel::all(4) {
                let (x, y) = builder.zone_center(question, option.index());
                map.insert(question, option, CalibrationPoint::new(x, y).with_radius(9.0));
            }
        }

        let mut config = ExtractionConfig::default();
        config.locator_strategy = LocatorStrategy::Calibrated;
        let extractor = Extractor::with_calibration(config, Arc::new(map)).expect("extractor");
        let result = extractor.extract(&photo);
        assert!(result.success, "failed: {:?}", result.error);
        assert_eq!(result.answer_string(), letters(&expected));
    }

    #[test]
    fn incomplete_calibration_fails_before_any_image() {
        let mut map = CalibrationMap::new();
        for question in 1..=10 {
            for option in OptionLabel::all(4) {
                if question == 7 && option.as_char() == 'D' {
                    continue;
                }
                map.insert(question, option, CalibrationPoint::new(10.0, 10.0 * question as f32));
            }
        }
        let mut config = ExtractionConfig::default();
        config.locator_strategy = LocatorStrategy::Calibrated;
        config.grid.question_count = Some(10);

        let err = Extractor::with_calibration(config, Arc::new(map)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::CalibrationIncomplete);
        assert!(err.to_string().contains("question 7"));
    }

    #[test]
    fn strategy_mismatch_is_a_config_error() {
        let mut config = ExtractionConfig::default();
        config.locator_strategy = LocatorStrategy::Calibrated;
        assert!(matches!(Extractor::new(config), Err(MarkscanError::Config(_))));

        let empty = Arc::new(CalibrationMap::new());
        let err = Extractor::with_calibration(ExtractionConfig::default(), empty).unwrap_err();
        assert!(matches!(err, MarkscanError::Config(_)));
    }

    #[test]
    fn window_outside_zone_is_degenerate_not_fatal() {
        let expected = answers();
        let builder = SheetBuilder::new().answers(&expected);
        let photo = photographed(&builder.render());

        let mut map = CalibrationMap::new();
        for question in 1..=50 {
            for option in OptionLabel::all(4) {
                let (x, y) = if question == 7 {
                    (5000.0, 5000.0)
                } else {
                    builder.zone_center(question, option.index())
                };
                map.insert(question, option, CalibrationPoint::new(x, y).with_radius(9.0));
            }
        }

        let mut config = ExtractionConfig::default();
        config.locator_strategy = LocatorStrategy::Calibrated;
        let extractor = Extractor::with_calibration(config, Arc::new(map)).expect("extractor");
        let result = extractor.extract(&photo);

        assert!(result.success, "failed: {:?}", result.error);
        assert_eq!(result.verdicts.len(), 50);
        let q7 = result.verdict(7).expect("q7");
        assert!(q7.flags.degenerate);
        assert_eq!(q7.confidence, 0.0);
        assert_eq!(q7.outcome, Outcome::Blank);

        let mut read = expected.clone();
        read[6] = None;
        assert_eq!(result.answer_string(), letters(&read));
    }

    #[test]
    fn detected_mode_reads_the_sheet() {
        let expected = answers();
        let photo = photographed(&SheetBuilder::new().answers(&expected).render());

        let mut config = ExtractionConfig::default();
        config.locator_strategy = LocatorStrategy::Detected;
        let extractor = Extractor::new(config).expect("extractor");
        let result = extractor.extract(&photo);

        assert!(result.success, "failed: {:?}", result.error);
        assert_eq!(result.verdicts.len(), 50);
        assert_eq!(result.answer_string(), letters(&expected));
    }

    #[test]
    fn detected_mode_without_bubbles_fails() {
        let page = GrayImage::from_pixel(800, 1100, Luma([250u8]));
        let mut config = ExtractionConfig::default();
        config.locator_strategy = LocatorStrategy::Detected;
        let result = Extractor::new(config).expect("extractor").extract(&photographed(&page));

        assert!(!result.success);
        assert!(result.verdicts.is_empty());
        assert_eq!(result.error.map(|e| e.kind), Some(FailureKind::BubblesNotFound));
    }

    #[test]
    fn small_bright_patch_is_not_a_page() {
        let mut raw = GrayImage::from_pixel(1000, 1300, Luma([40u8]));
        for y in 600..620 {
            for x in 500..520 {
                raw.put_pixel(x, y, Luma([250u8]));
            }
        }
        let result = Extractor::new(ExtractionConfig::default())
            .expect("extractor")
            .extract(&RawImage::from_gray(raw));
        assert!(!result.success);
        assert_eq!(result.error.map(|e| e.kind), Some(FailureKind::BoundaryNotFound));
    }

    #[test]
    fn featureless_image_fails_with_reason() {
        let raw = RawImage::from_gray(GrayImage::from_pixel(300, 400, Luma([128u8])));
        let result = Extractor::new(ExtractionConfig::default())
            .expect("extractor")
            .extract(&raw);
        assert!(!result.success);
        assert!(!result.zone_detected);
        assert!(result.verdicts.is_empty());
        assert_eq!(result.error.map(|e| e.kind), Some(FailureKind::BoundaryNotFound));
    }

    #[test]
    fn full_frame_fallback_is_not_a_detected_zone() {
        let mut config = ExtractionConfig::default();
        config.normalize.fallbacks.push(BoundaryStrategy::FullFrame);
        let raw = RawImage::from_gray(GrayImage::from_pixel(300, 400, Luma([250u8])));
        let result = Extractor::new(config).expect("extractor").extract(&raw);
        assert!(result.success);
        assert!(!result.zone_detected);
        assert!(result.requires_review);
        assert_eq!(result.boundary, Some(BoundaryKind::FullFrame));
    }

    #[test]
    fn unreadable_path_is_an_input_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sheet.png");
        std::fs::write(&path, b"not a png").expect("write");
        let result = Extractor::new(ExtractionConfig::default())
            .expect("extractor")
            .extract_path(&path);
        assert_eq!(result.error.map(|e| e.kind), Some(FailureKind::Input));
    }

    #[test]
    fn batch_matches_sequential_runs() {
        let extractor = Extractor::new(ExtractionConfig::default()).expect("extractor");
        let sheets = vec![
            photographed(&SheetBuilder::new().answers(&answers()).render()),
            RawImage::from_gray(GrayImage::from_pixel(200, 200, Luma([90u8]))),
            photographed(&SheetBuilder::new().render()),
        ];

        let batch = extractor.extract_batch(&sheets);
        assert_eq!(batch.len(), 3);
        for (raw, result) in sheets.iter().zip(&batch) {
            assert_eq!(result, &extractor.extract(raw));
        }
        assert!(!batch[1].success);
    }

    #[test]
    fn extractor_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Extractor>();
        assert_send_sync::<RawImage>();
    }
}
