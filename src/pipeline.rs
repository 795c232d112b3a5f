//! Pipeline orchestration
//!
//! This module provides the public API for stepflow. It runs a raw table
//! through every preparation stage, invokes the classifier and compiles
//! the report. Two degenerate endings are structured outcomes rather than
//! errors: too few samples for the active variant, and no valid data left
//! after exclusion.

use crate::aggregate::build_rollups;
use crate::artifacts::ArtifactStore;
use crate::builtin::ReferenceLoader;
use crate::cache::{lock_recover, ClassifierCache};
use crate::config::{ModelVariant, ProcessingConfig};
use crate::error::PipelineError;
use crate::model::{invoke, normalize_invocation, ClassifierLoader};
use crate::normalize::Normalizer;
use crate::report::{compile_report, SummaryReport};
use crate::resample::resample;
use crate::samplerate::effective_sample_rate;
use crate::schema::{map_columns, validate_axes};
use crate::summaries::{ReferenceSummarizer, Summarizer, SummarySet};
use crate::table::RawTable;
use crate::wear::{calculate_wear_stats, drop_edge_days, flag_low_wear_days, WearStats};

/// How one processing run ended.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// The full report plus the scratch directory of exports. Dropping the
    /// store deletes the files; persist copies first if they should live on.
    Completed {
        report: SummaryReport,
        artifacts: ArtifactStore,
    },
    /// Every row lost at least one axis value during exclusion, or nothing
    /// was left at all. Carries the merged wear statistics.
    NoValidData { wear_stats: WearStats },
    /// Fewer samples than the active variant can work with.
    InsufficientData {
        actual: usize,
        required: usize,
        variant: ModelVariant,
    },
}

impl ProcessOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ProcessOutcome::Completed { .. })
    }
}

/// Stateful processor holding the classifier cache and the summarizer.
///
/// One pipeline can serve many runs; classifiers load once per
/// (variant, device) pair.
pub struct StepPipeline {
    cache: ClassifierCache,
    summarizer: Box<dyn Summarizer>,
}

impl Default for StepPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl StepPipeline {
    /// A pipeline wired with the bundled classifier and summarizer.
    pub fn new() -> Self {
        Self::with_parts(Box::new(ReferenceLoader), Box::new(ReferenceSummarizer))
    }

    /// A pipeline with caller-supplied collaborators.
    pub fn with_parts(loader: Box<dyn ClassifierLoader>, summarizer: Box<dyn Summarizer>) -> Self {
        StepPipeline {
            cache: ClassifierCache::new(loader),
            summarizer,
        }
    }

    /// The classifier cache, for invalidation between runs.
    pub fn cache(&self) -> &ClassifierCache {
        &self.cache
    }

    /// Runs the full pipeline over one raw table.
    ///
    /// Pipeline stages:
    /// 1. Schema mapping and axis validation
    /// 2. Temporal normalization and boundary trimming
    /// 3. Sample-rate resolution
    /// 4. Conditional resampling for the active variant
    /// 5. Wear statistics, minimum-data guard, exclusions
    /// 6. Classifier invocation
    /// 7. Summaries, aggregation, artifacts, report
    pub fn process(
        &self,
        table: RawTable,
        config: &ProcessingConfig,
    ) -> Result<ProcessOutcome, PipelineError> {
        config.validate()?;

        // Stage 1: map columns onto the canonical layout and coerce axes
        let table = map_columns(table, &config.txyz)?;
        let axes = validate_axes(&table)?;

        // Stage 2: parse the time column, trim to configured boundaries
        let mut frame = Normalizer::index_frame(&table, axes, config)?;

        // Stage 3: resolve the sample rate
        let mut rate = effective_sample_rate(config.supplied_sample_rate(), frame.timestamps());
        log::debug!(
            "sample rate {} Hz ({}), {} rows",
            rate.hz,
            rate.source.as_str(),
            frame.len()
        );

        // Stage 4: regrid when the variant demands a fixed rate
        if let Some(target) = config.model.resample_target_hz() {
            if rate.hz != target {
                frame = resample(&frame, target)?;
                rate.hz = target;
            }
        }

        // Stage 5a: wear statistics over the prepared frame
        let mut wear_stats = calculate_wear_stats(&frame, rate.hz);

        // Stage 5b: minimum-data guard, before any exclusion
        if let Some(required) = config.model.min_samples() {
            if frame.len() < required {
                log::warn!(
                    "{} samples, {} model needs {}",
                    frame.len(),
                    config.model.as_str(),
                    required
                );
                return Ok(ProcessOutcome::InsufficientData {
                    actual: frame.len(),
                    required,
                    variant: config.model,
                });
            }
        }

        // Stage 5c: exclusions, then refreshed wear statistics on top
        let edge_policy = config.first_last_policy()?;
        let wear_floor = config.wear_below_seconds()?;
        if edge_policy.is_some() || wear_floor.is_some() {
            if let Some(policy) = edge_policy {
                frame = drop_edge_days(&frame, policy);
            }
            if let Some(min_seconds) = wear_floor {
                frame = flag_low_wear_days(frame, min_seconds, rate.hz);
            }
            wear_stats.merge(calculate_wear_stats(&frame, rate.hz));
        }

        // Stage 5d: nothing left to classify
        if frame.is_empty() || frame.all_rows_invalid() {
            log::warn!("no valid data after exclusion");
            return Ok(ProcessOutcome::NoValidData { wear_stats });
        }

        // Stage 6: load (or reuse) the classifier and predict
        let shared = self.cache.get_or_load(config.model, config.device)?;
        let mut classifier = lock_recover(&shared);
        let steptol = normalize_invocation(&classifier.tuning(), rate.hz, config.device).steptol;
        let prediction = invoke(&mut **classifier, &frame, &rate, config.device)?;
        drop(classifier);

        // Stage 7: exports, summaries, aggregation and the final report
        let mut artifacts = ArtifactStore::create()?;
        artifacts.write_steps(&prediction.steps)?;
        artifacts.write_step_times(&prediction.step_times)?;

        let thresholds = config.wear_thresholds();
        let summaries = SummarySet {
            enmo: self.summarizer.summarize_motion(&frame, &thresholds, false),
            enmo_adjusted: self.summarizer.summarize_motion(&frame, &thresholds, true),
            steps: self
                .summarizer
                .summarize_steps(&prediction.steps, steptol, &thresholds, false),
            steps_adjusted: self
                .summarizer
                .summarize_steps(&prediction.steps, steptol, &thresholds, true),
            cadence: self.summarizer.summarize_cadence(
                &prediction.steps,
                steptol,
                config.min_walk_per_day,
                &thresholds,
                false,
            ),
            cadence_adjusted: self.summarizer.summarize_cadence(
                &prediction.steps,
                steptol,
                config.min_walk_per_day,
                &thresholds,
                true,
            ),
            bouts: self.summarizer.summarize_bouts(
                &prediction.steps,
                &prediction.windows,
                config.bouts_min_walk,
                config.bouts_max_idle,
                &thresholds,
            ),
        };

        let rollups = build_rollups(&frame, &prediction.steps);
        artifacts.write_rollups(&rollups)?;
        artifacts.write_chart(&prediction.steps)?;

        let report = compile_report(wear_stats, summaries, &rollups, rate, frame.len());
        Ok(ProcessOutcome::Completed { report, artifacts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RateSource;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    // 2023-05-10 08:00:00 UTC
    const BASE_EPOCH: i64 = 1_683_705_600;

    /// n rows of a motionless device at 1 Hz, resting flat: (0, 0, 1).
    fn stationary_table(n: usize) -> RawTable {
        let time: Vec<Value> = (0..n).map(|i| Value::from(BASE_EPOCH + i as i64)).collect();
        let zeros = vec![Value::from(0.0); n];
        let ones = vec![Value::from(1.0); n];
        RawTable::from_json_columns(&json!({
            "time": time,
            "x": zeros.clone(),
            "y": zeros,
            "z": ones,
        }))
        .unwrap()
    }

    #[test]
    fn test_stationary_hour_completes_with_zero_steps() {
        let pipeline = StepPipeline::new();
        let outcome = pipeline
            .process(stationary_table(3600), &ProcessingConfig::default())
            .unwrap();

        let (report, artifacts) = match outcome {
            ProcessOutcome::Completed { report, artifacts } => (report, artifacts),
            other => panic!("expected a completed run, got {:?}", other),
        };
        assert_eq!(report.sample_rate, 1.0);
        assert_eq!(report.sample_rate_source, RateSource::DominantSpacing);
        assert_eq!(report.total_steps, 0);
        assert_eq!(report.data_duration_hours, 1.0);
        assert_eq!(report.minutely.len(), 60);
        assert!(report
            .minutely
            .iter()
            .all(|row| row.steps == 0.0 && row.enmo.abs() < 1e-9));
        assert_eq!(report.hourly.len(), 1);
        assert_eq!(report.daily.len(), 1);
        assert!(report.wear_stats.get("start_time").is_some());
        // Steps, StepTimes, three roll-ups and the chart
        assert_eq!(artifacts.files().len(), 6);
    }

    #[test]
    fn test_malformed_axis_cell_names_row_and_value() {
        let csv = "time,x,y,z\n\
                   2023-05-10 08:00:00,0.1,0.2,1.0\n\
                   2023-05-10 08:00:01,0.1,0.2,1.0\n\
                   2023-05-10 08:00:02,abc,0.2,1.0\n";
        let table = RawTable::from_csv_reader(csv.as_bytes()).unwrap();
        let err = StepPipeline::new()
            .process(table, &ProcessingConfig::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::TypeCoercion(_)));
        let message = err.to_string();
        assert!(message.contains("'x'"), "unexpected message: {message}");
        assert!(message.contains("[3]"), "unexpected message: {message}");
        assert!(message.contains("\"abc\""), "unexpected message: {message}");
    }

    #[test]
    fn test_ssl_with_nine_samples_fails_resampling() {
        let config = ProcessingConfig {
            model: ModelVariant::Ssl,
            ..Default::default()
        };
        let err = StepPipeline::new()
            .process(stationary_table(9), &config)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Insufficient data for resampling: need at least 10 data points, got 9"
        );
    }

    #[test]
    fn test_ssl_with_ten_samples_regrids_and_completes() {
        let config = ProcessingConfig {
            model: ModelVariant::Ssl,
            ..Default::default()
        };
        let outcome = StepPipeline::new()
            .process(stationary_table(10), &config)
            .unwrap();
        match outcome {
            ProcessOutcome::Completed { report, .. } => {
                assert_eq!(report.sample_rate, 30.0);
                assert_eq!(report.total_steps, 0);
            }
            other => panic!("expected a completed run, got {:?}", other),
        }
    }

    #[test]
    fn test_rf_guard_reports_counts_before_exclusion() {
        // the exclusion would null everything, but the guard runs first
        let config = ProcessingConfig {
            exclude_wear_below: Some("24h".to_string()),
            ..Default::default()
        };
        let outcome = StepPipeline::new()
            .process(stationary_table(40), &config)
            .unwrap();
        match outcome {
            ProcessOutcome::InsufficientData {
                actual,
                required,
                variant,
            } => {
                assert_eq!(actual, 40);
                assert_eq!(required, 50);
                assert_eq!(variant, ModelVariant::Rf);
            }
            other => panic!("expected the minimum-data outcome, got {:?}", other),
        }
    }

    #[test]
    fn test_wear_exclusion_can_null_every_day() {
        // two minutes of data cannot reach 24 h of daily wear
        let config = ProcessingConfig {
            exclude_wear_below: Some("24h".to_string()),
            ..Default::default()
        };
        let outcome = StepPipeline::new()
            .process(stationary_table(120), &config)
            .unwrap();
        match outcome {
            ProcessOutcome::NoValidData { wear_stats } => {
                // post-exclusion stats won the merge
                assert_eq!(wear_stats.get("wear_time_days"), Some(&Value::from(0.0)));
                assert!(wear_stats.get("start_time").is_some());
            }
            other => panic!("expected the no-valid-data outcome, got {:?}", other),
        }
    }

    #[test]
    fn test_supplied_rate_wins_over_observed_spacing() {
        let config = ProcessingConfig {
            sample_rate: Some(25.0),
            ..Default::default()
        };
        let outcome = StepPipeline::new()
            .process(stationary_table(60), &config)
            .unwrap();
        match outcome {
            ProcessOutcome::Completed { report, .. } => {
                assert_eq!(report.sample_rate, 25.0);
                assert_eq!(report.sample_rate_source, RateSource::Supplied);
            }
            other => panic!("expected a completed run, got {:?}", other),
        }
    }

    #[test]
    fn test_dropping_every_day_leaves_nothing() {
        let config = ProcessingConfig {
            exclude_first_last: Some("both".to_string()),
            ..Default::default()
        };
        let outcome = StepPipeline::new()
            .process(stationary_table(3600), &config)
            .unwrap();
        // one calendar day of data, dropped from both ends
        assert!(matches!(outcome, ProcessOutcome::NoValidData { .. }));
    }
}
