//! Statistical summaries
//!
//! The pipeline hands its outputs to a summarizer four times per mode:
//! motion, steps, cadence and bouts, each as a flat name-to-value map.
//! The summarizer internals are a collaborator concern; the bundled
//! [`ReferenceSummarizer`] computes totals, daily averages, walk minutes
//! and bout statistics so the report compiler always finds its scalars.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde_json::Value;

use crate::config::WearThresholds;
use crate::types::{SampleFrame, StepSeries, WindowMeta};

/// Flat name-to-value summary map.
pub type Summary = BTreeMap<String, Value>;

/// The seven summaries one run produces: motion, steps and cadence in
/// unadjusted and adjusted modes, plus bouts.
#[derive(Debug, Clone, Default)]
pub struct SummarySet {
    pub enmo: Summary,
    pub enmo_adjusted: Summary,
    pub steps: Summary,
    pub steps_adjusted: Summary,
    pub cadence: Summary,
    pub cadence_adjusted: Summary,
    pub bouts: Summary,
}

/// Trait for statistical summarizers
pub trait Summarizer: Send + Sync {
    /// Summary of the motion magnitude (ENMO) over the frame
    fn summarize_motion(
        &self,
        frame: &SampleFrame,
        thresholds: &WearThresholds,
        adjusted: bool,
    ) -> Summary;

    /// Summary of the per-window step series
    fn summarize_steps(
        &self,
        steps: &StepSeries,
        steptol: f64,
        thresholds: &WearThresholds,
        adjusted: bool,
    ) -> Summary;

    /// Cadence summary over walking windows
    fn summarize_cadence(
        &self,
        steps: &StepSeries,
        steptol: f64,
        min_walk_per_day: f64,
        thresholds: &WearThresholds,
        adjusted: bool,
    ) -> Summary;

    /// Walking-bout summary
    fn summarize_bouts(
        &self,
        steps: &StepSeries,
        windows: &[WindowMeta],
        min_walk: f64,
        max_idle: f64,
        thresholds: &WearThresholds,
    ) -> Summary;
}

/// Bundled summarizer.
///
/// Estimates are computed over observed windows only; its adjusted mode
/// reports the same numbers instead of imputing unworn time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceSummarizer;

fn distinct_days(steps: &StepSeries) -> usize {
    let days: BTreeSet<NaiveDate> = steps
        .iter()
        .filter(|p| p.steps.is_some())
        .map(|p| p.time.date_naive())
        .collect();
    days.len()
}

fn per_day(total: f64, days: usize) -> f64 {
    if days == 0 {
        0.0
    } else {
        total / days as f64
    }
}

impl Summarizer for ReferenceSummarizer {
    fn summarize_motion(
        &self,
        frame: &SampleFrame,
        _thresholds: &WearThresholds,
        _adjusted: bool,
    ) -> Summary {
        let present: Vec<f64> = (0..frame.len()).filter_map(|i| frame.enmo(i)).collect();
        let avg_mg = if present.is_empty() {
            0.0
        } else {
            present.iter().sum::<f64>() / present.len() as f64 * 1000.0
        };
        let mut summary = Summary::new();
        summary.insert("avg_enmo_mg".to_string(), Value::from(avg_mg));
        summary.insert("n_samples".to_string(), Value::from(present.len()));
        summary
    }

    fn summarize_steps(
        &self,
        steps: &StepSeries,
        steptol: f64,
        _thresholds: &WearThresholds,
        _adjusted: bool,
    ) -> Summary {
        let spacing_sec = steps.window_spacing_seconds().unwrap_or(0.0);
        let total_steps = steps.total_steps();
        let walk_windows = steps
            .iter()
            .filter(|p| p.steps.map(|s| s >= steptol).unwrap_or(false))
            .count();
        let total_walk = walk_windows as f64 * spacing_sec / 60.0;
        let days = distinct_days(steps);

        let mut summary = Summary::new();
        summary.insert("total_steps".to_string(), Value::from(total_steps));
        summary.insert("total_walk".to_string(), Value::from(total_walk));
        summary.insert(
            "avg_steps".to_string(),
            Value::from(per_day(total_steps, days)),
        );
        summary.insert(
            "avg_walk".to_string(),
            Value::from(per_day(total_walk, days)),
        );
        summary.insert("n_days".to_string(), Value::from(days));
        summary
    }

    fn summarize_cadence(
        &self,
        steps: &StepSeries,
        steptol: f64,
        min_walk_per_day: f64,
        _thresholds: &WearThresholds,
        _adjusted: bool,
    ) -> Summary {
        let spacing_sec = steps.window_spacing_seconds().unwrap_or(0.0);
        let mut walk_steps = 0.0;
        let mut walk_windows = 0usize;
        let mut peak = 0.0_f64;
        let mut windows_by_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        for point in steps.iter() {
            let count = match point.steps {
                Some(count) if count >= steptol => count,
                _ => continue,
            };
            walk_steps += count;
            walk_windows += 1;
            *windows_by_day.entry(point.time.date_naive()).or_insert(0) += 1;
            if spacing_sec > 0.0 {
                peak = peak.max(count * 60.0 / spacing_sec);
            }
        }
        let walk_seconds = walk_windows as f64 * spacing_sec;
        let avg = if walk_seconds > 0.0 {
            walk_steps * 60.0 / walk_seconds
        } else {
            0.0
        };
        let walk_days = windows_by_day
            .values()
            .filter(|windows| **windows as f64 * spacing_sec / 60.0 >= min_walk_per_day)
            .count();

        let mut summary = Summary::new();
        summary.insert("avg_cadence".to_string(), Value::from(avg));
        summary.insert("peak_cadence".to_string(), Value::from(peak));
        summary.insert("walk_days".to_string(), Value::from(walk_days));
        summary
    }

    fn summarize_bouts(
        &self,
        steps: &StepSeries,
        windows: &[WindowMeta],
        min_walk: f64,
        max_idle: f64,
        _thresholds: &WearThresholds,
    ) -> Summary {
        let spacing_min = steps.window_spacing_seconds().unwrap_or(0.0) / 60.0;
        let bouts = find_bouts(windows, min_walk, max_idle);

        let n = bouts.len();
        let total_windows: usize = bouts.iter().map(|b| b.len).sum();
        let longest = bouts.iter().map(|b| b.len).max().unwrap_or(0);
        let avg_minutes = if n == 0 {
            0.0
        } else {
            total_windows as f64 * spacing_min / n as f64
        };

        let mut summary = Summary::new();
        summary.insert("n_bouts".to_string(), Value::from(n));
        summary.insert("avg_bout_minutes".to_string(), Value::from(avg_minutes));
        summary.insert(
            "longest_bout_minutes".to_string(),
            Value::from(longest as f64 * spacing_min),
        );
        summary
    }
}

struct Bout {
    len: usize,
}

/// Maximal runs of walking windows, tolerating up to `max_idle`
/// consecutive non-walking windows inside a run. A run only counts as a
/// bout when its walking fraction reaches `min_walk`.
fn find_bouts(windows: &[WindowMeta], min_walk: f64, max_idle: f64) -> Vec<Bout> {
    let max_idle = max_idle.max(0.0) as usize;
    let mut bouts = Vec::new();
    let mut run_start: Option<usize> = None;
    let mut last_walk = 0usize;
    let mut walk_count = 0usize;

    let close = |start: usize, end: usize, walk_count: usize, bouts: &mut Vec<Bout>| {
        let len = end - start + 1;
        if walk_count as f64 / len as f64 >= min_walk {
            bouts.push(Bout { len });
        }
    };

    for (i, window) in windows.iter().enumerate() {
        if window.is_walk {
            match run_start {
                Some(start) if i - last_walk > max_idle + 1 => {
                    close(start, last_walk, walk_count, &mut bouts);
                    run_start = Some(i);
                    walk_count = 0;
                }
                Some(_) => {}
                None => {
                    run_start = Some(i);
                    walk_count = 0;
                }
            }
            last_walk = i;
            walk_count += 1;
        }
    }
    if let Some(start) = run_start {
        close(start, last_walk, walk_count, &mut bouts);
    }
    bouts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StepPoint;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn series(counts: &[Option<f64>], spacing_sec: i64) -> StepSeries {
        let start = Utc.with_ymd_and_hms(2023, 3, 1, 12, 0, 0).unwrap();
        StepSeries::new(
            counts
                .iter()
                .enumerate()
                .map(|(i, steps)| StepPoint {
                    time: start + Duration::seconds(i as i64 * spacing_sec),
                    steps: *steps,
                })
                .collect(),
        )
    }

    fn windows_of(walks: &[bool]) -> Vec<WindowMeta> {
        let start = Utc.with_ymd_and_hms(2023, 3, 1, 12, 0, 0).unwrap();
        walks
            .iter()
            .enumerate()
            .map(|(i, walk)| WindowMeta {
                start: start + Duration::seconds(i as i64 * 10),
                is_walk: *walk,
                valid_samples: 10,
            })
            .collect()
    }

    fn thresholds() -> WearThresholds {
        WearThresholds {
            min_wear_per_day: 1260.0,
            min_wear_per_hour: 50.0,
            min_wear_per_minute: 0.5,
        }
    }

    #[test]
    fn test_steps_summary_scalars() {
        // 10 s windows: three walking (>= 3 steps), one idle, one undecided
        let steps = series(&[Some(5.0), Some(4.0), Some(0.0), None, Some(6.0)], 10);
        let summary =
            ReferenceSummarizer.summarize_steps(&steps, 3.0, &thresholds(), false);

        assert_eq!(summary["total_steps"], Value::from(15.0));
        assert_eq!(summary["total_walk"], Value::from(0.5));
        assert_eq!(summary["n_days"], Value::from(1));
        assert_eq!(summary["avg_steps"], Value::from(15.0));
    }

    #[test]
    fn test_steps_summary_on_empty_series_is_all_zero() {
        let summary = ReferenceSummarizer.summarize_steps(
            &StepSeries::default(),
            3.0,
            &thresholds(),
            false,
        );
        assert_eq!(summary["total_steps"], Value::from(0.0));
        assert_eq!(summary["avg_steps"], Value::from(0.0));
    }

    #[test]
    fn test_cadence_over_walking_windows_only() {
        // walking windows carry 6 and 12 steps over 10 s each
        let steps = series(&[Some(6.0), Some(1.0), Some(12.0)], 10);
        let summary = ReferenceSummarizer.summarize_cadence(
            &steps,
            3.0,
            5.0,
            &thresholds(),
            false,
        );

        // 18 steps over 1/3 min of walking
        assert_eq!(summary["avg_cadence"], Value::from(54.0));
        assert_eq!(summary["peak_cadence"], Value::from(72.0));
        assert_eq!(summary["walk_days"], Value::from(0));
    }

    #[test]
    fn test_bout_idle_tolerance() {
        let steps = series(&[Some(5.0); 5], 10);
        // walk, walk, idle, walk: one bout at max_idle 1, two at 0
        let windows = windows_of(&[true, true, false, true, false]);

        let tolerant = ReferenceSummarizer.summarize_bouts(
            &steps,
            &windows,
            0.5,
            1.0,
            &thresholds(),
        );
        assert_eq!(tolerant["n_bouts"], Value::from(1));
        // 4 windows of 10 s
        assert!(
            (tolerant["longest_bout_minutes"].as_f64().unwrap() - 4.0 * 10.0 / 60.0).abs()
                < 1e-12
        );

        let strict = ReferenceSummarizer.summarize_bouts(
            &steps,
            &windows,
            0.5,
            0.0,
            &thresholds(),
        );
        assert_eq!(strict["n_bouts"], Value::from(2));
    }

    #[test]
    fn test_bout_walk_fraction_gate() {
        let steps = series(&[Some(5.0); 7], 10);
        // run of 7 windows with only 3 walking: fraction 3/7
        let windows = windows_of(&[true, false, false, true, false, false, true]);
        let summary = ReferenceSummarizer.summarize_bouts(
            &steps,
            &windows,
            0.8,
            2.0,
            &thresholds(),
        );
        assert_eq!(summary["n_bouts"], Value::from(0));
    }

    #[test]
    fn test_motion_summary_in_milli_g() {
        let start = Utc.with_ymd_and_hms(2023, 3, 1, 12, 0, 0).unwrap();
        let timestamps: Vec<DateTime<Utc>> =
            (0..4).map(|i| start + Duration::seconds(i)).collect();
        let frame = SampleFrame::from_parts(
            timestamps,
            vec![Some(0.0); 4],
            vec![Some(0.0); 4],
            vec![Some(1.1), Some(1.1), Some(1.1), None],
        )
        .unwrap();
        let summary = ReferenceSummarizer.summarize_motion(&frame, &thresholds(), false);

        let avg = summary["avg_enmo_mg"].as_f64().unwrap();
        assert!((avg - 100.0).abs() < 1e-9);
        assert_eq!(summary["n_samples"], Value::from(3));
    }
}
