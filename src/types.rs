//! Core types for the step pipeline
//!
//! This module defines the data structures that flow through each stage:
//! the time-indexed sample frame, the classifier outputs, the sample-rate
//! estimate and the multi-resolution roll-up tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CellIssue, PipelineError};

/// Time-indexed three-axis accelerometer frame.
///
/// Timestamps are strictly increasing; a missing axis value is `None`,
/// never a silent zero. Downstream stages only null or drop whole rows, so
/// the index stays sorted by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleFrame {
    pub(crate) timestamps: Vec<DateTime<Utc>>,
    pub(crate) x: Vec<Option<f64>>,
    pub(crate) y: Vec<Option<f64>>,
    pub(crate) z: Vec<Option<f64>>,
}

impl SampleFrame {
    /// Builds a frame, verifying column lengths and the strictly-increasing
    /// timestamp invariant. Duplicate or out-of-order timestamps are an
    /// input error, never sorted away.
    pub fn from_parts(
        timestamps: Vec<DateTime<Utc>>,
        x: Vec<Option<f64>>,
        y: Vec<Option<f64>>,
        z: Vec<Option<f64>>,
    ) -> Result<Self, PipelineError> {
        if x.len() != timestamps.len() || y.len() != timestamps.len() || z.len() != timestamps.len()
        {
            return Err(PipelineError::TableRead(format!(
                "axis columns must match the index length {}",
                timestamps.len()
            )));
        }
        let mut issues = Vec::new();
        for i in 1..timestamps.len() {
            if timestamps[i] <= timestamps[i - 1] {
                issues.push(CellIssue::new(
                    "time",
                    i + 1,
                    Some(timestamps[i].to_rfc3339()),
                ));
                if issues.len() == 5 {
                    break;
                }
            }
        }
        if !issues.is_empty() {
            return Err(PipelineError::NonMonotonicTime(issues));
        }
        Ok(SampleFrame { timestamps, x, y, z })
    }

    pub(crate) fn new_unchecked(
        timestamps: Vec<DateTime<Utc>>,
        x: Vec<Option<f64>>,
        y: Vec<Option<f64>>,
        z: Vec<Option<f64>>,
    ) -> Self {
        debug_assert!(x.len() == timestamps.len());
        debug_assert!(y.len() == timestamps.len());
        debug_assert!(z.len() == timestamps.len());
        SampleFrame { timestamps, x, y, z }
    }

    pub fn empty() -> Self {
        SampleFrame {
            timestamps: Vec::new(),
            x: Vec::new(),
            y: Vec::new(),
            z: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn x(&self) -> &[Option<f64>] {
        &self.x
    }

    pub fn y(&self) -> &[Option<f64>] {
        &self.y
    }

    pub fn z(&self) -> &[Option<f64>] {
        &self.z
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }

    /// True when all three axes are present at `row`.
    pub fn row_is_valid(&self, row: usize) -> bool {
        self.x[row].is_some() && self.y[row].is_some() && self.z[row].is_some()
    }

    pub fn valid_rows(&self) -> usize {
        (0..self.len()).filter(|&i| self.row_is_valid(i)).count()
    }

    /// True when every row is missing at least one axis value.
    pub fn all_rows_invalid(&self) -> bool {
        (0..self.len()).all(|i| !self.row_is_valid(i))
    }

    /// Euclidean norm minus one gravitational unit; `None` if any axis is
    /// missing at `row`.
    pub fn enmo(&self, row: usize) -> Option<f64> {
        let (x, y, z) = (self.x[row]?, self.y[row]?, self.z[row]?);
        Some((x * x + y * y + z * z).sqrt() - 1.0)
    }

    /// New frame keeping only rows for which `keep` returns true. Order is
    /// preserved, so the index stays strictly increasing.
    pub(crate) fn filter_rows<F: Fn(usize, DateTime<Utc>) -> bool>(&self, keep: F) -> Self {
        let mut timestamps = Vec::new();
        let mut x = Vec::new();
        let mut y = Vec::new();
        let mut z = Vec::new();
        for i in 0..self.len() {
            if keep(i, self.timestamps[i]) {
                timestamps.push(self.timestamps[i]);
                x.push(self.x[i]);
                y.push(self.y[i]);
                z.push(self.z[i]);
            }
        }
        SampleFrame { timestamps, x, y, z }
    }

    /// Nulls all three axes at `row`, keeping the row in the index.
    pub(crate) fn null_row(&mut self, row: usize) {
        self.x[row] = None;
        self.y[row] = None;
        self.z[row] = None;
    }
}

/// One entry of the per-window step series (Y). `steps` is `None` for
/// windows the classifier could not decide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepPoint {
    pub time: DateTime<Utc>,
    pub steps: Option<f64>,
}

/// Per-window step counts, indexed by window start.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepSeries {
    pub points: Vec<StepPoint>,
}

impl StepSeries {
    pub fn new(points: Vec<StepPoint>) -> Self {
        StepSeries { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepPoint> {
        self.points.iter()
    }

    /// Sum over decided windows.
    pub fn total_steps(&self) -> f64 {
        self.points.iter().filter_map(|p| p.steps).sum()
    }

    /// Spacing between consecutive window starts, in seconds: the median
    /// delta over the sorted starts. `None` below two points.
    pub fn window_spacing_seconds(&self) -> Option<f64> {
        if self.points.len() < 2 {
            return None;
        }
        let mut starts: Vec<DateTime<Utc>> = self.points.iter().map(|p| p.time).collect();
        starts.sort_unstable();
        let mut deltas: Vec<i64> = starts
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).num_milliseconds())
            .collect();
        deltas.sort_unstable();
        let mid = deltas.len() / 2;
        let median = if deltas.len() % 2 == 1 {
            deltas[mid] as f64
        } else {
            (deltas[mid - 1] as f64 + deltas[mid] as f64) / 2.0
        };
        Some(median / 1000.0)
    }
}

/// Ancillary per-window metadata (W).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowMeta {
    /// Window start time
    pub start: DateTime<Utc>,
    /// Whether the window was classified as walking
    pub is_walk: bool,
    /// Usable samples the classifier saw in the window
    pub valid_samples: usize,
}

/// Everything a classifier returns for one frame: the step series (Y),
/// per-window metadata (W) and individual step-event times (T_steps).
#[derive(Debug, Clone, Default)]
pub struct Prediction {
    pub steps: StepSeries,
    pub windows: Vec<WindowMeta>,
    pub step_times: Vec<DateTime<Utc>>,
}

/// How the effective sample rate was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    Supplied,
    DominantSpacing,
    MedianDelta,
    MeanDelta,
    DefaultFallback,
}

impl RateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateSource::Supplied => "supplied",
            RateSource::DominantSpacing => "dominant_spacing",
            RateSource::MedianDelta => "median_delta",
            RateSource::MeanDelta => "mean_delta",
            RateSource::DefaultFallback => "default_fallback",
        }
    }
}

/// Sample rate in Hz together with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateEstimate {
    pub hz: f64,
    pub source: RateSource,
}

impl RateEstimate {
    pub fn supplied(hz: f64) -> Self {
        RateEstimate {
            hz,
            source: RateSource::Supplied,
        }
    }

    /// True when no usable estimate was found and the fixed default applies.
    pub fn is_fallback(&self) -> bool {
        self.source == RateSource::DefaultFallback
    }
}

/// Roll-up bucket width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Minute,
    Hour,
    Day,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Minute => "minutely",
            Resolution::Hour => "hourly",
            Resolution::Day => "daily",
        }
    }
}

/// One bucket of an aggregate table. Buckets are half-open, left-aligned
/// and calendar-anchored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollupRow {
    pub start: DateTime<Utc>,
    pub steps: f64,
    pub enmo: f64,
}

/// Dense aggregate table at one resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct RollupTable {
    pub resolution: Resolution,
    pub rows: Vec<RollupRow>,
}

impl RollupTable {
    pub fn total_steps(&self) -> f64 {
        self.rows.iter().map(|r| r.steps).sum()
    }
}

/// Minute, hour and day tables for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RollupSet {
    pub minutely: RollupTable,
    pub hourly: RollupTable,
    pub daily: RollupTable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    #[test]
    fn test_from_parts_rejects_out_of_order_index() {
        let err = SampleFrame::from_parts(
            vec![ts(0), ts(2), ts(1)],
            vec![Some(0.0); 3],
            vec![Some(0.0); 3],
            vec![Some(1.0); 3],
        )
        .unwrap_err();
        assert!(err.to_string().contains("out of order"));
        assert!(err.to_string().contains('3'), "should name the 1-based row");
    }

    #[test]
    fn test_from_parts_rejects_duplicate_timestamps() {
        let err = SampleFrame::from_parts(
            vec![ts(0), ts(0)],
            vec![Some(0.0); 2],
            vec![Some(0.0); 2],
            vec![Some(1.0); 2],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::NonMonotonicTime(_)));
    }

    #[test]
    fn test_enmo_of_resting_orientation_is_zero() {
        let frame = SampleFrame::from_parts(
            vec![ts(0)],
            vec![Some(0.0)],
            vec![Some(0.0)],
            vec![Some(1.0)],
        )
        .unwrap();
        assert!(frame.enmo(0).unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_validity_scans() {
        let mut frame = SampleFrame::from_parts(
            vec![ts(0), ts(1)],
            vec![Some(0.1), Some(0.2)],
            vec![Some(0.0), Some(0.0)],
            vec![Some(1.0), Some(1.0)],
        )
        .unwrap();
        assert_eq!(frame.valid_rows(), 2);
        assert!(!frame.all_rows_invalid());
        frame.null_row(0);
        frame.null_row(1);
        assert!(frame.all_rows_invalid());
        assert_eq!(frame.enmo(0), None);
    }

    #[test]
    fn test_step_series_totals() {
        let series = StepSeries::new(vec![
            StepPoint {
                time: ts(0),
                steps: Some(12.0),
            },
            StepPoint {
                time: ts(10),
                steps: None,
            },
            StepPoint {
                time: ts(20),
                steps: Some(8.0),
            },
        ]);
        assert_eq!(series.total_steps(), 20.0);
        assert_eq!(series.window_spacing_seconds(), Some(10.0));
    }

    #[test]
    fn test_window_spacing_is_the_median_delta() {
        let point = |secs: i64| StepPoint {
            time: ts(secs),
            steps: Some(0.0),
        };

        // one long gap among regular 10 s windows must not skew the spacing
        let gappy = StepSeries::new(vec![
            point(0),
            point(10),
            point(20),
            point(30),
            point(150),
        ]);
        assert_eq!(gappy.window_spacing_seconds(), Some(10.0));

        // nor does window order
        let shuffled = StepSeries::new(vec![point(30), point(0), point(10), point(20)]);
        assert_eq!(shuffled.window_spacing_seconds(), Some(10.0));
    }
}
