//! Result compilation
//!
//! Collates one run's outputs into a single serializable report: wear
//! statistics, the seven summaries, the three roll-up tables as plain
//! records, and the headline scalars. Every leaf is a primitive, so the
//! report crosses JSON boundaries without surprises.

use serde::Serialize;

use crate::summaries::{Summary, SummarySet};
use crate::types::{RateEstimate, RateSource, RollupSet, RollupTable};
use crate::wear::WearStats;

/// One aggregate bucket rendered as primitives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupRecord {
    pub time: String,
    pub steps: f64,
    pub enmo: f64,
}

/// Everything a completed run reports.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub wear_stats: WearStats,
    pub enmo_summary: Summary,
    pub enmo_summary_adjusted: Summary,
    pub steps_summary: Summary,
    pub steps_summary_adjusted: Summary,
    pub cadence_summary: Summary,
    pub cadence_summary_adjusted: Summary,
    pub bouts_summary: Summary,
    pub minutely: Vec<RollupRecord>,
    pub hourly: Vec<RollupRecord>,
    pub daily: Vec<RollupRecord>,
    /// Truncated from the unadjusted steps summary
    pub total_steps: i64,
    pub total_walking_minutes: f64,
    pub average_daily_steps: f64,
    pub sample_rate: f64,
    pub sample_rate_source: RateSource,
    pub data_duration_hours: f64,
}

fn scalar(summary: &Summary, key: &str) -> f64 {
    summary.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0)
}

fn records_of(table: &RollupTable) -> Vec<RollupRecord> {
    table
        .rows
        .iter()
        .map(|row| RollupRecord {
            time: row.start.format("%Y-%m-%d %H:%M:%S").to_string(),
            steps: row.steps,
            enmo: row.enmo,
        })
        .collect()
}

/// Merges the run outputs into the final report. Scalars come from the
/// unadjusted steps summary; absent keys compile as zero.
pub fn compile_report(
    wear_stats: WearStats,
    summaries: SummarySet,
    rollups: &RollupSet,
    rate: RateEstimate,
    sample_count: usize,
) -> SummaryReport {
    let total_steps = scalar(&summaries.steps, "total_steps") as i64;
    let total_walking_minutes = scalar(&summaries.steps, "total_walk");
    let average_daily_steps = scalar(&summaries.steps, "avg_steps");
    let data_duration_hours = if rate.hz > 0.0 {
        sample_count as f64 / (rate.hz * 3600.0)
    } else {
        0.0
    };

    SummaryReport {
        wear_stats,
        enmo_summary: summaries.enmo,
        enmo_summary_adjusted: summaries.enmo_adjusted,
        steps_summary: summaries.steps,
        steps_summary_adjusted: summaries.steps_adjusted,
        cadence_summary: summaries.cadence,
        cadence_summary_adjusted: summaries.cadence_adjusted,
        bouts_summary: summaries.bouts,
        minutely: records_of(&rollups.minutely),
        hourly: records_of(&rollups.hourly),
        daily: records_of(&rollups.daily),
        total_steps,
        total_walking_minutes,
        average_daily_steps,
        sample_rate: rate.hz,
        sample_rate_source: rate.source,
        data_duration_hours,
    }
}
