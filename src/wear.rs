//! Wear-time accounting
//!
//! Computes named wear statistics over a frame and applies the optional
//! exclusion policies: dropping whole calendar days from the recording
//! edges and nulling days whose wear falls below a threshold. Statistics
//! are computed before and after exclusion and merged, with the
//! post-exclusion values winning per key.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{NaiveDate, Timelike};
use serde::Serialize;
use serde_json::Value;

use crate::config::{DayEdge, EdgeExclusion};
use crate::types::SampleFrame;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Named wear statistics for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WearStats {
    stats: BTreeMap<String, Value>,
}

impl WearStats {
    /// Overlays `newer` on top of self; later values win per key.
    pub fn merge(&mut self, newer: WearStats) {
        for (key, value) in newer.stats {
            self.stats.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.stats.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.stats.iter()
    }

    fn set<V: Into<Value>>(&mut self, key: &str, value: V) {
        self.stats.insert(key.to_string(), value.into());
    }
}

/// Computes wear statistics: recording span, worn and non-worn time, a
/// 24-hour coverage flag and per-day coverage fractions. A row counts as
/// worn when all three axes are present; each row covers `1 / rate`
/// seconds.
pub fn calculate_wear_stats(frame: &SampleFrame, sample_rate_hz: f64) -> WearStats {
    let mut stats = WearStats::default();
    if frame.is_empty() {
        stats.set("start_time", Value::Null);
        stats.set("end_time", Value::Null);
        stats.set("wear_time_days", 0.0);
        stats.set("nonwear_time_days", 0.0);
        stats.set("covers_full_day", false);
        stats.set("day_coverage", Value::Object(Default::default()));
        return stats;
    }

    let dt = if sample_rate_hz > 0.0 {
        1.0 / sample_rate_hz
    } else {
        0.0
    };
    let valid = frame.valid_rows();
    let invalid = frame.len() - valid;

    let format = "%Y-%m-%d %H:%M:%S";
    stats.set(
        "start_time",
        frame.timestamps[0].format(format).to_string(),
    );
    stats.set(
        "end_time",
        frame.timestamps[frame.len() - 1].format(format).to_string(),
    );
    stats.set("wear_time_days", valid as f64 * dt / SECONDS_PER_DAY);
    stats.set("nonwear_time_days", invalid as f64 * dt / SECONDS_PER_DAY);

    // per hour-of-day: (valid, total) sample counts
    let mut by_hour: [(usize, usize); 24] = [(0, 0); 24];
    let mut by_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for i in 0..frame.len() {
        let hour = frame.timestamps[i].hour() as usize;
        by_hour[hour].1 += 1;
        if frame.row_is_valid(i) {
            by_hour[hour].0 += 1;
            *by_day.entry(frame.timestamps[i].date_naive()).or_insert(0) += 1;
        }
    }
    let covers_full_day = by_hour
        .iter()
        .all(|(valid, total)| *total > 0 && *valid as f64 / *total as f64 >= 0.01);
    stats.set("covers_full_day", covers_full_day);

    let mut day_coverage = serde_json::Map::new();
    for (date, count) in by_day {
        let fraction = (count as f64 * dt / SECONDS_PER_DAY).min(1.0);
        day_coverage.insert(date.format("%Y-%m-%d").to_string(), Value::from(fraction));
    }
    stats.set("day_coverage", Value::Object(day_coverage));

    stats
}

/// Drops whole calendar days from the configured end(s) of the recording.
pub fn drop_edge_days(frame: &SampleFrame, policy: EdgeExclusion) -> SampleFrame {
    if frame.is_empty() {
        return frame.clone();
    }
    let mut dates: Vec<NaiveDate> = Vec::new();
    for ts in frame.timestamps() {
        let date = ts.date_naive();
        if dates.last() != Some(&date) {
            dates.push(date);
        }
    }
    let mut drop: HashSet<NaiveDate> = HashSet::new();
    if matches!(policy.edge, DayEdge::First | DayEdge::Both) {
        drop.extend(dates.iter().take(policy.days).copied());
    }
    if matches!(policy.edge, DayEdge::Last | DayEdge::Both) {
        drop.extend(dates.iter().rev().take(policy.days).copied());
    }
    let kept = frame.filter_rows(|_, ts| !drop.contains(&ts.date_naive()));
    log::debug!(
        "dropped {} edge day(s), {} of {} rows remain",
        drop.len(),
        kept.len(),
        frame.len()
    );
    kept
}

/// Nulls the axis values of days whose wear duration is strictly below
/// `min_wear_seconds`. Rows are kept so the index is unchanged.
pub fn flag_low_wear_days(
    mut frame: SampleFrame,
    min_wear_seconds: f64,
    sample_rate_hz: f64,
) -> SampleFrame {
    if frame.is_empty() {
        return frame;
    }
    let dt = if sample_rate_hz > 0.0 {
        1.0 / sample_rate_hz
    } else {
        0.0
    };
    let mut wear_by_day: HashMap<NaiveDate, f64> = HashMap::new();
    for i in 0..frame.len() {
        if frame.row_is_valid(i) {
            *wear_by_day.entry(frame.timestamps[i].date_naive()).or_insert(0.0) += dt;
        }
    }
    let flagged: HashSet<NaiveDate> = wear_by_day
        .iter()
        .filter(|(_, wear)| **wear < min_wear_seconds)
        .map(|(date, _)| *date)
        .collect();
    // days with zero valid rows never enter wear_by_day but are already
    // all-null, so there is nothing to flag there
    if flagged.is_empty() {
        return frame;
    }
    log::warn!(
        "flagging {} day(s) below the {:.0}s wear threshold",
        flagged.len(),
        min_wear_seconds
    );
    for i in 0..frame.len() {
        if flagged.contains(&frame.timestamps[i].date_naive()) {
            frame.null_row(i);
        }
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn hourly_frame(days: usize, samples_per_day: usize) -> SampleFrame {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let spacing = Duration::seconds(86_400 / samples_per_day as i64);
        let mut timestamps: Vec<DateTime<Utc>> = Vec::new();
        for day in 0..days {
            for slot in 0..samples_per_day {
                timestamps
                    .push(start + Duration::days(day as i64) + spacing * slot as i32);
            }
        }
        let n = timestamps.len();
        SampleFrame::from_parts(
            timestamps,
            vec![Some(0.0); n],
            vec![Some(0.0); n],
            vec![Some(1.0); n],
        )
        .unwrap()
    }

    #[test]
    fn test_stats_on_empty_frame() {
        let stats = calculate_wear_stats(&SampleFrame::empty(), 100.0);
        assert_eq!(stats.get("start_time"), Some(&Value::Null));
        assert_eq!(stats.get("wear_time_days"), Some(&Value::from(0.0)));
        assert_eq!(stats.get("covers_full_day"), Some(&Value::from(false)));
    }

    #[test]
    fn test_wear_and_nonwear_split() {
        // 120 samples at 1 Hz, 30 of them nulled
        let mut frame = hourly_frame(1, 86_400).filter_rows(|i, _| i < 120);
        for i in 0..30 {
            frame.null_row(i);
        }
        let stats = calculate_wear_stats(&frame, 1.0);
        let wear = stats.get("wear_time_days").unwrap().as_f64().unwrap();
        let nonwear = stats.get("nonwear_time_days").unwrap().as_f64().unwrap();
        assert!((wear - 90.0 / 86_400.0).abs() < 1e-12);
        assert!((nonwear - 30.0 / 86_400.0).abs() < 1e-12);
        assert_eq!(stats.get("covers_full_day"), Some(&Value::from(false)));
    }

    #[test]
    fn test_full_day_coverage_flag() {
        // one sample per hour for a whole day at 1/3600 Hz
        let frame = hourly_frame(1, 24);
        let stats = calculate_wear_stats(&frame, 1.0 / 3600.0);
        assert_eq!(stats.get("covers_full_day"), Some(&Value::from(true)));
        let coverage = stats.get("day_coverage").unwrap();
        let day = coverage.get("2023-01-01").unwrap().as_f64().unwrap();
        assert!((day - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_merge_prefers_newer_values() {
        let mut pre = WearStats::default();
        pre.set("wear_time_days", 2.0);
        pre.set("start_time", "2023-01-01 00:00:00");
        let mut post = WearStats::default();
        post.set("wear_time_days", 1.0);
        pre.merge(post);
        assert_eq!(pre.get("wear_time_days"), Some(&Value::from(1.0)));
        // untouched keys survive
        assert_eq!(
            pre.get("start_time"),
            Some(&Value::from("2023-01-01 00:00:00"))
        );
    }

    #[test]
    fn test_drop_first_and_last_days() {
        let frame = hourly_frame(3, 24);
        let kept = drop_edge_days(
            &frame,
            EdgeExclusion {
                edge: DayEdge::Both,
                days: 1,
            },
        );
        assert_eq!(kept.len(), 24);
        assert_eq!(
            kept.first_timestamp().unwrap().date_naive(),
            NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
        );

        let kept = drop_edge_days(
            &frame,
            EdgeExclusion {
                edge: DayEdge::First,
                days: 1,
            },
        );
        assert_eq!(kept.len(), 48);
    }

    #[test]
    fn test_drop_can_empty_the_frame() {
        let frame = hourly_frame(3, 24);
        let kept = drop_edge_days(
            &frame,
            EdgeExclusion {
                edge: DayEdge::Both,
                days: 2,
            },
        );
        assert!(kept.is_empty());
    }

    #[test]
    fn test_flag_low_wear_days_nulls_but_keeps_rows() {
        // day one fully worn, day two only two samples
        let full = hourly_frame(1, 24);
        let start_day2 = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        let mut timestamps: Vec<DateTime<Utc>> = full.timestamps().to_vec();
        timestamps.push(start_day2);
        timestamps.push(start_day2 + Duration::hours(1));
        let n = timestamps.len();
        let frame = SampleFrame::from_parts(
            timestamps,
            vec![Some(0.0); n],
            vec![Some(0.0); n],
            vec![Some(1.0); n],
        )
        .unwrap();

        // at one sample per hour, 12h of wear needs 12 valid samples
        let flagged = flag_low_wear_days(frame, 12.0 * 3600.0, 1.0 / 3600.0);
        assert_eq!(flagged.len(), 26, "rows must be kept");
        assert!(flagged.row_is_valid(0), "day one untouched");
        assert!(!flagged.row_is_valid(24), "day two nulled");
        assert!(!flagged.row_is_valid(25));
    }

    #[test]
    fn test_flagging_every_day_leaves_all_rows_invalid() {
        let frame = hourly_frame(2, 4);
        let flagged = flag_low_wear_days(frame, 25.0 * 3600.0, 1.0 / 3600.0);
        assert!(flagged.all_rows_invalid());
    }
}
