//! Multi-resolution aggregation
//!
//! Builds the minute table over a dense, calendar-anchored grid spanning
//! the observed range: step counts summed per minute, motion magnitude
//! (ENMO, in milli-g) averaged over present samples, then zero-filled.
//! The hour and day tables are derived strictly from the filled minute
//! table, so an unmonitored hour reads as zero rather than missing.

use chrono::{DateTime, Utc};

use crate::types::{Resolution, RollupRow, RollupSet, RollupTable, SampleFrame, StepSeries};

const MINUTE: i64 = 60;
const HOUR: i64 = 3600;
const DAY: i64 = 86_400;

fn floor_epoch(ts: DateTime<Utc>, width_secs: i64) -> DateTime<Utc> {
    let secs = ts.timestamp();
    let floored = secs.div_euclid(width_secs) * width_secs;
    DateTime::from_timestamp(floored, 0).unwrap_or(ts)
}

/// Builds the minute, hour and day tables for one run. Step windows may
/// arrive in any order; each lands in its own calendar minute.
pub fn build_rollups(frame: &SampleFrame, steps: &StepSeries) -> RollupSet {
    let minutely = build_minutely(frame, steps);
    let hourly = rollup_of(&minutely.rows, HOUR, Resolution::Hour);
    let daily = rollup_of(&minutely.rows, DAY, Resolution::Day);
    RollupSet {
        minutely,
        hourly,
        daily,
    }
}

fn build_minutely(frame: &SampleFrame, steps: &StepSeries) -> RollupTable {
    let mut bounds: Option<(DateTime<Utc>, DateTime<Utc>)> = None;
    let mut widen = |ts: DateTime<Utc>| {
        bounds = Some(match bounds {
            None => (ts, ts),
            Some((lo, hi)) => (lo.min(ts), hi.max(ts)),
        });
    };
    if let (Some(first), Some(last)) = (frame.first_timestamp(), frame.last_timestamp()) {
        widen(first);
        widen(last);
    }
    // window starts carry no ordering invariant, so every one widens
    for point in steps.iter() {
        widen(point.time);
    }
    let (lo, hi) = match bounds {
        Some(bounds) => bounds,
        None => {
            return RollupTable {
                resolution: Resolution::Minute,
                rows: Vec::new(),
            }
        }
    };

    let start = floor_epoch(lo, MINUTE);
    let end = floor_epoch(hi, MINUTE);
    let slots = ((end.timestamp() - start.timestamp()) / MINUTE) as usize + 1;
    let slot_of = |ts: DateTime<Utc>| {
        ((floor_epoch(ts, MINUTE).timestamp() - start.timestamp()) / MINUTE) as usize
    };

    let mut step_sums = vec![0.0_f64; slots];
    for point in steps.iter() {
        if let Some(count) = point.steps {
            step_sums[slot_of(point.time)] += count;
        }
    }

    let mut enmo_sums = vec![0.0_f64; slots];
    let mut enmo_counts = vec![0u32; slots];
    for i in 0..frame.len() {
        if let Some(enmo) = frame.enmo(i) {
            let slot = slot_of(frame.timestamps()[i]);
            enmo_sums[slot] += enmo * 1000.0;
            enmo_counts[slot] += 1;
        }
    }

    let rows = (0..slots)
        .map(|slot| RollupRow {
            start: floor_epoch(start + chrono::Duration::minutes(slot as i64), MINUTE),
            steps: step_sums[slot],
            enmo: if enmo_counts[slot] > 0 {
                enmo_sums[slot] / enmo_counts[slot] as f64
            } else {
                0.0
            },
        })
        .collect();
    RollupTable {
        resolution: Resolution::Minute,
        rows,
    }
}

/// Groups the (already dense and sorted) minute rows into wider buckets:
/// steps summed, ENMO averaged over the minute values.
fn rollup_of(minutes: &[RollupRow], width_secs: i64, resolution: Resolution) -> RollupTable {
    let mut rows: Vec<RollupRow> = Vec::new();
    let mut current: Option<(DateTime<Utc>, f64, f64, u32)> = None;
    for minute in minutes {
        let bucket = floor_epoch(minute.start, width_secs);
        match current.as_mut() {
            Some((start, steps, enmo, count)) if *start == bucket => {
                *steps += minute.steps;
                *enmo += minute.enmo;
                *count += 1;
            }
            _ => {
                if let Some((start, steps, enmo, count)) = current.take() {
                    rows.push(RollupRow {
                        start,
                        steps,
                        enmo: enmo / count as f64,
                    });
                }
                current = Some((bucket, minute.steps, minute.enmo, 1));
            }
        }
    }
    if let Some((start, steps, enmo, count)) = current.take() {
        rows.push(RollupRow {
            start,
            steps,
            enmo: enmo / count as f64,
        });
    }
    RollupTable { resolution, rows }
}
