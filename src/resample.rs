//! Conditional resampling
//!
//! Regrids a frame onto a fixed-width time grid when the active model
//! variant requires a specific rate. Bins are whole milliseconds wide,
//! calendar-anchored at midnight of the first sample's day; each bin takes
//! the mean of the samples that fall inside it and an empty bin stays
//! missing rather than being zero-filled.

use chrono::{DateTime, Duration, Utc};

use crate::error::PipelineError;
use crate::types::SampleFrame;

/// Fewest samples resampling will accept.
pub const MIN_SAMPLES: usize = 10;

/// Regrids `frame` to `target_hz`. The output covers every bin between the
/// first and last sample, inclusive, so the index spacing is uniform.
pub fn resample(frame: &SampleFrame, target_hz: f64) -> Result<SampleFrame, PipelineError> {
    if frame.len() < MIN_SAMPLES {
        return Err(PipelineError::InsufficientData {
            required: MIN_SAMPLES,
            actual: frame.len(),
        });
    }
    let bin_ms = ((1000.0 / target_hz) as i64).max(1);
    let first = frame.timestamps[0];
    let anchor = midnight_of(first);

    let bin_of = |ts: DateTime<Utc>| -> i64 { (ts - anchor).num_milliseconds() / bin_ms };
    let first_bin = bin_of(first);
    let last_bin = bin_of(frame.timestamps[frame.len() - 1]);
    let n_bins = (last_bin - first_bin + 1) as usize;

    let mut sums = vec![[0.0f64; 3]; n_bins];
    let mut counts = vec![[0u32; 3]; n_bins];
    for i in 0..frame.len() {
        let slot = (bin_of(frame.timestamps[i]) - first_bin) as usize;
        for (axis, value) in [frame.x[i], frame.y[i], frame.z[i]].into_iter().enumerate() {
            if let Some(v) = value {
                sums[slot][axis] += v;
                counts[slot][axis] += 1;
            }
        }
    }

    let mut timestamps = Vec::with_capacity(n_bins);
    let mut x = Vec::with_capacity(n_bins);
    let mut y = Vec::with_capacity(n_bins);
    let mut z = Vec::with_capacity(n_bins);
    for slot in 0..n_bins {
        let bin_start = anchor + Duration::milliseconds((first_bin + slot as i64) * bin_ms);
        timestamps.push(bin_start);
        let mean_of = |axis: usize| -> Option<f64> {
            if counts[slot][axis] > 0 {
                Some(sums[slot][axis] / counts[slot][axis] as f64)
            } else {
                None
            }
        };
        x.push(mean_of(0));
        y.push(mean_of(1));
        z.push(mean_of(2));
    }

    log::debug!(
        "resampled {} rows into {} bins of {} ms",
        frame.len(),
        n_bins,
        bin_ms
    );
    Ok(SampleFrame::new_unchecked(timestamps, x, y, z))
}

fn midnight_of(ts: DateTime<Utc>) -> DateTime<Utc> {
    // and_hms_opt(0,0,0) always exists for a valid date
    ts.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or(ts)
}
