//! Sample-rate inference
//!
//! An ordered list of strategies over consecutive timestamp deltas:
//! dominant spacing (mode), then median, then mean. Dominant and median
//! estimates must land inside the plausible band; the mean is a lenient
//! last resort and only needs to be finite. When nothing usable remains,
//! the fixed default applies.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::PipelineError;
use crate::types::{RateEstimate, RateSource};

/// Fixed fallback rate when no strategy yields a usable estimate.
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 104.0;
/// Plausible band for inferred rates.
pub const MIN_PLAUSIBLE_HZ: f64 = 1.0;
pub const MAX_PLAUSIBLE_HZ: f64 = 1000.0;

/// What to do when every strategy fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateFallback {
    /// Absorb the failure into `DEFAULT_SAMPLE_RATE_HZ`.
    Default,
    /// Surface a `SampleRateInference` error instead.
    Disabled,
}

/// Resolves the effective rate for a run: a supplied non-zero rate is used
/// verbatim, otherwise the strategy list runs with the default fallback.
pub fn effective_sample_rate(
    supplied: Option<f64>,
    timestamps: &[DateTime<Utc>],
) -> RateEstimate {
    match supplied {
        Some(hz) => RateEstimate::supplied(hz),
        // the default fallback cannot fail
        None => infer_sample_rate(timestamps, RateFallback::Default)
            .unwrap_or(RateEstimate {
                hz: DEFAULT_SAMPLE_RATE_HZ,
                source: RateSource::DefaultFallback,
            }),
    }
}

/// Runs the inference strategies in order and returns the first usable
/// estimate with its provenance. Pure: the same series always yields the
/// same estimate.
pub fn infer_sample_rate(
    timestamps: &[DateTime<Utc>],
    fallback: RateFallback,
) -> Result<RateEstimate, PipelineError> {
    let deltas = deltas_nanos(timestamps);

    if let Some(hz) = dominant_spacing_hz(&deltas).filter(|hz| in_band(*hz)) {
        log::debug!("sample rate {} Hz from dominant spacing", hz);
        return Ok(RateEstimate {
            hz,
            source: RateSource::DominantSpacing,
        });
    }
    if let Some(hz) = median_delta_hz(&deltas).filter(|hz| in_band(*hz)) {
        log::debug!("sample rate {} Hz from median delta", hz);
        return Ok(RateEstimate {
            hz,
            source: RateSource::MedianDelta,
        });
    }
    if let Some(hz) = mean_delta_hz(&deltas).filter(|hz| hz.is_finite() && *hz > 0.0) {
        log::debug!("sample rate {} Hz from mean delta", hz);
        return Ok(RateEstimate {
            hz,
            source: RateSource::MeanDelta,
        });
    }

    match fallback {
        RateFallback::Default => {
            log::warn!(
                "sample rate inference found no usable estimate from {} timestamps, \
                 falling back to {} Hz",
                timestamps.len(),
                DEFAULT_SAMPLE_RATE_HZ
            );
            Ok(RateEstimate {
                hz: DEFAULT_SAMPLE_RATE_HZ,
                source: RateSource::DefaultFallback,
            })
        }
        RateFallback::Disabled => Err(PipelineError::SampleRateInference(format!(
            "no strategy produced a usable estimate from {} timestamps",
            timestamps.len()
        ))),
    }
}

fn in_band(hz: f64) -> bool {
    hz.is_finite() && (MIN_PLAUSIBLE_HZ..=MAX_PLAUSIBLE_HZ).contains(&hz)
}

fn deltas_nanos(timestamps: &[DateTime<Utc>]) -> Vec<i64> {
    timestamps
        .windows(2)
        .filter_map(|pair| (pair[1] - pair[0]).num_nanoseconds())
        .collect()
}

fn nanos_to_hz(nanos: f64) -> f64 {
    1e9 / nanos
}

/// Most frequent delta; ties break towards the smaller spacing so the
/// result is deterministic.
fn dominant_spacing_hz(deltas: &[i64]) -> Option<f64> {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for delta in deltas {
        *counts.entry(*delta).or_insert(0) += 1;
    }
    let (delta, _) = counts
        .into_iter()
        .max_by(|(da, ca), (db, cb)| ca.cmp(cb).then(db.cmp(da)))?;
    Some(nanos_to_hz(delta as f64))
}

fn median_delta_hz(deltas: &[i64]) -> Option<f64> {
    if deltas.is_empty() {
        return None;
    }
    let mut sorted = deltas.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 1 {
        sorted[mid] as f64
    } else {
        (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
    };
    Some(nanos_to_hz(median))
}

fn mean_delta_hz(deltas: &[i64]) -> Option<f64> {
    if deltas.is_empty() {
        return None;
    }
    let sum: i128 = deltas.iter().map(|d| *d as i128).sum();
    let mean = sum as f64 / deltas.len() as f64;
    Some(nanos_to_hz(mean))
}
