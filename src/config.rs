//! Processing configuration: model variant, column mapping, wear thresholds
//! and exclusion policies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// Step-count model variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// Random forest. Works at the native sample rate, needs at least 50 samples.
    Rf,
    /// Self-supervised model. Requires input resampled to 30 Hz.
    Ssl,
}

impl ModelVariant {
    /// Target rate the variant requires, if any.
    pub fn resample_target_hz(&self) -> Option<f64> {
        match self {
            ModelVariant::Rf => None,
            ModelVariant::Ssl => Some(30.0),
        }
    }

    /// Minimum sample count the variant can work with, if any.
    pub fn min_samples(&self) -> Option<usize> {
        match self {
            ModelVariant::Rf => Some(50),
            ModelVariant::Ssl => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelVariant::Rf => "rf",
            ModelVariant::Ssl => "ssl",
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rf" => Ok(ModelVariant::Rf),
            "ssl" => Ok(ModelVariant::Ssl),
            other => Err(format!("unknown model type '{}', expected rf or ssl", other)),
        }
    }
}

/// Device the classifier executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionDevice {
    Cpu,
    Cuda,
    Mps,
}

impl ExecutionDevice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionDevice::Cpu => "cpu",
            ExecutionDevice::Cuda => "cuda",
            ExecutionDevice::Mps => "mps",
        }
    }
}

impl Default for ExecutionDevice {
    fn default() -> Self {
        ExecutionDevice::Cpu
    }
}

impl fmt::Display for ExecutionDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionDevice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(ExecutionDevice::Cpu),
            "cuda" => Ok(ExecutionDevice::Cuda),
            "mps" => Ok(ExecutionDevice::Mps),
            other => Err(format!(
                "unknown device '{}', expected cpu, cuda or mps",
                other
            )),
        }
    }
}

/// Which end(s) of the recording to drop whole days from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayEdge {
    First,
    Last,
    Both,
}

/// Drop `days` whole calendar days from the configured end(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeExclusion {
    pub edge: DayEdge,
    pub days: usize,
}

impl FromStr for EdgeExclusion {
    type Err = String;

    /// Accepts `first`, `last`, `both`, optionally suffixed with a day
    /// count, e.g. `both:2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, days) = match s.split_once(':') {
            Some((name, count)) => {
                let days: usize = count
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid day count '{}'", count.trim()))?;
                if days == 0 {
                    return Err("day count must be at least 1".to_string());
                }
                (name.trim(), days)
            }
            None => (s, 1),
        };
        let edge = match name.to_ascii_lowercase().as_str() {
            "first" => DayEdge::First,
            "last" => DayEdge::Last,
            "both" => DayEdge::Both,
            other => {
                return Err(format!(
                    "unknown exclusion '{}', expected first, last or both",
                    other
                ))
            }
        };
        Ok(EdgeExclusion { edge, days })
    }
}

/// Parses a wear duration such as `12h`, `90m` or `3600s` into seconds.
/// A bare number is taken as hours.
pub fn parse_wear_duration(s: &str) -> Result<f64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    let (number, unit) = match s.find(|c: char| c.is_ascii_alphabetic()) {
        Some(pos) => (&s[..pos], s[pos..].trim()),
        None => (s, "h"),
    };
    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid number '{}'", number.trim()))?;
    if value < 0.0 {
        return Err("duration must not be negative".to_string());
    }
    let seconds = match unit.to_ascii_lowercase().as_str() {
        "h" | "hr" | "hour" | "hours" => value * 3600.0,
        "m" | "min" | "minute" | "minutes" => value * 60.0,
        "s" | "sec" | "second" | "seconds" => value,
        other => return Err(format!("unknown duration unit '{}'", other)),
    };
    Ok(seconds)
}

/// Minimum wear coverage required for a period to count in summaries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WearThresholds {
    /// Minutes of wear required per day.
    pub min_wear_per_day: f64,
    /// Minutes of wear required per hour.
    pub min_wear_per_hour: f64,
    /// Fraction of a minute that must be covered.
    pub min_wear_per_minute: f64,
}

/// All knobs of a processing run.
///
/// The optional string-valued fields keep their submitted form; they are
/// parsed by the stage that consumes them, and an empty or `"string"`
/// placeholder value counts as unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub model: ModelVariant,
    /// Source column names for time, x, y, z, in that order.
    pub txyz: Vec<String>,
    /// Sample rate in Hz when the caller knows it; `None` or zero means infer.
    pub sample_rate: Option<f64>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// Drop whole days from the recording edges, e.g. `both` or `first:2`.
    pub exclude_first_last: Option<String>,
    /// Null out days with wear below this duration, e.g. `12h`.
    pub exclude_wear_below: Option<String>,
    pub min_wear_per_day: f64,
    pub min_wear_per_hour: f64,
    pub min_wear_per_minute: f64,
    /// Minutes of walking required for a day to count in cadence summaries.
    pub min_walk_per_day: f64,
    /// Fraction of a bout that must be walking.
    pub bouts_min_walk: f64,
    /// Longest idle stretch tolerated inside a bout, in windows.
    pub bouts_max_idle: f64,
    pub device: ExecutionDevice,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        ProcessingConfig {
            model: ModelVariant::Rf,
            txyz: vec![
                "time".to_string(),
                "x".to_string(),
                "y".to_string(),
                "z".to_string(),
            ],
            sample_rate: None,
            start_time: None,
            end_time: None,
            exclude_first_last: None,
            exclude_wear_below: None,
            min_wear_per_day: 21.0 * 60.0,
            min_wear_per_hour: 50.0,
            min_wear_per_minute: 0.5,
            min_walk_per_day: 5.0,
            bouts_min_walk: 0.8,
            bouts_max_idle: 3.0,
            device: ExecutionDevice::Cpu,
        }
    }
}

/// Filters unset optional string values: `None`, whitespace and the web-form
/// placeholder `string` all count as absent.
pub(crate) fn provided(value: &Option<String>) -> Option<&str> {
    let v = value.as_deref()?.trim();
    if v.is_empty() || v.eq_ignore_ascii_case("string") {
        None
    } else {
        Some(v)
    }
}

impl ProcessingConfig {
    /// Checks the numeric fields; string-valued options are validated where
    /// they are consumed.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if let Some(rate) = self.sample_rate {
            if rate < 0.0 {
                return Err(PipelineError::config(
                    "sample_rate",
                    &rate.to_string(),
                    "sample rate must not be negative",
                ));
            }
        }
        let thresholds = [
            ("min_wear_per_day", self.min_wear_per_day),
            ("min_wear_per_hour", self.min_wear_per_hour),
            ("min_wear_per_minute", self.min_wear_per_minute),
            ("min_walk_per_day", self.min_walk_per_day),
            ("bouts_min_walk", self.bouts_min_walk),
            ("bouts_max_idle", self.bouts_max_idle),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(PipelineError::config(
                    name,
                    &value.to_string(),
                    "threshold must be a non-negative number",
                ));
            }
        }
        Ok(())
    }

    /// Supplied sample rate, with zero treated as unset.
    pub fn supplied_sample_rate(&self) -> Option<f64> {
        self.sample_rate.filter(|rate| *rate != 0.0)
    }

    pub fn wear_thresholds(&self) -> WearThresholds {
        WearThresholds {
            min_wear_per_day: self.min_wear_per_day,
            min_wear_per_hour: self.min_wear_per_hour,
            min_wear_per_minute: self.min_wear_per_minute,
        }
    }

    /// Parsed first/last-day exclusion policy, if configured.
    pub fn first_last_policy(&self) -> Result<Option<EdgeExclusion>, PipelineError> {
        match provided(&self.exclude_first_last) {
            None => Ok(None),
            Some(text) => text.parse().map(Some).map_err(|reason: String| {
                PipelineError::config("exclude_first_last", text, &reason)
            }),
        }
    }

    /// Parsed minimum daily wear duration in seconds, if configured.
    pub fn wear_below_seconds(&self) -> Result<Option<f64>, PipelineError> {
        match provided(&self.exclude_wear_below) {
            None => Ok(None),
            Some(text) => parse_wear_duration(text).map(Some).map_err(|reason| {
                PipelineError::config("exclude_wear_below", text, &reason)
            }),
        }
    }
}
