//! Classifier contract and invocation adapter
//!
//! This module defines the trait a step classifier implements, the loader
//! trait that produces one for a (variant, device) pair, and the single
//! normalization function that turns classifier tuning plus the runtime
//! sample rate into one settings struct applied before prediction.

use std::error::Error;

use crate::config::{ExecutionDevice, ModelVariant};
use crate::error::PipelineError;
use crate::types::{Prediction, RateEstimate, SampleFrame};

/// Boxed error for classifier implementations.
pub type ClassifierError = Box<dyn Error + Send + Sync>;

/// Tuning a classifier exposes before invocation. Any field may be unset;
/// [`normalize_invocation`] resolves the defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifierTuning {
    /// Window length in seconds
    pub window_sec: Option<f64>,
    /// Minimum step count for a window to count as walking
    pub steptol: Option<f64>,
    /// Minimum bout length, in windows
    pub bout_min_len: Option<u32>,
    /// Maximum idle time tolerated inside a bout, in seconds
    pub bout_max_idle: Option<f64>,
}

/// Settings applied to a classifier right before prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationSettings {
    /// Plain scalar rate in Hz
    pub sample_rate_hz: f64,
    pub window_sec: f64,
    /// Samples per window: ceil(rate * window seconds)
    pub window_len: usize,
    pub steptol: f64,
    pub bout_min_len: u32,
    pub bout_max_idle: f64,
    pub device: ExecutionDevice,
    /// Always off; the pipeline owns its own logging
    pub verbose: bool,
}

/// Resolves tuning against the runtime sample rate. Window seconds default
/// to 1 when unset, thresholds default to zero, verbosity is forced off.
pub fn normalize_invocation(
    tuning: &ClassifierTuning,
    sample_rate_hz: f64,
    device: ExecutionDevice,
) -> InvocationSettings {
    let window_sec = tuning.window_sec.unwrap_or(1.0);
    InvocationSettings {
        sample_rate_hz,
        window_sec,
        window_len: (sample_rate_hz * window_sec).ceil() as usize,
        steptol: tuning.steptol.unwrap_or(0.0),
        bout_min_len: tuning.bout_min_len.unwrap_or(0),
        bout_max_idle: tuning.bout_max_idle.unwrap_or(0.0),
        device,
        verbose: false,
    }
}

/// Trait for step classifiers
pub trait StepClassifier: Send {
    /// The variant this classifier implements
    fn variant(&self) -> ModelVariant;

    /// Tuning to feed into [`normalize_invocation`]
    fn tuning(&self) -> ClassifierTuning;

    /// Accept normalized settings before prediction
    fn apply_settings(&mut self, settings: &InvocationSettings) -> Result<(), ClassifierError>;

    /// Predict step counts over a clean frame
    fn predict(&mut self, frame: &SampleFrame) -> Result<Prediction, ClassifierError>;
}

/// Trait for classifier loaders
pub trait ClassifierLoader: Send + Sync {
    /// Produce a classifier for the variant on the device
    fn load(
        &self,
        variant: ModelVariant,
        device: ExecutionDevice,
    ) -> Result<Box<dyn StepClassifier>, ClassifierError>;
}

/// Configures the classifier from its own tuning and runs its single
/// predict entry point. Configuration failures wrap as `ModelLoad`,
/// prediction failures as `ModelPrediction`.
pub fn invoke(
    classifier: &mut dyn StepClassifier,
    frame: &SampleFrame,
    rate: &RateEstimate,
    device: ExecutionDevice,
) -> Result<Prediction, PipelineError> {
    let settings = normalize_invocation(&classifier.tuning(), rate.hz, device);
    log::debug!(
        "invoking {} classifier: window_len={} steptol={}",
        classifier.variant().as_str(),
        settings.window_len,
        settings.steptol
    );
    classifier
        .apply_settings(&settings)
        .map_err(|e| PipelineError::ModelLoad {
            variant: classifier.variant().as_str().to_string(),
            reason: e.to_string(),
        })?;
    classifier
        .predict(frame)
        .map_err(|e| PipelineError::ModelPrediction(e.to_string()))
}
