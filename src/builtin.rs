//! Bundled reference classifier
//!
//! A deterministic windowed peak counter over the motion magnitude. It
//! stands in for the trained models so the pipeline is executable end to
//! end: stationary input yields zero steps, oscillating input counts one
//! step per local magnitude peak. Windows containing a missing sample are
//! left undecided.

use crate::config::{ExecutionDevice, ModelVariant};
use crate::model::{
    ClassifierError, ClassifierLoader, ClassifierTuning, InvocationSettings, StepClassifier,
};
use crate::types::{Prediction, SampleFrame, StepPoint, StepSeries, WindowMeta};

/// Magnitude a local maximum must exceed to count as a step, in g.
const PEAK_THRESHOLD_G: f64 = 0.05;

/// Windowed peak counter. Counts local maxima of the per-sample ENMO
/// within fixed-length sample windows; a trailing partial window is
/// dropped.
pub struct ReferenceClassifier {
    variant: ModelVariant,
    settings: Option<InvocationSettings>,
}

impl ReferenceClassifier {
    pub fn new(variant: ModelVariant) -> Self {
        ReferenceClassifier {
            variant,
            settings: None,
        }
    }
}

impl StepClassifier for ReferenceClassifier {
    fn variant(&self) -> ModelVariant {
        self.variant
    }

    fn tuning(&self) -> ClassifierTuning {
        ClassifierTuning {
            window_sec: Some(10.0),
            steptol: Some(3.0),
            bout_min_len: None,
            bout_max_idle: None,
        }
    }

    fn apply_settings(&mut self, settings: &InvocationSettings) -> Result<(), ClassifierError> {
        if settings.window_len == 0 {
            return Err("window length must be at least 1 sample".into());
        }
        self.settings = Some(settings.clone());
        Ok(())
    }

    fn predict(&mut self, frame: &SampleFrame) -> Result<Prediction, ClassifierError> {
        let settings = self
            .settings
            .as_ref()
            .ok_or("classifier invoked before settings were applied")?;
        let window_len = settings.window_len;

        let mut points = Vec::new();
        let mut windows = Vec::new();
        let mut step_times = Vec::new();

        let full_windows = frame.len() / window_len;
        for w in 0..full_windows {
            let lo = w * window_len;
            let hi = lo + window_len;
            let start = frame.timestamps()[lo];

            let magnitudes: Vec<Option<f64>> = (lo..hi).map(|i| frame.enmo(i)).collect();
            let valid_samples = magnitudes.iter().filter(|m| m.is_some()).count();
            if valid_samples < window_len {
                // undecided window
                points.push(StepPoint { time: start, steps: None });
                windows.push(WindowMeta {
                    start,
                    is_walk: false,
                    valid_samples,
                });
                continue;
            }

            let mut steps = 0.0;
            for i in 1..window_len - 1 {
                let (prev, here, next) = (
                    magnitudes[i - 1].unwrap_or(0.0),
                    magnitudes[i].unwrap_or(0.0),
                    magnitudes[i + 1].unwrap_or(0.0),
                );
                if here > prev && here >= next && here > PEAK_THRESHOLD_G {
                    steps += 1.0;
                    step_times.push(frame.timestamps()[lo + i]);
                }
            }
            points.push(StepPoint {
                time: start,
                steps: Some(steps),
            });
            windows.push(WindowMeta {
                start,
                is_walk: steps >= settings.steptol,
                valid_samples,
            });
        }

        Ok(Prediction {
            steps: StepSeries::new(points),
            windows,
            step_times,
        })
    }
}

/// Loader producing the bundled classifier for every known variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceLoader;

impl ClassifierLoader for ReferenceLoader {
    fn load(
        &self,
        variant: ModelVariant,
        _device: ExecutionDevice,
    ) -> Result<Box<dyn StepClassifier>, ClassifierError> {
        Ok(Box::new(ReferenceClassifier::new(variant)))
    }
}
