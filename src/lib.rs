//! Stepflow - Accelerometer preparation and step-count pipeline
//!
//! Stepflow turns raw tri-axial accelerometer tables into step-count
//! reports through a deterministic pipeline: schema mapping → temporal
//! normalization → sample-rate resolution → conditional resampling →
//! wear-time exclusion → classification → aggregation → report.
//!
//! ## Entry points
//!
//! - [`StepPipeline::process`]: run a [`RawTable`] end to end
//! - [`RawTable`]: build the input from CSV or columnar JSON
//! - [`ProcessingConfig`]: the knobs of a run

pub mod aggregate;
pub mod artifacts;
pub mod builtin;
pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod resample;
pub mod samplerate;
pub mod schema;
pub mod summaries;
pub mod table;
pub mod types;
pub mod wear;

pub use config::{ExecutionDevice, ModelVariant, ProcessingConfig};
pub use error::PipelineError;
pub use pipeline::{ProcessOutcome, StepPipeline};
pub use report::SummaryReport;
pub use table::RawTable;

// Classifier seam exports
pub use model::{ClassifierLoader, StepClassifier};
pub use types::{Prediction, RateEstimate, RateSource, SampleFrame, StepSeries};

/// Stepflow version embedded in reports and artifact metadata
pub const STEPFLOW_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for exported artifacts
pub const PRODUCER_NAME: &str = "stepflow";
