//! Error types for the step pipeline

use serde::Serialize;
use thiserror::Error;

/// A single offending cell collected during validation.
///
/// Rows are 1-based for user display. `value` holds the offending text
/// verbatim; it is `None` when the cell was empty to begin with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellIssue {
    pub column: String,
    pub row: usize,
    pub value: Option<String>,
}

impl CellIssue {
    pub fn new(column: &str, row: usize, value: Option<String>) -> Self {
        CellIssue {
            column: column.to_string(),
            row,
            value,
        }
    }
}

fn rows_of(issues: &[CellIssue]) -> String {
    let rows: Vec<String> = issues.iter().map(|i| i.row.to_string()).collect();
    format!("[{}]", rows.join(", "))
}

fn values_of(issues: &[CellIssue]) -> String {
    let values: Vec<String> = issues
        .iter()
        .map(|i| format!("{:?}", i.value.as_deref().unwrap_or("")))
        .collect();
    format!("[{}]", values.join(", "))
}

/// Renders issues grouped per column, one clause per column.
fn render_by_column(issues: &[CellIssue], what: &str, with_values: bool) -> String {
    let mut columns: Vec<&str> = Vec::new();
    for issue in issues {
        if !columns.contains(&issue.column.as_str()) {
            columns.push(&issue.column);
        }
    }
    let clauses: Vec<String> = columns
        .iter()
        .map(|col| {
            let of_col: Vec<CellIssue> = issues
                .iter()
                .filter(|i| i.column == *col)
                .cloned()
                .collect();
            if with_values {
                format!(
                    "Column '{}' has {} at rows {}: {}",
                    col,
                    what,
                    rows_of(&of_col),
                    values_of(&of_col)
                )
            } else {
                format!("Column '{}' has {} at rows {}", col, what, rows_of(&of_col))
            }
        })
        .collect();
    clauses.join("; ")
}

/// Errors that can occur while preparing and processing accelerometer data
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid column mapping: {0}")]
    Schema(String),

    #[error("Data type validation failed: {}", render_by_column(.0, "non-numeric values", true))]
    TypeCoercion(Vec<CellIssue>),

    #[error("Missing data found: {}", render_by_column(.0, "missing values", false))]
    MissingData(Vec<CellIssue>),

    #[error("Unable to parse time column: invalid timestamps at rows {}: {}", rows_of(.0), values_of(.0))]
    TimeParse(Vec<CellIssue>),

    #[error("Timestamps out of order at rows {}: {}", rows_of(.0), values_of(.0))]
    NonMonotonicTime(Vec<CellIssue>),

    #[error("Invalid {option} value '{value}': {reason}")]
    Config {
        option: String,
        value: String,
        reason: String,
    },

    #[error("Insufficient data for resampling: need at least {required} data points, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Unable to infer sample rate: {0}")]
    SampleRateInference(String),

    #[error("Failed to load {variant} model: {reason}")]
    ModelLoad { variant: String, reason: String },

    #[error("Model prediction failed: {0}")]
    ModelPrediction(String),

    #[error("Failed to read input table: {0}")]
    TableRead(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Offending-cell details for errors that carry them.
    pub fn cell_issues(&self) -> Option<&[CellIssue]> {
        match self {
            PipelineError::TypeCoercion(issues)
            | PipelineError::MissingData(issues)
            | PipelineError::TimeParse(issues)
            | PipelineError::NonMonotonicTime(issues) => Some(issues),
            _ => None,
        }
    }

    pub fn config(option: &str, value: &str, reason: &str) -> Self {
        PipelineError::Config {
            option: option.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}
