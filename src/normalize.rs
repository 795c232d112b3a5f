//! Temporal normalization
//!
//! Parses the time column into a UTC index, enforces the strictly
//! increasing ordering invariant and applies optional start/end trimming.
//! Trimming only removes rows; timestamps are never fabricated.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::config::{provided, ProcessingConfig};
use crate::error::{CellIssue, PipelineError};
use crate::schema::ValidatedAxes;
use crate::table::{CellValue, RawTable};
use crate::types::SampleFrame;

const MAX_EXAMPLES: usize = 5;

/// Accepted layouts for naive timestamps, tried in order. Naive values are
/// taken as UTC.
const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Temporal normalizer: turns the mapped table plus validated axes into a
/// time-indexed sample frame.
pub struct Normalizer;

impl Normalizer {
    /// Parses and indexes the time column.
    ///
    /// Unparseable non-null values raise `TimeParse`; originally-null cells
    /// raise `MissingData`; out-of-order timestamps raise
    /// `NonMonotonicTime`. An empty frame after trimming is not an error
    /// here, downstream guards own that.
    pub fn index_frame(
        table: &RawTable,
        axes: ValidatedAxes,
        config: &ProcessingConfig,
    ) -> Result<SampleFrame, PipelineError> {
        let cells = table
            .column("time")
            .ok_or_else(|| PipelineError::Schema("column 'time' not mapped".to_string()))?;

        let mut timestamps = Vec::with_capacity(cells.len());
        let mut malformed: Vec<CellIssue> = Vec::new();
        let mut missing: Vec<CellIssue> = Vec::new();
        for (idx, cell) in cells.iter().enumerate() {
            let row = idx + 1;
            let parsed = match cell {
                CellValue::Null => {
                    if missing.len() < MAX_EXAMPLES {
                        missing.push(CellIssue::new("time", row, None));
                    }
                    None
                }
                CellValue::Number(seconds) => {
                    let parsed = epoch_seconds_to_utc(*seconds);
                    if parsed.is_none() && malformed.len() < MAX_EXAMPLES {
                        malformed.push(CellIssue::new("time", row, Some(seconds.to_string())));
                    }
                    parsed
                }
                CellValue::Text(text) => {
                    let parsed = parse_timestamp(text);
                    if parsed.is_none() && malformed.len() < MAX_EXAMPLES {
                        malformed.push(CellIssue::new("time", row, Some(text.clone())));
                    }
                    parsed
                }
            };
            if let Some(ts) = parsed {
                timestamps.push(ts);
            }
        }
        if !malformed.is_empty() {
            return Err(PipelineError::TimeParse(malformed));
        }
        if !missing.is_empty() {
            return Err(PipelineError::MissingData(missing));
        }

        let n = timestamps.len();
        let frame = SampleFrame::from_parts(
            timestamps,
            axes.x.into_iter().map(Some).collect(),
            axes.y.into_iter().map(Some).collect(),
            axes.z.into_iter().map(Some).collect(),
        )?;
        debug_assert_eq!(frame.len(), n);

        let start = boundary("start_time", &config.start_time)?;
        let end = boundary("end_time", &config.end_time)?;
        if start.is_none() && end.is_none() {
            return Ok(frame);
        }
        let trimmed = frame.filter_rows(|_, ts| {
            start.map_or(true, |s| ts >= s) && end.map_or(true, |e| ts <= e)
        });
        log::debug!(
            "trimmed frame to {} of {} rows (start={:?}, end={:?})",
            trimmed.len(),
            frame.len(),
            start,
            end
        );
        Ok(trimmed)
    }
}

/// Parses a timestamp string: RFC 3339 first, then the fixed naive layouts,
/// then a bare date (midnight).
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return Some(Utc.from_utc_datetime(&midnight));
    }
    None
}

/// Unix seconds (fractional allowed) to UTC.
fn epoch_seconds_to_utc(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}

fn boundary(
    option: &str,
    value: &Option<String>,
) -> Result<Option<DateTime<Utc>>, PipelineError> {
    match provided(value) {
        None => Ok(None),
        Some(text) => match parse_timestamp(text) {
            Some(ts) => Ok(Some(ts)),
            None => Err(PipelineError::config(
                option,
                text,
                "unrecognized datetime format (e.g. '2023-01-01 10:00:00')",
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame_from_csv(csv: &str, config: &ProcessingConfig) -> Result<SampleFrame, PipelineError> {
        let table = RawTable::from_csv_reader(csv.as_bytes()).unwrap();
        let mapped = crate::schema::map_columns(table, &config.txyz).unwrap();
        let axes = crate::schema::validate_axes(&mapped).unwrap();
        Normalizer::index_frame(&mapped, axes, config)
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2023-01-01 10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-01 10:00:00.000"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-01T10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-01T10:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2023/01/01 10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-01 10:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2023-01-01"),
            Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("not a date"), None);
    }

    #[test]
    fn test_epoch_seconds_accepted() {
        let config = ProcessingConfig::default();
        let value = serde_json::json!({
            "time": [1672567200.0, 1672567201.0],
            "x": [0.1, 0.2],
            "y": [0.0, 0.0],
            "z": [1.0, 1.0],
        });
        let table = RawTable::from_json_columns(&value).unwrap();
        let mapped = crate::schema::map_columns(table, &config.txyz).unwrap();
        let axes = crate::schema::validate_axes(&mapped).unwrap();
        let frame = Normalizer::index_frame(&mapped, axes, &config).unwrap();
        assert_eq!(
            frame.first_timestamp(),
            Some(Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_unparseable_timestamp_reports_row_and_value() {
        let config = ProcessingConfig::default();
        let err = frame_from_csv(
            "time,x,y,z\n2023-01-01 10:00:00,0.1,0.0,1.0\nyesterday,0.2,0.0,1.0\n",
            &config,
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, PipelineError::TimeParse(_)));
        assert!(message.contains("[2]"), "{}", message);
        assert!(message.contains("\"yesterday\""), "{}", message);
    }

    #[test]
    fn test_null_timestamp_is_missing_data() {
        let config = ProcessingConfig::default();
        let err = frame_from_csv(
            "time,x,y,z\n,0.1,0.0,1.0\n2023-01-01 10:00:01,0.2,0.0,1.0\n",
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::MissingData(_)));
        assert!(err.to_string().contains("'time'"));
    }

    #[test]
    fn test_parse_failures_take_precedence_over_missing() {
        let config = ProcessingConfig::default();
        let err = frame_from_csv(
            "time,x,y,z\n,0.1,0.0,1.0\nbogus,0.2,0.0,1.0\n",
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::TimeParse(_)));
    }

    #[test]
    fn test_out_of_order_timestamps_rejected() {
        let config = ProcessingConfig::default();
        let err = frame_from_csv(
            "time,x,y,z\n2023-01-01 10:00:01,0.1,0.0,1.0\n2023-01-01 10:00:00,0.2,0.0,1.0\n",
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::NonMonotonicTime(_)));
    }

    #[test]
    fn test_trim_is_inclusive_on_both_ends() {
        let config = ProcessingConfig {
            start_time: Some("2023-01-01 10:00:01".to_string()),
            end_time: Some("2023-01-01 10:00:02".to_string()),
            ..Default::default()
        };
        let frame = frame_from_csv(
            "time,x,y,z\n\
             2023-01-01 10:00:00,0.1,0.0,1.0\n\
             2023-01-01 10:00:01,0.2,0.0,1.0\n\
             2023-01-01 10:00:02,0.3,0.0,1.0\n\
             2023-01-01 10:00:03,0.4,0.0,1.0\n",
            &config,
        )
        .unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.x()[0], Some(0.2));
        assert_eq!(frame.x()[1], Some(0.3));
    }

    #[test]
    fn test_placeholder_boundary_is_ignored() {
        let config = ProcessingConfig {
            start_time: Some("string".to_string()),
            ..Default::default()
        };
        let frame = frame_from_csv("time,x,y,z\n2023-01-01 10:00:00,0.1,0.0,1.0\n", &config);
        assert_eq!(frame.unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_boundary_is_config_error() {
        let config = ProcessingConfig {
            start_time: Some("not-a-time".to_string()),
            ..Default::default()
        };
        let err = frame_from_csv("time,x,y,z\n2023-01-01 10:00:00,0.1,0.0,1.0\n", &config)
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("start_time"), "{}", message);
        assert!(message.contains("not-a-time"), "{}", message);
    }

    #[test]
    fn test_trim_can_leave_an_empty_frame() {
        let config = ProcessingConfig {
            start_time: Some("2024-01-01 00:00:00".to_string()),
            ..Default::default()
        };
        let frame = frame_from_csv("time,x,y,z\n2023-01-01 10:00:00,0.1,0.0,1.0\n", &config);
        assert!(frame.unwrap().is_empty());
    }
}
