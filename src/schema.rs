//! Schema mapping and type validation
//!
//! First stage of the pipeline: renames the caller's columns onto the
//! canonical `time, x, y, z` layout and coerces the axis columns to
//! numbers, collecting offending cells instead of stopping at the first.

use crate::error::{CellIssue, PipelineError};
use crate::table::{CellValue, RawTable};

/// Canonical column names, in mapping order.
pub const CANONICAL_COLUMNS: [&str; 4] = ["time", "x", "y", "z"];

/// How many offending cells to report per column.
const MAX_EXAMPLES: usize = 5;

/// Renames the four mapped columns onto the canonical layout. All other
/// columns pass through unchanged and row order is preserved.
pub fn map_columns(mut table: RawTable, txyz: &[String]) -> Result<RawTable, PipelineError> {
    if txyz.len() != 4 {
        return Err(PipelineError::Schema(format!(
            "txyz must contain exactly 4 column names (time, x, y, z), got {}",
            txyz.len()
        )));
    }
    let missing: Vec<String> = txyz
        .iter()
        .filter(|name| !table.has_column(name))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::Schema(format!(
            "Missing columns: {}. Available columns: {}",
            missing.join(", "),
            table.column_names().join(", ")
        )));
    }
    let pairs: Vec<(&str, &str)> = txyz
        .iter()
        .map(String::as_str)
        .zip(CANONICAL_COLUMNS)
        .collect();
    table.rename_simultaneous(&pairs);
    Ok(table)
}

/// Fully validated axis columns; no nulls remain after this stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAxes {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

/// Coerces the canonical x/y/z columns to numbers.
///
/// Cells that fail conversion raise a `TypeCoercion` error carrying up to
/// five examples per column (1-based rows, offending text verbatim). Cells
/// that are empty or parse to NaN count as missing instead and raise
/// `MissingData` once coercion is clean.
pub fn validate_axes(table: &RawTable) -> Result<ValidatedAxes, PipelineError> {
    let mut malformed: Vec<CellIssue> = Vec::new();
    let mut missing: Vec<CellIssue> = Vec::new();
    let mut columns: Vec<Vec<Option<f64>>> = Vec::with_capacity(3);

    for name in &CANONICAL_COLUMNS[1..] {
        let cells = table
            .column(name)
            .ok_or_else(|| PipelineError::Schema(format!("column '{}' not mapped", name)))?;
        columns.push(coerce_column(name, cells, &mut malformed, &mut missing));
    }

    if !malformed.is_empty() {
        return Err(PipelineError::TypeCoercion(malformed));
    }
    if !missing.is_empty() {
        return Err(PipelineError::MissingData(missing));
    }

    let unwrap_all = |column: Vec<Option<f64>>| -> Vec<f64> {
        // no nulls can remain once both issue lists are empty
        column.into_iter().flatten().collect()
    };
    let mut iter = columns.into_iter();
    Ok(ValidatedAxes {
        x: unwrap_all(iter.next().unwrap_or_default()),
        y: unwrap_all(iter.next().unwrap_or_default()),
        z: unwrap_all(iter.next().unwrap_or_default()),
    })
}

fn coerce_column(
    name: &str,
    cells: &[CellValue],
    malformed: &mut Vec<CellIssue>,
    missing: &mut Vec<CellIssue>,
) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(cells.len());
    let mut malformed_in_column = 0usize;
    let mut missing_in_column = 0usize;
    for (idx, cell) in cells.iter().enumerate() {
        let row = idx + 1;
        let value = match cell {
            CellValue::Number(n) if n.is_nan() => None,
            CellValue::Number(n) => Some(*n),
            CellValue::Null => None,
            CellValue::Text(text) => match text.trim().parse::<f64>() {
                Ok(v) if v.is_nan() => None,
                Ok(v) => Some(v),
                Err(_) => {
                    if malformed_in_column < MAX_EXAMPLES {
                        malformed.push(CellIssue::new(name, row, Some(text.clone())));
                        malformed_in_column += 1;
                    }
                    out.push(None);
                    continue;
                }
            },
        };
        if value.is_none() && missing_in_column < MAX_EXAMPLES {
            missing.push(CellIssue::new(name, row, None));
            missing_in_column += 1;
        }
        out.push(value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table(csv: &str) -> RawTable {
        RawTable::from_csv_reader(csv.as_bytes()).unwrap()
    }

    fn mapping(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_mapping_renames_and_passes_other_columns_through() {
        let raw = table("ts,ax,ay,az,hr\n2023-01-01 10:00:00,0.1,0.2,1.0,61\n");
        let mapped = map_columns(raw, &mapping(&["ts", "ax", "ay", "az"])).unwrap();
        assert_eq!(mapped.column_names(), &["time", "x", "y", "z", "hr"]);
        assert_eq!(
            mapped.column("hr").unwrap()[0],
            CellValue::Text("61".to_string())
        );
    }

    #[test]
    fn test_mapping_arity_is_checked() {
        let raw = table("a,b\n1,2\n");
        let err = map_columns(raw, &mapping(&["a", "b", "c"])).unwrap_err();
        assert!(err.to_string().contains("exactly 4"));
        assert!(err.to_string().contains("got 3"));
    }

    #[test]
    fn test_mapping_reports_missing_and_available_columns() {
        let raw = table("ts,ax,ay\n1,2,3\n");
        let err = map_columns(raw, &mapping(&["ts", "ax", "ay", "az"])).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Missing columns: az"));
        assert!(message.contains("Available columns: ts, ax, ay"));
    }

    #[test]
    fn test_axis_swap_mapping() {
        let raw = table("time,z,y,x\n2023-01-01,1.0,0.2,0.3\n");
        let mapped = map_columns(raw, &mapping(&["time", "z", "y", "x"])).unwrap();
        // position 2 of the mapping is canonical x
        assert_eq!(mapped.column_names(), &["time", "x", "y", "z"]);
        let axes = validate_axes(&mapped).unwrap();
        assert_eq!(axes.x, vec![1.0]);
        assert_eq!(axes.z, vec![0.3]);
    }

    #[test]
    fn test_non_numeric_cell_reported_with_row_and_value() {
        let raw = table(
            "time,x,y,z\n\
             2023-01-01 10:00:00,0.1,0.0,1.0\n\
             2023-01-01 10:00:01,0.2,0.0,1.0\n\
             2023-01-01 10:00:02,abc,0.0,1.0\n\
             2023-01-01 10:00:03,0.3,0.0,1.0\n",
        );
        let mapped = map_columns(raw, &mapping(&["time", "x", "y", "z"])).unwrap();
        let err = validate_axes(&mapped).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, PipelineError::TypeCoercion(_)));
        assert!(message.contains("'x'"), "names the column: {}", message);
        assert!(message.contains("[3]"), "names the 1-based row: {}", message);
        assert!(message.contains("\"abc\""), "quotes the value: {}", message);
    }

    #[test]
    fn test_coercion_examples_capped_at_five_per_column() {
        let mut csv = String::from("time,x,y,z\n");
        for i in 0..8 {
            csv.push_str(&format!("2023-01-01 10:00:0{},bad{},0.0,1.0\n", i, i));
        }
        let mapped = map_columns(table(&csv), &mapping(&["time", "x", "y", "z"])).unwrap();
        let err = validate_axes(&mapped).unwrap_err();
        match err {
            PipelineError::TypeCoercion(issues) => assert_eq!(issues.len(), 5),
            other => panic!("expected TypeCoercion, got {:?}", other),
        }
    }

    #[test]
    fn test_nan_text_counts_as_missing_not_malformed() {
        let raw = table("time,x,y,z\n2023-01-01,nan,0.0,1.0\n");
        let mapped = map_columns(raw, &mapping(&["time", "x", "y", "z"])).unwrap();
        let err = validate_axes(&mapped).unwrap_err();
        assert!(matches!(err, PipelineError::MissingData(_)));
    }

    #[test]
    fn test_missing_values_reported_per_column() {
        let raw = table("time,x,y,z\n2023-01-01,,0.0,1.0\n2023-01-02,0.1,0.0,1.0\n");
        let mapped = map_columns(raw, &mapping(&["time", "x", "y", "z"])).unwrap();
        let err = validate_axes(&mapped).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, PipelineError::MissingData(_)));
        assert!(message.contains("'x'"));
        assert!(message.contains("[1]"));
    }

    #[test]
    fn test_clean_numeric_table_passes() {
        let raw = table("time,x,y,z\n2023-01-01,0.1,0.2,0.97\n2023-01-02,-0.1,0.0,1.02\n");
        let mapped = map_columns(raw, &mapping(&["time", "x", "y", "z"])).unwrap();
        let axes = validate_axes(&mapped).unwrap();
        assert_eq!(axes.x, vec![0.1, -0.1]);
        assert_eq!(axes.y, vec![0.2, 0.0]);
        assert_eq!(axes.z, vec![0.97, 1.02]);
    }
}
