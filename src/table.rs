//! Raw tabular input as it arrives from a CSV export or a JSON payload,
//! before any schema mapping or type validation.

use std::io::Read;
use std::path::Path;

use crate::error::PipelineError;

/// One cell of the raw table.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Text(String),
    Number(f64),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// The cell's submitted form, for error messages. `None` for empty cells.
    pub fn render(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Number(n) => Some(n.to_string()),
        }
    }
}

/// Column-ordered table of raw cells. All columns have the same length and
/// row order is the order of arrival.
#[derive(Debug, Clone)]
pub struct RawTable {
    names: Vec<String>,
    columns: Vec<Vec<CellValue>>,
}

impl RawTable {
    /// Builds a table from named columns, checking that lengths agree.
    pub fn from_columns(columns: Vec<(String, Vec<CellValue>)>) -> Result<Self, PipelineError> {
        let mut names = Vec::with_capacity(columns.len());
        let mut cells = Vec::with_capacity(columns.len());
        let mut expected_len: Option<usize> = None;
        for (name, column) in columns {
            match expected_len {
                None => expected_len = Some(column.len()),
                Some(len) if len != column.len() => {
                    return Err(PipelineError::TableRead(format!(
                        "column '{}' has {} rows, expected {}",
                        name,
                        column.len(),
                        len
                    )));
                }
                Some(_) => {}
            }
            names.push(name);
            cells.push(column);
        }
        Ok(RawTable {
            names,
            columns: cells,
        })
    }

    /// Reads a headered CSV stream. Empty cells become null, everything else
    /// stays text until the validation stage coerces it.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, PipelineError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);
        let names: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if names.is_empty() {
            return Err(PipelineError::TableRead("no header row".to_string()));
        }
        let mut columns: Vec<Vec<CellValue>> = vec![Vec::new(); names.len()];
        for record in csv_reader.records() {
            let record = record?;
            for (idx, column) in columns.iter_mut().enumerate() {
                let cell = record.get(idx).unwrap_or("");
                if cell.is_empty() {
                    column.push(CellValue::Null);
                } else {
                    column.push(CellValue::Text(cell.to_string()));
                }
            }
        }
        Ok(RawTable { names, columns })
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(std::io::BufReader::new(file))
    }

    /// Builds a table from a JSON object of column-name to value-array, the
    /// shape the JSON ingestion endpoint submits.
    pub fn from_json_columns(value: &serde_json::Value) -> Result<Self, PipelineError> {
        let object = value.as_object().ok_or_else(|| {
            PipelineError::TableRead("expected a JSON object of column arrays".to_string())
        })?;
        let mut columns = Vec::with_capacity(object.len());
        for (name, cells) in object {
            let array = cells.as_array().ok_or_else(|| {
                PipelineError::TableRead(format!("column '{}' is not an array", name))
            })?;
            let mut column = Vec::with_capacity(array.len());
            for cell in array {
                let value = match cell {
                    serde_json::Value::Null => CellValue::Null,
                    serde_json::Value::String(s) => CellValue::Text(s.clone()),
                    serde_json::Value::Number(n) => match n.as_f64() {
                        Some(f) => CellValue::Number(f),
                        None => CellValue::Null,
                    },
                    serde_json::Value::Bool(b) => CellValue::Number(if *b { 1.0 } else { 0.0 }),
                    other => {
                        return Err(PipelineError::TableRead(format!(
                            "column '{}' holds unsupported value {}",
                            name, other
                        )))
                    }
                };
                column.push(value);
            }
            columns.push((name.clone(), column));
        }
        Self::from_columns(columns)
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&[CellValue]> {
        let idx = self.names.iter().position(|n| n == name)?;
        Some(&self.columns[idx])
    }

    /// Renames columns in one simultaneous pass, keeping positions. A plain
    /// sequential rename would cascade when a target name is also a source,
    /// e.g. swapping `x` and `z`.
    pub(crate) fn rename_simultaneous(&mut self, pairs: &[(&str, &str)]) {
        self.names = self
            .names
            .iter()
            .map(|name| {
                pairs
                    .iter()
                    .find(|(from, _)| from == name)
                    .map(|(_, to)| to.to_string())
                    .unwrap_or_else(|| name.clone())
            })
            .collect();
    }
}
