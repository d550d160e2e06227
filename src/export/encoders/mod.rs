//! Format encoders for export operations
//!
//! An encoder turns batches of rows into the bytes of an output format.
//! Encoders are pure: the coordinator hands their output to a sink.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{CsvConfig, PdfConfig};
use crate::error::{ExportError, Result};

use super::source::Row;

pub mod csv;
pub mod pdf;

pub use csv::CsvEncoder;
pub use pdf::PdfEncoder;

/// Output formats an export job can produce
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Pdf,
}

impl ExportFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        ext.parse().ok()
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Csv => write!(f, "CSV"),
            ExportFormat::Pdf => write!(f, "PDF"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(ExportError::Generic(format!(
                "Unsupported export format: {other}. Supported formats: csv, pdf"
            ))),
        }
    }
}

/// Format together with its format-specific settings
#[derive(Debug, Clone, PartialEq)]
pub enum FormatOptions {
    Csv(CsvConfig),
    Pdf(PdfConfig),
}

impl FormatOptions {
    pub fn format(&self) -> ExportFormat {
        match self {
            FormatOptions::Csv(_) => ExportFormat::Csv,
            FormatOptions::Pdf(_) => ExportFormat::Pdf,
        }
    }

    /// Build the encoder for these options
    pub fn build_encoder(&self) -> Result<Box<dyn RowEncoder>> {
        Ok(match self {
            FormatOptions::Csv(config) => Box::new(CsvEncoder::new(config.clone())?),
            FormatOptions::Pdf(config) => Box::new(PdfEncoder::new(config.clone())?),
        })
    }
}

/// Trait for turning rows into output bytes
pub trait RowEncoder: Send {
    /// Encode a batch of rows
    ///
    /// Streaming formats return the bytes for these rows; paged formats
    /// may buffer and return nothing until [`finish`](Self::finish).
    fn encode_batch(&mut self, rows: &[Row]) -> Result<Vec<u8>>;

    /// Produce any trailing bytes (footers, buffered pages)
    fn finish(&mut self) -> Result<Vec<u8>>;
}

/// Ordered set of column names discovered from rows
///
/// The first batch fixes the initial order (sorted by name); columns first
/// seen in later batches are appended, sorted among themselves.
#[derive(Debug, Default, Clone)]
pub(crate) struct ColumnSet {
    names: Vec<String>,
}

impl ColumnSet {
    /// Record the columns of `rows`, returning how many were new
    pub(crate) fn observe(&mut self, rows: &[Row]) -> usize {
        let mut new_fields = std::collections::BTreeSet::new();
        for row in rows {
            for key in row.keys() {
                if !self.names.contains(key) {
                    new_fields.insert(key.clone());
                }
            }
        }
        let added = new_fields.len();
        self.names.extend(new_fields);
        added
    }

    pub(crate) fn names(&self) -> &[String] {
        &self.names
    }
}

/// Plain-text rendering of a cell value
///
/// Returns `None` for null or missing values so callers can apply their
/// own NULL representation. Strings are rendered without JSON quoting;
/// arrays and objects as compact JSON.
pub(crate) fn cell_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ExportFormat::from_path(Path::new("out/data.CSV")), Some(ExportFormat::Csv));
        assert_eq!(ExportFormat::from_path(Path::new("report.pdf")), Some(ExportFormat::Pdf));
        assert_eq!(ExportFormat::from_path(Path::new("report.txt")), None);
        assert_eq!(ExportFormat::from_path(Path::new("report")), None);
    }

    #[test]
    fn test_column_set_appends_new_columns() {
        let mut columns = ColumnSet::default();
        assert_eq!(columns.observe(&[row(json!({ "b": 1, "a": 2 }))]), 2);
        assert_eq!(columns.observe(&[row(json!({ "a": 3, "d": 4, "c": 5 }))]), 2);
        assert_eq!(columns.names(), ["a", "b", "c", "d"]);
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(None), None);
        assert_eq!(cell_text(Some(&json!(null))), None);
        assert_eq!(cell_text(Some(&json!("plain"))).unwrap(), "plain");
        assert_eq!(cell_text(Some(&json!(1.5))).unwrap(), "1.5");
        assert_eq!(cell_text(Some(&json!({ "k": [1, 2] }))).unwrap(), r#"{"k":[1,2]}"#);
    }
}
