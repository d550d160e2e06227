//! CSV encoder
//!
//! Writes rows as delimiter-separated values with an optional header row.
//! Columns are detected from the rows themselves.

use tracing::{debug, warn};

use crate::config::CsvConfig;
use crate::error::{EncodeError, Result};
use crate::export::source::Row;

use super::{ColumnSet, RowEncoder, cell_text};

/// Encoder for CSV format
///
/// Columns come from the first non-empty batch, sorted by name. Columns
/// first seen in a later batch are appended to every following row, but
/// the header (already written) does not list them, so those rows carry
/// more fields than the header. Sources with a varying shape should put
/// every column in the first batch.
pub struct CsvEncoder {
    config: CsvConfig,
    columns: ColumnSet,
    /// Whether the header row has been emitted
    header_written: bool,
    /// Number of rows encoded
    encoded: usize,
}

impl CsvEncoder {
    /// Create a new CSV encoder
    ///
    /// # Arguments
    /// * `config` - Delimiter, quote, terminator and NULL settings
    ///
    /// # Returns
    /// * `Result<Self>` - New encoder or an error for unusable settings
    pub fn new(config: CsvConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| EncodeError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            config,
            columns: ColumnSet::default(),
            header_written: false,
            encoded: 0,
        })
    }

    /// Column names in output order
    pub fn columns(&self) -> &[String] {
        self.columns.names()
    }

    fn push_line(&self, out: &mut String, fields: impl Iterator<Item = String>) {
        let mut first = true;
        for field in fields {
            if !first {
                out.push(self.config.delimiter);
            }
            out.push_str(&field);
            first = false;
        }
        out.push_str(&self.config.line_terminator);
    }

    /// Escape a CSV value if necessary
    ///
    /// Values containing the delimiter, the quote character, CR or LF are
    /// enclosed in quotes with embedded quotes doubled.
    fn escape_value(&self, value: &str) -> String {
        let quote = self.config.quote;
        let needs_quoting = value
            .chars()
            .any(|c| c == self.config.delimiter || c == quote || c == '\n' || c == '\r');
        if needs_quoting {
            let doubled: String = [quote, quote].iter().collect();
            format!("{quote}{}{quote}", value.replace(quote, &doubled))
        } else {
            value.to_string()
        }
    }
}

impl RowEncoder for CsvEncoder {
    fn encode_batch(&mut self, rows: &[Row]) -> Result<Vec<u8>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let added = self.columns.observe(rows);
        if self.header_written && added > 0 {
            // The header is already out; earlier rows simply lack these columns
            warn!(
                "{} CSV column(s) appeared after the header was written; \
                 later rows have more fields than the header",
                added
            );
        }

        let mut out = String::new();
        if !self.header_written {
            if self.config.header {
                let names: Vec<String> =
                    self.columns.names().iter().map(|n| self.escape_value(n)).collect();
                self.push_line(&mut out, names.into_iter());
            }
            self.header_written = true;
        }

        for row in rows {
            let fields: Vec<String> = self
                .columns
                .names()
                .iter()
                .map(|name| match cell_text(row.get(name)) {
                    Some(text) => self.escape_value(&text),
                    None => self.config.null_value.clone(),
                })
                .collect();
            self.push_line(&mut out, fields.into_iter());
        }

        self.encoded += rows.len();
        Ok(out.into_bytes())
    }

    fn finish(&mut self) -> Result<Vec<u8>> {
        debug!("CSV encoder finished: {} rows, {} columns", self.encoded, self.columns.names().len());
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn rows(values: Vec<Value>) -> Vec<Row> {
        values.into_iter().map(|v| v.as_object().cloned().unwrap()).collect()
    }

    fn encode(config: CsvConfig, batches: Vec<Vec<Value>>) -> String {
        let mut encoder = CsvEncoder::new(config).unwrap();
        let mut out = Vec::new();
        for batch in batches {
            out.extend(encoder.encode_batch(&rows(batch)).unwrap());
        }
        out.extend(encoder.finish().unwrap());
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_csv_basic() {
        let output = encode(
            CsvConfig::default(),
            vec![vec![json!({ "name": "Alice", "age": 30 }), json!({ "name": "Bob", "age": 25 })]],
        );
        assert_eq!(output, "age,name\n30,Alice\n25,Bob\n");
    }

    #[test]
    fn test_csv_special_characters() {
        let output = encode(
            CsvConfig::default(),
            vec![vec![
                json!({ "text": "Hello, world!" }),
                json!({ "text": "Quote: \"test\"" }),
                json!({ "text": "Newline\ntest" }),
            ]],
        );
        assert!(output.contains("\"Hello, world!\""));
        assert!(output.contains("\"Quote: \"\"test\"\"\""));
        assert!(output.contains("\"Newline\ntest\""));
    }

    #[test]
    fn test_csv_null_and_missing_values() {
        let output = encode(
            CsvConfig::default(),
            vec![vec![json!({ "a": null, "b": 1 }), json!({ "b": 2 })]],
        );
        assert_eq!(output, "a,b\nNULL,1\nNULL,2\n");
    }

    #[test]
    fn test_csv_custom_delimiter_and_quote() {
        let config = CsvConfig {
            delimiter: ';',
            quote: '\'',
            line_terminator: "\r\n".to_string(),
            header: false,
            null_value: String::new(),
        };
        let output = encode(
            config,
            vec![vec![json!({ "a": "x;y", "b": "it's", "c": "plain, fine" })]],
        );
        assert_eq!(output, "'x;y';'it''s';plain, fine\r\n");
    }

    #[test]
    fn test_csv_late_columns_extend_rows_past_header() {
        let output = encode(
            CsvConfig::default(),
            vec![vec![json!({ "id": 1 })], vec![json!({ "id": 2, "name": "Bob" })]],
        );
        assert_eq!(output, "id\n1\n2,Bob\n");
    }

    #[test]
    fn test_csv_nested_values_as_json() {
        let output = encode(
            CsvConfig::default(),
            vec![vec![json!({ "tags": ["a", "b"] })]],
        );
        assert_eq!(output, "tags\n\"[\"\"a\"\",\"\"b\"\"]\"\n");
    }

    #[test]
    fn test_csv_rejects_quote_equal_to_delimiter() {
        let config = CsvConfig {
            quote: ',',
            ..CsvConfig::default()
        };
        assert!(CsvEncoder::new(config).is_err());
    }

    #[test]
    fn test_csv_empty_export() {
        assert_eq!(encode(CsvConfig::default(), vec![]), "");
    }
}
