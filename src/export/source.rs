//! Row sources for export operations
//!
//! A [`RowSource`] streams rows in batches so an export never has to hold
//! the whole data set in memory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, info};

use crate::error::{Result, SourceError};

/// A single row: column name to value
pub type Row = Map<String, Value>;

/// Trait for streaming rows in batches
#[async_trait]
pub trait RowSource: Send {
    /// Fetch the next batch of rows
    ///
    /// # Returns
    /// * `Result<Option<Vec<Row>>>` - Next batch of rows, or None if exhausted
    async fn next_batch(&mut self) -> Result<Option<Vec<Row>>>;

    /// Close the source and release resources
    async fn close(&mut self) -> Result<()>;
}

/// Source over rows already held in memory
pub struct MemorySource {
    rows: std::vec::IntoIter<Row>,
    batch_size: usize,
}

impl MemorySource {
    pub fn new(rows: Vec<Row>, batch_size: usize) -> Self {
        Self {
            rows: rows.into_iter(),
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl RowSource for MemorySource {
    async fn next_batch(&mut self) -> Result<Option<Vec<Row>>> {
        let batch: Vec<Row> = self.rows.by_ref().take(self.batch_size).collect();
        Ok((!batch.is_empty()).then_some(batch))
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Source reading one JSON object per line from a file
pub struct JsonLinesSource {
    /// `None` once exhausted or closed
    lines: Option<Lines<BufReader<File>>>,
    path: PathBuf,
    batch_size: usize,
    line_number: usize,
    total_fetched: u64,
}

impl JsonLinesSource {
    /// Open a JSON Lines file
    ///
    /// # Arguments
    /// * `path` - Input file path
    /// * `batch_size` - Number of rows per batch
    pub async fn open(path: impl AsRef<Path>, batch_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await.map_err(|e| {
            SourceError::Read(format!("cannot open {}: {}", path.display(), e))
        })?;

        debug!("Opened JSON Lines source: {}", path.display());

        Ok(Self {
            lines: Some(BufReader::new(file).lines()),
            path: path.to_path_buf(),
            batch_size: batch_size.max(1),
            line_number: 0,
            total_fetched: 0,
        })
    }

    fn parse_line(&self, line: &str) -> Result<Row> {
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(row)) => Ok(row),
            Ok(other) => Err(SourceError::InvalidRecord {
                line: self.line_number,
                message: format!("expected a JSON object, found {}", json_kind(&other)),
            }
            .into()),
            Err(e) => Err(SourceError::InvalidRecord {
                line: self.line_number,
                message: e.to_string(),
            }
            .into()),
        }
    }
}

#[async_trait]
impl RowSource for JsonLinesSource {
    async fn next_batch(&mut self) -> Result<Option<Vec<Row>>> {
        let mut batch = Vec::with_capacity(self.batch_size);

        while batch.len() < self.batch_size {
            let Some(lines) = self.lines.as_mut() else {
                break;
            };
            let next = lines
                .next_line()
                .await
                .map_err(|e| SourceError::Read(e.to_string()));
            let line = match next {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.lines = None;
                    break;
                }
                Err(e) => {
                    // On error, drop the reader to release the file
                    self.lines = None;
                    return Err(e.into());
                }
            };
            self.line_number += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            batch.push(self.parse_line(trimmed)?);
        }

        if batch.is_empty() {
            debug!(
                "JSON Lines source {} exhausted after {} rows",
                self.path.display(),
                self.total_fetched
            );
            Ok(None)
        } else {
            self.total_fetched += batch.len() as u64;
            Ok(Some(batch))
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.lines.take().is_some() {
            info!(
                "Closed JSON Lines source {} after {} rows",
                self.path.display(),
                self.total_fetched
            );
        }
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
