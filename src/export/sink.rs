//! Export sinks
//!
//! A sink is the destination an export job writes encoded bytes to. The
//! coordinator only touches a sink between `will_begin_writing_data` and
//! `process_complete`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::{ExportError, Result};

/// Destination for exported bytes
#[async_trait]
pub trait ExportSink: Send {
    /// Append bytes to the destination
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Push buffered bytes to the destination
    async fn flush(&mut self) -> io::Result<()>;

    /// Release the destination; no writes are accepted afterwards
    async fn close(&mut self) -> io::Result<()>;

    /// Total bytes accepted so far
    fn bytes_written(&self) -> u64;
}

/// Buffered file sink
#[derive(Debug)]
pub struct FileSink {
    /// `None` once closed
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    written: u64,
}

impl FileSink {
    /// Create (or truncate) the file at `path`
    ///
    /// Fails if the parent directory does not exist.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        validate_path(path)?;
        let writer = create_writer(path).await?;

        debug!("Created file sink for: {}", path.display());

        Ok(Self {
            writer: Some(writer),
            path: path.to_path_buf(),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "sink is closed"))
    }
}

#[async_trait]
impl ExportSink for FileSink {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer()?.write_all(bytes).await?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.shutdown().await?;
            debug!("Closed file sink: {} ({} bytes)", self.path.display(), self.written);
        }
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }
}

/// In-memory sink backed by a shared buffer
///
/// Keep a handle from [`MemorySink::buffer`] to read the output after the
/// sink has been handed to a job.
pub struct MemorySink {
    buffer: Arc<Mutex<Vec<u8>>>,
    /// Maximum number of bytes accepted; further writes fail
    limit: Option<usize>,
    written: u64,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
            limit: None,
            written: 0,
            closed: false,
        }
    }

    /// Sink that fails with `WriteZero` once `limit` bytes are exceeded
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new()
        }
    }

    /// Shared handle to the underlying buffer
    pub fn buffer(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.buffer)
    }

    /// Copy of everything written so far
    pub fn contents(&self) -> Vec<u8> {
        self.buffer.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExportSink for MemorySink {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink is closed"));
        }
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| io::Error::other("memory sink buffer poisoned"))?;
        if let Some(limit) = self.limit {
            if buffer.len() + bytes.len() > limit {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("memory sink limit of {limit} bytes exceeded"),
                ));
            }
        }
        buffer.extend_from_slice(bytes);
        self.written += bytes.len() as u64;
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }
}

/// Helper function to create a buffered file writer
///
/// # Arguments
/// * `path` - File path to create
///
/// # Returns
/// * `Result<BufWriter<File>>` - Buffered writer or error
async fn create_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).await.map_err(|e| {
        ExportError::Io(io::Error::new(
            e.kind(),
            format!("Failed to create {}: {}", path.display(), e),
        ))
    })?;
    Ok(BufWriter::with_capacity(1024 * 1024, file)) // 1MB buffer
}

/// Helper function to validate file path and directory
///
/// # Arguments
/// * `path` - File path to validate
///
/// # Returns
/// * `Result<()>` - Success or error
fn validate_path(path: &Path) -> Result<()> {
    // Check if parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(ExportError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Directory does not exist: {}", parent.display()),
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_memory_sink_collects_bytes() {
        let mut sink = MemorySink::new();
        let buffer = sink.buffer();
        assert_ok!(sink.write(b"hello ").await);
        assert_ok!(sink.write(b"world").await);
        assert_ok!(sink.flush().await);
        assert_ok!(sink.close().await);

        assert_eq!(&*buffer.lock().unwrap(), b"hello world");
        assert_eq!(sink.bytes_written(), 11);
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn test_memory_sink_rejects_writes_after_close() {
        let mut sink = MemorySink::new();
        sink.close().await.unwrap();
        let err = sink.write(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_memory_sink_limit() {
        let mut sink = MemorySink::with_limit(4);
        assert_ok!(sink.write(b"abcd").await);
        let err = assert_err!(sink.write(b"e").await);
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
        assert_eq!(sink.contents(), b"abcd");
    }

    #[tokio::test]
    async fn test_file_sink_writes_file() {
        let path = std::env::temp_dir().join(format!("rowexport_sink_{}.txt", uuid::Uuid::new_v4()));
        let mut sink = FileSink::create(&path).await.unwrap();
        sink.write(b"a,b\n1,2\n").await.unwrap();
        sink.flush().await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(sink.bytes_written(), 8);

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "a,b\n1,2\n");

        // Cleanup
        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_file_sink_invalid_directory() {
        assert_err!(FileSink::create("/nonexistent/directory/file.csv").await);
    }
}
