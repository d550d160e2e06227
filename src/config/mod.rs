//! Configuration management for rowexport
//!
//! This module handles loading, parsing, and managing configuration from various sources:
//! - Configuration files (TOML format)
//! - Environment variables
//! - Command-line arguments
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ConfigError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Export pipeline configuration
    #[serde(default)]
    pub export: ExportConfig,

    /// CSV output configuration
    #[serde(default)]
    pub csv: CsvConfig,

    /// PDF output configuration
    #[serde(default)]
    pub pdf: PdfConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Export pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportConfig {
    /// Number of rows fetched from the source per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Show a progress bar while exporting
    #[serde(default = "default_progress_bar")]
    pub progress_bar: bool,
}

/// CSV output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CsvConfig {
    /// Field separator
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Character used to enclose fields that need it
    #[serde(default = "default_quote")]
    pub quote: char,

    /// Line terminator written after every row
    #[serde(default = "default_line_terminator")]
    pub line_terminator: String,

    /// Write a header row with the column names
    #[serde(default = "default_header")]
    pub header: bool,

    /// Text written for null values
    #[serde(default = "default_null_value")]
    pub null_value: String,
}

/// PDF output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PdfConfig {
    /// Paper size
    #[serde(default = "default_page_size")]
    pub page_size: PageSize,

    /// Page orientation
    #[serde(default = "default_orientation")]
    pub orientation: Orientation,

    /// Body font size in points
    #[serde(default = "default_font_size")]
    pub font_size: f32,

    /// Page margin in points
    #[serde(default = "default_margin")]
    pub margin: f32,

    /// Title printed at the top of every page
    #[serde(default)]
    pub title: Option<String>,
}

/// Paper sizes supported by the PDF encoder
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PageSize {
    A4,
    Letter,
    Legal,
}

/// Page orientation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_batch_size() -> usize {
    1000
}

fn default_progress_bar() -> bool {
    true
}

fn default_delimiter() -> char {
    ','
}

fn default_quote() -> char {
    '"'
}

fn default_line_terminator() -> String {
    "\n".to_string()
}

fn default_header() -> bool {
    true
}

fn default_null_value() -> String {
    "NULL".to_string()
}

fn default_page_size() -> PageSize {
    PageSize::A4
}

fn default_orientation() -> Orientation {
    Orientation::Portrait
}

fn default_font_size() -> f32 {
    9.0
}

fn default_margin() -> f32 {
    36.0
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            progress_bar: default_progress_bar(),
        }
    }
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            quote: default_quote(),
            line_terminator: default_line_terminator(),
            header: default_header(),
            null_value: default_null_value(),
        }
    }
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            orientation: default_orientation(),
            font_size: default_font_size(),
            margin: default_margin(),
            title: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Load configuration from an explicit file or the default location
    ///
    /// An explicit path must exist. A missing file at the default location
    /// yields the default configuration.
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Apply `ROWEXPORT_*` environment variable overrides
    ///
    /// Recognized: `ROWEXPORT_LOG_LEVEL`, `ROWEXPORT_BATCH_SIZE`.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides using `lookup` to read variables
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("ROWEXPORT_LOG_LEVEL") {
            self.logging.level = level.parse()?;
        }
        if let Some(size) = lookup("ROWEXPORT_BATCH_SIZE") {
            self.export.batch_size = size.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "export.batch_size".to_string(),
                value: size.clone(),
            })?;
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - Path to default configuration file
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".rowexport")
            .join("config.toml")
    }

    /// Serialize the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        if self.export.batch_size == 0 {
            return Err(invalid("export.batch_size", "0"));
        }
        self.csv.validate()?;
        self.pdf.validate()
    }
}

impl CsvConfig {
    /// Check that the delimiter, quote and terminator can be told apart
    pub fn validate(&self) -> Result<()> {
        if matches!(self.delimiter, '\r' | '\n') {
            return Err(invalid("csv.delimiter", &self.delimiter.escape_default().to_string()));
        }
        if self.quote == self.delimiter || matches!(self.quote, '\r' | '\n') {
            return Err(invalid("csv.quote", &self.quote.escape_default().to_string()));
        }
        if self.line_terminator.is_empty() {
            return Err(invalid("csv.line_terminator", ""));
        }
        Ok(())
    }
}

impl PdfConfig {
    /// Check font size and margins against the page dimensions
    pub fn validate(&self) -> Result<()> {
        if !(4.0..=72.0).contains(&self.font_size) {
            return Err(invalid("pdf.font_size", &self.font_size.to_string()));
        }
        let (width, height) = self.page_dimensions();
        if self.margin < 0.0 || self.margin * 4.0 >= width.min(height) {
            return Err(invalid("pdf.margin", &self.margin.to_string()));
        }
        Ok(())
    }

    /// Page width and height in points, orientation applied
    pub fn page_dimensions(&self) -> (f32, f32) {
        let (w, h) = self.page_size.dimensions();
        match self.orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        }
    }
}

impl PageSize {
    /// Portrait width and height in points
    pub fn dimensions(&self) -> (f32, f32) {
        match self {
            PageSize::A4 => (595.0, 842.0),
            PageSize::Letter => (612.0, 792.0),
            PageSize::Legal => (612.0, 1008.0),
        }
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = crate::error::ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(invalid("logging.level", s)),
        }
    }
}

impl FromStr for PageSize {
    type Err = crate::error::ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "a4" => Ok(PageSize::A4),
            "letter" => Ok(PageSize::Letter),
            "legal" => Ok(PageSize::Legal),
            _ => Err(invalid("pdf.page_size", s)),
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSize::A4 => write!(f, "a4"),
            PageSize::Letter => write!(f, "letter"),
            PageSize::Legal => write!(f, "legal"),
        }
    }
}

fn invalid(field: &str, value: &str) -> crate::error::ExportError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}
