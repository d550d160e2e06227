use std::{fmt, io};

use crate::export::job::JobState;

/// Crate-wide `Result` type using [`ExportError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Top-level error type for export operations.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum ExportError {
    /// Misuse of the export job lifecycle.
    Lifecycle(LifecycleError),

    /// I/O errors (sinks, files).
    Io(io::Error),

    /// Row source errors.
    Source(SourceError),

    /// Format encoding errors.
    Encode(EncodeError),

    /// Configuration errors.
    Config(ConfigError),

    /// The worker task running a job panicked or was aborted.
    Runner(String),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Lifecycle errors raised by [`crate::export::ExportJob`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// The operation is not valid from the job's current state.
    InvalidStateTransition {
        from: JobState,
        operation: &'static str,
    },

    /// A progress value lower than the last reported one.
    ProgressRegression { current: u64, requested: u64 },

    /// A delegate was already registered for this job.
    DelegateAlreadySet,
}

/// Row source errors.
#[derive(Debug)]
pub enum SourceError {
    /// A record could not be parsed into a row.
    InvalidRecord { line: usize, message: String },

    /// Reading from the underlying input failed.
    Read(String),
}

/// Format encoding errors.
#[derive(Debug)]
pub enum EncodeError {
    /// Encoder options are unusable.
    InvalidConfig(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Lifecycle(e) => write!(f, "Lifecycle error: {e}"),
            ExportError::Io(e) => write!(f, "I/O error: {e}"),
            ExportError::Source(e) => write!(f, "Source error: {e}"),
            ExportError::Encode(e) => write!(f, "Encoding error: {e}"),
            ExportError::Config(e) => write!(f, "Configuration error: {e}"),
            ExportError::Runner(msg) => write!(f, "Export worker failed: {msg}"),
            ExportError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleError::InvalidStateTransition { from, operation } => {
                write!(f, "cannot {operation} a job in state {from}")
            }
            LifecycleError::ProgressRegression { current, requested } => {
                write!(f, "progress cannot go from {current} back to {requested}")
            }
            LifecycleError::DelegateAlreadySet => write!(f, "delegate already registered"),
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::InvalidRecord { line, message } => {
                write!(f, "invalid record on line {line}: {message}")
            }
            SourceError::Read(msg) => write!(f, "read failed: {msg}"),
        }
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::InvalidConfig(msg) => write!(f, "invalid encoder options: {msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Io(e) => Some(e),
            _ => None,
        }
    }
}
impl std::error::Error for LifecycleError {}
impl std::error::Error for SourceError {}
impl std::error::Error for EncodeError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to ExportError ========================= */

impl From<io::Error> for ExportError {
    fn from(err: io::Error) -> Self {
        ExportError::Io(err)
    }
}

impl From<LifecycleError> for ExportError {
    fn from(err: LifecycleError) -> Self {
        ExportError::Lifecycle(err)
    }
}

impl From<SourceError> for ExportError {
    fn from(err: SourceError) -> Self {
        ExportError::Source(err)
    }
}

impl From<EncodeError> for ExportError {
    fn from(err: EncodeError) -> Self {
        ExportError::Encode(err)
    }
}

impl From<ConfigError> for ExportError {
    fn from(err: ConfigError) -> Self {
        ExportError::Config(err)
    }
}

impl From<tokio::task::JoinError> for ExportError {
    fn from(err: tokio::task::JoinError) -> Self {
        ExportError::Runner(err.to_string())
    }
}

impl From<String> for ExportError {
    fn from(msg: String) -> Self {
        ExportError::Generic(msg)
    }
}

impl From<&str> for ExportError {
    fn from(msg: &str) -> Self {
        ExportError::Generic(msg.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_error_display() {
        let err = ExportError::from(LifecycleError::InvalidStateTransition {
            from: JobState::Running,
            operation: "start",
        });
        assert_eq!(
            err.to_string(),
            "Lifecycle error: cannot start a job in state running"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let err: ExportError = io.into();
        assert!(matches!(err, ExportError::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_source_error_display() {
        let err = SourceError::InvalidRecord {
            line: 4,
            message: "expected object".into(),
        };
        assert_eq!(err.to_string(), "invalid record on line 4: expected object");
    }
}
