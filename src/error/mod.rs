//! Error handling module for export operations.
//!
//! Every fallible operation in the crate returns [`Result`], whose error
//! type [`ExportError`] wraps the more specific kinds below:
//! - [`LifecycleError`]: misuse of the export job state machine
//! - [`SourceError`]: failures while reading rows
//! - [`EncodeError`]: failures while producing CSV/PDF bytes
//! - [`ConfigError`]: unreadable or invalid configuration
//!
//! # Example
//!
//! ```rust
//! use rowexport::error::{ExportError, LifecycleError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(LifecycleError::DelegateAlreadySet.into())
//! }
//!
//! assert!(matches!(example_operation(), Err(ExportError::Lifecycle(_))));
//! ```

pub mod kinds;

// Re-export commonly used types
pub use kinds::{ConfigError, EncodeError, ExportError, LifecycleError, Result, SourceError};
