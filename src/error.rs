//! Error types for the configuration registry and job scheduler.
//!
//! Each variant carries a stable error code (SCREAMING_SNAKE_CASE) that is
//! included in the Display output and accessible via [`ShelfError::code()`].
//!
//! Most runtime problems never surface as errors: rejected writes, wrong-kind
//! reads and unknown keys are recorded on access counters and logged. Errors
//! are reserved for construction, document parsing and file operations.

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Reading or writing the config document failed.
    pub const PERSISTENCE_FAILED: &str = "PERSISTENCE_FAILED";

    /// A job could not be scheduled.
    pub const SCHEDULING_FAILED: &str = "SCHEDULING_FAILED";

    /// A static definition is invalid.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// Underlying I/O error.
    pub const IO_ERROR: &str = "IO_ERROR";
}

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum ShelfError {
    /// File write, rename or parse failure.
    #[error("[{}] {}", error_codes::PERSISTENCE_FAILED, .0)]
    Persistence(String),

    /// Job could not be scheduled.
    #[error("[{}] {}", error_codes::SCHEDULING_FAILED, .0)]
    Scheduling(String),

    /// Invalid static definition (bad default, empty schedule identity).
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),

    /// I/O error.
    #[error("[{}] {}", error_codes::IO_ERROR, .0)]
    Io(#[from] std::io::Error),
}

impl ShelfError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Persistence(_) => error_codes::PERSISTENCE_FAILED,
            Self::Scheduling(_) => error_codes::SCHEDULING_FAILED,
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::Io(_) => error_codes::IO_ERROR,
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ShelfError>;
