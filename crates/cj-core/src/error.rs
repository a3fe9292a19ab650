//! Error types for conjoint analysis

use thiserror::Error;

/// Conjoint analysis error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Invalid mode/method argument, or a required argument omitted.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Referenced column, attribute or respondent absent from the data.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Division by zero, non-finite intermediate, or rank-deficient fit.
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// Malformed input shapes (ragged rows, unknown levels, empty tables).
    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Short machine-readable kind, used in serialized failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration",
            Error::NotFound(_) => "not_found",
            Error::Numerical(_) => "numerical",
            Error::Validation(_) => "validation",
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
