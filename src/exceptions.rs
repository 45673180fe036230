//! ## Custom Errors for Trip Cleaner
//!
//! This module defines the error types returned by the cleaning pipeline and the trip catalog.
//! It uses the `thiserror` crate to derive the `Error` trait.
//!
//! Every variant here is *fatal*: a run that returns one of them produces no output artifact.
//! Row-level problems (a trip failing a filter) are never errors; they are recorded in the
//! [`ExclusionLog`](crate::audit::ExclusionLog) instead.
//!
//! ### Example
//!
//! ```rust
//! use trip_cleaner::exceptions::{TripCleanerError, TripCleanerResult};
//!
//! fn load_trips() -> TripCleanerResult<()> {
//!     Err(TripCleanerError::MissingInput("data/raw/train.csv".into()))
//! }
//! ```

use thiserror::Error;

/// Errors specific to the Trip Cleaner library.
#[derive(Debug, Error)]
pub enum TripCleanerError {
    /// Wraps underlying I/O errors.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Wraps errors from DataFusion.
    #[error("DataFusion error: {0}")]
    DataFusionError(#[from] datafusion::error::DataFusionError),

    /// Wraps errors from Arrow.
    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),

    /// Wraps errors from Parquet.
    #[error("Parquet error: {0}")]
    ParquetError(#[from] parquet::errors::ParquetError),

    /// Wraps errors raised while parsing a TOML configuration file.
    #[error("Configuration error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// An invalid parameter or configuration value was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The input artifact does not exist.
    #[error("Input not found: {0}")]
    MissingInput(String),

    /// One or more required columns are absent from a table.
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// A timestamp column could not be parsed.
    #[error("Invalid timestamp column '{column}': {reason}")]
    InvalidTimestamp { column: String, reason: String },

    /// A pipeline stage failed; the stage name is kept for reporting.
    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: Box<TripCleanerError>,
    },
}

/// A convenient result type for Trip Cleaner operations.
pub type TripCleanerResult<T> = std::result::Result<T, TripCleanerError>;

impl TripCleanerError {
    /// Wraps the error with the name of the stage that raised it.
    pub fn in_stage(self, stage: &str) -> Self {
        TripCleanerError::StageFailed {
            stage: stage.to_string(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, looking through any stage wrappers.
    pub fn root_cause(&self) -> &TripCleanerError {
        match self {
            TripCleanerError::StageFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
