//! Error types for GPS ingestion.

use std::path::PathBuf;

use thiserror::Error;

/// Problems with the mapping or the shape of the source file.
///
/// These are always fatal: the mapping (or the input) has to be fixed and the
/// run repeated.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Required targets that no configured alias resolved to
    #[error("Missing required column mappings: {missing:?}. Have columns: {available:?}")]
    MissingColumns {
        missing: Vec<String>,
        available: Vec<String>,
    },

    /// Direct mode without a resolvable `ts` column
    #[error(
        "No timestamp column mapped and no stopwatch config (start_time_header + seconds_column) provided. Have columns: {available:?}"
    )]
    MissingTimestamp { available: Vec<String> },

    /// Stopwatch start key absent from (or empty in) the header block
    #[error("Header '{key}' not found at top of file; available header keys: {available:?}")]
    MissingHeaderKey { key: String, available: Vec<String> },

    /// Stopwatch seconds column absent from the raw table
    #[error("seconds_column '{column}' not found in data columns: {available:?}")]
    MissingSecondsColumn {
        column: String,
        available: Vec<String>,
    },

    #[error("Unknown time zone '{0}' in time.input_tz")]
    UnknownTimeZone(String),

    #[error("Invalid mapping file {path}: {source}")]
    InvalidMapping {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Anything that can stop a normalization run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Config(#[from] ConfigurationError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

impl IngestError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngestError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
