//! Normalization of vendor GPS telemetry into one canonical table.
//!
//! The entry point is [`normalize`], which takes a raw vendor file (CSV with an
//! optional `#` header block, or Parquet) plus a YAML mapping and returns the
//! canonical [`GpsTable`] along with an [`IngestReport`].

pub mod config;
pub mod error;
pub mod normalizer;
pub mod output;
pub mod parsers;
pub mod report;
pub mod schema;
pub mod timestamp;

pub use config::{Aliases, MappingConfig, TimeConfig, UnitsConfig};
pub use error::{ConfigurationError, IngestError};
pub use normalizer::normalize;
pub use report::IngestReport;
pub use schema::{GpsRow, GpsTable, in_valid_range, pick_first_matching};
pub use timestamp::TimestampStrategy;
