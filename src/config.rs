use std::collections::BTreeMap;
use std::path::Path;

use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::error::{ConfigurationError, IngestError};
use crate::schema::TARGETS;

/// Time zone assumed for naive timestamps when `time.input_tz` is not set.
pub const DEFAULT_INPUT_TZ: &str = "UTC";

/// Per-vendor mapping, loaded from YAML.
///
/// ```yaml
/// time:
///   start_time_header: StartTime
///   seconds_column: Seconds
///   input_tz: America/Los_Angeles
/// units:
///   speed_is_kmh: true
/// columns:
///   lat: [Latitude, lat_deg]
///   lon: Longitude
/// ```
///
/// Every section is optional; a missing or `null` section is empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    #[serde(deserialize_with = "null_as_default")]
    pub time: TimeConfig,
    #[serde(deserialize_with = "null_as_default")]
    pub units: UnitsConfig,
    #[serde(deserialize_with = "null_as_default")]
    pub columns: BTreeMap<String, Aliases>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// Direct mode: source timestamps are already UTC (or carry an offset)
    pub is_iso_utc: bool,
    /// IANA zone for naive timestamps, `UTC` when absent
    pub input_tz: Option<String>,
    /// Header key holding the stopwatch start time
    pub start_time_header: Option<String>,
    /// Column with seconds elapsed since the header start time
    pub seconds_column: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitsConfig {
    pub speed_is_kmh: bool,
}

/// One alias or an ordered list of them, highest priority first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Aliases {
    One(String),
    Many(Vec<String>),
}

impl Aliases {
    pub fn as_slice(&self) -> &[String] {
        match self {
            Aliases::One(alias) => std::slice::from_ref(alias),
            Aliases::Many(aliases) => aliases,
        }
    }
}

impl TimeConfig {
    pub fn timezone(&self) -> Result<Tz, ConfigurationError> {
        let name = self.input_tz.as_deref().unwrap_or(DEFAULT_INPUT_TZ).trim();
        name.parse::<Tz>()
            .or_else(|_| Tz::from_str_insensitive(name))
            .map_err(|_| ConfigurationError::UnknownTimeZone(name.to_string()))
    }

    /// `(start_time_header, seconds_column)` when both are configured.
    pub fn stopwatch(&self) -> Option<(&str, &str)> {
        match (&self.start_time_header, &self.seconds_column) {
            (Some(header), Some(column)) => Some((header.as_str(), column.as_str())),
            _ => None,
        }
    }
}

impl MappingConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| IngestError::io(path, e))?;
        Ok(Self::from_yaml_str(&text, path)?)
    }

    pub fn from_yaml_str(text: &str, origin: &Path) -> Result<Self, ConfigurationError> {
        let invalid = |source| ConfigurationError::InvalidMapping {
            path: origin.to_path_buf(),
            source,
        };

        // An empty or comment-only document is an empty mapping.
        let value: serde_yaml::Value = serde_yaml::from_str(text).map_err(invalid)?;
        let config: MappingConfig = if value.is_null() {
            MappingConfig::default()
        } else {
            serde_yaml::from_value(value).map_err(invalid)?
        };

        config.validate()?;
        Ok(config)
    }

    /// Aliases configured for a canonical target, empty if none.
    pub fn aliases(&self, target: &str) -> &[String] {
        self.columns.get(target).map(Aliases::as_slice).unwrap_or(&[])
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        self.time.timezone()?;
        for target in self.columns.keys() {
            if !TARGETS.contains(&target.as_str()) {
                warn!(key = %target, "ignoring mapping for unknown column target");
            }
        }
        Ok(())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
