use crate::grammar::{Dst, Timestamp};
use crate::unmarshal::Location;
use chrono::offset::LocalResult;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("unable to parse config file: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("unknown timezone {0}")]
    Timezone(String),
}

fn location_name_default() -> String { return "Europe/Amsterdam".to_string() }

/// Timezone the meter clock runs in.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct LocationConfig {
    /// IANA zone name
    #[serde(default="location_name_default")]
    pub name: String,
}

impl Default for LocationConfig {
    fn default() -> Self {
        LocationConfig {
            name: location_name_default(),
        }
    }
}

impl LocationConfig {
    pub fn timezone(&self) -> Option<Tz> {
        self.name.parse().ok()
    }

    /// Read a meter timestamp as wall-clock time in the configured zone.
    ///
    /// The S/W flag only decides between the two candidates of a local time
    /// that occurs twice when the clocks go back.
    pub fn resolve(&self, timestamp: &Timestamp) -> Option<DateTime<FixedOffset>> {
        let naive = NaiveDateTime::parse_from_str(&timestamp.value, "%y%m%d%H%M%S").ok()?;
        let Some(tz) = self.timezone() else {
            warn!("Unknown timezone {}", self.name);
            return None;
        };

        match tz.from_local_datetime(&naive) {
            LocalResult::Single(local) => Some(local.fixed_offset()),
            LocalResult::Ambiguous(summer, winter) => match timestamp.dst {
                Some(Dst::Winter) => Some(winter.fixed_offset()),
                Some(Dst::Summer) | None => Some(summer.fixed_offset()),
            },
            LocalResult::None => {
                debug!("{} does not exist in {}", naive, self.name);
                None
            }
        }
    }
}

impl Location for LocationConfig {
    fn resolve(&self, timestamp: &Timestamp) -> Option<DateTime<FixedOffset>> {
        LocationConfig::resolve(self, timestamp)
    }
}

fn verify_checksum_default() -> bool { return true }
fn location_default() -> LocationConfig { return LocationConfig::default() }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Config {
    #[serde(default="verify_checksum_default")]
    pub verify_checksum: bool,
    #[serde(default="location_default")]
    pub location: LocationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            verify_checksum: verify_checksum_default(),
            location: location_default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading config from {}", path.display());

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Config::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            debug!("Empty config, using defaults");
            return Ok(Config::default());
        }

        let config: Config = serde_yml::from_str(contents)?;
        if config.location.timezone().is_none() {
            return Err(ConfigError::Timezone(config.location.name));
        }
        debug!("Config: verify_checksum={}, location={}", config.verify_checksum, config.location.name);

        Ok(config)
    }
}
