//! Registry configuration, loaded from TOML
//!
//! ```toml
//! [defaults]
//! use_old_style = false
//! strict_chain = true
//!
//! [namespaces.billing]
//! strict_chain = false
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```

use crate::errors::{Error, ErrorKind, Result};
use crate::infrastructure::logging::{LogConfig, LogFormat};
use crate::types::{ConfigOverrides, TypeConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::Level;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Flags of the default namespace, inherited by namespaces without overrides
    #[serde(default)]
    pub defaults: TypeConfig,

    /// Namespaces created together with the registry
    #[serde(default)]
    pub namespaces: BTreeMap<String, ConfigOverrides>,

    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default = "default_format")]
    pub format: String,

    #[serde(default)]
    pub filter: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            filter: None,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "compact".to_string()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::with_addition(
                ErrorKind::WrongArgumentsUsed,
                format!("failed to read config {}: {}", path.display(), e),
            )
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            Error::with_addition(ErrorKind::WrongArgumentsUsed, format!("invalid config: {}", e))
        })
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            Error::with_addition(ErrorKind::WrongArgumentsUsed, format!("unserializable config: {}", e))
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = self.to_toml_string()?;
        fs::write(path.as_ref(), content).map_err(|e| {
            Error::with_addition(
                ErrorKind::WrongArgumentsUsed,
                format!("failed to write config {}: {}", path.as_ref().display(), e),
            )
        })
    }

    /// Subscriber settings for [`init_logging`](crate::infrastructure::logging::init_logging).
    /// Unknown level or format names fall back to the defaults.
    pub fn log_config(&self) -> LogConfig {
        let level = self.logging.level.parse::<Level>().unwrap_or(Level::INFO);
        let format = LogFormat::parse(&self.logging.format).unwrap_or(LogFormat::Compact);
        let config = LogConfig::new().with_level(level).with_format(format);
        match &self.logging.filter {
            Some(filter) => config.with_filter(filter.clone()),
            None => config,
        }
    }
}
