//! User configuration loaded from TOML.
//!
//! ```toml
//! [grid]
//! columns = 26
//! rows = 100
//! ```

use directories::ProjectDirs;
use gridcalc_core::{DEFAULT_COLUMNS, DEFAULT_ROWS, MAX_COLUMNS, MAX_ROWS};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error(
        "Invalid grid size {columns}x{rows}: columns must be 1..={max_columns}, rows 1..={max_rows}",
        max_columns = MAX_COLUMNS,
        max_rows = MAX_ROWS
    )]
    InvalidGrid { columns: usize, rows: usize },
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub grid: GridConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct GridConfig {
    pub columns: usize,
    pub rows: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            columns: DEFAULT_COLUMNS,
            rows: DEFAULT_ROWS,
        }
    }
}

impl Config {
    /// Parse and validate config text.
    pub fn from_toml(content: &str, path: &Path) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Config::from_toml(&content, path)
    }

    /// Resolve the config to use.
    ///
    /// An explicit path must exist. Otherwise the default location is used if
    /// `use_default` is set and a file is there; if not, built-in defaults.
    pub fn load(explicit: Option<&Path>, use_default: bool) -> Result<Config, ConfigError> {
        if let Some(path) = explicit {
            return Config::from_file(path);
        }
        if use_default {
            if let Some(path) = default_config_path().filter(|p| p.exists()) {
                tracing::debug!(path = %path.display(), "loading default config");
                return Config::from_file(&path);
            }
        }
        Ok(Config::default())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let GridConfig { columns, rows } = self.grid;
        if !(1..=MAX_COLUMNS).contains(&columns) || !(1..=MAX_ROWS).contains(&rows) {
            return Err(ConfigError::InvalidGrid { columns, rows });
        }
        Ok(())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "gridcalc")?;
    let mut path = proj.config_dir().to_path_buf();
    path.push("config.toml");
    Some(path)
}
