//! Locating and reading the relay's TOML configuration.

use std::io::ErrorKind;
use std::path::PathBuf;

use super::RelayConfig;

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "rtmp-relay.toml";

/// A loaded configuration and the file it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: RelayConfig,
    /// `None` when no file was found and defaults are in use.
    pub source: Option<PathBuf>,
}

/// Finds the configuration file and parses it.
#[derive(Debug)]
pub struct ConfigLoader {
    candidates: Vec<PathBuf>,
    /// Set when the path came from the command line; it must exist.
    required: bool,
}

impl ConfigLoader {
    /// Look in the working directory, then in the user config directory.
    #[must_use]
    pub fn discover() -> Self {
        let mut candidates = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("rtmp-relay").join("config.toml"));
        }
        Self {
            candidates,
            required: false,
        }
    }

    /// Load exactly `path`. A missing file is an error.
    #[must_use]
    pub fn explicit(path: PathBuf) -> Self {
        Self {
            candidates: vec![path],
            required: true,
        }
    }

    /// Read the first candidate that exists.
    ///
    /// Falls back to defaults when no discovered candidate exists.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing, or if a file exists
    /// but cannot be read or parsed.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        for path in &self.candidates {
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) if e.kind() == ErrorKind::NotFound && !self.required => continue,
                Err(source) => {
                    return Err(ConfigError::ReadError {
                        path: path.clone(),
                        source,
                    })
                }
            };

            let config = toml::from_str(&content).map_err(|source| ConfigError::ParseError {
                path: path.clone(),
                source,
            })?;
            return Ok(LoadedConfig {
                config,
                source: Some(path.clone()),
            });
        }

        Ok(LoadedConfig {
            config: RelayConfig::default(),
            source: None,
        })
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}
