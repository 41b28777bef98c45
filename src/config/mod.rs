//! TOML-based configuration.
//!
//! Supports a config file (granary.toml) with environment variable expansion
//! in paths.
//!
//! Example configuration:
//! ```toml
//! base_currency = "KRW"
//!
//! [mart]
//! path = "${GRANARY_DATA}/mart.db"
//!
//! [facts]
//! dir = "./facts"
//!
//! [registry]
//! path = "./metrics.toml"
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::registry::catalog::DEFAULT_BASE_CURRENCY;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Currency settlements are reported in; rows already in this currency
    /// never need an fx rate.
    pub base_currency: Option<String>,

    pub mart: MartSettings,
    pub facts: FactsSettings,
    pub registry: RegistrySettings,
}

/// Mart database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MartSettings {
    /// Path to the SQLite mart file (supports ${ENV_VAR} expansion).
    pub path: String,
}

impl Default for MartSettings {
    fn default() -> Self {
        Self {
            path: "./mart.db".to_string(),
        }
    }
}

/// Fact input configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FactsSettings {
    /// Directory scanned for fact record files (*.json).
    pub dir: String,
}

impl Default for FactsSettings {
    fn default() -> Self {
        Self {
            dir: "./facts".to_string(),
        }
    }
}

/// Metric registry configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Path to a TOML metric catalog. When unset the builtin catalog is used.
    pub path: Option<String>,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `GRANARY_CONFIG`
    /// 2. `./granary.toml`
    /// 3. `~/.config/granary/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("GRANARY_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("granary.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("granary").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    pub fn base_currency(&self) -> &str {
        self.base_currency.as_deref().unwrap_or(DEFAULT_BASE_CURRENCY)
    }

    /// Mart path with environment variables expanded.
    pub fn mart_path(&self) -> Result<PathBuf, SettingsError> {
        Ok(PathBuf::from(expand_env_vars(&self.mart.path)?))
    }

    /// Facts directory with environment variables expanded.
    pub fn facts_dir(&self) -> Result<PathBuf, SettingsError> {
        Ok(PathBuf::from(expand_env_vars(&self.facts.dir)?))
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' {
            if chars.peek() == Some(&'{') {
                chars.next();
                let mut var_name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch == '}' {
                        chars.next();
                        break;
                    }
                    var_name.push(ch);
                    chars.next();
                }
                let value = env::var(&var_name)
                    .map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
                result.push_str(&value);
            } else {
                let mut var_name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        var_name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if var_name.is_empty() {
                    result.push('$');
                } else {
                    let value = env::var(&var_name)
                        .map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
                    result.push_str(&value);
                }
            }
        } else {
            result.push(c);
        }
    }

    Ok(result)
}
