//! User configuration management
//!
//! Configuration is stored in TOML format at `~/.gpm/config.toml`. A loaded
//! [`Config`] is passed explicitly to the registry client and the install
//! transaction; nothing reads it from global state.
//!
//! # Examples
//!
//! ```no_run
//! use gpm::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = Config::load()?;
//! println!("Registry URL: {}", config.registry.url);
//!
//! config.registry.url = "https://registry.example.com".to_string();
//! config.save()?;
//! # Ok(())
//! # }
//! ```

use crate::engine::EngineType;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// User configuration file (`~/.gpm/config.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Registry settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Authentication settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Install settings
    #[serde(default)]
    pub install: InstallConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry type: "http" or "file"
    #[serde(default = "default_registry_type")]
    pub registry_type: String,

    /// Registry URL (for HTTP registry)
    #[serde(default = "default_registry_url")]
    pub url: String,

    /// Registry root directory (for file registry)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_registry_type() -> String {
    "http".to_string()
}

fn default_registry_url() -> String {
    "https://registry.gpm.dev".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            registry_type: default_registry_type(),
            url: default_registry_url(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Opaque bearer token used for publishing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Engine to use when none is passed on the command line and detection is skipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_engine: Option<EngineType>,
}

impl Config {
    /// Get the default config file path
    ///
    /// Uses GPM_CONFIG_DIR if set, otherwise ~/.gpm/config.toml
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(config_dir) = std::env::var("GPM_CONFIG_DIR") {
            return Ok(PathBuf::from(config_dir).join("config.toml"));
        }

        let home = dirs::home_dir()
            .ok_or_else(|| Error::Other("Could not find home directory".to_string()))?;

        Ok(home.join(".gpm").join("config.toml"))
    }

    /// Load config from file, or return defaults if it doesn't exist
    ///
    /// Environment variable overrides:
    /// - `GPM_TOKEN`: overrides `auth.token`
    /// - `GPM_REGISTRY`: overrides `registry.url`
    /// - `GPM_CONFIG_DIR`: overrides the config directory location
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;

        let config = if !path.exists() {
            Self::default()
        } else {
            let content = fs::read_to_string(&path)?;
            toml::from_str(&content)?
        };

        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("GPM_TOKEN").filter(|t| !t.is_empty()) {
            self.auth.token = Some(token);
        }
        if let Some(url) = lookup("GPM_REGISTRY").filter(|u| !u.is_empty()) {
            self.registry.url = url;
        }
        self
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }
}
