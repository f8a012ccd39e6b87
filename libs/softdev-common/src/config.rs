//! IOC configuration loading
//!
//! Sources, lowest to highest priority:
//! 1. built-in defaults
//! 2. `config/default.toml`, `config/default.yaml`, `config/default.json`
//! 3. an explicit file (format chosen by extension)
//! 4. `SOFTDEV_`-prefixed environment variables, `__` separating nested keys
//!    (`SOFTDEV_SERVER__BIND=0.0.0.0:5070`)

use crate::error::{CommonError, Result};
use crate::logging::LogConfig;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use softdev_fields::{validate_device_name, NamedFieldSpec};
use std::collections::HashSet;
use std::path::Path;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "SOFTDEV_";

/// Default listen address of the TCP transport
pub const DEFAULT_BIND: &str = "127.0.0.1:5070";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// One device instance of a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model (schema) name, also the database file stem
    pub name: String,
    /// Device name prefixing every published variable
    pub device: String,
    /// Fields in declaration order
    #[serde(default)]
    pub fields: Vec<NamedFieldSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftdevConfig {
    pub logging: LogConfig,
    pub server: ServerConfig,
    pub models: Vec<ModelConfig>,
}

impl SoftdevConfig {
    /// Check names and uniqueness across models
    ///
    /// Field definitions themselves are validated when schemas are built.
    pub fn validate(&self) -> Result<()> {
        let mut devices = HashSet::new();
        for model in &self.models {
            validate_device_name(&model.name)
                .map_err(|e| CommonError::config(format!("model '{}': {}", model.name, e)))?;
            validate_device_name(&model.device)
                .map_err(|e| CommonError::config(format!("model '{}': {}", model.name, e)))?;
            if !devices.insert(model.device.as_str()) {
                return Err(CommonError::config(format!(
                    "device '{}' is configured twice",
                    model.device
                )));
            }
            if model.fields.is_empty() {
                return Err(CommonError::config(format!(
                    "model '{}' has no fields",
                    model.name
                )));
            }
        }
        Ok(())
    }

    pub fn model(&self, device: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.device == device)
    }
}

fn file_provider(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| CommonError::config(format!("{} has no extension", path.display())))?;
    match extension {
        "toml" => Ok(figment.merge(Toml::file(path))),
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        "json" => Ok(figment.merge(Json::file(path))),
        other => Err(CommonError::config(format!(
            "unsupported config file format: {}",
            other
        ))),
    }
}

fn figment(path: Option<&Path>) -> Result<Figment> {
    let mut figment = Figment::from(Serialized::defaults(SoftdevConfig::default()))
        .merge(Toml::file("config/default.toml"))
        .merge(Yaml::file("config/default.yaml"))
        .merge(Json::file("config/default.json"));
    if let Some(path) = path {
        if !path.exists() {
            return Err(CommonError::config(format!("{} not found", path.display())));
        }
        figment = file_provider(figment, path)?;
    }
    Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
}

/// Load and validate the configuration
pub fn load_config(path: Option<&Path>) -> Result<SoftdevConfig> {
    let config: SoftdevConfig = figment(path)?.extract()?;
    config.validate()?;
    Ok(config)
}
