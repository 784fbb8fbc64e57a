use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::sync::Arc;
use log::info;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    SerdeJson(serde_json::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Config file IO error: {}", e),
            ConfigError::SerdeJson(e) => write!(f, "Config JSON parsing error: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::SerdeJson(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self { ConfigError::Io(err) }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self { ConfigError::SerdeJson(err) }
}

/// Credentials and deployment names for the hosted AI service.
#[derive(Deserialize, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    /// Deployment used by insight generation.
    pub deployment: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("deployment", &self.deployment)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Startup configuration read once from the config file and shared read-only.
#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub orq: ProviderConfig,
}

impl AppConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.orq.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid("orq.api_key must not be empty".to_string()));
        }
        if self.orq.deployment.trim().is_empty() {
            return Err(ConfigError::Invalid("orq.deployment must not be empty".to_string()));
        }
        Ok(())
    }
}

pub fn load_config_from_str(json_str: &str) -> Result<Arc<AppConfig>, ConfigError> {
    let config: AppConfig = serde_json::from_str(json_str)?;
    config.validate()?;
    Ok(Arc::new(config))
}

pub fn load_app_config(path: &str) -> Result<Arc<AppConfig>, ConfigError> {
    info!("Loading configuration from: {}", path);
    let json_str = fs::read_to_string(path)?;
    load_config_from_str(&json_str)
}
