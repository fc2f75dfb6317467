use crate::credentials::FanCredentials;
use crate::error::ConfigError;
use crate::model::FanModel;
use crate::mqtt::mqtt_handler::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "fanlink";
const CONFIG_FILE: &str = "fanlink.toml";

/// Connection settings for a single fan, read from TOML
///
/// ```toml
/// host = "192.168.1.20"
/// model = "475"
/// username = "DYSON-NN2-EU-ABC1234A"
/// password = "label password"
/// ```
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct FanConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Product code of the fan model
    pub model: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_reply_timeout_secs")]
    pub reply_timeout_secs: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_reply_timeout_secs() -> u64 {
    10
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl FanConfig {
    pub fn load(path: &Path) -> Result<FanConfig, ConfigError> {
        info!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::parse(&content)?;
        debug!("Config loaded for {}:{}", config.host, config.port);
        Ok(config)
    }

    /// Parses and validates a TOML document
    pub fn parse(content: &str) -> Result<FanConfig, ConfigError> {
        let config: FanConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// `<config dir>/fanlink/fanlink.toml`, or `./fanlink.toml` without a config dir
    pub fn default_path() -> PathBuf {
        match dirs::config_dir() {
            Some(mut path) => {
                path.push(CONFIG_DIR);
                path.push(CONFIG_FILE);
                path
            }
            None => {
                warn!("Could not determine config directory, using current directory");
                PathBuf::from(".").join(CONFIG_FILE)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidConfig("host must not be empty".to_string()));
        }
        if self.fan_model().is_none() {
            return Err(ConfigError::InvalidConfig(format!(
                "unknown model code: {}",
                self.model
            )));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "connect_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.reply_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "reply_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.keep_alive_secs < 5 {
            return Err(ConfigError::InvalidConfig(
                "keep_alive_secs must be at least 5".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "channel_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn fan_model(&self) -> Option<FanModel> {
        FanModel::from_product_code(&self.model)
    }

    pub fn credentials(&self) -> FanCredentials {
        FanCredentials::new(&self.username, &self.password)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        host = "192.168.1.20"
        model = "475"
        username = "DYSON-NN2-EU-ABC1234A"
        password = "secret"
    "#;

    #[test]
    fn defaults_fill_optional_keys() {
        let config = FanConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.port, 1883);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.keep_alive(), Duration::from_secs(30));
        assert_eq!(config.reply_timeout(), Duration::from_secs(10));
        assert_eq!(config.channel_capacity, 100);
        assert_eq!(config.fan_model(), Some(FanModel::PureCoolLinkTower));
        assert_eq!(config.credentials().username(), "NN2-EU-ABC1234A");
    }

    #[test]
    fn unknown_model_is_rejected() {
        let content = MINIMAL.replace("\"475\"", "\"999\"");
        assert!(matches!(
            FanConfig::parse(&content),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn zero_connect_timeout_is_rejected() {
        let content = format!("{}\nconnect_timeout_secs = 0\n", MINIMAL);
        assert!(matches!(
            FanConfig::parse(&content),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_required_key_is_a_parse_error() {
        assert!(matches!(
            FanConfig::parse("host = \"10.0.0.2\""),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn unreadable_file_reports_its_path() {
        let result = FanConfig::load(Path::new("/nonexistent/fanlink.toml"));
        match result {
            Err(ConfigError::ReadError { path, .. }) => {
                assert_eq!(path, "/nonexistent/fanlink.toml")
            }
            other => panic!("expected read error, got {:?}", other),
        }
    }

    #[test]
    fn default_path_ends_with_the_config_file() {
        assert!(FanConfig::default_path().ends_with("fanlink.toml"));
    }
}
