use serde::Deserialize;
use std::io;
use std::path::Path;
use std::time::Duration;

use crate::ofp_header::{OPENFLOW_0_01_VERSION, OPENFLOW_0_04_VERSION};

#[derive(Debug, Fail)]
pub enum ConfigError {
    #[fail(display = "Cannot read configuration: {}", error)]
    Io {
        #[cause]
        error: io::Error,
    },
    #[fail(display = "Cannot parse configuration: {}", error)]
    Parse {
        #[cause]
        error: toml::de::Error,
    },
    #[fail(display = "Invalid configuration: {}", message)]
    Validation {
        message: String,
    },
}

/// Controller settings, read from a TOML file. Every field has a default.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    /// Address switches connect to.
    pub listen_address: String,
    /// Seconds between two stats polling cycles.
    pub poll_interval: u64,
    pub send_echo_requests: bool,
    /// Send a set-config once the handshake completes.
    pub send_set_config: bool,
    /// Ask for features again whenever an echo reply went out.
    pub send_features_request_on_echo: bool,
    /// Polling cycles skipped while a previous one is unfinished, before starting over.
    pub overlap_skip_threshold: u32,
    pub supported_versions: Vec<u8>,
    /// log4rs configuration file.
    pub log_config: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            listen_address: "0.0.0.0:6653".to_string(),
            poll_interval: 60,
            send_echo_requests: true,
            send_set_config: true,
            send_features_request_on_echo: false,
            overlap_skip_threshold: 5,
            supported_versions: vec![OPENFLOW_0_01_VERSION, OPENFLOW_0_04_VERSION],
            log_config: "log4rs.yml".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|error| ConfigError::Io { error })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ControllerConfig =
            toml::from_str(content).map_err(|error| ConfigError::Parse { error })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval == 0 {
            return Err(ConfigError::Validation {
                message: "poll_interval must be greater than 0".to_string(),
            });
        }
        if self.supported_versions.is_empty() {
            return Err(ConfigError::Validation {
                message: "supported_versions must not be empty".to_string(),
            });
        }
        for version in &self.supported_versions {
            if *version != OPENFLOW_0_01_VERSION && *version != OPENFLOW_0_04_VERSION {
                return Err(ConfigError::Validation {
                    message: format!("OpenFlow version 0x{:02x} is not supported", version),
                });
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    /// Upper bound for waiting on the last fragments of a multipart reply.
    pub fn multipart_wait(&self) -> Duration {
        self.poll_interval() / 2
    }
}
