//! Configuration management for wisdom-channel
//!
//! Settings come from defaults, then a TOML file or the environment.
//! Environment variables use the `WISDOM_CHANNEL_` prefix:
//!
//! | variable | setting |
//! |---|---|
//! | `WISDOM_CHANNEL_ROLE` | `node.role` (`agent` or `wa`) |
//! | `WISDOM_CHANNEL_STATE_DIR` | `node.state_dir` |
//! | `WISDOM_CHANNEL_RECORD_KEY` | `channel.record_key` |
//! | `WISDOM_CHANNEL_PEER_KEY` | `channel.peer_key` |
//! | `WISDOM_CHANNEL_AUTH_KEY` | `channel.auth_key` (`local` or `peer`) |
//! | `WISDOM_CHANNEL_RECV_MAX_PER_MIN` | `rate_limit.max_per_window` |
//! | `WISDOM_CHANNEL_RECV_WINDOW_SECS` | `rate_limit.window` |
//! | `WISDOM_CHANNEL_MAILBOX_DIR` | `mailbox.dir` |
//! | `WISDOM_CHANNEL_REGISTRY_PATH` | `registry.path` |
//! | `WISDOM_CHANNEL_LOG_LEVEL` | `logging.level` |
//! | `WISDOM_CHANNEL_LOG_JSON` | `logging.json_format` |

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod error;

pub use error::ConfigError;

use crate::core_channel::{PollConfig, RateLimiterConfig};
use crate::core_crypto::AuthKeySource;
use crate::core_identity::{PublicId, Role};
use crate::core_mailbox::RecordKey;
use crate::logging::LogLevel;

const ENV_PREFIX: &str = "WISDOM_CHANNEL_";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node: NodeConfig,
    pub channel: ChannelConfig,
    pub rate_limit: RateLimiterConfig,
    pub poll: PollConfig,
    pub mailbox: MailboxConfig,
    pub registry: RegistryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub role: Role,
    /// Holds keypair.json, record.json and secrets.json
    pub state_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Record to listen on; falls back to record.json
    pub record_key: Option<String>,
    /// Counterpart public id; falls back to the registry or secret map
    pub peer_key: Option<String>,
    pub auth_key: AuthKeySource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// Shared directory for the file-backed mailbox
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
    pub with_timestamp: bool,
    pub with_target: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            role: Role::WisdomAuthority,
            state_dir: PathBuf::from("~/.wisdom-channel"),
        }
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("~/.wisdom-channel/mailbox") }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("~/.wisdom-channel/registry.json") }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::invalid(key, format!("'{}' is not a boolean", other))),
    }
}

impl Config {
    /// Load configuration from `WISDOM_CHANNEL_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Apply variables resolved by `lookup` on top of the defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields with any variables `lookup` resolves
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.is_empty());

        if let Some(role) = var("ROLE") {
            self.node.role = role.parse().map_err(|e| ConfigError::invalid("ROLE", e))?;
        }
        if let Some(dir) = var("STATE_DIR") {
            self.node.state_dir = PathBuf::from(dir);
        }

        if let Some(key) = var("RECORD_KEY") {
            self.channel.record_key = Some(key);
        }
        if let Some(key) = var("PEER_KEY") {
            self.channel.peer_key = Some(key);
        }
        if let Some(source) = var("AUTH_KEY") {
            self.channel.auth_key =
                source.parse().map_err(|e: String| ConfigError::invalid("AUTH_KEY", e))?;
        }

        if let Some(max) = var("RECV_MAX_PER_MIN") {
            self.rate_limit.max_per_window = max
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid("RECV_MAX_PER_MIN", e))?;
        }
        if let Some(secs) = var("RECV_WINDOW_SECS") {
            let secs: u64 =
                secs.trim().parse().map_err(|e| ConfigError::invalid("RECV_WINDOW_SECS", e))?;
            self.rate_limit.window = Duration::from_secs(secs);
        }

        if let Some(dir) = var("MAILBOX_DIR") {
            self.mailbox.dir = PathBuf::from(dir);
        }
        if let Some(path) = var("REGISTRY_PATH") {
            self.registry.path = PathBuf::from(path);
        }

        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = var("LOG_JSON") {
            self.logging.json_format = parse_bool("LOG_JSON", &json)?;
        }

        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::FileReadError { path: path.to_path_buf(), source }
        })?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|source| ConfigError::FileWriteError {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.max_per_window == 0 {
            return Err(ConfigError::ValidationFailed(
                "rate_limit.max_per_window must be greater than 0".to_string(),
            ));
        }
        if self.rate_limit.window.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "rate_limit.window must be greater than 0".to_string(),
            ));
        }

        for (name, backoff) in [
            ("poll.empty_backoff", self.poll.empty_backoff),
            ("poll.rate_limit_backoff", self.poll.rate_limit_backoff),
            ("poll.error_backoff", self.poll.error_backoff),
        ] {
            if backoff.is_zero() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        self.record_key()?;
        self.peer_key()?;

        if LogLevel::parse(&self.logging.level).is_none() {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Parsed `channel.record_key`
    pub fn record_key(&self) -> Result<Option<RecordKey>, ConfigError> {
        self.channel
            .record_key
            .as_deref()
            .map(|k| k.parse().map_err(|e| ConfigError::invalid("RECORD_KEY", e)))
            .transpose()
    }

    /// Parsed `channel.peer_key`
    pub fn peer_key(&self) -> Result<Option<PublicId>, ConfigError> {
        self.channel
            .peer_key
            .as_deref()
            .map(|k| k.parse().map_err(|e| ConfigError::invalid("PEER_KEY", e)))
            .transpose()
    }
}
