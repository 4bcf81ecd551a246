//! Configuration Module
//!
//! Flat, process-wide broker configuration: bind address, connection limits,
//! keep-alive, anonymous-access policy, and the username→password directory.
//! Loaded from defaults, overridden by an optional TOML file, overridden by
//! `MQTTBROKER__*` environment variables, with CLI flags applied last by the
//! caller in `main.rs` (see SPEC_FULL §10.3).

use std::collections::HashMap;
use std::path::Path;

use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};


/// Configuration error types.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading the config file.
    Io(std::io::Error),
    /// TOML parsing error.
    Parse(toml::de::Error),
    /// Error from the `config` crate's layered builder.
    Config(config::ConfigError),
    /// Failed a post-load sanity check.
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config io error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
            ConfigError::Config(e) => write!(f, "config error: {e}"),
            ConfigError::Validation(msg) => write!(f, "config validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_web_port() -> u16 {
    8080
}

fn default_max_connections() -> usize {
    1000
}

fn default_max_keepalive_seconds() -> u16 {
    300
}

/// Process-wide broker configuration (SPEC_FULL §3 "Configuration" plus the
/// `web_port` field carried through for admin-surface compatibility, §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_web_port")]
    pub web_port: u16,
    #[serde(default)]
    pub allow_anonymous: bool,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_keepalive_seconds")]
    pub max_keepalive_seconds: u16,
    /// username -> plaintext password (see SPEC_FULL §9: preserved, not hardened).
    #[serde(default)]
    pub users: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            web_port: default_web_port(),
            allow_anonymous: false,
            max_connections: default_max_connections(),
            max_keepalive_seconds: default_max_keepalive_seconds(),
            users: HashMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file on disk, then layer
    /// `MQTTBROKER__*` environment variables on top. Defaults apply wherever
    /// neither source sets a field.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("host", default_host())?
            .set_default("port", default_port() as i64)?
            .set_default("web_port", default_web_port() as i64)?
            .set_default("allow_anonymous", false)?
            .set_default("max_connections", default_max_connections() as i64)?
            .set_default(
                "max_keepalive_seconds",
                default_max_keepalive_seconds() as i64,
            )?;

        if let Some(path) = path {
            let content = std::fs::read_to_string(path)?;
            builder = builder.add_source(File::from_str(&content, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("MQTTBROKER")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build()?;
        let parsed: Config = cfg.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Load configuration purely from the process environment (no file).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Parse configuration directly from a TOML string — used by tests that
    /// don't want to touch the filesystem.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let parsed: Config = toml::from_str(content)?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Basic sanity checks beyond what serde's type system already enforces.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Validation("port must be nonzero".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Validation(
                "max_connections must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}
