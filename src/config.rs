use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KafkaConfig {
    /// Seed brokers of the cluster, as `host:port`.
    pub brokers: Vec<String>,
    /// Default topic every record is published to.
    pub topic: String,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default, rename = "user")]
    pub username: String,
    #[serde(default, rename = "pass")]
    pub password: String,
    /// SCRAM hash strength; 0 selects SASL/PLAIN.
    #[serde(default)]
    pub scram: u32,
    #[serde(default)]
    pub tls: TlsConfig,
}

// Keep the password out of logs.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("scram", &self.scram)
            .field("tls", &self.tls)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, rename = "caPath", alias = "capath")]
    pub ca_path: Option<PathBuf>,
    #[serde(default, rename = "certPath", alias = "certpath")]
    pub cert_path: Option<PathBuf>,
    #[serde(default, rename = "keyPath", alias = "keypath")]
    pub key_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    #[serde(default = "default_flush_timeout_secs")]
    pub flush_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_body_bytes: default_max_body_bytes(),
            request_timeout_secs: default_request_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            flush_timeout_secs: default_flush_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }
}

impl Config {
    /// Loads the file at `path`, applies environment overrides from the
    /// process environment and validates the result.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`] with an explicit variable lookup.
    pub fn load_with_env<P, F>(path: P, lookup: F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Replaces individual fields with the values of their environment
    /// variables, when set.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let kafka = &mut self.kafka;

        if let Some(brokers) = lookup("KAFKA_BROKERS") {
            kafka.brokers = brokers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(username) = lookup("KAFKA_USERNAME") {
            kafka.auth.username = username;
        }
        if let Some(password) = lookup("KAFKA_PASSWORD") {
            kafka.auth.password = password;
        }
        if let Some(scram) = lookup("KAFKA_SCRAM") {
            kafka.auth.scram = parse_env("KAFKA_SCRAM", &scram)?;
        }

        let tls = &mut kafka.auth.tls;
        if let Some(enabled) = lookup("KAFKA_TLS_ENABLED") {
            tls.enabled = parse_flag("KAFKA_TLS_ENABLED", &enabled)?;
        }
        if let Some(path) = lookup("KAFKA_TLS_CA_PATH") {
            tls.ca_path = non_empty_path(path);
        }
        if let Some(path) = lookup("KAFKA_TLS_CERT_PATH") {
            tls.cert_path = non_empty_path(path);
        }
        if let Some(path) = lookup("KAFKA_TLS_KEY_PATH") {
            tls.key_path = non_empty_path(path);
        }

        if let Some(addr) = lookup("GATEWAY_LISTEN_ADDR") {
            self.server.listen_addr = parse_env("GATEWAY_LISTEN_ADDR", &addr)?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.kafka.brokers.is_empty() {
            return Err(Error::Config("kafka.brokers must not be empty".to_string()));
        }
        if let Some(blank) = self.kafka.brokers.iter().position(|b| b.trim().is_empty()) {
            return Err(Error::Config(format!("kafka.brokers[{}] is blank", blank)));
        }
        if self.kafka.topic.trim().is_empty() {
            return Err(Error::Config("kafka.topic must not be empty".to_string()));
        }
        if self.server.max_body_bytes == 0 {
            return Err(Error::Config(
                "server.max_body_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid value {:?} for {}: {}", value, key, e)))
}

/// Accepts the spellings deployments commonly use for booleans:
/// `1`/`0`, `t`/`f` and `true`/`false` in lower, upper or title case.
fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => Err(Error::Config(format!(
            "invalid value {:?} for {}: expected a boolean",
            other, key
        ))),
    }
}

fn non_empty_path(value: String) -> Option<PathBuf> {
    if value.trim().is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_body_bytes() -> usize {
    1_048_576 // 1MB
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

fn default_flush_timeout_secs() -> u64 {
    5
}
