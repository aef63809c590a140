//! Service configuration.
//!
//! Loaded from YAML; every field has a default so an empty file (or no file) is a valid config.
//! [`ServiceConfig::validate`] turns it into a [`ValidatedConfig`] the service runs on.

use anyhow::Context;
use crashpad_execution::PhaseConfig;
use crashpad_types::casino::MAX_CLIENT_SEED_LENGTH;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

#[derive(Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,
    #[serde(default = "default_crash_display_ms")]
    pub crash_display_ms: u64,
    #[serde(default = "default_growth_per_sec")]
    pub growth_per_sec: f64,
    #[serde(default = "default_client_seed")]
    pub client_seed: String,
    /// Hex master secret for the server seed chains. A random one is generated when unset.
    #[serde(default)]
    pub master_secret: Option<String>,
    /// Shared secret that lets an admin account's connection send admin commands. Admin
    /// commands are refused on the wire when unset.
    #[serde(default)]
    pub admin_token: Option<String>,
    #[serde(default = "default_demo_table")]
    pub demo_table: bool,
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    #[serde(default)]
    pub crowd_seed: Option<u64>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9123
}

fn default_database() -> PathBuf {
    PathBuf::from("crashpad.db")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tick_ms() -> u64 {
    100
}

fn default_idle_ms() -> u64 {
    crashpad_execution::round_scheduler::DEFAULT_IDLE_MS
}

fn default_crash_display_ms() -> u64 {
    crashpad_execution::round_scheduler::DEFAULT_CRASH_DISPLAY_MS
}

fn default_growth_per_sec() -> f64 {
    crashpad_execution::round_scheduler::DEFAULT_GROWTH_PER_SEC
}

fn default_client_seed() -> String {
    "crashpad".to_string()
}

fn default_demo_table() -> bool {
    true
}

fn default_broadcast_capacity() -> usize {
    1024
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: default_database(),
            log_level: default_log_level(),
            tick_ms: default_tick_ms(),
            idle_ms: default_idle_ms(),
            crash_display_ms: default_crash_display_ms(),
            growth_per_sec: default_growth_per_sec(),
            client_seed: default_client_seed(),
            master_secret: None,
            admin_token: None,
            demo_table: default_demo_table(),
            broadcast_capacity: default_broadcast_capacity(),
            crowd_seed: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("log_level", &self.log_level)
            .field("tick_ms", &self.tick_ms)
            .field("idle_ms", &self.idle_ms)
            .field("crash_display_ms", &self.crash_display_ms)
            .field("growth_per_sec", &self.growth_per_sec)
            .field("client_seed", &self.client_seed)
            .field(
                "master_secret",
                &self.master_secret.as_ref().map(|_| "<redacted>"),
            )
            .field(
                "admin_token",
                &self.admin_token.as_ref().map(|_| "<redacted>"),
            )
            .field("demo_table", &self.demo_table)
            .field("broadcast_capacity", &self.broadcast_capacity)
            .field("crowd_seed", &self.crowd_seed)
            .finish()
    }
}

pub const MIN_ADMIN_TOKEN_LENGTH: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: u64 },
    #[error("invalid round timing: {0}")]
    InvalidTiming(&'static str),
    #[error("{field} must be 32 bytes of hex")]
    InvalidHex { field: &'static str },
    #[error("client seed must be 1-{MAX_CLIENT_SEED_LENGTH} printable ascii characters")]
    InvalidClientSeed,
    #[error("admin token must be at least {MIN_ADMIN_TOKEN_LENGTH} printable ascii characters")]
    InvalidAdminToken,
    #[error("invalid listen address: {0}")]
    InvalidAddress(String),
}

#[derive(Clone)]
pub struct ValidatedConfig {
    pub host: String,
    pub port: u16,
    pub database: PathBuf,
    pub log_level: Level,
    pub tick: Duration,
    pub timing: PhaseConfig,
    pub client_seed: String,
    pub master_secret: Option<[u8; 32]>,
    pub admin_token: Option<String>,
    pub demo_table: bool,
    pub broadcast_capacity: usize,
    pub crowd_seed: Option<u64>,
}

impl ValidatedConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl ServiceConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        serde_yaml::from_str(&contents).context("could not parse config file")
    }

    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let log_level =
            Level::from_str(&self.log_level).map_err(|_| ConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            })?;
        ensure_nonzero("tick_ms", self.tick_ms)?;
        ensure_nonzero("broadcast_capacity", self.broadcast_capacity as u64)?;

        let timing = PhaseConfig::new(self.idle_ms, self.crash_display_ms, self.growth_per_sec);
        timing.validate().map_err(ConfigError::InvalidTiming)?;

        if self.client_seed.is_empty()
            || self.client_seed.len() > MAX_CLIENT_SEED_LENGTH
            || !self.client_seed.chars().all(|c| c.is_ascii_graphic())
        {
            return Err(ConfigError::InvalidClientSeed);
        }

        let master_secret = self
            .master_secret
            .as_deref()
            .map(|value| {
                let bytes = hex::decode(value.trim_start_matches("0x"))
                    .map_err(|_| ConfigError::InvalidHex { field: "master_secret" })?;
                <[u8; 32]>::try_from(bytes.as_slice())
                    .map_err(|_| ConfigError::InvalidHex { field: "master_secret" })
            })
            .transpose()?;

        if let Some(token) = &self.admin_token {
            if token.len() < MIN_ADMIN_TOKEN_LENGTH || !token.chars().all(|c| c.is_ascii_graphic())
            {
                return Err(ConfigError::InvalidAdminToken);
            }
        }

        let config = ValidatedConfig {
            host: self.host,
            port: self.port,
            database: self.database,
            log_level,
            tick: Duration::from_millis(self.tick_ms),
            timing,
            client_seed: self.client_seed,
            master_secret,
            admin_token: self.admin_token,
            demo_table: self.demo_table,
            broadcast_capacity: self.broadcast_capacity,
            crowd_seed: self.crowd_seed,
        };
        let addr = config.listen_addr();
        addr.parse::<std::net::SocketAddr>()
            .map_err(|_| ConfigError::InvalidAddress(addr))?;
        Ok(config)
    }
}

fn ensure_nonzero(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidNonZero { field, value });
    }
    Ok(())
}
