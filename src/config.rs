//! Service configuration record.
//!
//! One YAML file per deployment environment (`config/development.yaml`,
//! `config/production.yaml`, ...). The record is loaded once at startup and is
//! read-only afterwards.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};
use thiserror::Error;
use time::Duration;

use crate::{
    password::{MAX_HASH_COST, MIN_HASH_COST},
    token::SYMMETRIC_KEY_SIZE,
};

pub const DEFAULT_CONFIG_DIR: &str = "config";
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Upper bound for access and refresh token lifetimes.
pub const MAX_TOKEN_DURATION: Duration = Duration::days(366);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub name: String,
    #[serde(default = "default_db_driver")]
    pub db_driver: String,
    #[serde(deserialize_with = "secret")]
    pub db_source: SecretString,
    #[serde(default)]
    pub migration_url: String,
    pub http_server_address: String,
    #[serde(deserialize_with = "secret")]
    pub token_symmetric_key: SecretString,
    #[serde(deserialize_with = "duration")]
    pub access_token_duration: Duration,
    #[serde(deserialize_with = "duration")]
    pub refresh_token_duration: Duration,
    #[serde(default = "default_role")]
    pub default_role: String,
    #[serde(default = "default_authorization_header_key")]
    pub authorization_header_key: String,
    #[serde(default = "default_authorization_type_bearer")]
    pub authorization_type_bearer: String,
    #[serde(default = "default_authorization_payload_key")]
    pub authorization_payload_key: String,
    #[serde(default = "default_allow_origin")]
    pub access_control_allow_origin: String,
    #[serde(default = "default_allow_headers")]
    pub access_control_allow_headers: String,
    #[serde(default = "default_allow_methods")]
    pub access_control_allow_methods: String,
    #[serde(default = "default_password_hash_cost")]
    pub password_hash_cost: u32,
}

fn default_db_driver() -> String {
    "postgres".to_string()
}

fn default_role() -> String {
    "customer".to_string()
}

fn default_authorization_header_key() -> String {
    "authorization".to_string()
}

fn default_authorization_type_bearer() -> String {
    "bearer".to_string()
}

fn default_authorization_payload_key() -> String {
    "authorization_payload".to_string()
}

fn default_allow_origin() -> String {
    "*".to_string()
}

fn default_allow_headers() -> String {
    "content-type,authorization".to_string()
}

fn default_allow_methods() -> String {
    "GET,POST,PUT,DELETE,OPTIONS".to_string()
}

const fn default_password_hash_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

fn duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

/// Parse compact durations such as `15m`, `24h`, `1h30m`, `90s` or `500ms`.
///
/// # Errors
/// Returns `Invalid` for empty input, unknown units or missing numbers.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ConfigError::Invalid("empty duration".to_string()));
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest.chars().take_while(char::is_ascii_digit).count();
        if digits == 0 {
            return Err(ConfigError::Invalid(format!("invalid duration: {input}")));
        }
        let value: i64 = rest[..digits]
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid duration: {input}")))?;
        rest = &rest[digits..];

        let unit_len = rest.chars().take_while(char::is_ascii_alphabetic).count();
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let millis_per_unit: i64 = match unit {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "invalid duration unit {unit:?} in {input}"
                )))
            }
        };
        let overflow = || ConfigError::Invalid(format!("duration out of range: {input}"));
        let part = value
            .checked_mul(millis_per_unit)
            .map(Duration::milliseconds)
            .ok_or_else(overflow)?;
        total = total.checked_add(part).ok_or_else(overflow)?;
    }

    Ok(total)
}

fn check_token_duration(name: &str, duration: Duration) -> Result<(), ConfigError> {
    if !duration.is_positive() {
        return Err(ConfigError::Invalid(format!("{name} must be positive")));
    }
    if duration > MAX_TOKEN_DURATION {
        return Err(ConfigError::Invalid(format!(
            "{name} must not exceed {MAX_TOKEN_DURATION}"
        )));
    }
    Ok(())
}

/// Resolve which file to load: an explicit path wins, otherwise
/// `<dir>/<environment>.yaml`.
#[must_use]
pub fn resolve_path(explicit: Option<&str>, dir: &str, environment: &str) -> PathBuf {
    explicit.map_or_else(
        || Path::new(dir).join(format!("{environment}.yaml")),
        PathBuf::from,
    )
}

impl Config {
    /// Read and validate a YAML config file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    /// # Errors
    /// Returns an error if the document is not a valid config record.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(raw)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    fn normalize(&mut self) {
        self.authorization_header_key = self.authorization_header_key.trim().to_lowercase();
        self.authorization_type_bearer = self.authorization_type_bearer.trim().to_lowercase();
        self.db_driver = self.db_driver.trim().to_lowercase();
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.db_driver != "postgres" {
            return Err(ConfigError::Invalid(format!(
                "unsupported db_driver: {}",
                self.db_driver
            )));
        }
        let key_len = self.token_symmetric_key.expose_secret().len();
        if key_len != SYMMETRIC_KEY_SIZE {
            return Err(ConfigError::Invalid(format!(
                "token_symmetric_key must be exactly {SYMMETRIC_KEY_SIZE} bytes, got {key_len}"
            )));
        }
        self.listen_address()?;
        check_token_duration("access_token_duration", self.access_token_duration)?;
        check_token_duration("refresh_token_duration", self.refresh_token_duration)?;
        if self.authorization_header_key.is_empty() || self.authorization_type_bearer.is_empty() {
            return Err(ConfigError::Invalid(
                "authorization header key and type must not be empty".to_string(),
            ));
        }
        if self.default_role.trim().is_empty() {
            return Err(ConfigError::Invalid("default_role must not be empty".to_string()));
        }
        if !(MIN_HASH_COST..=MAX_HASH_COST).contains(&self.password_hash_cost) {
            return Err(ConfigError::Invalid(format!(
                "password_hash_cost must be between {MIN_HASH_COST} and {MAX_HASH_COST}"
            )));
        }
        Ok(())
    }

    /// # Errors
    /// Returns `Invalid` when `http_server_address` is not `host:port`.
    pub fn listen_address(&self) -> Result<SocketAddr, ConfigError> {
        self.http_server_address.parse().map_err(|_| {
            ConfigError::Invalid(format!(
                "invalid http_server_address: {}",
                self.http_server_address
            ))
        })
    }

    /// Directory holding migrations, if any are configured.
    #[must_use]
    pub fn migration_dir(&self) -> Option<PathBuf> {
        let url = self.migration_url.trim();
        if url.is_empty() {
            return None;
        }
        Some(PathBuf::from(url.strip_prefix("file://").unwrap_or(url)))
    }
}
