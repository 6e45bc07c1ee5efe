//! Shared request state and authentication settings.

use std::sync::Arc;
use time::Duration;

use crate::{
    clock::Clock, config::Config, password::PasswordHasher, store::Store, token::Maker,
};

const DEFAULT_ACCESS_TOKEN_MINUTES: i64 = 15;
const DEFAULT_REFRESH_TOKEN_HOURS: i64 = 24;
const DEFAULT_HEADER_KEY: &str = "authorization";
const DEFAULT_SCHEME: &str = "bearer";
const DEFAULT_PAYLOAD_KEY: &str = "authorization_payload";
const DEFAULT_ROLE: &str = "customer";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    access_token_duration: Duration,
    refresh_token_duration: Duration,
    header_key: String,
    scheme: String,
    payload_key: String,
    default_role: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_duration: Duration::minutes(DEFAULT_ACCESS_TOKEN_MINUTES),
            refresh_token_duration: Duration::hours(DEFAULT_REFRESH_TOKEN_HOURS),
            header_key: DEFAULT_HEADER_KEY.to_string(),
            scheme: DEFAULT_SCHEME.to_string(),
            payload_key: DEFAULT_PAYLOAD_KEY.to_string(),
            default_role: DEFAULT_ROLE.to_string(),
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .with_access_token_duration(config.access_token_duration)
            .with_refresh_token_duration(config.refresh_token_duration)
            .with_header_key(&config.authorization_header_key)
            .with_scheme(&config.authorization_type_bearer)
            .with_payload_key(&config.authorization_payload_key)
            .with_default_role(&config.default_role)
    }

    #[must_use]
    pub fn with_access_token_duration(mut self, duration: Duration) -> Self {
        self.access_token_duration = duration;
        self
    }

    #[must_use]
    pub fn with_refresh_token_duration(mut self, duration: Duration) -> Self {
        self.refresh_token_duration = duration;
        self
    }

    #[must_use]
    pub fn with_header_key(mut self, key: &str) -> Self {
        self.header_key = key.trim().to_lowercase();
        self
    }

    #[must_use]
    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.trim().to_lowercase();
        self
    }

    #[must_use]
    pub fn with_payload_key(mut self, key: &str) -> Self {
        self.payload_key = key.to_string();
        self
    }

    #[must_use]
    pub fn with_default_role(mut self, role: &str) -> Self {
        self.default_role = role.to_string();
        self
    }

    #[must_use]
    pub const fn access_token_duration(&self) -> Duration {
        self.access_token_duration
    }

    #[must_use]
    pub const fn refresh_token_duration(&self) -> Duration {
        self.refresh_token_duration
    }

    #[must_use]
    pub fn header_key(&self) -> &str {
        &self.header_key
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Name under which the verified payload is recorded in request spans.
    #[must_use]
    pub fn payload_key(&self) -> &str {
        &self.payload_key
    }

    #[must_use]
    pub fn default_role(&self) -> &str {
        &self.default_role
    }
}

/// Everything a handler needs, built once at startup.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub tokens: Arc<dyn Maker>,
    pub clock: Arc<dyn Clock>,
    pub hasher: PasswordHasher,
    pub config: AuthConfig,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("clock", &self.clock)
            .field("hasher", &self.hasher)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
