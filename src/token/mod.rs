//! Bearer token issuance and verification.
//!
//! Access and refresh tokens share one payload shape. Tokens are
//! self-contained: verification never touches the store, so revocation is only
//! possible on the refresh path, where every renewal re-reads the session the
//! refresh token's `id` points at.

mod paseto;

pub use paseto::{PasetoMaker, SYMMETRIC_KEY_SIZE};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid key size: must be exactly {SYMMETRIC_KEY_SIZE} bytes, got {0}")]
    InvalidKeySize(usize),
    #[error("token is invalid")]
    Invalid,
    #[error("token has expired")]
    Expired,
    #[error("failed to encode token: {0}")]
    Encoding(String),
}

/// Snapshot of the owner's role taken at issuance.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleSnapshot {
    /// External role id.
    pub id: String,
    pub name: String,
}

/// Claims carried by access and refresh tokens.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payload {
    pub id: Uuid,
    pub username: String,
    pub role: RoleSnapshot,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expired_at: OffsetDateTime,
}

impl Payload {
    /// Build a payload with a fresh random id, valid from `now` for `duration`.
    ///
    /// # Errors
    /// Returns `Encoding` when `now + duration` is not a representable date.
    pub fn new(
        username: &str,
        role: &RoleSnapshot,
        duration: Duration,
        now: OffsetDateTime,
    ) -> Result<Self, TokenError> {
        // Whole seconds keep the timestamps stable across RFC 3339 and Postgres.
        let issued_at = now.replace_nanosecond(0).unwrap_or(now);
        let expired_at = issued_at.checked_add(duration).ok_or_else(|| {
            TokenError::Encoding(format!("token lifetime {duration} is out of range"))
        })?;
        Ok(Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            role: role.clone(),
            issued_at,
            expired_at,
        })
    }

    /// # Errors
    /// Returns `Expired` once `now` is past `expired_at`.
    pub fn valid_at(&self, now: OffsetDateTime) -> Result<(), TokenError> {
        if now > self.expired_at {
            return Err(TokenError::Expired);
        }
        Ok(())
    }
}

/// Capability to mint and check bearer tokens.
pub trait Maker: Send + Sync {
    /// Issue a token for `username` valid for `duration`.
    ///
    /// # Errors
    /// Returns `Encoding` if the payload cannot be serialized or sealed.
    fn create_token(
        &self,
        username: &str,
        role: &RoleSnapshot,
        duration: Duration,
    ) -> Result<(String, Payload), TokenError>;

    /// Authenticate a token and return its payload.
    ///
    /// # Errors
    /// Returns `Invalid` for forged or malformed tokens and `Expired` for tokens
    /// past their validity window.
    fn verify_token(&self, token: &str) -> Result<Payload, TokenError>;
}
