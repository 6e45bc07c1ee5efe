//! PASETO `v4.local` token maker.
//!
//! The payload is encrypted and authenticated with one process-wide symmetric
//! key; any bit flip in the token fails decryption.

use pasetors::keys::SymmetricKey;
use pasetors::token::UntrustedToken;
use pasetors::version4::{LocalToken, V4};
use pasetors::Local;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use time::Duration;
use tracing::debug;

use super::{Maker, Payload, RoleSnapshot, TokenError};
use crate::clock::Clock;

pub const SYMMETRIC_KEY_SIZE: usize = 32;

pub struct PasetoMaker {
    key: SymmetricKey<V4>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PasetoMaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasetoMaker")
            .field("key", &"***")
            .field("clock", &self.clock)
            .finish()
    }
}

impl PasetoMaker {
    /// Build a maker from a 32-byte symmetric key.
    ///
    /// # Errors
    /// Returns `InvalidKeySize` when the key is not exactly 32 bytes.
    pub fn new(symmetric_key: &SecretString, clock: Arc<dyn Clock>) -> Result<Self, TokenError> {
        let bytes = symmetric_key.expose_secret().as_bytes();
        if bytes.len() != SYMMETRIC_KEY_SIZE {
            return Err(TokenError::InvalidKeySize(bytes.len()));
        }
        let key = SymmetricKey::<V4>::from(bytes)
            .map_err(|_| TokenError::InvalidKeySize(bytes.len()))?;
        Ok(Self { key, clock })
    }
}

impl Maker for PasetoMaker {
    fn create_token(
        &self,
        username: &str,
        role: &RoleSnapshot,
        duration: Duration,
    ) -> Result<(String, Payload), TokenError> {
        let payload = Payload::new(username, role, duration, self.clock.now())?;
        let message =
            serde_json::to_vec(&payload).map_err(|err| TokenError::Encoding(err.to_string()))?;
        let token = LocalToken::encrypt(&self.key, &message, None, None)
            .map_err(|err| TokenError::Encoding(err.to_string()))?;
        Ok((token, payload))
    }

    fn verify_token(&self, token: &str) -> Result<Payload, TokenError> {
        let untrusted = UntrustedToken::<Local, V4>::try_from(token).map_err(|err| {
            debug!("rejecting malformed token: {err}");
            TokenError::Invalid
        })?;
        let trusted = LocalToken::decrypt(&self.key, &untrusted, None, None).map_err(|err| {
            debug!("rejecting unauthenticated token: {err}");
            TokenError::Invalid
        })?;
        let payload: Payload =
            serde_json::from_str(trusted.payload()).map_err(|_| TokenError::Invalid)?;
        payload.valid_at(self.clock.now())?;
        Ok(payload)
    }
}
