//! One-way password hashing with bcrypt.
//!
//! Hashes are self-describing (`$2b$<cost>$<salt><digest>`), so `check` accepts
//! any hash produced by `hash` regardless of the cost it was created with.

use thiserror::Error;

/// bcrypt only consumes the first 72 bytes of its input.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Accepted bcrypt work factors.
pub const MIN_HASH_COST: u32 = 4;
pub const MAX_HASH_COST: u32 = 31;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password exceeds {MAX_PASSWORD_BYTES} bytes")]
    TooLong,
    #[error("password does not match")]
    Mismatch,
    #[error("malformed password hash: {0}")]
    MalformedHash(String),
    #[error("failed to hash password: {0}")]
    Hash(String),
}

#[derive(Clone, Copy, Debug)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl PasswordHasher {
    #[must_use]
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    #[must_use]
    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a plaintext password with a fresh salt.
    ///
    /// # Errors
    /// Returns `TooLong` for inputs over 72 bytes and `Hash` if bcrypt fails.
    pub fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        if plaintext.len() > MAX_PASSWORD_BYTES {
            return Err(PasswordError::TooLong);
        }
        bcrypt::hash(plaintext, self.cost).map_err(|err| PasswordError::Hash(err.to_string()))
    }

    /// Compare a plaintext password against a stored hash in constant time.
    ///
    /// # Errors
    /// Returns `Mismatch` when the password is wrong and `MalformedHash` when the
    /// stored value is not a bcrypt hash.
    pub fn check(&self, plaintext: &str, hashed: &str) -> Result<(), PasswordError> {
        // `hash` never accepts such inputs, so nothing stored can match them.
        if plaintext.len() > MAX_PASSWORD_BYTES {
            return Err(PasswordError::Mismatch);
        }
        match bcrypt::verify(plaintext, hashed) {
            Ok(true) => Ok(()),
            Ok(false) => Err(PasswordError::Mismatch),
            Err(err) => Err(PasswordError::MalformedHash(err.to_string())),
        }
    }
}
