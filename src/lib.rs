//! # Innkeep (Hospitality Authentication Core)
//!
//! `innkeep` handles staff and guest accounts for a hospitality backend:
//! registration, password login, short-lived access tokens and longer-lived
//! refresh sessions, and role-based access to administrative routes.
//!
//! ## Tokens & Sessions
//!
//! Access and refresh tokens are `PASETO` v4.local tokens sealed with a
//! 32-byte symmetric key. Each login creates a session row keyed by the
//! refresh token's id; renewal re-checks that row (blocked, owner, token,
//! expiry) before minting a new access token. Revoking a session blocks it.
//!
//! ## Roles
//!
//! Every user holds exactly one role. The role name is copied into the token
//! at issuance; admin-only routes compare against that snapshot.

pub mod api;
pub mod cli;
pub mod clock;
pub mod config;
pub mod password;
pub mod store;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
