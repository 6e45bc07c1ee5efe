//! API handlers and the response shapes they share.

pub mod health;
pub mod roles;
pub mod tokens;
pub mod users;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::task;
use tracing::warn;
use utoipa::ToSchema;

use super::error::{ApiError, FieldViolation};
use crate::{
    password::{PasswordError, PasswordHasher, MAX_PASSWORD_BYTES},
    store::{Role, User},
};

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleSummary {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub role: RoleSummary,
    #[serde(with = "time::serde::rfc3339")]
    pub password_changed_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            role: RoleSummary {
                id: user.role.external_id.clone(),
                name: user.role.name.clone(),
                description: user.role.description.clone(),
            },
            password_changed_at: user.password_changed_at,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Role> for RoleResponse {
    fn from(role: Role) -> Self {
        Self {
            id: role.external_id,
            name: role.name,
            description: role.description,
            created_at: role.created_at,
            updated_at: role.updated_at,
        }
    }
}

/// Hash on the blocking pool; bcrypt is CPU bound.
pub(crate) async fn hash_password(
    hasher: PasswordHasher,
    password: String,
) -> Result<String, ApiError> {
    let hashed = task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    hashed.map_err(|err| match err {
        PasswordError::TooLong => ApiError::Validation(vec![FieldViolation::new(
            "password",
            format!("the password field must have a maximum value of {MAX_PASSWORD_BYTES}"),
        )]),
        other => ApiError::Internal(other.to_string()),
    })
}

pub(crate) async fn check_password(
    hasher: PasswordHasher,
    password: String,
    hashed: String,
) -> Result<(), ApiError> {
    let checked = task::spawn_blocking(move || hasher.check(&password, &hashed))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    match checked {
        Ok(()) => Ok(()),
        Err(PasswordError::MalformedHash(detail)) => {
            warn!("stored password hash is malformed: {detail}");
            Err(ApiError::PasswordMismatch)
        }
        Err(_) => Err(ApiError::PasswordMismatch),
    }
}
