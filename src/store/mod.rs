//! Persistence contract for users, roles and refresh sessions.
//!
//! Driver errors never cross this boundary: implementations translate them
//! into [`StoreError`] kinds (zero rows, unique violation, unavailable).

#[cfg(test)]
pub mod memory;
mod postgres;

pub use postgres::PgStore;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::token::RoleSnapshot;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no rows in result set")]
    NotFound,
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Role {
    pub internal_id: i64,
    pub external_id: String,
    pub name: String,
    pub description: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Role {
    #[must_use]
    pub fn snapshot(&self) -> RoleSnapshot {
        RoleSnapshot {
            id: self.external_id.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub hashed_password: String,
    pub full_name: String,
    pub email: String,
    pub password_changed_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub role: Role,
    pub is_deleted: bool,
    pub deleted_at: Option<OffsetDateTime>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub username: String,
    pub refresh_token: String,
    pub user_agent: String,
    pub client_ip: String,
    pub is_blocked: bool,
    pub blocked_at: Option<OffsetDateTime>,
    pub expired_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub struct CreateUserParams {
    pub username: String,
    pub hashed_password: String,
    pub full_name: String,
    pub email: String,
    pub role_id: i64,
    pub created_at: OffsetDateTime,
}

/// Fields left as `None` keep their stored value.
#[derive(Clone, Debug, Default)]
pub struct UpdateUserParams {
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub hashed_password: Option<String>,
    pub password_changed_at: Option<OffsetDateTime>,
}

#[derive(Clone, Debug)]
pub struct CreateRoleParams {
    pub external_id: String,
    pub name: String,
    pub description: String,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub struct UpdateRoleParams {
    pub external_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub struct CreateSessionParams {
    pub id: Uuid,
    pub username: String,
    pub refresh_token: String,
    pub user_agent: String,
    pub client_ip: String,
    pub is_blocked: bool,
    pub expired_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    /// Fetch a user by username, including soft-deleted ones.
    async fn get_user(&self, username: &str) -> Result<User, StoreError>;
    async fn create_user(&self, params: CreateUserParams) -> Result<User, StoreError>;
    async fn update_user(&self, params: UpdateUserParams) -> Result<User, StoreError>;
    /// Mark a live user deleted; already-deleted users count as absent.
    async fn soft_delete_user(
        &self,
        username: &str,
        deleted_at: OffsetDateTime,
    ) -> Result<User, StoreError>;

    async fn get_role_by_name(&self, name: &str) -> Result<Role, StoreError>;
    async fn get_role(&self, external_id: &str) -> Result<Role, StoreError>;
    async fn create_role(&self, params: CreateRoleParams) -> Result<Role, StoreError>;
    async fn list_roles(&self, limit: i64, offset: i64) -> Result<Vec<Role>, StoreError>;
    async fn update_role(&self, params: UpdateRoleParams) -> Result<Role, StoreError>;

    async fn create_session(&self, params: CreateSessionParams) -> Result<Session, StoreError>;
    async fn get_session(&self, id: Uuid) -> Result<Session, StoreError>;
    async fn block_session(
        &self,
        id: Uuid,
        blocked_at: OffsetDateTime,
    ) -> Result<Session, StoreError>;
}
