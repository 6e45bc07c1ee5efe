//! In-memory store used by handler and middleware tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    CreateRoleParams, CreateSessionParams, CreateUserParams, Role, Session, Store, StoreError,
    UpdateRoleParams, UpdateUserParams, User,
};

#[derive(Debug, Default)]
struct Tables {
    roles: Vec<Role>,
    users: HashMap<String, StoredUser>,
    sessions: HashMap<Uuid, Session>,
}

#[derive(Clone, Debug)]
struct StoredUser {
    user: User,
    role_id: i64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    offline: AtomicBool,
    reject_sessions: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the database were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fail session inserts only; reads and user lookups keep working.
    pub fn set_reject_sessions(&self, reject: bool) {
        self.reject_sessions.store(reject, Ordering::SeqCst);
    }

    fn tables(&self) -> Result<std::sync::MutexGuard<'_, Tables>, StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("poisoned".to_string()))
    }

    pub fn session_count(&self) -> usize {
        self.tables.lock().map_or(0, |tables| tables.sessions.len())
    }
}

impl Tables {
    fn role_by_id(&self, internal_id: i64) -> Result<Role, StoreError> {
        self.roles
            .iter()
            .find(|role| role.internal_id == internal_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn hydrate(&self, stored: &StoredUser) -> Result<User, StoreError> {
        let mut user = stored.user.clone();
        user.role = self.role_by_id(stored.role_id)?;
        Ok(user)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.tables().map(|_| ())
    }

    async fn get_user(&self, username: &str) -> Result<User, StoreError> {
        let tables = self.tables()?;
        let stored = tables.users.get(username).ok_or(StoreError::NotFound)?;
        tables.hydrate(stored)
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<User, StoreError> {
        let mut tables = self.tables()?;
        if tables.users.contains_key(&params.username) {
            return Err(StoreError::UniqueViolation("users_pkey".to_string()));
        }
        if tables.users.values().any(|u| u.user.email == params.email) {
            return Err(StoreError::UniqueViolation("users_email_key".to_string()));
        }
        let role = tables.role_by_id(params.role_id)?;
        let stored = StoredUser {
            user: User {
                username: params.username.clone(),
                hashed_password: params.hashed_password,
                full_name: params.full_name,
                email: params.email,
                password_changed_at: OffsetDateTime::UNIX_EPOCH,
                created_at: params.created_at,
                role,
                is_deleted: false,
                deleted_at: None,
            },
            role_id: params.role_id,
        };
        tables.users.insert(params.username, stored.clone());
        tables.hydrate(&stored)
    }

    async fn update_user(&self, params: UpdateUserParams) -> Result<User, StoreError> {
        let mut tables = self.tables()?;
        if let Some(email) = &params.email {
            let taken = tables
                .users
                .values()
                .any(|u| &u.user.email == email && u.user.username != params.username);
            if taken {
                return Err(StoreError::UniqueViolation("users_email_key".to_string()));
            }
        }
        let stored = tables
            .users
            .get_mut(&params.username)
            .filter(|stored| !stored.user.is_deleted)
            .ok_or(StoreError::NotFound)?;
        if let Some(full_name) = params.full_name {
            stored.user.full_name = full_name;
        }
        if let Some(email) = params.email {
            stored.user.email = email;
        }
        if let Some(hashed_password) = params.hashed_password {
            stored.user.hashed_password = hashed_password;
        }
        if let Some(changed_at) = params.password_changed_at {
            stored.user.password_changed_at = changed_at;
        }
        let stored = stored.clone();
        tables.hydrate(&stored)
    }

    async fn soft_delete_user(
        &self,
        username: &str,
        deleted_at: OffsetDateTime,
    ) -> Result<User, StoreError> {
        let mut tables = self.tables()?;
        let stored = tables
            .users
            .get_mut(username)
            .filter(|stored| !stored.user.is_deleted)
            .ok_or(StoreError::NotFound)?;
        stored.user.is_deleted = true;
        stored.user.deleted_at = Some(deleted_at);
        let stored = stored.clone();
        tables.hydrate(&stored)
    }

    async fn get_role_by_name(&self, name: &str) -> Result<Role, StoreError> {
        let tables = self.tables()?;
        tables
            .roles
            .iter()
            .find(|role| role.name == name)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_role(&self, external_id: &str) -> Result<Role, StoreError> {
        let tables = self.tables()?;
        tables
            .roles
            .iter()
            .find(|role| role.external_id == external_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create_role(&self, params: CreateRoleParams) -> Result<Role, StoreError> {
        let mut tables = self.tables()?;
        if tables.roles.iter().any(|role| role.name == params.name) {
            return Err(StoreError::UniqueViolation("roles_name_key".to_string()));
        }
        let internal_id = tables
            .roles
            .iter()
            .map(|role| role.internal_id)
            .max()
            .unwrap_or(0)
            + 1;
        let role = Role {
            internal_id,
            external_id: params.external_id,
            name: params.name,
            description: params.description,
            created_at: params.created_at,
            updated_at: params.created_at,
        };
        tables.roles.push(role.clone());
        Ok(role)
    }

    async fn list_roles(&self, limit: i64, offset: i64) -> Result<Vec<Role>, StoreError> {
        let tables = self.tables()?;
        let mut roles = tables.roles.clone();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }

    async fn update_role(&self, params: UpdateRoleParams) -> Result<Role, StoreError> {
        let mut tables = self.tables()?;
        if let Some(name) = &params.name {
            let taken = tables
                .roles
                .iter()
                .any(|role| &role.name == name && role.external_id != params.external_id);
            if taken {
                return Err(StoreError::UniqueViolation("roles_name_key".to_string()));
            }
        }
        let role = tables
            .roles
            .iter_mut()
            .find(|role| role.external_id == params.external_id)
            .ok_or(StoreError::NotFound)?;
        if let Some(name) = params.name {
            role.name = name;
        }
        if let Some(description) = params.description {
            role.description = description;
        }
        role.updated_at = params.updated_at;
        Ok(role.clone())
    }

    async fn create_session(&self, params: CreateSessionParams) -> Result<Session, StoreError> {
        if self.reject_sessions.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("sessions table is read-only".to_string()));
        }
        let mut tables = self.tables()?;
        if tables.sessions.contains_key(&params.id) {
            return Err(StoreError::UniqueViolation("sessions_pkey".to_string()));
        }
        let session = Session {
            id: params.id,
            username: params.username,
            refresh_token: params.refresh_token,
            user_agent: params.user_agent,
            client_ip: params.client_ip,
            is_blocked: params.is_blocked,
            blocked_at: None,
            expired_at: params.expired_at,
            created_at: params.created_at,
        };
        tables.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: Uuid) -> Result<Session, StoreError> {
        let tables = self.tables()?;
        tables.sessions.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn block_session(
        &self,
        id: Uuid,
        blocked_at: OffsetDateTime,
    ) -> Result<Session, StoreError> {
        let mut tables = self.tables()?;
        let session = tables.sessions.get_mut(&id).ok_or(StoreError::NotFound)?;
        session.is_blocked = true;
        if session.blocked_at.is_none() {
            session.blocked_at = Some(blocked_at);
        }
        Ok(session.clone())
    }
}
