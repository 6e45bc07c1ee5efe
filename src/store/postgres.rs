//! Postgres-backed store.

use async_trait::async_trait;
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use time::OffsetDateTime;
use tracing::{info_span, Instrument, Span};
use uuid::Uuid;

use super::{
    CreateRoleParams, CreateSessionParams, CreateUserParams, Role, Session, Store, StoreError,
    UpdateRoleParams, UpdateUserParams, User,
};

const UNIQUE_VIOLATION: &str = "23505";

const USER_COLUMNS: &str = r"
    u.username, u.hashed_password, u.full_name, u.email, u.password_changed_at,
    u.created_at, u.is_deleted, u.deleted_at,
    r.internal_id, r.external_id, r.name, r.description,
    r.created_at AS role_created_at, r.updated_at AS role_updated_at
";

const ROLE_COLUMNS: &str = "internal_id, external_id, name, description, created_at, updated_at";

const SESSION_COLUMNS: &str = r"
    id, username, refresh_token, user_agent, client_ip, is_blocked, blocked_at,
    expired_at, created_at
";

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_span(operation: &str, statement: &str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

/// Translate driver errors into store kinds.
pub(super) fn map_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db_err)
            if db_err
                .code()
                .is_some_and(|code| code.as_ref() == UNIQUE_VIOLATION) =>
        {
            StoreError::UniqueViolation(db_err.constraint().unwrap_or("unique").to_string())
        }
        other => StoreError::Unavailable(other.to_string()),
    }
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        username: row.try_get("username")?,
        hashed_password: row.try_get("hashed_password")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        password_changed_at: row.try_get("password_changed_at")?,
        created_at: row.try_get("created_at")?,
        is_deleted: row.try_get("is_deleted")?,
        deleted_at: row.try_get("deleted_at")?,
        role: Role {
            internal_id: row.try_get("internal_id")?,
            external_id: row.try_get("external_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            created_at: row.try_get("role_created_at")?,
            updated_at: row.try_get("role_updated_at")?,
        },
    })
}

fn role_from_row(row: &PgRow) -> Result<Role, sqlx::Error> {
    Ok(Role {
        internal_id: row.try_get("internal_id")?,
        external_id: row.try_get("external_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn session_from_row(row: &PgRow) -> Result<Session, sqlx::Error> {
    Ok(Session {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        refresh_token: row.try_get("refresh_token")?,
        user_agent: row.try_get("user_agent")?,
        client_ip: row.try_get("client_ip")?,
        is_blocked: row.try_get("is_blocked")?,
        blocked_at: row.try_get("blocked_at")?,
        expired_at: row.try_get("expired_at")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        async {
            let mut conn = self.pool.acquire().await.map_err(map_error)?;
            conn.ping().await.map_err(map_error)
        }
        .instrument(span)
        .await
    }

    async fn get_user(&self, username: &str) -> Result<User, StoreError> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users u JOIN roles r ON r.internal_id = u.role_id WHERE u.username = $1"
        );
        let row = sqlx::query(&query)
            .bind(username)
            .fetch_one(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .map_err(map_error)?;
        user_from_row(&row).map_err(map_error)
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<User, StoreError> {
        let query = format!(
            r"
            WITH u AS (
                INSERT INTO users (username, hashed_password, full_name, email, role_id, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *
            )
            SELECT {USER_COLUMNS} FROM u JOIN roles r ON r.internal_id = u.role_id
            "
        );
        let row = sqlx::query(&query)
            .bind(&params.username)
            .bind(&params.hashed_password)
            .bind(&params.full_name)
            .bind(&params.email)
            .bind(params.role_id)
            .bind(params.created_at)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", &query))
            .await
            .map_err(map_error)?;
        user_from_row(&row).map_err(map_error)
    }

    async fn update_user(&self, params: UpdateUserParams) -> Result<User, StoreError> {
        let query = format!(
            r"
            WITH u AS (
                UPDATE users SET
                    full_name = COALESCE($2, full_name),
                    email = COALESCE($3, email),
                    hashed_password = COALESCE($4, hashed_password),
                    password_changed_at = COALESCE($5, password_changed_at)
                WHERE username = $1 AND NOT is_deleted
                RETURNING *
            )
            SELECT {USER_COLUMNS} FROM u JOIN roles r ON r.internal_id = u.role_id
            "
        );
        let row = sqlx::query(&query)
            .bind(&params.username)
            .bind(params.full_name)
            .bind(params.email)
            .bind(params.hashed_password)
            .bind(params.password_changed_at)
            .fetch_one(&self.pool)
            .instrument(query_span("UPDATE", &query))
            .await
            .map_err(map_error)?;
        user_from_row(&row).map_err(map_error)
    }

    async fn soft_delete_user(
        &self,
        username: &str,
        deleted_at: OffsetDateTime,
    ) -> Result<User, StoreError> {
        let query = format!(
            r"
            WITH u AS (
                UPDATE users SET is_deleted = TRUE, deleted_at = $2
                WHERE username = $1 AND NOT is_deleted
                RETURNING *
            )
            SELECT {USER_COLUMNS} FROM u JOIN roles r ON r.internal_id = u.role_id
            "
        );
        let row = sqlx::query(&query)
            .bind(username)
            .bind(deleted_at)
            .fetch_one(&self.pool)
            .instrument(query_span("UPDATE", &query))
            .await
            .map_err(map_error)?;
        user_from_row(&row).map_err(map_error)
    }

    async fn get_role_by_name(&self, name: &str) -> Result<Role, StoreError> {
        let query = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE name = $1");
        let row = sqlx::query(&query)
            .bind(name)
            .fetch_one(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .map_err(map_error)?;
        role_from_row(&row).map_err(map_error)
    }

    async fn get_role(&self, external_id: &str) -> Result<Role, StoreError> {
        let query = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE external_id = $1");
        let row = sqlx::query(&query)
            .bind(external_id)
            .fetch_one(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .map_err(map_error)?;
        role_from_row(&row).map_err(map_error)
    }

    async fn create_role(&self, params: CreateRoleParams) -> Result<Role, StoreError> {
        let query = format!(
            r"
            INSERT INTO roles (external_id, name, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING {ROLE_COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(&params.external_id)
            .bind(&params.name)
            .bind(&params.description)
            .bind(params.created_at)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", &query))
            .await
            .map_err(map_error)?;
        role_from_row(&row).map_err(map_error)
    }

    async fn list_roles(&self, limit: i64, offset: i64) -> Result<Vec<Role>, StoreError> {
        let query =
            format!("SELECT {ROLE_COLUMNS} FROM roles ORDER BY name LIMIT $1 OFFSET $2");
        let rows = sqlx::query(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .map_err(map_error)?;
        rows.iter()
            .map(role_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_error)
    }

    async fn update_role(&self, params: UpdateRoleParams) -> Result<Role, StoreError> {
        let query = format!(
            r"
            UPDATE roles SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                updated_at = $4
            WHERE external_id = $1
            RETURNING {ROLE_COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(&params.external_id)
            .bind(params.name)
            .bind(params.description)
            .bind(params.updated_at)
            .fetch_one(&self.pool)
            .instrument(query_span("UPDATE", &query))
            .await
            .map_err(map_error)?;
        role_from_row(&row).map_err(map_error)
    }

    async fn create_session(&self, params: CreateSessionParams) -> Result<Session, StoreError> {
        let query = format!(
            r"
            INSERT INTO sessions
                (id, username, refresh_token, user_agent, client_ip, is_blocked, expired_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {SESSION_COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(params.id)
            .bind(&params.username)
            .bind(&params.refresh_token)
            .bind(&params.user_agent)
            .bind(&params.client_ip)
            .bind(params.is_blocked)
            .bind(params.expired_at)
            .bind(params.created_at)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", &query))
            .await
            .map_err(map_error)?;
        session_from_row(&row).map_err(map_error)
    }

    async fn get_session(&self, id: Uuid) -> Result<Session, StoreError> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_one(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .map_err(map_error)?;
        session_from_row(&row).map_err(map_error)
    }

    async fn block_session(
        &self,
        id: Uuid,
        blocked_at: OffsetDateTime,
    ) -> Result<Session, StoreError> {
        // Blocking twice keeps the first timestamp.
        let query = format!(
            r"
            UPDATE sessions SET
                is_blocked = TRUE,
                blocked_at = COALESCE(blocked_at, $2)
            WHERE id = $1
            RETURNING {SESSION_COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(blocked_at)
            .fetch_one(&self.pool)
            .instrument(query_span("UPDATE", &query))
            .await
            .map_err(map_error)?;
        session_from_row(&row).map_err(map_error)
    }
}
