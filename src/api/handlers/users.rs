//! User accounts and password login.
//!
//! Flow Overview:
//! 1) `POST /users` registers with the configured default role.
//! 2) `POST /users/login` checks the password, then issues an access token and
//!    a refresh token whose id becomes the primary key of a new session row.
//! 3) Authenticated routes read or update the caller; admins read or
//!    soft-delete anyone.

use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{check_password, hash_password, UserResponse};
use crate::{
    api::{
        error::{ApiError, ErrorBody},
        middleware::ClientMeta,
        validation::{Rule, Validate, ValidatedJson, Validator},
        AppState,
    },
    store::{CreateSessionParams, CreateUserParams, UpdateUserParams, User},
    token::Payload,
};

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub email: String,
}

impl Validate for CreateUserRequest {
    fn validate(&self) -> Result<(), ApiError> {
        Validator::new()
            .text("username", &self.username, &[Rule::Required, Rule::Alphanum])
            .text("password", &self.password, &[Rule::Required, Rule::Min(6)])
            .text("full_name", &self.full_name, &[Rule::Required])
            .text("email", &self.email, &[Rule::Required, Rule::Email])
            .finish()
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct LoginUserRequest {
    pub username: String,
    pub password: String,
}

impl Validate for LoginUserRequest {
    fn validate(&self) -> Result<(), ApiError> {
        Validator::new()
            .text("username", &self.username, &[Rule::Required, Rule::Alphanum])
            .text(
                "password",
                &self.password,
                &[Rule::Required, Rule::Alphanum, Rule::Min(6)],
            )
            .finish()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginUserResponse {
    pub session_id: Uuid,
    pub access_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub access_token_expires_at: OffsetDateTime,
    pub refresh_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub refresh_token_expires_at: OffsetDateTime,
    pub user: UserResponse,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl Validate for UpdateUserRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut validator = Validator::new();
        if self.full_name.is_none() && self.email.is_none() && self.password.is_none() {
            validator.reject("body", "at least one of full_name, email or password is required");
        }
        validator
            .optional_text("full_name", self.full_name.as_deref(), &[Rule::Required])
            .optional_text("email", self.email.as_deref(), &[Rule::Required, Rule::Email])
            .optional_text("password", self.password.as_deref(), &[Rule::Required, Rule::Min(6)])
            .finish()
    }
}

fn live(user: User) -> Result<User, ApiError> {
    if user.is_deleted {
        Err(ApiError::NoRow)
    } else {
        Ok(user)
    }
}

#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "User created.", body = UserResponse),
        (status = 400, description = "Invalid input.", body = ErrorBody),
        (status = 403, description = "Username or email already taken.", body = ErrorBody),
        (status = 404, description = "Default role is missing.", body = ErrorBody),
        (status = 500, description = "Store or hashing failure.", body = ErrorBody),
    ),
    tag = "users"
)]
#[instrument(skip_all, fields(username = %request.username))]
pub async fn create_user(
    Extension(state): Extension<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<CreateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let hashed_password = hash_password(state.hasher, request.password).await?;
    let role = state
        .store
        .get_role_by_name(state.config.default_role())
        .await
        .map_err(ApiError::from_store)?;

    let user = state
        .store
        .create_user(CreateUserParams {
            username: request.username,
            hashed_password,
            full_name: request.full_name,
            email: request.email,
            role_id: role.internal_id,
            created_at: state.clock.now(),
        })
        .await
        .map_err(ApiError::from_store)?;

    info!("user created");
    Ok(Json(UserResponse::from(&user)))
}

#[utoipa::path(
    post,
    path = "/users/login",
    request_body = LoginUserRequest,
    responses(
        (status = 200, description = "Tokens issued and session created.", body = LoginUserResponse),
        (status = 400, description = "Invalid input.", body = ErrorBody),
        (status = 401, description = "Password mismatch.", body = ErrorBody),
        (status = 404, description = "User not found.", body = ErrorBody),
        (status = 500, description = "Token or session failure.", body = ErrorBody),
    ),
    tag = "users"
)]
#[instrument(skip_all, fields(username = %request.username))]
pub async fn login_user(
    Extension(state): Extension<Arc<AppState>>,
    meta: ClientMeta,
    ValidatedJson(request): ValidatedJson<LoginUserRequest>,
) -> Result<Json<LoginUserResponse>, ApiError> {
    let user = state
        .store
        .get_user(&request.username)
        .await
        .map_err(ApiError::from_store)
        .and_then(live)?;

    check_password(state.hasher, request.password, user.hashed_password.clone()).await?;

    let role = user.role.snapshot();
    let (access_token, access_payload) = state
        .tokens
        .create_token(&user.username, &role, state.config.access_token_duration())
        .map_err(|err| ApiError::TokenCreation(err.to_string()))?;
    let (refresh_token, refresh_payload) = state
        .tokens
        .create_token(&user.username, &role, state.config.refresh_token_duration())
        .map_err(|err| ApiError::TokenCreation(err.to_string()))?;

    let session = state
        .store
        .create_session(CreateSessionParams {
            id: refresh_payload.id,
            username: user.username.clone(),
            refresh_token: refresh_token.clone(),
            user_agent: meta.user_agent,
            client_ip: meta.client_ip,
            is_blocked: false,
            expired_at: refresh_payload.expired_at,
            created_at: state.clock.now(),
        })
        .await
        .map_err(|err| ApiError::Session(err.to_string()))?;

    info!(session_id = %session.id, "session created");
    Ok(Json(LoginUserResponse {
        session_id: session.id,
        access_token,
        access_token_expires_at: access_payload.expired_at,
        refresh_token,
        refresh_token_expires_at: refresh_payload.expired_at,
        user: UserResponse::from(&user),
    }))
}

#[utoipa::path(
    get,
    path = "/users/info",
    responses(
        (status = 200, description = "The caller.", body = UserResponse),
        (status = 401, description = "Missing or invalid access token.", body = ErrorBody),
        (status = 404, description = "User not found.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn user_info(
    Extension(state): Extension<Arc<AppState>>,
    Extension(payload): Extension<Payload>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .store
        .get_user(&payload.username)
        .await
        .map_err(ApiError::from_store)
        .and_then(live)?;
    Ok(Json(UserResponse::from(&user)))
}

#[utoipa::path(
    get,
    path = "/users/{username}",
    params(
        ("username" = String, Path, description = "Username")
    ),
    responses(
        (status = 200, description = "User detail.", body = UserResponse),
        (status = 401, description = "Missing token or not an admin.", body = ErrorBody),
        (status = 404, description = "User not found.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn get_user(
    Extension(state): Extension<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .store
        .get_user(&username)
        .await
        .map_err(ApiError::from_store)
        .and_then(live)?;
    Ok(Json(UserResponse::from(&user)))
}

#[utoipa::path(
    put,
    path = "/users",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Caller updated.", body = UserResponse),
        (status = 400, description = "Invalid input.", body = ErrorBody),
        (status = 401, description = "Missing or invalid access token.", body = ErrorBody),
        (status = 403, description = "Email already taken.", body = ErrorBody),
        (status = 404, description = "User not found.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
#[instrument(skip_all, fields(username = %payload.username))]
pub async fn update_user(
    Extension(state): Extension<Arc<AppState>>,
    Extension(payload): Extension<Payload>,
    ValidatedJson(request): ValidatedJson<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let mut params = UpdateUserParams {
        username: payload.username,
        full_name: request.full_name,
        email: request.email,
        ..UpdateUserParams::default()
    };
    if let Some(password) = request.password {
        params.hashed_password = Some(hash_password(state.hasher, password).await?);
        params.password_changed_at = Some(state.clock.now());
    }

    let user = state
        .store
        .update_user(params)
        .await
        .map_err(ApiError::from_store)?;

    info!("user updated");
    Ok(Json(UserResponse::from(&user)))
}

#[utoipa::path(
    delete,
    path = "/users/{username}",
    params(
        ("username" = String, Path, description = "Username")
    ),
    responses(
        (status = 200, description = "User soft-deleted.", body = UserResponse),
        (status = 401, description = "Missing token or not an admin.", body = ErrorBody),
        (status = 404, description = "User not found or already deleted.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
#[instrument(skip_all, fields(username = %username))]
pub async fn delete_user(
    Extension(state): Extension<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .store
        .soft_delete_user(&username, state.clock.now())
        .await
        .map_err(ApiError::from_store)?;

    info!("user deleted");
    Ok(Json(UserResponse::from(&user)))
}
