//! Refresh-token exchange and session revocation.
//!
//! A refresh token is only honoured while its session row exists, is not
//! blocked, belongs to the same user, stores the same token and is not
//! expired. Renewal never mutates the session.

use axum::{extract::Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    api::{
        error::{ApiError, ErrorBody},
        validation::{Rule, Validate, ValidatedJson, Validator},
        AppState,
    },
    store::Session,
    token::Payload,
};

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

impl Validate for RefreshTokenRequest {
    fn validate(&self) -> Result<(), ApiError> {
        Validator::new()
            .text("refresh_token", &self.refresh_token, &[Rule::Required])
            .finish()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RenewAccessTokenResponse {
    pub access_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub access_token_expires_at: OffsetDateTime,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RevokeSessionResponse {
    pub session_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub blocked_at: OffsetDateTime,
}

/// Check a live session against the refresh token that references it.
fn check_session(
    session: &Session,
    payload: &Payload,
    refresh_token: &str,
    now: OffsetDateTime,
) -> Result<(), ApiError> {
    if session.is_blocked {
        return Err(ApiError::BlockedSession);
    }
    if session.username != payload.username {
        return Err(ApiError::WrongUserSession);
    }
    if session.refresh_token != refresh_token {
        return Err(ApiError::WrongSessionToken);
    }
    if now >= session.expired_at {
        return Err(ApiError::ExpiredSession);
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/tokens/renew_access",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "New access token.", body = RenewAccessTokenResponse),
        (status = 400, description = "Invalid input.", body = ErrorBody),
        (status = 401, description = "Refresh token or session rejected.", body = ErrorBody),
        (status = 404, description = "Session not found.", body = ErrorBody),
        (status = 500, description = "Session store or token failure.", body = ErrorBody),
    ),
    tag = "tokens"
)]
pub async fn renew_access_token(
    Extension(state): Extension<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<RefreshTokenRequest>,
) -> Result<Json<RenewAccessTokenResponse>, ApiError> {
    let payload = state.tokens.verify_token(&request.refresh_token)?;
    let session = state
        .store
        .get_session(payload.id)
        .await
        .map_err(ApiError::from_session_store)?;
    check_session(&session, &payload, &request.refresh_token, state.clock.now())?;

    let (access_token, access_payload) = state
        .tokens
        .create_token(
            &payload.username,
            &payload.role,
            state.config.access_token_duration(),
        )
        .map_err(|err| ApiError::TokenCreation(err.to_string()))?;

    debug!(session_id = %session.id, "access token renewed");
    Ok(Json(RenewAccessTokenResponse {
        access_token,
        access_token_expires_at: access_payload.expired_at,
    }))
}

#[utoipa::path(
    post,
    path = "/tokens/revoke",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Session blocked.", body = RevokeSessionResponse),
        (status = 400, description = "Invalid input.", body = ErrorBody),
        (status = 401, description = "Token rejected or session owned by someone else.", body = ErrorBody),
        (status = 404, description = "Session not found.", body = ErrorBody),
        (status = 500, description = "Session store failure.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "tokens"
)]
#[instrument(skip_all, fields(username = %caller.username))]
pub async fn revoke_session(
    Extension(state): Extension<Arc<AppState>>,
    Extension(caller): Extension<Payload>,
    ValidatedJson(request): ValidatedJson<RefreshTokenRequest>,
) -> Result<Json<RevokeSessionResponse>, ApiError> {
    let payload = state.tokens.verify_token(&request.refresh_token)?;
    let session = state
        .store
        .get_session(payload.id)
        .await
        .map_err(ApiError::from_session_store)?;
    if session.username != caller.username || payload.username != caller.username {
        return Err(ApiError::WrongUserSession);
    }

    let now = state.clock.now();
    let session = state
        .store
        .block_session(session.id, now)
        .await
        .map_err(ApiError::from_session_store)?;

    info!(session_id = %session.id, "session revoked");
    Ok(Json(RevokeSessionResponse {
        session_id: session.id,
        blocked_at: session.blocked_at.unwrap_or(now),
    }))
}
