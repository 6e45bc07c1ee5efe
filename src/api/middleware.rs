//! Bearer authentication and role gating for resource routes.
//!
//! Every protected route runs [`authenticate`] then [`authorize`]; the verified
//! [`Payload`] travels to handlers as a request extension.

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header::USER_AGENT, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
    Extension,
};
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tracing::{debug, warn};

use super::{
    error::{ApiError, USER_DOES_NOT_EXIST},
    state::AppState,
};
use crate::{store::StoreError, token::Payload};

pub const ADMIN_ROLE: &str = "admin";

/// Role a route group requires, handed to [`authorize`] as middleware state.
#[derive(Clone, Debug)]
pub struct RequiredRole(String);

impl RequiredRole {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn admin() -> Self {
        Self::new(ADMIN_ROLE)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Split `<scheme> <token>` and check the scheme against the configured one.
///
/// # Errors
/// Returns the matching `auth_header_*` kind when the header is unusable.
pub fn bearer_token<'a>(header: &'a str, scheme: &str) -> Result<&'a str, ApiError> {
    let header = header.trim();
    if header.is_empty() {
        return Err(ApiError::AuthHeaderMissing);
    }
    let fields: Vec<&str> = header.split_whitespace().collect();
    if fields.len() < 2 {
        return Err(ApiError::AuthHeaderMalformed);
    }
    if !fields[0].eq_ignore_ascii_case(scheme) {
        return Err(ApiError::AuthSchemeUnsupported(fields[0].to_string()));
    }
    Ok(fields[1])
}

pub async fn authenticate(
    Extension(state): Extension<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = match request.headers().get(state.config.header_key()) {
        Some(value) => value
            .to_str()
            .map_err(|_| ApiError::AuthHeaderMalformed)?
            .to_string(),
        None => String::new(),
    };
    let token = bearer_token(&header, state.config.scheme())?;
    let payload = state.tokens.verify_token(token)?;

    let user = state
        .store
        .get_user(&payload.username)
        .await
        .map_err(|err| match err {
            StoreError::NotFound => ApiError::VerifyToken(USER_DOES_NOT_EXIST.to_string()),
            other => {
                warn!("failed to load token owner: {other}");
                ApiError::VerifyToken("token is invalid".to_string())
            }
        })?;
    if user.is_deleted {
        return Err(ApiError::VerifyToken(USER_DOES_NOT_EXIST.to_string()));
    }

    debug!(
        payload_key = state.config.payload_key(),
        username = %payload.username,
        role = %payload.role.name,
        "request authenticated"
    );
    request.extensions_mut().insert(payload);
    Ok(next.run(request).await)
}

pub async fn authorize(
    State(required): State<RequiredRole>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let allowed = request
        .extensions()
        .get::<Payload>()
        .is_some_and(|payload| payload.role.name == required.name());
    if !allowed {
        return Err(ApiError::ForbiddenRole(required.name().to_string()));
    }
    Ok(next.run(request).await)
}

/// Forensic details captured when a session is created.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientMeta {
    pub user_agent: String,
    pub client_ip: String,
}

impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let client_ip = extract_client_ip(&parts.headers)
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_default();
        Ok(Self {
            user_agent,
            client_ip,
        })
    }
}

fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
