//! Failure kinds surfaced by the HTTP layer and their response mapping.
//!
//! Handlers and middleware return [`ApiError`]; `IntoResponse` is the only
//! place that decides the status code and the `{"errors":[...]}` body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::{store::StoreError, token::TokenError};

pub const USER_DOES_NOT_EXIST: &str = "token is invalid. User does not exist";

/// One entry of an error body; `field` is only set for validation failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct FieldViolation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub msg: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            msg: msg.into(),
        }
    }

    pub fn message(msg: impl Into<String>) -> Self {
        Self {
            field: None,
            msg: msg.into(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub errors: Vec<FieldViolation>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(Vec<FieldViolation>),
    #[error("{0}")]
    BadRequest(String),
    #[error("no rows in result set")]
    NoRow,
    #[error("duplicate key value violates unique constraint \"{0}\"")]
    UniqueViolation(String),
    #[error("password does not match")]
    PasswordMismatch,
    #[error("{0}")]
    VerifyToken(String),
    #[error("authorization header is not provided")]
    AuthHeaderMissing,
    #[error("invalid authorization header format")]
    AuthHeaderMalformed,
    #[error("unsupported authorization type {0}")]
    AuthSchemeUnsupported(String),
    #[error("blocked session")]
    BlockedSession,
    #[error("incorrect session user")]
    WrongUserSession,
    #[error("mismatched session token")]
    WrongSessionToken,
    #[error("expired session")]
    ExpiredSession,
    #[error("session store failure")]
    Session(String),
    #[error("failed to create token")]
    TokenCreation(String),
    #[error("Only {0} is allowed to perform this action")]
    ForbiddenRole(String),
    #[error("internal server error")]
    Internal(String),
}

impl ApiError {
    /// Stable machine name of the failure kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => "validation",
            Self::NoRow => "no_row",
            Self::UniqueViolation(_) => "unique_violation",
            Self::PasswordMismatch => "password_mismatch",
            Self::VerifyToken(_) => "verify_token",
            Self::AuthHeaderMissing => "auth_header_missing",
            Self::AuthHeaderMalformed => "auth_header_malformed",
            Self::AuthSchemeUnsupported(_) => "auth_scheme_unsupported",
            Self::BlockedSession => "blocked_session",
            Self::WrongUserSession => "wrong_user_session",
            Self::WrongSessionToken => "wrong_session_token",
            Self::ExpiredSession => "expired_session",
            Self::Session(_) => "session",
            Self::TokenCreation(_) => "token_creation",
            Self::ForbiddenRole(_) => "forbidden_role",
            Self::Internal(_) => "internal",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NoRow => StatusCode::NOT_FOUND,
            Self::UniqueViolation(_) => StatusCode::FORBIDDEN,
            Self::PasswordMismatch
            | Self::VerifyToken(_)
            | Self::AuthHeaderMissing
            | Self::AuthHeaderMalformed
            | Self::AuthSchemeUnsupported(_)
            | Self::BlockedSession
            | Self::WrongUserSession
            | Self::WrongSessionToken
            | Self::ExpiredSession
            | Self::ForbiddenRole(_) => StatusCode::UNAUTHORIZED,
            Self::Session(_) | Self::TokenCreation(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Map a store failure from a plain lookup or write.
    #[must_use]
    pub fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NoRow,
            StoreError::UniqueViolation(constraint) => Self::UniqueViolation(constraint),
            StoreError::Unavailable(detail) => Self::Internal(detail),
        }
    }

    /// Map a store failure on the session table; io errors become `session`.
    #[must_use]
    pub fn from_session_store(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NoRow,
            other => Self::Session(other.to_string()),
        }
    }

    fn detail(&self) -> Option<&str> {
        match self {
            Self::Session(detail) | Self::TokenCreation(detail) | Self::Internal(detail) => {
                Some(detail)
            }
            _ => None,
        }
    }

    fn body(self) -> ErrorBody {
        match self {
            Self::Validation(errors) => ErrorBody { errors },
            other => ErrorBody {
                errors: vec![FieldViolation::message(other.to_string())],
            },
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        Self::VerifyToken(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        if status.is_server_error() {
            error!(kind, detail = self.detail().unwrap_or_default(), "{}", self);
        } else {
            debug!(kind, "{}", self);
        }
        (status, Json(self.body())).into_response()
    }
}
