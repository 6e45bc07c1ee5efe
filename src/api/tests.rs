use anyhow::{anyhow, Result};
use axum::{
    body::Body,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
        Method, Request, StatusCode,
    },
    Router,
};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};
use tower::ServiceExt;
use ulid::Ulid;
use uuid::Uuid;

use super::{cors_layer, router, AppState, AuthConfig};
use crate::{
    clock::{Clock, FixedClock},
    password::PasswordHasher,
    store::{memory::MemoryStore, CreateRoleParams, CreateSessionParams, CreateUserParams, Store},
    token::{Maker, PasetoMaker, Payload, RoleSnapshot, TokenError},
};

const KEY: &str = "12345678901234567890123456789012";

fn t0() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    clock: Arc<FixedClock>,
    tokens: Arc<PasetoMaker>,
    hasher: PasswordHasher,
}

/// Verifies like the real maker but cannot mint new tokens.
struct MintlessMaker {
    inner: Arc<PasetoMaker>,
}

impl Maker for MintlessMaker {
    fn create_token(
        &self,
        _username: &str,
        _role: &RoleSnapshot,
        _duration: Duration,
    ) -> Result<(String, Payload), TokenError> {
        Err(TokenError::Encoding("entropy source unavailable".to_string()))
    }

    fn verify_token(&self, token: &str) -> Result<Payload, TokenError> {
        self.inner.verify_token(token)
    }
}

impl Harness {
    async fn new() -> Result<Self> {
        Self::with_maker(|tokens| -> Arc<dyn Maker> { tokens }).await
    }

    async fn with_maker(wrap: impl FnOnce(Arc<PasetoMaker>) -> Arc<dyn Maker>) -> Result<Self> {
        let clock = Arc::new(FixedClock::new(t0()));
        let store = Arc::new(MemoryStore::new());
        for (name, description) in [("admin", "Hotel staff"), ("customer", "Guests")] {
            store
                .create_role(CreateRoleParams {
                    external_id: Ulid::new().to_string(),
                    name: name.to_string(),
                    description: description.to_string(),
                    created_at: t0(),
                })
                .await?;
        }
        let tokens = Arc::new(PasetoMaker::new(&SecretString::from(KEY), clock.clone())?);
        let hasher = PasswordHasher::new(4);
        let state = Arc::new(AppState {
            store: store.clone(),
            tokens: wrap(tokens.clone()),
            clock: clock.clone(),
            hasher,
            config: AuthConfig::new(),
        });
        Ok(Self {
            app: router(state),
            store,
            clock,
            tokens,
            hasher,
        })
    }

    async fn seed_user(&self, username: &str, password: &str, role: &str) -> Result<()> {
        let role = self.store.get_role_by_name(role).await?;
        self.store
            .create_user(CreateUserParams {
                username: username.to_string(),
                hashed_password: self.hasher.hash(password)?,
                full_name: format!("{username} Example"),
                email: format!("{username}@example.com"),
                role_id: role.internal_id,
                created_at: t0(),
            })
            .await?;
        Ok(())
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_AGENT, "frontdesk/2.1");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };
        self.dispatch(request).await
    }

    async fn dispatch(&self, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let response = self.app.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, value))
    }

    async fn login(&self, username: &str, password: &str) -> Result<Value> {
        let (status, body) = self
            .send(
                Method::POST,
                "/users/login",
                Some(json!({"username": username, "password": password})),
                None,
            )
            .await?;
        if status != StatusCode::OK {
            return Err(anyhow!("login failed with {status}: {body}"));
        }
        Ok(body)
    }

    async fn renew(&self, refresh_token: &str) -> Result<(StatusCode, Value)> {
        self.send(
            Method::POST,
            "/tokens/renew_access",
            Some(json!({"refresh_token": refresh_token})),
            None,
        )
        .await
    }
}

fn text<'a>(body: &'a Value, key: &str) -> &'a str {
    body[key].as_str().unwrap_or_default()
}

fn first_msg(body: &Value) -> &str {
    body["errors"][0]["msg"].as_str().unwrap_or_default()
}

fn timestamp(body: &Value, key: &str) -> Result<OffsetDateTime> {
    Ok(OffsetDateTime::parse(text(body, key), &Rfc3339)?)
}

#[tokio::test]
async fn login_issues_tokens_and_records_session() -> Result<()> {
    let h = Harness::new().await?;
    h.seed_user("alice", "lexy84", "admin").await?;

    let body = h.login("alice", "lexy84").await?;
    assert!(text(&body, "access_token").starts_with("v4.local."));
    assert!(text(&body, "refresh_token").starts_with("v4.local."));
    assert_eq!(
        timestamp(&body, "access_token_expires_at")?,
        t0() + Duration::minutes(15)
    );
    assert_eq!(
        timestamp(&body, "refresh_token_expires_at")?,
        t0() + Duration::hours(24)
    );
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["role"]["name"], "admin");
    assert!(body["user"].get("hashed_password").is_none());

    let refresh = h.tokens.verify_token(text(&body, "refresh_token"))?;
    let session_id: Uuid = text(&body, "session_id").parse()?;
    assert_eq!(session_id, refresh.id);

    let session = h.store.get_session(session_id).await?;
    assert_eq!(session.refresh_token, text(&body, "refresh_token"));
    assert_eq!(session.username, "alice");
    assert_eq!(session.user_agent, "frontdesk/2.1");
    assert_eq!(session.expired_at, refresh.expired_at);
    assert!(!session.is_blocked);
    Ok(())
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() -> Result<()> {
    let h = Harness::new().await?;
    h.seed_user("alice", "lexy84", "admin").await?;

    let (status, body) = h
        .send(
            Method::POST,
            "/users/login",
            Some(json!({"username": "alice", "password": "wrongpass"})),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(first_msg(&body), "password does not match");
    assert_eq!(h.store.session_count(), 0);
    Ok(())
}

#[tokio::test]
async fn login_for_unknown_user() -> Result<()> {
    let h = Harness::new().await?;

    let (status, body) = h
        .send(
            Method::POST,
            "/users/login",
            Some(json!({"username": "ghost", "password": "x"})),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"errors": [{"field": "password", "msg": "the password field must have a minimum value of 6"}]})
    );

    let (status, body) = h
        .send(
            Method::POST,
            "/users/login",
            Some(json!({"username": "ghost", "password": "lexy84"})),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(first_msg(&body), "no rows in result set");
    Ok(())
}

#[tokio::test]
async fn renewal_after_block_is_rejected() -> Result<()> {
    let h = Harness::new().await?;
    h.seed_user("alice", "lexy84", "admin").await?;
    let body = h.login("alice", "lexy84").await?;
    let session_id: Uuid = text(&body, "session_id").parse()?;

    h.store.block_session(session_id, h.clock.now()).await?;

    let (status, body) = h.renew(text(&body, "refresh_token")).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(first_msg(&body), "blocked session");
    Ok(())
}

#[tokio::test]
async fn renewal_with_tampered_token_is_rejected() -> Result<()> {
    let h = Harness::new().await?;
    h.seed_user("alice", "lexy84", "admin").await?;
    let body = h.login("alice", "lexy84").await?;

    let mut bytes = text(&body, "refresh_token").as_bytes().to_vec();
    let middle = bytes.len() / 2;
    bytes[middle] = if bytes[middle] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(bytes)?;

    let (status, body) = h.renew(&tampered).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(first_msg(&body), "token is invalid");
    Ok(())
}

#[tokio::test]
async fn admin_route_is_gated_by_role() -> Result<()> {
    let h = Harness::new().await?;
    h.seed_user("alice", "lexy84", "admin").await?;
    h.seed_user("carol", "lexy84", "customer").await?;

    let customer = h.login("carol", "lexy84").await?;
    let (status, body) = h
        .send(
            Method::GET,
            "/users/alice",
            None,
            Some(text(&customer, "access_token")),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        first_msg(&body),
        "Only admin is allowed to perform this action"
    );

    let admin = h.login("alice", "lexy84").await?;
    let (status, body) = h
        .send(
            Method::GET,
            "/users/carol",
            None,
            Some(text(&admin, "access_token")),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "carol");
    assert_eq!(body["role"]["name"], "customer");
    Ok(())
}

#[tokio::test]
async fn renewal_is_repeatable_and_leaves_session_untouched() -> Result<()> {
    let h = Harness::new().await?;
    h.seed_user("alice", "lexy84", "admin").await?;
    let body = h.login("alice", "lexy84").await?;
    let refresh_token = text(&body, "refresh_token").to_string();
    let session_id: Uuid = text(&body, "session_id").parse()?;
    let before = h.store.get_session(session_id).await?;

    h.clock.advance(Duration::minutes(20));
    let (status, first) = h.renew(&refresh_token).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, second) = h.renew(&refresh_token).await?;
    assert_eq!(status, StatusCode::OK);

    let first_payload = h.tokens.verify_token(text(&first, "access_token"))?;
    let second_payload = h.tokens.verify_token(text(&second, "access_token"))?;
    assert_ne!(first_payload.id, second_payload.id);
    assert!(second_payload.expired_at >= first_payload.expired_at);
    assert_eq!(
        timestamp(&first, "access_token_expires_at")?,
        t0() + Duration::minutes(35)
    );
    assert_eq!(first_payload.role.name, "admin");

    assert_eq!(h.store.get_session(session_id).await?, before);
    Ok(())
}

#[tokio::test]
async fn renewal_rejects_mismatched_sessions() -> Result<()> {
    let h = Harness::new().await?;
    let role = h.store.get_role_by_name("customer").await?.snapshot();

    // Session stores a different token string.
    let (token, payload) = h.tokens.create_token("alice", &role, Duration::hours(24))?;
    h.store
        .create_session(CreateSessionParams {
            id: payload.id,
            username: "alice".to_string(),
            refresh_token: "v4.local.something-else".to_string(),
            user_agent: String::new(),
            client_ip: String::new(),
            is_blocked: false,
            expired_at: payload.expired_at,
            created_at: t0(),
        })
        .await?;
    let (status, body) = h.renew(&token).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(first_msg(&body), "mismatched session token");

    // Session belongs to another user.
    let (token, payload) = h.tokens.create_token("mallory", &role, Duration::hours(24))?;
    h.store
        .create_session(CreateSessionParams {
            id: payload.id,
            username: "alice".to_string(),
            refresh_token: token.clone(),
            user_agent: String::new(),
            client_ip: String::new(),
            is_blocked: false,
            expired_at: payload.expired_at,
            created_at: t0(),
        })
        .await?;
    let (status, body) = h.renew(&token).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(first_msg(&body), "incorrect session user");

    // Session expires before the token does.
    let (token, payload) = h.tokens.create_token("alice", &role, Duration::hours(24))?;
    h.store
        .create_session(CreateSessionParams {
            id: payload.id,
            username: "alice".to_string(),
            refresh_token: token.clone(),
            user_agent: String::new(),
            client_ip: String::new(),
            is_blocked: false,
            expired_at: t0() + Duration::minutes(1),
            created_at: t0(),
        })
        .await?;
    h.clock.advance(Duration::minutes(2));
    let (status, body) = h.renew(&token).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(first_msg(&body), "expired session");

    // No session at all.
    let (token, _) = h.tokens.create_token("alice", &role, Duration::hours(24))?;
    let (status, _) = h.renew(&token).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn renewal_reports_store_outage_as_session_error() -> Result<()> {
    let h = Harness::new().await?;
    h.seed_user("alice", "lexy84", "admin").await?;
    let body = h.login("alice", "lexy84").await?;

    h.store.set_offline(true);
    let (status, body) = h.renew(text(&body, "refresh_token")).await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(first_msg(&body), "session store failure");
    Ok(())
}

#[tokio::test]
async fn login_reports_user_lookup_outage_as_internal() -> Result<()> {
    let h = Harness::new().await?;
    h.seed_user("alice", "lexy84", "admin").await?;

    h.store.set_offline(true);
    let (status, body) = h
        .send(
            Method::POST,
            "/users/login",
            Some(json!({"username": "alice", "password": "lexy84"})),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(first_msg(&body), "internal server error");
    Ok(())
}

#[tokio::test]
async fn login_reports_session_insert_failure() -> Result<()> {
    let h = Harness::new().await?;
    h.seed_user("alice", "lexy84", "admin").await?;

    h.store.set_reject_sessions(true);
    let (status, body) = h
        .send(
            Method::POST,
            "/users/login",
            Some(json!({"username": "alice", "password": "lexy84"})),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(first_msg(&body), "session store failure");
    assert!(body.get("access_token").is_none());
    assert_eq!(h.store.session_count(), 0);
    Ok(())
}

#[tokio::test]
async fn login_reports_token_creation_failure() -> Result<()> {
    let h = Harness::with_maker(|inner| -> Arc<dyn Maker> { Arc::new(MintlessMaker { inner }) })
        .await?;
    h.seed_user("alice", "lexy84", "admin").await?;

    let (status, body) = h
        .send(
            Method::POST,
            "/users/login",
            Some(json!({"username": "alice", "password": "lexy84"})),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(first_msg(&body), "failed to create token");
    assert_eq!(h.store.session_count(), 0);
    Ok(())
}

#[tokio::test]
async fn renewal_reports_token_creation_failure() -> Result<()> {
    let h = Harness::with_maker(|inner| -> Arc<dyn Maker> { Arc::new(MintlessMaker { inner }) })
        .await?;
    h.seed_user("alice", "lexy84", "admin").await?;
    let user = h.store.get_user("alice").await?;

    let (refresh_token, refresh) = h
        .tokens
        .create_token("alice", &user.role.snapshot(), Duration::hours(24))?;
    h.store
        .create_session(CreateSessionParams {
            id: refresh.id,
            username: "alice".to_string(),
            refresh_token: refresh_token.clone(),
            user_agent: "frontdesk/2.1".to_string(),
            client_ip: "10.0.0.7".to_string(),
            is_blocked: false,
            expired_at: refresh.expired_at,
            created_at: t0(),
        })
        .await?;

    let (status, body) = h.renew(&refresh_token).await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(first_msg(&body), "failed to create token");
    Ok(())
}

#[tokio::test]
async fn renewal_after_refresh_expiry_fails_verification() -> Result<()> {
    let h = Harness::new().await?;
    h.seed_user("alice", "lexy84", "admin").await?;
    let body = h.login("alice", "lexy84").await?;

    h.clock.advance(Duration::hours(24) + Duration::seconds(1));
    let (status, body) = h.renew(text(&body, "refresh_token")).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(first_msg(&body), "token has expired");
    Ok(())
}

#[tokio::test]
async fn authentication_header_failures() -> Result<()> {
    let h = Harness::new().await?;

    let cases = [
        (None, "authorization header is not provided"),
        (Some("   "), "authorization header is not provided"),
        (Some("v4.local.abc"), "invalid authorization header format"),
        (Some("Basic dXNlcjpwYXNz"), "unsupported authorization type Basic"),
        (Some("bearer v4.local.abc"), "token is invalid"),
    ];
    for (header, msg) in cases {
        let mut builder = Request::builder().method(Method::GET).uri("/users/info");
        if let Some(header) = header {
            builder = builder.header(AUTHORIZATION, header);
        }
        let (status, body) = h.dispatch(builder.body(Body::empty())?).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{header:?}");
        assert_eq!(first_msg(&body), msg, "{header:?}");
    }
    Ok(())
}

#[tokio::test]
async fn expired_access_token_is_rejected() -> Result<()> {
    let h = Harness::new().await?;
    h.seed_user("alice", "lexy84", "admin").await?;
    let body = h.login("alice", "lexy84").await?;

    h.clock.advance(Duration::minutes(16));
    let (status, body) = h
        .send(Method::GET, "/users/info", None, Some(text(&body, "access_token")))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(first_msg(&body), "token has expired");
    Ok(())
}

#[tokio::test]
async fn deleted_user_loses_access() -> Result<()> {
    let h = Harness::new().await?;
    h.seed_user("alice", "lexy84", "admin").await?;
    h.seed_user("bob", "lexy84", "customer").await?;
    let admin = h.login("alice", "lexy84").await?;
    let bob = h.login("bob", "lexy84").await?;

    let (status, body) = h
        .send(Method::DELETE, "/users/bob", None, Some(text(&admin, "access_token")))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "bob");

    let (status, body) = h
        .send(Method::GET, "/users/info", None, Some(text(&bob, "access_token")))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(first_msg(&body), "token is invalid. User does not exist");

    let (status, _) = h
        .send(
            Method::POST,
            "/users/login",
            Some(json!({"username": "bob", "password": "lexy84"})),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = h
        .send(Method::DELETE, "/users/bob", None, Some(text(&admin, "access_token")))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn create_user_assigns_default_role() -> Result<()> {
    let h = Harness::new().await?;
    let request = json!({
        "username": "dave",
        "password": "secret1",
        "full_name": "Dave Example",
        "email": "dave@example.com",
    });

    let (status, body) = h
        .send(Method::POST, "/users", Some(request.clone()), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "dave");
    assert_eq!(body["role"]["name"], "customer");
    assert!(body.get("hashed_password").is_none());

    let (status, _) = h.send(Method::POST, "/users", Some(request), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    h.login("dave", "secret1").await?;
    Ok(())
}

#[tokio::test]
async fn create_user_reports_every_invalid_field() -> Result<()> {
    let h = Harness::new().await?;
    let (status, body) = h
        .send(
            Method::POST,
            "/users",
            Some(json!({"username": "dave_1", "password": "abc", "email": "nope"})),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"errors": [
            {"field": "username", "msg": "the username field must be of type alphanumeric"},
            {"field": "password", "msg": "the password field must have a minimum value of 6"},
            {"field": "full_name", "msg": "the full_name field is required"},
            {"field": "email", "msg": "the email field is invalid"},
        ]})
    );
    Ok(())
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() -> Result<()> {
    let h = Harness::new().await?;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/users/login")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{\"username\": "))?;
    let (status, body) = h.dispatch(request).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let errors = body["errors"].as_array().cloned().unwrap_or_default();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].get("field").is_none());
    Ok(())
}

#[tokio::test]
async fn update_user_changes_profile_and_password() -> Result<()> {
    let h = Harness::new().await?;
    h.seed_user("alice", "lexy84", "customer").await?;
    let body = h.login("alice", "lexy84").await?;
    let token = text(&body, "access_token").to_string();

    let (status, body) = h
        .send(Method::PUT, "/users", Some(json!({})), Some(&token))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "body");

    h.clock.advance(Duration::minutes(1));
    let (status, body) = h
        .send(
            Method::PUT,
            "/users",
            Some(json!({"full_name": "Alice Liddell", "password": "newpass1"})),
            Some(&token),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["full_name"], "Alice Liddell");
    assert_eq!(
        timestamp(&body, "password_changed_at")?,
        t0() + Duration::minutes(1)
    );

    h.login("alice", "newpass1").await?;
    let (status, _) = h
        .send(
            Method::POST,
            "/users/login",
            Some(json!({"username": "alice", "password": "lexy84"})),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn user_info_returns_caller() -> Result<()> {
    let h = Harness::new().await?;
    h.seed_user("alice", "lexy84", "customer").await?;
    let body = h.login("alice", "lexy84").await?;

    let (status, body) = h
        .send(Method::GET, "/users/info", None, Some(text(&body, "access_token")))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["email"], "alice@example.com");
    Ok(())
}

#[tokio::test]
async fn revoke_blocks_own_session_only() -> Result<()> {
    let h = Harness::new().await?;
    h.seed_user("alice", "lexy84", "customer").await?;
    h.seed_user("bob", "lexy84", "customer").await?;
    let alice = h.login("alice", "lexy84").await?;
    let bob = h.login("bob", "lexy84").await?;
    let refresh_token = text(&alice, "refresh_token");

    let (status, body) = h
        .send(
            Method::POST,
            "/tokens/revoke",
            Some(json!({"refresh_token": refresh_token})),
            Some(text(&bob, "access_token")),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(first_msg(&body), "incorrect session user");

    let (status, body) = h
        .send(
            Method::POST,
            "/tokens/revoke",
            Some(json!({"refresh_token": refresh_token})),
            Some(text(&alice, "access_token")),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], alice["session_id"]);
    assert_eq!(timestamp(&body, "blocked_at")?, t0());

    let (status, body) = h.renew(refresh_token).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(first_msg(&body), "blocked session");
    Ok(())
}

#[tokio::test]
async fn role_management_round() -> Result<()> {
    let h = Harness::new().await?;
    h.seed_user("alice", "lexy84", "admin").await?;
    let admin = h.login("alice", "lexy84").await?;
    let token = text(&admin, "access_token").to_string();

    let (status, created) = h
        .send(
            Method::POST,
            "/role",
            Some(json!({"name": "housekeeping", "description": "Room service staff"})),
            Some(&token),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let id = text(&created, "id").to_string();
    assert_eq!(id.len(), 26);

    let (status, _) = h
        .send(
            Method::POST,
            "/role",
            Some(json!({"name": "housekeeping", "description": "again"})),
            Some(&token),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, fetched) = h
        .send(Method::GET, &format!("/role/{id}"), None, Some(&token))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "housekeeping");

    let (status, _) = h
        .send(Method::GET, "/role/01ARZ3NDEKTSV4RRFFQ69G5FAV", None, Some(&token))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    h.clock.advance(Duration::minutes(10));
    let (status, updated) = h
        .send(
            Method::PUT,
            "/role",
            Some(json!({"id": id, "description": "Rooms and linen"})),
            Some(&token),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "housekeeping");
    assert_eq!(updated["description"], "Rooms and linen");
    assert_eq!(timestamp(&updated, "updated_at")?, t0() + Duration::minutes(10));

    let (status, listed) = h
        .send(
            Method::POST,
            "/role/all",
            Some(json!({"page_id": 1, "page_size": 5})),
            Some(&token),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<_> = listed
        .as_array()
        .map(|roles| roles.iter().map(|r| r["name"].clone()).collect())
        .unwrap_or_default();
    assert_eq!(names, vec!["admin", "customer", "housekeeping"]);

    let (status, body) = h
        .send(
            Method::POST,
            "/role/all",
            Some(json!({"page_id": 0, "page_size": 100})),
            Some(&token),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"errors": [
            {"field": "page_id", "msg": "the page_id field is required"},
            {"field": "page_size", "msg": "the page_size field must have a maximum value of 50"},
        ]})
    );
    Ok(())
}

#[tokio::test]
async fn health_reflects_store() -> Result<()> {
    let h = Harness::new().await?;
    let (status, body) = h.send(Method::GET, "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "ok");
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));

    h.store.set_offline(true);
    let (status, body) = h.send(Method::GET, "/health", None, None).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["database"], "error");
    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> Result<()> {
    let h = Harness::new().await?;
    let (status, body) = h.send(Method::GET, "/openapi.json", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"].get("/users/login").is_some());
    Ok(())
}

#[test]
fn cors_layer_parses_lists() {
    assert!(cors_layer("*", "content-type,authorization", "GET,POST,PUT,DELETE,OPTIONS").is_ok());
    assert!(cors_layer("https://frontdesk.example.com, https://admin.example.com", "*", "*").is_ok());
    assert!(cors_layer("*", "bad header", "GET").is_err());
}
