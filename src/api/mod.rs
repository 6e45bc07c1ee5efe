use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Extension, Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

pub mod error;
pub mod handlers;
pub mod middleware;
mod openapi;
mod state;
pub mod validation;

#[cfg(test)]
mod tests;

pub use openapi::openapi;
pub use state::{AppState, AuthConfig};

use handlers::{health, roles, tokens, users};
use middleware::{authenticate, authorize, RequiredRole};

/// Routes with their auth layers; callers add transport layers on top.
///
/// Public: registration, login, renewal, health. Authenticated: the caller's
/// own profile and session revocation. Admin: user lookup/deletion and roles.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/health", get(health::health))
        .route("/openapi.json", get(openapi::openapi_json))
        .route("/users", post(users::create_user))
        .route("/users/login", post(users::login_user))
        .route("/tokens/renew_access", post(tokens::renew_access_token));

    let authenticated = Router::new()
        .route("/users", put(users::update_user))
        .route("/users/info", get(users::user_info))
        .route("/tokens/revoke", post(tokens::revoke_session))
        .route_layer(from_fn(authenticate));

    let admin = Router::new()
        .route(
            "/users/{username}",
            get(users::get_user).delete(users::delete_user),
        )
        .route("/role", post(roles::create_role).put(roles::update_role))
        .route("/role/all", post(roles::list_roles))
        .route("/role/{id}", get(roles::get_role))
        .route_layer(from_fn_with_state(RequiredRole::admin(), authorize))
        .route_layer(from_fn(authenticate));

    public
        .merge(authenticated)
        .merge(admin)
        .layer(Extension(state))
}

/// Full application: routes plus request id, tracing and CORS layers.
#[must_use]
pub fn app(state: Arc<AppState>, cors: CorsLayer) -> Router {
    router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors),
    )
}

/// Build the CORS layer from comma separated allow lists; `*` means any.
///
/// # Errors
/// Returns an error if an origin, header or method does not parse.
pub fn cors_layer(origins: &str, headers: &str, methods: &str) -> Result<CorsLayer> {
    let origin = if origins.trim() == "*" {
        AllowOrigin::any()
    } else {
        let list = split_list(origins)
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .with_context(|| format!("Invalid CORS origin: {origin}"))
            })
            .collect::<Result<Vec<_>>>()?;
        AllowOrigin::list(list)
    };

    let allow_headers = if headers.trim() == "*" {
        AllowHeaders::any()
    } else {
        let list = split_list(headers)
            .map(|header| {
                HeaderName::from_bytes(header.to_lowercase().as_bytes())
                    .with_context(|| format!("Invalid CORS header: {header}"))
            })
            .collect::<Result<Vec<_>>>()?;
        AllowHeaders::list(list)
    };

    let allow_methods = if methods.trim() == "*" {
        AllowMethods::any()
    } else {
        let list = split_list(methods)
            .map(|method| {
                Method::from_bytes(method.to_uppercase().as_bytes())
                    .with_context(|| format!("Invalid CORS method: {method}"))
            })
            .collect::<Result<Vec<_>>>()?;
        AllowMethods::list(list)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_headers(allow_headers)
        .allow_methods(allow_methods))
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

/// Start the server
/// # Errors
/// Return error if failed to bind or serve
pub async fn serve(address: SocketAddr, app: Router) -> Result<()> {
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;

    info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
