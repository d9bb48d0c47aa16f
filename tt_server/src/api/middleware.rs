//! Request middleware: panic recovery, metrics, CORS, authentication and
//! permission gates.
//!
//! # Usage
//!
//! Gates are applied per route group with `route_layer`, after the
//! authentication layer has put an [`Identity`] into the request extensions:
//!
//! ```rust,no_run
//! use axum::{Router, routing::get, middleware};
//! # use tt_server::api::middleware::require_todos_read;
//! # use tt_server::api::AppState;
//! # async fn handler() {}
//! # let state: AppState = unimplemented!();
//!
//! let reads: Router<AppState> = Router::new()
//!     .route("/v1/todos", get(handler))
//!     .route_layer(middleware::from_fn_with_state(state.clone(), require_todos_read));
//! # let _ = reads;
//! ```

use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use todo_tracker::auth::AuthError;
use todo_tracker::permissions::PermissionCode;
use todo_tracker::users::Identity;

use super::AppState;
use super::errors::ApiError;
use crate::logging::log_security_event;
use crate::metrics;

/// Turn a panic anywhere below into a logged 500 that closes the connection.
pub async fn recover_panic(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());

            let mut response =
                ApiError::Internal(format!("panic in {method} {path}: {message}")).into_response();
            response
                .headers_mut()
                .insert(header::CONNECTION, HeaderValue::from_static("close"));
            response
        }
    }
}

/// Count requests and responses and time each request.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let started = Instant::now();
    metrics::request_received();

    let response = next.run(request).await;

    metrics::response_sent(
        response.status().as_u16(),
        started.elapsed().as_micros() as f64,
    );
    response
}

/// CORS for the configured trusted origins.
///
/// A trusted origin gets `Access-Control-Allow-Origin` echoed back. A
/// preflight (`OPTIONS` carrying `Access-Control-Request-Method`) from a
/// trusted origin is answered here with 200. Every other request, including
/// preflights from untrusted origins, continues down the chain.
pub async fn enable_cors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let trusted_origin = request
        .headers()
        .get(header::ORIGIN)
        .filter(|origin| {
            origin
                .to_str()
                .is_ok_and(|o| state.cors_trusted_origins.iter().any(|t| t == o))
        })
        .cloned();
    let preflight = request.method() == Method::OPTIONS
        && request
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);

    let mut response = match &trusted_origin {
        Some(_) if preflight => {
            let mut response = StatusCode::OK.into_response();
            let headers = response.headers_mut();
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("OPTIONS, PUT, PATCH, DELETE"),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("Authorization, Content-Type"),
            );
            response
        }
        _ => next.run(request).await,
    };

    let headers = response.headers_mut();
    headers.append(header::VARY, HeaderValue::from_static("Origin"));
    headers.append(
        header::VARY,
        HeaderValue::from_static("Access-Control-Request-Method"),
    );
    if let Some(origin) = trusted_origin {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    response
}

/// Resolve the `Authorization` header into an [`Identity`].
///
/// No header means [`Identity::Anonymous`]. A header that is present but not
/// a well-formed, live bearer token is rejected with 401.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let authorization = request.headers().get(header::AUTHORIZATION).cloned();
    let identity = match resolve_identity(&state, authorization).await {
        Ok(identity) => identity,
        Err(err) => {
            let mut response = err.into_response();
            append_vary(&mut response);
            return response;
        }
    };

    request.extensions_mut().insert(identity);
    let mut response = next.run(request).await;
    append_vary(&mut response);
    response
}

async fn resolve_identity(
    state: &AppState,
    authorization: Option<HeaderValue>,
) -> Result<Identity, ApiError> {
    let Some(value) = authorization else {
        return Ok(Identity::Anonymous);
    };

    let value = value
        .to_str()
        .map_err(|_| ApiError::InvalidAuthenticationToken)?;
    let parts: Vec<&str> = value.split(' ').collect();
    if parts.len() != 2 || parts[0] != "Bearer" {
        return Err(ApiError::InvalidAuthenticationToken);
    }

    match state.auth.authenticate_bearer(parts[1]).await {
        Ok(user) => Ok(Identity::User(user)),
        Err(AuthError::InvalidToken) => {
            log_security_event("invalid_token", None, None, "bearer token rejected");
            Err(ApiError::InvalidAuthenticationToken)
        }
        Err(e) => Err(e.into()),
    }
}

fn append_vary(response: &mut Response) {
    response.headers_mut().append(
        header::VARY,
        HeaderValue::from_static("Authorization"),
    );
}

/// Check the caller is an activated user holding `code`.
async fn check_permission(
    state: &AppState,
    identity: Option<Identity>,
    code: PermissionCode,
) -> Result<(), ApiError> {
    let user = match identity {
        Some(Identity::User(user)) => user,
        _ => return Err(ApiError::AuthenticationRequired),
    };

    if !user.activated {
        return Err(ApiError::InactiveAccount);
    }

    let permissions = state.auth.permissions(user.id).await?;
    if !permissions.includes(code) {
        return Err(ApiError::NotPermitted);
    }
    Ok(())
}

/// Gate for routes that read todos.
pub async fn require_todos_read(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let identity = request.extensions().get::<Identity>().cloned();
    match check_permission(&state, identity, PermissionCode::TodosRead).await {
        Ok(()) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}

/// Gate for routes that modify todos.
pub async fn require_todos_write(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let identity = request.extensions().get::<Identity>().cloned();
    match check_permission(&state, identity, PermissionCode::TodosWrite).await {
        Ok(()) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}

/// Fallback for paths no route matches
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Fallback for a known path with an unsupported method
pub async fn method_not_allowed(method: Method) -> ApiError {
    ApiError::MethodNotAllowed(method)
}
