//! HTTP API for the todo tracker.
//!
//! # Modules
//!
//! - [`users`]: registration and activation
//! - [`tokens`]: activation token re-issue and authentication tokens
//! - [`todos`]: owner-scoped todo CRUD
//! - [`batch`]: batch delete
//! - [`middleware`]: panic recovery, metrics, CORS, authentication, permission gates
//! - [`rate_limiter`]: per-client token buckets
//! - [`request_id`]: request tagging and tracing spans
//! - [`json`]: body decoding and response encoding
//! - [`errors`]: the error taxonomy every failure maps into
//!
//! # Endpoints
//!
//! ```text
//! GET    /v1/healthcheck              - Liveness (public)
//! POST   /v1/users                    - Register (public)
//! PUT    /v1/users/activation         - Activate (public)
//! POST   /v1/tokens/activation        - Re-issue activation token (public)
//! POST   /v1/tokens/authentication    - Log in (public)
//! GET    /v1/todos                    - List todos (todos:read)
//! GET    /v1/todos/{id}               - Show todo (todos:read)
//! POST   /v1/todos                    - Create todo (todos:write)
//! PATCH  /v1/todos/{id}               - Update todo (todos:write)
//! DELETE /v1/todos/{id}               - Delete todo (todos:write)
//! DELETE /v1/batch/todos              - Delete several todos (todos:write)
//! GET    /debug/vars                  - Prometheus metrics (public)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use tt_server::api::{AppState, create_router};
//! use tt_server::config::{Environment, LimiterConfig};
//! use std::sync::Arc;
//! use todo_tracker::db::Store;
//! use todo_tracker::mailer::LogMailer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = AppState::new(
//!     Store::in_memory(),
//!     "development-only-pepper".to_string(),
//!     Arc::new(LogMailer::new("noreply@example.com")),
//!     LimiterConfig::default(),
//!     Environment::Development,
//!     Vec::new(),
//! );
//!
//! let app = create_router(state);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:4000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod errors;
pub mod health;
pub mod json;
pub mod middleware;
pub mod rate_limiter;
pub mod request_id;
pub mod todos;
pub mod tokens;
pub mod users;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use todo_tracker::{auth::AuthManager, db::Store, mailer::Mailer};

use crate::background::BackgroundTasks;
use crate::config::{Environment, LimiterConfig};
use rate_limiter::RateLimiter;

/// Application state shared across all handlers and middleware.
///
/// Cloned for each request; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub auth: Arc<AuthManager>,
    pub mailer: Arc<dyn Mailer>,
    pub limiter: Arc<RateLimiter>,
    /// Welcome and activation emails run here so shutdown can wait for them
    pub tasks: BackgroundTasks,
    pub env: Environment,
    /// Set when a Prometheus recorder was installed at startup
    pub metrics: Option<PrometheusHandle>,
    pub cors_trusted_origins: Vec<String>,
}

impl AppState {
    pub fn new(
        store: Store,
        pepper: String,
        mailer: Arc<dyn Mailer>,
        limiter: LimiterConfig,
        env: Environment,
        cors_trusted_origins: Vec<String>,
    ) -> Self {
        let auth = AuthManager::new(store.clone(), pepper, env.is_production());
        Self {
            store,
            auth: Arc::new(auth),
            mailer,
            limiter: Arc::new(RateLimiter::new(limiter)),
            tasks: BackgroundTasks::new(),
            env,
            metrics: None,
            cors_trusted_origins,
        }
    }

    /// Replace the auth manager, e.g. to lower hashing cost in tests
    pub fn with_auth(mut self, auth: AuthManager) -> Self {
        self.auth = Arc::new(auth);
        self
    }

    /// Serve `/debug/vars` from `handle`
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Build the router with every endpoint and the full middleware chain.
///
/// Layers, outermost first: request id, panic recovery, metrics, CORS, rate
/// limit, authentication. Permission gates sit on the todo route groups.
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/v1/healthcheck", get(health::healthcheck))
        .route("/debug/vars", get(health::debug_vars))
        .route("/v1/users", post(users::register))
        .route("/v1/users/activation", put(users::activate))
        .route("/v1/tokens/activation", post(tokens::create_activation_token))
        .route(
            "/v1/tokens/authentication",
            post(tokens::create_authentication_token),
        );

    let read_routes = Router::new()
        .route("/v1/todos", get(todos::list_todos))
        .route("/v1/todos/{id}", get(todos::show_todo))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_todos_read,
        ));

    let write_routes = Router::new()
        .route("/v1/todos", post(todos::create_todo))
        .route(
            "/v1/todos/{id}",
            axum::routing::patch(todos::update_todo).delete(todos::delete_todo),
        )
        .route("/v1/batch/todos", delete(batch::delete_todos))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_todos_write,
        ));

    let limiter = state.limiter.clone();

    Router::new()
        .merge(public_routes)
        .merge(read_routes)
        .merge(write_routes)
        .fallback(middleware::not_found)
        .method_not_allowed_fallback(middleware::method_not_allowed)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::authenticate,
        ))
        .layer(axum::middleware::from_fn_with_state(
            limiter,
            rate_limiter::rate_limit,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::enable_cors,
        ))
        .layer(axum::middleware::from_fn(middleware::track_metrics))
        .layer(axum::middleware::from_fn(middleware::recover_panic))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .with_state(state)
}
