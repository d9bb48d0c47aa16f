//! Liveness and metrics endpoints.

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::AppState;
use super::errors::ApiError;
use super::json::write_json;

/// `GET /v1/healthcheck`
///
/// ```bash
/// curl http://localhost:4000/v1/healthcheck
/// # {"status":"available","system_info":{"environment":"development","version":"0.1.0"}}
/// ```
pub async fn healthcheck(State(state): State<AppState>) -> Response {
    write_json(
        StatusCode::OK,
        &json!({
            "status": "available",
            "system_info": {
                "environment": state.env.as_str(),
                "version": env!("CARGO_PKG_VERSION"),
            },
        }),
    )
}

/// `GET /debug/vars`: Prometheus text exposition, when a recorder is installed.
pub async fn debug_vars(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => {
            let mut response = handle.render().into_response();
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        None => ApiError::NotFound.into_response(),
    }
}
