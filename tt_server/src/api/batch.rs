//! Batch delete.
//!
//! Each id is handled on its own: one bad or missing id does not stop the
//! others from being deleted.
//!
//! ```bash
//! curl -X DELETE http://localhost:4000/v1/batch/todos \
//!   -H "Authorization: Bearer $TOKEN" \
//!   -d '{"ids": ["1", "bad", "999"]}'
//! ```

use axum::{Extension, extract::State, http::StatusCode, response::Response};
use serde::{Deserialize, Serialize};
use todo_tracker::errors::DataError;
use todo_tracker::users::Identity;

use super::AppState;
use super::errors::{ApiError, ApiResult};
use super::json::{ReadJson, write_json};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchInput {
    #[serde(default)]
    pub ids: Vec<String>,
}

/// Outcome for one requested id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemResult {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

impl ItemResult {
    fn ok(id: String) -> Self {
        Self {
            id,
            success: true,
            error: None,
        }
    }

    fn failed(id: String, error: &'static str) -> Self {
        Self {
            id,
            success: false,
            error: Some(error),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub success: bool,
    pub results: Vec<ItemResult>,
}

impl BatchResponse {
    pub fn from_results(results: Vec<ItemResult>) -> Self {
        Self {
            success: results.iter().all(|r| r.success),
            results,
        }
    }

    pub fn status(&self) -> StatusCode {
        if self.success {
            StatusCode::OK
        } else {
            StatusCode::BAD_REQUEST
        }
    }
}

/// `DELETE /v1/batch/todos`
///
/// Responds `200 OK` when every id was deleted, `400 Bad Request` otherwise,
/// with a per-id result in both cases.
pub async fn delete_todos(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ReadJson(input): ReadJson<BatchInput>,
) -> ApiResult<Response> {
    let user = identity.user().ok_or(ApiError::AuthenticationRequired)?;
    if input.ids.is_empty() {
        return Err(ApiError::BadRequest("no IDs provided".to_string()));
    }

    let mut results = Vec::with_capacity(input.ids.len());
    for raw in input.ids {
        let id = match raw.parse::<i64>() {
            Ok(id) if id >= 1 => id,
            _ => {
                results.push(ItemResult::failed(raw, "invalid ID"));
                continue;
            }
        };

        let result = match state.store.todos.delete(id, user.id).await {
            Ok(()) => ItemResult::ok(raw),
            Err(DataError::RecordNotFound) => ItemResult::failed(raw, "not found"),
            Err(e) => {
                tracing::error!(todo_id = id, error = %e, "batch delete failed");
                ItemResult::failed(raw, "internal error")
            }
        };
        results.push(result);
    }

    let response = BatchResponse::from_results(results);
    Ok(write_json(response.status(), &response))
}
