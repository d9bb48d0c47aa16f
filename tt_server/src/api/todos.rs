//! Todo CRUD. Every operation is scoped to the authenticated owner; another
//! user's todo looks exactly like a missing one.

use axum::{
    Extension,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Instant;
use todo_tracker::filters::{Filters, validate_filters};
use todo_tracker::todos::{NewTodo, TodoPatch, validate_todo};
use todo_tracker::users::{Identity, User};
use todo_tracker::validator::Validator;

use super::AppState;
use super::errors::{ApiError, ApiResult};
use super::json::{ReadJson, write_json};
use crate::logging::log_database_operation;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTodoInput {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub contexts: Option<Vec<String>>,
    #[serde(default)]
    pub projects: Option<Vec<String>>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub archived: Option<bool>,
}

impl From<CreateTodoInput> for NewTodo {
    fn from(input: CreateTodoInput) -> Self {
        NewTodo {
            text: input.text,
            contexts: input.contexts.unwrap_or_default(),
            projects: input.projects.unwrap_or_default(),
            priority: input.priority.unwrap_or_default(),
            completed: input.completed.unwrap_or(false),
            archived: input.archived.unwrap_or(false),
        }
    }
}

/// The authenticated user. Gated routes never see an anonymous identity.
fn owner(identity: &Identity) -> ApiResult<&User> {
    identity.user().ok_or(ApiError::AuthenticationRequired)
}

/// Parse a path id. Anything but a positive integer is a 404.
fn parse_id(raw: &str) -> ApiResult<i64> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(ApiError::NotFound),
    }
}

/// `POST /v1/todos`
///
/// ```bash
/// curl -X POST http://localhost:4000/v1/todos \
///   -H "Authorization: Bearer $TOKEN" \
///   -d '{"text": "buy milk @home +shopping", "contexts": ["home"], "projects": ["shopping"]}'
/// ```
///
/// Responds `201 Created` with the todo and a `Location` header.
pub async fn create_todo(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ReadJson(input): ReadJson<CreateTodoInput>,
) -> ApiResult<Response> {
    let user = owner(&identity)?;
    let new_todo = NewTodo::from(input);

    let mut v = Validator::new();
    new_todo.validate(&mut v);
    v.finish().map_err(ApiError::FailedValidation)?;

    let todo = state.store.todos.insert(user.id, &new_todo).await?;

    let mut response = write_json(StatusCode::CREATED, &json!({ "todo": todo }));
    if let Ok(location) = HeaderValue::from_str(&format!("/v1/todos/{}", todo.id)) {
        response.headers_mut().insert(header::LOCATION, location);
    }
    Ok(response)
}

/// `GET /v1/todos/{id}`
pub async fn show_todo(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let user = owner(&identity)?;
    let id = parse_id(&id)?;

    let todo = state.store.todos.get(id, user.id).await?;
    Ok(write_json(StatusCode::OK, &json!({ "todo": todo })))
}

// 1/0, t/f and true/false in lower, upper or title case.
fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn read_int(qs: &HashMap<String, String>, key: &str, default: i64, v: &mut Validator) -> i64 {
    match qs.get(key).filter(|s| !s.is_empty()) {
        None => default,
        Some(s) => s.parse().unwrap_or_else(|_| {
            v.add_error(key, "must be an integer value");
            default
        }),
    }
}

fn read_bool(qs: &HashMap<String, String>, key: &str, v: &mut Validator) -> bool {
    match qs.get(key).filter(|s| !s.is_empty()) {
        None => false,
        Some(s) => parse_bool(s).unwrap_or_else(|| {
            v.add_error(key, "must be a boolean value");
            false
        }),
    }
}

/// Build listing filters from the query string, collecting every problem.
pub fn read_filters(qs: &HashMap<String, String>) -> Result<(String, Filters), ApiError> {
    let mut v = Validator::new();

    let text = qs.get("text").cloned().unwrap_or_default();
    let defaults = Filters::default();
    let filters = Filters {
        page: read_int(qs, "page", defaults.page, &mut v),
        page_size: read_int(qs, "page_size", defaults.page_size, &mut v),
        sort: qs
            .get("sort")
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or(defaults.sort),
        include_archived: read_bool(qs, "include-archived", &mut v),
        only_archived: read_bool(qs, "only-archived", &mut v),
        done: read_bool(qs, "done", &mut v),
        undone: read_bool(qs, "undone", &mut v),
        ..defaults
    };

    validate_filters(&mut v, &filters);
    v.finish().map_err(ApiError::FailedValidation)?;
    Ok((text, filters))
}

/// `GET /v1/todos`
///
/// ```bash
/// curl "http://localhost:4000/v1/todos?text=milk&sort=-id&page_size=5&done=true" \
///   -H "Authorization: Bearer $TOKEN"
/// ```
pub async fn list_todos(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> ApiResult<Response> {
    let user = owner(&identity)?;
    let Query(qs) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let (text, filters) = read_filters(&qs)?;

    let started = Instant::now();
    let (todos, pagination) = state.store.todos.get_all(user.id, &text, &filters).await?;
    log_database_operation("select", "todos", started.elapsed().as_millis() as u64);

    Ok(write_json(
        StatusCode::OK,
        &json!({ "todos": todos, "paginationData": pagination }),
    ))
}

/// `PATCH /v1/todos/{id}`
///
/// Absent or `null` fields stay as they are. A `version` that differs from the
/// stored one is a 409, as is losing a race with a concurrent update.
pub async fn update_todo(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    ReadJson(patch): ReadJson<TodoPatch>,
) -> ApiResult<Response> {
    let user = owner(&identity)?;
    let id = parse_id(&id)?;

    let mut todo = state.store.todos.get(id, user.id).await?;
    if patch.version.is_some_and(|version| version != todo.version) {
        return Err(ApiError::EditConflict);
    }

    patch.apply(&mut todo);

    let mut v = Validator::new();
    validate_todo(&mut v, &todo);
    v.finish().map_err(ApiError::FailedValidation)?;

    state.store.todos.update(&mut todo).await?;
    Ok(write_json(StatusCode::OK, &json!({ "todo": todo })))
}

/// `DELETE /v1/todos/{id}`
pub async fn delete_todo(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let user = owner(&identity)?;
    let id = parse_id(&id)?;

    state.store.todos.delete(id, user.id).await?;
    Ok(write_json(
        StatusCode::OK,
        &json!({ "message": "todo successfully deleted" }),
    ))
}
