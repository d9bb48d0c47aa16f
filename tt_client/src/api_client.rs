//! HTTP API client for the todo tracker server.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use todo_tracker::filters::PaginationData;
use todo_tracker::todos::{NewTodo, Todo};
use todo_tracker::users::User;

/// Token returned by `POST /tokens/authentication`
#[derive(Debug, Clone, Deserialize)]
pub struct AuthToken {
    pub token: String,
    pub expiry: DateTime<Utc>,
}

/// Per-id outcome of a batch delete
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchItem {
    pub id: String,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchResult {
    results: Vec<BatchItem>,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    user: User,
}

#[derive(Debug, Deserialize)]
struct TodoEnvelope {
    todo: Todo,
}

#[derive(Debug, Deserialize)]
struct TodoListEnvelope {
    todos: Vec<Todo>,
    #[serde(rename = "paginationData", default)]
    pagination: PaginationData,
}

#[derive(Debug, Deserialize)]
struct AuthEnvelope {
    authentication_token: AuthToken,
}

/// An error response from the server
#[derive(Debug, Clone, PartialEq)]
pub struct ApiFailure {
    pub status: StatusCode,
    pub message: String,
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ApiFailure {}

/// Turn an `{"error": ...}` body into one line. Field maps are listed in key
/// order; a 401 adds a hint to log in again.
pub fn describe_error(status: StatusCode, body: &Value) -> String {
    let message = match body.get("error") {
        Some(Value::String(msg)) => msg.clone(),
        Some(Value::Object(fields)) => fields
            .iter()
            .map(|(field, msg)| match msg {
                Value::String(msg) => format!("{field}: {msg}"),
                other => format!("{field}: {other}"),
            })
            .collect::<Vec<_>>()
            .join("; "),
        _ => status
            .canonical_reason()
            .unwrap_or("unexpected response")
            .to_lowercase(),
    };

    if status == StatusCode::UNAUTHORIZED {
        format!("{message} (run `tt auth` to log in)")
    } else {
        message
    }
}

/// API client for communicating with the todo tracker server
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
    token: Option<String>,
}

impl ApiClient {
    /// Create a client for `base_url`, e.g. `http://localhost:4000/v1`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            token: None,
        }
    }

    /// Attach a bearer token to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send and decode a success body, or turn an error body into
    /// [`ApiFailure`].
    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
        let response = builder
            .send()
            .await
            .with_context(|| format!("Failed to send {what} request"))?;
        let status = response.status();
        log::debug!("{what}: {status}");

        if !status.is_success() {
            return Err(failure(status, response).await.into());
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {what} response"))
    }

    /// `POST /users`
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<User> {
        let body = json!({ "name": name, "email": email, "password": password });
        let envelope: UserEnvelope = self
            .send(self.request(Method::POST, "/users").json(&body), "register")
            .await?;
        log::info!("registered user {}", envelope.user.id);
        Ok(envelope.user)
    }

    /// `PUT /users/activation`
    pub async fn activate(&self, token: &str) -> Result<User> {
        let body = json!({ "token": token });
        let envelope: UserEnvelope = self
            .send(
                self.request(Method::PUT, "/users/activation").json(&body),
                "activate",
            )
            .await?;
        Ok(envelope.user)
    }

    /// `POST /tokens/authentication`
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<AuthToken> {
        let body = json!({ "email": email, "password": password });
        let envelope: AuthEnvelope = self
            .send(
                self.request(Method::POST, "/tokens/authentication")
                    .json(&body),
                "authenticate",
            )
            .await?;
        log::info!("token expires at {}", envelope.authentication_token.expiry);
        Ok(envelope.authentication_token)
    }

    /// `POST /todos`
    pub async fn create_todo(&self, todo: &NewTodo) -> Result<Todo> {
        let body = json!({
            "text": todo.text,
            "contexts": todo.contexts,
            "projects": todo.projects,
            "priority": todo.priority,
            "completed": todo.completed,
            "archived": todo.archived,
        });
        let envelope: TodoEnvelope = self
            .send(self.request(Method::POST, "/todos").json(&body), "create todo")
            .await?;
        Ok(envelope.todo)
    }

    /// `GET /todos` with the given query pairs
    pub async fn list_todos(
        &self,
        query: &[(&str, String)],
    ) -> Result<(Vec<Todo>, PaginationData)> {
        let envelope: TodoListEnvelope = self
            .send(self.request(Method::GET, "/todos").query(query), "list todos")
            .await?;
        Ok((envelope.todos, envelope.pagination))
    }

    /// `GET /todos/{id}`
    pub async fn get_todo(&self, id: i64) -> Result<Todo> {
        let envelope: TodoEnvelope = self
            .send(
                self.request(Method::GET, &format!("/todos/{id}")),
                "get todo",
            )
            .await?;
        Ok(envelope.todo)
    }

    /// `PATCH /todos/{id}` with a partial update
    pub async fn update_todo(&self, id: i64, patch: &Value) -> Result<Todo> {
        let envelope: TodoEnvelope = self
            .send(
                self.request(Method::PATCH, &format!("/todos/{id}"))
                    .json(patch),
                "update todo",
            )
            .await?;
        Ok(envelope.todo)
    }

    /// `DELETE /todos/{id}`
    pub async fn delete_todo(&self, id: i64) -> Result<()> {
        let _: Value = self
            .send(
                self.request(Method::DELETE, &format!("/todos/{id}")),
                "delete todo",
            )
            .await?;
        Ok(())
    }

    /// `DELETE /batch/todos`. A partial failure is not an error: the
    /// per-id results are returned either way.
    pub async fn delete_todos(&self, ids: &[i64]) -> Result<Vec<BatchItem>> {
        let ids: Vec<String> = ids.iter().map(i64::to_string).collect();
        let response = self
            .request(Method::DELETE, "/batch/todos")
            .json(&json!({ "ids": ids }))
            .send()
            .await
            .context("Failed to send batch delete request")?;
        let status = response.status();
        log::debug!("batch delete: {status}");

        if status != StatusCode::OK && status != StatusCode::BAD_REQUEST {
            return Err(failure(status, response).await.into());
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse batch delete response")?;
        match serde_json::from_value::<BatchResult>(body.clone()) {
            Ok(result) => Ok(result.results),
            // 400 without results, e.g. an empty id list
            Err(_) => Err(ApiFailure {
                status,
                message: describe_error(status, &body),
            }
            .into()),
        }
    }
}

async fn failure(status: StatusCode, response: Response) -> ApiFailure {
    let body = response.json::<Value>().await.unwrap_or(Value::Null);
    ApiFailure {
        status,
        message: describe_error(status, &body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_string_error() {
        let body = json!({ "error": "the requested resource could not be found" });
        assert_eq!(
            describe_error(StatusCode::NOT_FOUND, &body),
            "the requested resource could not be found"
        );
    }

    #[test]
    fn test_describe_field_errors() {
        let body = json!({ "error": { "text": "must be provided", "priority": "must be A-Z" } });
        assert_eq!(
            describe_error(StatusCode::UNPROCESSABLE_ENTITY, &body),
            "priority: must be A-Z; text: must be provided"
        );
    }

    #[test]
    fn test_describe_unauthorized_adds_hint() {
        let body = json!({ "error": "invalid or missing authentication token" });
        let message = describe_error(StatusCode::UNAUTHORIZED, &body);
        assert!(message.starts_with("invalid or missing authentication token"));
        assert!(message.contains("tt auth"));
    }

    #[test]
    fn test_describe_without_body() {
        assert_eq!(
            describe_error(StatusCode::BAD_GATEWAY, &Value::Null),
            "bad gateway"
        );
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = ApiClient::new("http://localhost:4000/v1/");
        assert_eq!(client.base_url(), "http://localhost:4000/v1");
    }
}
