//! User registration and activation.
//!
//! ```bash
//! curl -X POST http://localhost:4000/v1/users \
//!   -d '{"name": "Alice", "email": "alice@example.com", "password": "pa55word"}'
//!
//! curl -X PUT http://localhost:4000/v1/users/activation \
//!   -d '{"token": "Y3QMGX3PJ3WLRL2YRTQGQ6KRHU"}'
//! ```

use axum::{extract::State, http::StatusCode, response::Response};
use serde::Deserialize;
use serde_json::json;
use todo_tracker::mailer::{EmailMessage, Mailer};

use super::AppState;
use super::errors::ApiResult;
use super::json::{ReadJson, write_json};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivateInput {
    #[serde(default)]
    pub token: String,
}

/// `POST /v1/users`
///
/// Creates an unactivated user holding `todos:read` and mails an activation
/// token in the background. Responds `202 Accepted` with the user.
///
/// # Errors
///
/// - `400 Bad Request`: Malformed body
/// - `422 Unprocessable Entity`: Invalid fields or email already registered
pub async fn register(
    State(state): State<AppState>,
    ReadJson(input): ReadJson<RegisterInput>,
) -> ApiResult<Response> {
    let (user, token) = state
        .auth
        .register(&input.name, &input.email, &input.password)
        .await?;

    let mailer = state.mailer.clone();
    let message = EmailMessage::user_welcome(&user.email, user.id, &token.plaintext);
    state.tasks.spawn("user_welcome_email", async move {
        if let Err(e) = mailer.send(&message).await {
            tracing::error!(error = %e, "failed to send welcome email");
        }
    });

    tracing::info!(user_id = user.id, "user registered");
    Ok(write_json(StatusCode::ACCEPTED, &json!({ "user": user })))
}

/// `PUT /v1/users/activation`
///
/// Redeems an activation token: the user is marked activated, every
/// activation token they hold is deleted and `todos:write` is granted.
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Malformed, unknown or expired token
/// - `409 Conflict`: The user record changed concurrently
pub async fn activate(
    State(state): State<AppState>,
    ReadJson(input): ReadJson<ActivateInput>,
) -> ApiResult<Response> {
    let user = state.auth.activate(&input.token).await?;

    tracing::info!(user_id = user.id, "user activated");
    Ok(write_json(
        StatusCode::ACCEPTED,
        &json!({
            "message": "user successfully activated",
            "user": user,
        }),
    ))
}
