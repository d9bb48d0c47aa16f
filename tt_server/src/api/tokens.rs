//! Activation token re-issue and authentication tokens.

use axum::{extract::State, http::StatusCode, response::Response};
use serde::Deserialize;
use serde_json::json;
use todo_tracker::auth::AuthError;
use todo_tracker::mailer::{EmailMessage, Mailer};

use super::AppState;
use super::errors::{ApiError, ApiResult};
use super::json::{ReadJson, write_json};
use crate::logging::log_security_event;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivationTokenInput {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// `POST /v1/tokens/activation`
///
/// Mails a fresh activation token when the email belongs to an unactivated
/// user. The response is the same whether or not anything was sent.
pub async fn create_activation_token(
    State(state): State<AppState>,
    ReadJson(input): ReadJson<ActivationTokenInput>,
) -> ApiResult<Response> {
    if let Some((user, token)) = state.auth.request_activation_token(&input.email).await? {
        let mailer = state.mailer.clone();
        let message = EmailMessage::token_activation(&user.email, &token.plaintext);
        state.tasks.spawn("token_activation_email", async move {
            if let Err(e) = mailer.send(&message).await {
                tracing::error!(error = %e, "failed to send activation email");
            }
        });
    }

    Ok(write_json(
        StatusCode::ACCEPTED,
        &json!({
            "message": "an email will be sent to you containing activation instructions",
        }),
    ))
}

/// `POST /v1/tokens/authentication`
///
/// ```bash
/// curl -X POST http://localhost:4000/v1/tokens/authentication \
///   -d '{"email": "alice@example.com", "password": "pa55word"}'
/// # {"authentication_token": {"token": "...", "expiry": "..."}}
/// ```
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Malformed email or password
/// - `401 Unauthorized`: Unknown email or wrong password
pub async fn create_authentication_token(
    State(state): State<AppState>,
    ReadJson(input): ReadJson<CredentialsInput>,
) -> ApiResult<Response> {
    let token = match state.auth.authenticate(&input.email, &input.password).await {
        Ok(token) => token,
        Err(AuthError::InvalidCredentials) => {
            log_security_event("login_failed", None, None, "invalid credentials");
            return Err(ApiError::InvalidCredentials);
        }
        Err(e) => return Err(e.into()),
    };

    Ok(write_json(
        StatusCode::CREATED,
        &json!({ "authentication_token": token }),
    ))
}
