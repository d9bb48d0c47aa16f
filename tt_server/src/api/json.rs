//! JSON request decoding and response encoding.

use axum::{
    body::{Body, to_bytes},
    extract::{FromRequest, Request},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::error::Category;

use super::errors::ApiError;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 1_048_576;

/// Serialize `value` as indented JSON followed by a newline.
pub fn write_json<T: Serialize>(status: StatusCode, value: &T) -> Response {
    let mut buf = Vec::with_capacity(128);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);

    if let Err(e) = value.serialize(&mut ser) {
        tracing::error!(error = %e, "failed to encode response");
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        return response;
    }
    buf.push(b'\n');

    let mut response = Response::new(Body::from(buf));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// JSON body extractor with descriptive 400s.
///
/// Rejects bodies over [`MAX_BODY_BYTES`], empty bodies, trailing values and
/// (with `deny_unknown_fields` on the target) unknown keys.
#[derive(Debug)]
pub struct ReadJson<T>(pub T);

impl<T, S> FromRequest<S> for ReadJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let bytes = to_bytes(req.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|_| ApiError::BadRequest(format!("body must not exceed {MAX_BODY_BYTES} bytes")))?;

        decode(&bytes).map(ReadJson)
    }
}

/// Decode exactly one JSON value from `bytes`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::BadRequest("request body must not be empty".to_string()));
    }

    let mut de = serde_json::Deserializer::from_slice(bytes);
    let value = T::deserialize(&mut de).map_err(classify)?;
    de.end().map_err(|_| {
        ApiError::BadRequest("body must contain only a single JSON value".to_string())
    })?;
    Ok(value)
}

fn classify(err: serde_json::Error) -> ApiError {
    let (line, column) = (err.line(), err.column());
    let message = match err.classify() {
        Category::Syntax => {
            format!("body contains badly-formed JSON (at line {line}, column {column})")
        }
        Category::Eof => "body contains badly-formed JSON".to_string(),
        Category::Data => {
            let text = err.to_string();
            match unknown_field_name(&text) {
                Some(field) => format!("body contains unknown field \"{field}\""),
                None => format!(
                    "body contains JSON of incorrect type (at line {line}, column {column})"
                ),
            }
        }
        Category::Io => "body could not be read".to_string(),
    };
    ApiError::BadRequest(message)
}

// serde reports unknown fields as "unknown field `name`, expected ...".
fn unknown_field_name(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("unknown field `")?;
    rest.split('`').next()
}
