//! Maps [`gateway_engine::EngineError`] (and request-parsing failures) onto
//! HTTP status codes and JSON bodies, the way the teacher's `readiness`
//! handler maps domain state onto `StatusCode` rather than unwrapping.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_engine::EngineError;
use serde_json::json;

pub enum ApiError {
    /// Malformed request body, unsupported language name, oversized source.
    BadRequest(String),
    /// Engine-reported capacity or circuit-open condition; retryable.
    Unavailable { message: String, retry_after_secs: Option<u64> },
    /// Anything else — surfaced as a plain 500, never `unwrap`ed away.
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Unsupported(_) | EngineError::InputTooLarge { .. } | EngineError::PolicyRejected(_) => {
                ApiError::BadRequest(err.to_string())
            }
            EngineError::Capacity { .. } | EngineError::CircuitOpen { .. } => ApiError::Unavailable {
                retry_after_secs: err.retry_after_secs(),
                message: err.to_string(),
            },
        }
    }
}

/// `Json<T>` extractor, but malformed/missing bodies surface as
/// [`ApiError::BadRequest`] (spec §6.1: "malformed request -> 400") instead
/// of axum's default 422 `UNPROCESSABLE_ENTITY` rejection.
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.to_string()))?;
        Ok(ValidatedJson(value))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                tracing::debug!(%message, "api: rejecting malformed request");
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Unavailable { message, retry_after_secs } => {
                tracing::warn!(%message, "api: engine unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "error": message, "retryAfter": retry_after_secs })),
                )
                    .into_response()
            }
            ApiError::Internal(message) => {
                tracing::error!(%message, "api: internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": message }))).into_response()
            }
        }
    }
}
