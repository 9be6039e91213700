use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

/// The five error kinds surfaced uniformly across every component (§7).
/// `Internal` is a sixth, catch-all kind for anything that should never
/// happen and must never leak detail to the client.
#[derive(Debug)]
pub enum ApiError {
    InvalidInput { code: &'static str, message: Option<String> },
    Unauthorized { code: &'static str },
    Forbidden { code: &'static str },
    NotFound { code: &'static str },
    Conflict { code: &'static str, message: Option<String>, detail: Option<serde_json::Value> },
    Internal { trace_id: Uuid, message: String },
}

impl ApiError {
    pub fn invalid_input(code: &'static str) -> Self {
        Self::InvalidInput { code, message: None }
    }

    pub fn invalid_input_msg(code: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput { code, message: Some(message.into()) }
    }

    pub fn unauthorized(code: &'static str) -> Self {
        Self::Unauthorized { code }
    }

    pub fn forbidden(code: &'static str) -> Self {
        Self::Forbidden { code }
    }

    pub fn not_found(code: &'static str) -> Self {
        Self::NotFound { code }
    }

    pub fn conflict(code: &'static str, detail: Option<serde_json::Value>) -> Self {
        Self::Conflict { code, message: None, detail }
    }

    /// Wrap an unexpected error (DB failure, serialization bug, ...). Generates
    /// a fresh trace id, logs the real cause at `error` level, and returns an
    /// opaque body carrying only that trace id so the client can report it
    /// without ever seeing a stack trace.
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        let trace_id = Uuid::new_v4();
        tracing::error!(%trace_id, error = %err, "internal error");
        Self::Internal { trace_id, message: err.to_string() }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body, error_code) = match self {
            ApiError::InvalidInput { code, message } => (
                StatusCode::BAD_REQUEST,
                ErrorBody { code: code.into(), message, trace_id: None, detail: None },
                code,
            ),
            ApiError::Unauthorized { code } => (
                StatusCode::UNAUTHORIZED,
                ErrorBody { code: code.into(), message: None, trace_id: None, detail: None },
                code,
            ),
            ApiError::Forbidden { code } => (
                StatusCode::FORBIDDEN,
                ErrorBody { code: code.into(), message: None, trace_id: None, detail: None },
                code,
            ),
            ApiError::NotFound { code } => (
                StatusCode::NOT_FOUND,
                ErrorBody { code: code.into(), message: None, trace_id: None, detail: None },
                code,
            ),
            ApiError::Conflict { code, message, detail } => (
                StatusCode::CONFLICT,
                ErrorBody { code: code.into(), message, trace_id: None, detail },
                code,
            ),
            ApiError::Internal { trace_id, message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    code: "internal_error".into(),
                    message: Some(message),
                    trace_id: Some(trace_id),
                    detail: None,
                },
                "internal_error",
            ),
        };

        let mut resp = (status, Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(error_code) {
            resp.headers_mut().insert("X-Error-Code", val);
        }
        resp.headers_mut()
            .insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_carries_detail_and_status() {
        let detail = serde_json::json!({"conflictArtifactId": Uuid::nil()});
        let err = ApiError::conflict("stale_base", Some(detail.clone()));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "stale_base");
    }

    #[test]
    fn internal_never_leaks_message_as_code() {
        let err = ApiError::internal("db connection refused");
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "internal_error");
    }
}
