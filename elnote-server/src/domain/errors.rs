use common_http_errors::ApiError;
use serde_json::Value;

/// The five kinds of §7 plus the implicit sixth (internal/unexpected).
/// Every service function in this crate returns `DomainResult<T>`; handlers
/// convert to [`ApiError`] at the HTTP boundary via `From`.
#[derive(Debug)]
pub enum DomainError {
    InvalidInput { code: &'static str, message: Option<String> },
    Unauthorized { code: &'static str },
    Forbidden { code: &'static str },
    NotFound { code: &'static str },
    Conflict { code: &'static str, detail: Option<Value> },
    Internal(anyhow::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
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

    pub fn conflict(code: &'static str, detail: Value) -> Self {
        Self::Conflict { code, detail: Some(detail) }
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(anyhow::anyhow!(err))
    }
}

impl From<common_audit::AuditError> for DomainError {
    fn from(err: common_audit::AuditError) -> Self {
        Self::Internal(anyhow::anyhow!(err))
    }
}

impl From<anyhow::Error> for DomainError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidInput { code, message: Some(m) } => {
                ApiError::invalid_input_msg(code, m)
            }
            DomainError::InvalidInput { code, message: None } => ApiError::invalid_input(code),
            DomainError::Unauthorized { code } => ApiError::unauthorized(code),
            DomainError::Forbidden { code } => ApiError::forbidden(code),
            DomainError::NotFound { code } => ApiError::not_found(code),
            DomainError::Conflict { code, detail } => ApiError::conflict(code, detail),
            DomainError::Internal(err) => ApiError::internal(err),
        }
    }
}
