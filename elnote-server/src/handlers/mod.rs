pub mod attachments;
pub mod auth;
pub mod collaboration;
pub mod experiments;
pub mod health;
pub mod ops;
pub mod signatures;
pub mod sync;

use common_auth::GuardError;
use common_http_errors::ApiError;

/// `common_auth`'s guards convert to `(StatusCode, String)`, not `ApiError`;
/// every handler in this crate speaks `ApiError` uniformly, so role/ownership
/// checks are funneled through this instead of `?`.
fn map_guard(err: GuardError) -> ApiError {
    match err {
        GuardError::Forbidden { .. } => ApiError::forbidden("role_not_permitted"),
        GuardError::InvalidClaims => ApiError::unauthorized("invalid_role_claim"),
    }
}
