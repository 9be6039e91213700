use axum::http::StatusCode;

use crate::roles::Role;
use crate::AuthContext;

#[derive(Debug, Clone)]
pub enum GuardError {
    Forbidden { required: Vec<Role> },
    InvalidClaims,
}

impl GuardError {
    pub fn into_response(self) -> (StatusCode, String) {
        match self {
            GuardError::Forbidden { required } => (
                StatusCode::FORBIDDEN,
                if required.is_empty() {
                    "Insufficient role".to_string()
                } else {
                    let names: Vec<&str> = required.iter().map(Role::as_str).collect();
                    format!("Insufficient role. Required one of: {}", names.join(", "))
                },
            ),
            GuardError::InvalidClaims => {
                (StatusCode::UNAUTHORIZED, "Invalid role claim".to_string())
            }
        }
    }
}

impl From<GuardError> for (StatusCode, String) {
    fn from(value: GuardError) -> Self {
        value.into_response()
    }
}

/// Accepts the request only if the caller's role is one of `allowed`.
pub fn ensure_role(auth: &AuthContext, allowed: &[Role]) -> Result<(), GuardError> {
    if allowed.is_empty() {
        return Ok(());
    }

    let role = auth.role().map_err(|_| GuardError::InvalidClaims)?;
    if allowed.contains(&role) {
        Ok(())
    } else {
        Err(GuardError::Forbidden {
            required: allowed.to_vec(),
        })
    }
}

/// Accepts the request only if the caller owns `resource_owner_id` or holds
/// the workspace-wide `owner`/`admin` role.
pub fn ensure_owner(
    auth: &AuthContext,
    resource_owner_id: uuid::Uuid,
) -> Result<(), GuardError> {
    if auth.user_id() == resource_owner_id {
        return Ok(());
    }

    let role = auth.role().map_err(|_| GuardError::InvalidClaims)?;
    if matches!(role, Role::Owner | Role::Admin) {
        Ok(())
    } else {
        Err(GuardError::Forbidden {
            required: vec![Role::Owner, Role::Admin],
        })
    }
}
