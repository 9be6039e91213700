use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::roles::Role;

/// Claims embedded in an access token, per §4.2: `{sub, role, device_id}`
/// plus the standard registered claims needed to validate the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: String,
    pub device_id: Uuid,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Uuid {
        self.sub
    }

    pub fn role(&self) -> AuthResult<Role> {
        Role::parse(&self.role).ok_or_else(|| AuthError::InvalidClaim("role", self.role.clone()))
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == role.as_str()
    }
}
