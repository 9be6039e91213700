use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::claims::Claims;
use crate::config::JwtConfig;
use crate::error::AuthResult;
use crate::roles::Role;

/// Fields the caller supplies when minting a new access token; `iss`/`iat`/
/// `exp` are filled in by [`JwtVerifier::issue`].
pub struct TokenClaims {
    pub user_id: Uuid,
    pub role: Role,
    pub device_id: Uuid,
    pub ttl: Duration,
}

#[derive(Clone)]
pub struct JwtVerifier {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtVerifier {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(&config.secret);
        let decoding_key = DecodingKey::from_secret(&config.secret);
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    pub fn issue(&self, claims: TokenClaims) -> AuthResult<String> {
        let now = Utc::now();
        let exp = now + claims.ttl;
        let payload = Claims {
            sub: claims.user_id,
            role: claims.role.as_str().to_string(),
            device_id: claims.device_id,
            iss: self.config.issuer.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &payload, &self.encoding_key)?;
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.issuer.clone()]);
        validation.leeway = self.config.leeway_seconds.into();

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> JwtVerifier {
        JwtVerifier::new(JwtConfig::new(
            b"0123456789abcdef0123456789abcdef".to_vec(),
            "elnote",
        ))
    }

    #[test]
    fn issue_then_verify_round_trips() {
        let v = verifier();
        let user_id = Uuid::new_v4();
        let device_id = Uuid::new_v4();
        let token = v
            .issue(TokenClaims {
                user_id,
                role: Role::Author,
                device_id,
                ttl: Duration::minutes(15),
            })
            .expect("issue token");

        let claims = v.verify(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.device_id, device_id);
        assert_eq!(claims.role().unwrap(), Role::Author);
    }

    #[test]
    fn expired_token_is_rejected() {
        let v = verifier();
        let token = v
            .issue(TokenClaims {
                user_id: Uuid::new_v4(),
                role: Role::Viewer,
                device_id: Uuid::new_v4(),
                ttl: Duration::seconds(-60),
            })
            .expect("issue token");

        assert!(v.verify(&token).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let v = verifier();
        let token = v
            .issue(TokenClaims {
                user_id: Uuid::new_v4(),
                role: Role::Owner,
                device_id: Uuid::new_v4(),
                ttl: Duration::minutes(15),
            })
            .expect("issue token");

        let other = JwtVerifier::new(JwtConfig::new(
            b"fedcba9876543210fedcba9876543210".to_vec(),
            "elnote",
        ));
        assert!(other.verify(&token).is_err());
    }
}
