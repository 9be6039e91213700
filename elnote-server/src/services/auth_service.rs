use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration as ChronoDuration, Utc};
use common_audit::{append_audit, AuditActor};
use common_auth::{Claims, JwtVerifier, Role, TokenClaims};
use rand_core::RngCore;
use serde_json::json;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::users::{Device, User};
use crate::domain::{DomainError, DomainResult};

pub struct LoginResult {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
    pub device_id: Uuid,
}

pub fn hash_password(password: &str) -> DomainResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| DomainError::Internal(anyhow::anyhow!("password hashing failed: {err}")))
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

fn hash_refresh_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    format!("{}.{}", Uuid::new_v4(), hex::encode(bytes))
}

/// §4.2 `login`.
pub async fn login(
    pool: &PgPool,
    verifier: &JwtVerifier,
    email: &str,
    password: &str,
    device_name: &str,
    access_ttl: ChronoDuration,
    refresh_ttl: ChronoDuration,
) -> DomainResult<LoginResult> {
    let user: Option<User> = sqlx::query_as(
        "SELECT id, email, password_hash, role, must_change_password, is_default_admin, created_at, updated_at
         FROM users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    let user = match user {
        Some(u) if verify_password(password, &u.password_hash) => u,
        _ => {
            let mut tx = pool.begin().await?;
            let _ = append_audit(
                &mut tx,
                AuditActor::system(),
                "auth.login.failed",
                "user",
                None,
                json!({ "email": email }),
            )
            .await;
            tx.commit().await.ok();
            return Err(DomainError::unauthorized("invalid_credentials"));
        }
    };

    let role = user.role().ok_or_else(|| DomainError::Internal(anyhow::anyhow!("unknown role on user row")))?;

    let refresh_token = generate_refresh_token();
    let refresh_hash = hash_refresh_token(&refresh_token);
    let refresh_expires_at = Utc::now() + refresh_ttl;

    let mut tx = pool.begin().await?;

    let device_id: Uuid = sqlx::query_scalar(
        "INSERT INTO devices (user_id, device_name, refresh_token_hash, refresh_token_expires_at)
         VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(user.id)
    .bind(device_name)
    .bind(&refresh_hash)
    .bind(refresh_expires_at)
    .fetch_one(&mut *tx)
    .await?;

    append_audit(
        &mut tx,
        AuditActor::user(user.id),
        "auth.login",
        "user",
        Some(user.id),
        json!({ "deviceId": device_id }),
    )
    .await?;

    tx.commit().await?;

    let access_token = verifier
        .issue(TokenClaims { user_id: user.id, role, device_id, ttl: access_ttl })
        .map_err(|err| DomainError::Internal(anyhow::anyhow!(err)))?;

    Ok(LoginResult { access_token, refresh_token, user, device_id })
}

/// §4.2 `refresh`.
pub async fn refresh(
    pool: &PgPool,
    verifier: &JwtVerifier,
    refresh_token: &str,
    access_ttl: ChronoDuration,
) -> DomainResult<String> {
    let hash = hash_refresh_token(refresh_token);

    let row = sqlx::query(
        "SELECT d.id AS device_id, d.user_id, d.device_name, d.refresh_token_hash, d.refresh_token_expires_at,
                d.revoked_at, d.created_at AS device_created_at, d.last_seen_at,
                u.id AS user_id_col, u.email, u.password_hash, u.role, u.must_change_password, u.is_default_admin,
                u.created_at AS user_created_at, u.updated_at
         FROM devices d
         JOIN users u ON u.id = d.user_id
         WHERE d.refresh_token_hash = $1
           AND d.revoked_at IS NULL
           AND d.refresh_token_expires_at > now()",
    )
    .bind(&hash)
    .fetch_optional(pool)
    .await?;

    let row = row.ok_or_else(|| DomainError::unauthorized("invalid_refresh_token"))?;

    let device = Device {
        id: row.try_get("device_id")?,
        user_id: row.try_get("user_id")?,
        device_name: row.try_get("device_name")?,
        refresh_token_hash: row.try_get("refresh_token_hash")?,
        refresh_token_expires_at: row.try_get("refresh_token_expires_at")?,
        revoked_at: row.try_get("revoked_at")?,
        created_at: row.try_get("device_created_at")?,
        last_seen_at: row.try_get("last_seen_at")?,
    };
    let user = User {
        id: row.try_get("user_id_col")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: row.try_get("role")?,
        must_change_password: row.try_get("must_change_password")?,
        is_default_admin: row.try_get("is_default_admin")?,
        created_at: row.try_get("user_created_at")?,
        updated_at: row.try_get("updated_at")?,
    };
    // `InvalidRefreshToken` is surfaced as Unauthorized per §7's taxonomy
    // (there is no dedicated kind for it); §4.2 names it distinctly at the
    // service layer so callers can log it separately from bad passwords.
    let role = user.role().ok_or_else(|| DomainError::Internal(anyhow::anyhow!("unknown role on user row")))?;

    sqlx::query("UPDATE devices SET last_seen_at = now() WHERE id = $1")
        .bind(device.id)
        .execute(pool)
        .await?;

    let mut tx = pool.begin().await?;
    append_audit(
        &mut tx,
        AuditActor::user(user.id),
        "auth.refresh",
        "user",
        Some(user.id),
        json!({ "deviceId": device.id }),
    )
    .await?;
    tx.commit().await?;

    verifier
        .issue(TokenClaims { user_id: user.id, role, device_id: device.id, ttl: access_ttl })
        .map_err(|err| DomainError::Internal(anyhow::anyhow!(err)))
}

/// §4.2 `logout`.
pub async fn logout(pool: &PgPool, refresh_token: &str) -> DomainResult<()> {
    let hash = hash_refresh_token(refresh_token);

    let device_id: Option<Uuid> = sqlx::query_scalar(
        "UPDATE devices SET revoked_at = now()
         WHERE refresh_token_hash = $1 AND revoked_at IS NULL
         RETURNING id",
    )
    .bind(&hash)
    .fetch_optional(pool)
    .await?;

    let Some(device_id) = device_id else {
        return Err(DomainError::unauthorized("invalid_refresh_token"));
    };

    let mut tx = pool.begin().await?;
    append_audit(
        &mut tx,
        AuditActor::system(),
        "auth.logout",
        "device",
        Some(device_id),
        json!({}),
    )
    .await?;
    tx.commit().await?;

    Ok(())
}

/// Named in spec.md §9's Design Notes as a deliberate operability trade-off:
/// a known default admin is created if none exists, with a random password
/// logged once and never persisted in plaintext.
pub async fn ensure_default_admin(pool: &PgPool, default_admin_email: &str) -> DomainResult<()> {
    let existing: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM users WHERE is_default_admin = TRUE")
            .fetch_optional(pool)
            .await?;

    if existing.is_some() {
        return Ok(());
    }

    let mut random_bytes = [0u8; 18];
    OsRng.fill_bytes(&mut random_bytes);
    let password = hex::encode(random_bytes);
    let password_hash = hash_password(&password)?;

    sqlx::query(
        "INSERT INTO users (email, password_hash, role, must_change_password, is_default_admin)
         VALUES ($1, $2, 'admin', TRUE, TRUE)",
    )
    .bind(default_admin_email)
    .bind(&password_hash)
    .execute(pool)
    .await?;

    tracing::warn!(
        email = default_admin_email,
        password,
        "seeded default admin account; change this password immediately"
    );

    Ok(())
}

/// `POST /v1/auth/admin/reset` break-glass path (§4.2 Design Notes): resets
/// the default admin's password. Only callable when there is no admin yet,
/// or by an existing admin, so this does not open a password-reset oracle.
pub async fn reset_default_admin_password(pool: &PgPool, new_password: &str) -> DomainResult<()> {
    let password_hash = hash_password(new_password)?;

    let updated: Option<Uuid> = sqlx::query_scalar(
        "UPDATE users SET password_hash = $1, must_change_password = TRUE
         WHERE is_default_admin = TRUE
         RETURNING id",
    )
    .bind(&password_hash)
    .fetch_optional(pool)
    .await?;

    updated.ok_or_else(|| DomainError::not_found("no_default_admin"))?;
    Ok(())
}

/// Re-verifies a user's live password, as required before a signature
/// attestation (§4.6 step 1).
pub async fn verify_live_password(pool: &PgPool, user_id: Uuid, password: &str) -> DomainResult<()> {
    let stored_hash: Option<String> = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    let stored_hash = stored_hash.ok_or_else(|| DomainError::forbidden("invalid_credentials"))?;
    if verify_password(password, &stored_hash) {
        Ok(())
    } else {
        Err(DomainError::forbidden("invalid_credentials"))
    }
}

/// Used by `AuthContext` consumers that need the caller's role freshly
/// re-validated against the database rather than trusting the token claim
/// alone (currently unused in the hot path — every handler trusts `Claims`
/// per §4.2 — kept for completeness of the service surface).
#[allow(dead_code)]
pub fn role_from_claims(claims: &Claims) -> DomainResult<Role> {
    claims.role().map_err(|_| DomainError::unauthorized("invalid_role_claim"))
}
