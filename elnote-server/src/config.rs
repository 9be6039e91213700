use std::env;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

/// Typed view over every environment variable named in §6. Missing or
/// malformed required values abort startup; optional values fall back to
/// the documented defaults.
#[derive(Clone)]
pub struct AppConfig {
    pub http_addr: String,
    pub database_url: String,
    pub jwt_secret: Vec<u8>,
    pub jwt_issuer: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub require_tls: bool,

    pub object_store_public_base_url: String,
    pub object_store_bucket: String,
    pub object_store_sign_secret: Vec<u8>,
    pub object_store_inventory_url: Option<String>,
    pub attachment_upload_url_ttl: Duration,
    pub attachment_download_url_ttl: Duration,

    pub reconcile_stale_after: Duration,
    pub reconcile_scan_limit: u32,
    pub reconcile_schedule_enabled: bool,
    pub reconcile_schedule_interval: Duration,
    pub reconcile_schedule_run_on_startup: bool,
    pub reconcile_schedule_actor_email: String,

    pub default_admin_email: String,
    pub sync_broadcast_capacity: usize,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("http_addr", &self.http_addr)
            .field("jwt_secret", &"***redacted***")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("require_tls", &self.require_tls)
            .field("object_store_public_base_url", &self.object_store_public_base_url)
            .field("object_store_bucket", &self.object_store_bucket)
            .field("object_store_sign_secret", &"***redacted***")
            .field("object_store_inventory_url", &self.object_store_inventory_url)
            .field("reconcile_stale_after", &self.reconcile_stale_after)
            .field("reconcile_scan_limit", &self.reconcile_scan_limit)
            .field("reconcile_schedule_enabled", &self.reconcile_schedule_enabled)
            .field("reconcile_schedule_interval", &self.reconcile_schedule_interval)
            .field("reconcile_schedule_actor_email", &self.reconcile_schedule_actor_email)
            .finish()
    }
}

/// Clamp applied to any admin-supplied reconcile scan limit, per §4.8.
pub const RECONCILE_SCAN_LIMIT_MIN: u32 = 1;
pub const RECONCILE_SCAN_LIMIT_MAX: u32 = 2000;

pub fn load() -> Result<AppConfig> {
    let http_addr = env::var("HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?.into_bytes();
    if jwt_secret.len() < 32 {
        return Err(anyhow!("JWT_SECRET must be at least 32 bytes"));
    }

    let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "elnote".to_string());

    let access_token_ttl = duration_seconds_from_env("ACCESS_TOKEN_TTL", 15 * 60)?;
    let refresh_token_ttl = duration_seconds_from_env("REFRESH_TOKEN_TTL", 30 * 24 * 60 * 60)?;

    let require_tls = bool_from_env("REQUIRE_TLS").unwrap_or(false);

    let object_store_public_base_url = env::var("OBJECT_STORE_PUBLIC_BASE_URL")
        .context("OBJECT_STORE_PUBLIC_BASE_URL must be set")?;
    let object_store_bucket =
        env::var("OBJECT_STORE_BUCKET").context("OBJECT_STORE_BUCKET must be set")?;
    let object_store_sign_secret = env::var("OBJECT_STORE_SIGN_SECRET")
        .map(|v| v.into_bytes())
        .unwrap_or_else(|_| jwt_secret.clone());
    let object_store_inventory_url = env::var("OBJECT_STORE_INVENTORY_URL").ok();

    let attachment_upload_url_ttl = duration_seconds_from_env("ATTACHMENT_UPLOAD_URL_TTL", 15 * 60)?;
    let attachment_download_url_ttl =
        duration_seconds_from_env("ATTACHMENT_DOWNLOAD_URL_TTL", 15 * 60)?;

    let reconcile_stale_after = duration_seconds_from_env("RECONCILE_STALE_AFTER", 24 * 60 * 60)?;
    let reconcile_scan_limit = u32_from_env("RECONCILE_SCAN_LIMIT", 500)?
        .clamp(RECONCILE_SCAN_LIMIT_MIN, RECONCILE_SCAN_LIMIT_MAX);
    let reconcile_schedule_enabled = bool_from_env("RECONCILE_SCHEDULE_ENABLED").unwrap_or(false);
    let reconcile_schedule_interval =
        duration_seconds_from_env("RECONCILE_SCHEDULE_INTERVAL", 60 * 60)?;
    let reconcile_schedule_run_on_startup =
        bool_from_env("RECONCILE_SCHEDULE_RUN_ON_STARTUP").unwrap_or(false);
    let reconcile_schedule_actor_email = env::var("RECONCILE_SCHEDULE_ACTOR_EMAIL")
        .unwrap_or_else(|_| "admin@elnote.local".to_string());

    let default_admin_email =
        env::var("DEFAULT_ADMIN_EMAIL").unwrap_or_else(|_| "admin@elnote.local".to_string());

    let sync_broadcast_capacity = u32_from_env("SYNC_BROADCAST_CAPACITY", 1024)? as usize;

    Ok(AppConfig {
        http_addr,
        database_url,
        jwt_secret,
        jwt_issuer,
        access_token_ttl,
        refresh_token_ttl,
        require_tls,
        object_store_public_base_url,
        object_store_bucket,
        object_store_sign_secret,
        object_store_inventory_url,
        attachment_upload_url_ttl,
        attachment_download_url_ttl,
        reconcile_stale_after,
        reconcile_scan_limit,
        reconcile_schedule_enabled,
        reconcile_schedule_interval,
        reconcile_schedule_run_on_startup,
        reconcile_schedule_actor_email,
        default_admin_email,
        sync_broadcast_capacity,
    })
}

fn bool_from_env(key: &str) -> Option<bool> {
    env::var(key).ok().map(|value| {
        matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
    })
}

fn duration_seconds_from_env(key: &str, default_secs: u64) -> Result<Duration> {
    match env::var(key) {
        Ok(raw) => {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{key} must be an integer number of seconds"))?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(Duration::from_secs(default_secs)),
    }
}

fn u32_from_env(key: &str, default: u32) -> Result<u32> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().with_context(|| format!("{key} must be an integer")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_scan_limit_clamps_to_documented_bounds() {
        assert_eq!(5000u32.clamp(RECONCILE_SCAN_LIMIT_MIN, RECONCILE_SCAN_LIMIT_MAX), 2000);
        assert_eq!(0u32.clamp(RECONCILE_SCAN_LIMIT_MIN, RECONCILE_SCAN_LIMIT_MAX), 1);
    }

    #[test]
    fn bool_from_env_accepts_common_truthy_spellings() {
        std::env::set_var("ELNOTE_TEST_BOOL", "Yes");
        assert_eq!(bool_from_env("ELNOTE_TEST_BOOL"), Some(true));
        std::env::set_var("ELNOTE_TEST_BOOL", "0");
        assert_eq!(bool_from_env("ELNOTE_TEST_BOOL"), Some(false));
    }
}
