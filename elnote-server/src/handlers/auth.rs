use axum::extract::State;
use axum::Json;
use chrono::Duration as ChronoDuration;
use common_http_errors::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::domain::users::UserSummary;
use crate::services::auth_service;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default = "default_device_name")]
    pub device_name: String,
}

fn default_device_name() -> String {
    "unnamed-device".to_string()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserSummary,
    pub device_id: uuid::Uuid,
}

/// `POST /v1/auth/login`.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::invalid_input("missing_credentials"));
    }

    let result = auth_service::login(
        &state.db,
        &state.jwt_verifier,
        &req.email,
        &req.password,
        &req.device_name,
        ChronoDuration::from_std(state.config.access_token_ttl).unwrap_or_else(|_| ChronoDuration::minutes(15)),
        ChronoDuration::from_std(state.config.refresh_token_ttl).unwrap_or_else(|_| ChronoDuration::days(30)),
    )
    .await?;

    Ok(Json(LoginResponse {
        access_token: result.access_token,
        refresh_token: result.refresh_token,
        user: UserSummary::from(&result.user),
        device_id: result.device_id,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
}

/// `POST /v1/auth/refresh`.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    if req.refresh_token.trim().is_empty() {
        return Err(ApiError::invalid_input("missing_refresh_token"));
    }

    let access_token = auth_service::refresh(
        &state.db,
        &state.jwt_verifier,
        &req.refresh_token,
        ChronoDuration::from_std(state.config.access_token_ttl).unwrap_or_else(|_| ChronoDuration::minutes(15)),
    )
    .await?;

    Ok(Json(RefreshResponse { access_token }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: String,
}

/// `POST /v1/auth/logout`.
pub async fn logout(
    State(state): State<AppState>,
    Json(req): Json<LogoutRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    auth_service::logout(&state.db, &req.refresh_token).await?;
    Ok(Json(serde_json::json!({ "loggedOut": true })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminResetRequest {
    pub new_password: String,
}

/// `POST /v1/auth/admin/reset`. Break-glass path named in §9's design notes;
/// not listed among the role-gated routes because there is, by definition,
/// no guaranteed admin session to gate it with.
pub async fn admin_reset(
    State(state): State<AppState>,
    Json(req): Json<AdminResetRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if req.new_password.len() < 12 {
        return Err(ApiError::invalid_input("password_too_short"));
    }
    auth_service::reset_default_admin_password(&state.db, &req.new_password).await?;
    Ok(Json(serde_json::json!({ "reset": true })))
}
