use axum::extract::{Path, State};
use axum::Json;
use common_auth::AuthContext;
use common_http_errors::{ApiError, ApiResult};
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::domain::signatures::{SignatureType, SignatureVerification};
use crate::services::{auth_service, signature_service};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    pub experiment_id: Uuid,
    pub signature_type: String,
    pub password: String,
}

/// `POST /v1/signatures`. Re-verifies the caller's live password before
/// attesting, per §4.6 step 1 — a bearer token alone is not sufficient
/// evidence of intent to sign.
pub async fn sign(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<SignRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let signature_type = SignatureType::parse(&req.signature_type)
        .ok_or_else(|| ApiError::invalid_input("invalid_signature_type"))?;

    auth_service::verify_live_password(&state.db, auth.user_id(), &req.password).await?;

    let signature_id = signature_service::sign(
        &state.db,
        &state.change_feed,
        req.experiment_id,
        auth.user_id(),
        auth.claims.device_id,
        signature_type,
    )
    .await?;

    Ok(Json(serde_json::json!({ "signatureId": signature_id })))
}

/// `GET /v1/experiments/{id}/signatures/verify`.
pub async fn verify(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SignatureVerification>> {
    let verification = signature_service::verify(&state.db, id).await?;
    Ok(Json(verification))
}
