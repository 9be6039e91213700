use axum::extract::{Path, State};
use axum::Json;
use common_auth::AuthContext;
use common_http_errors::ApiResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::AppState;
use crate::domain::attachments::Attachment;
use crate::services::attachment_service;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateAttachmentRequest {
    pub experiment_id: Uuid,
    pub object_key: String,
    pub size_bytes: i64,
    pub mime_type: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateAttachmentResponse {
    pub attachment_id: Uuid,
    pub upload_url: String,
}

/// `POST /v1/attachments/initiate`.
pub async fn initiate(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<InitiateAttachmentRequest>,
) -> ApiResult<Json<InitiateAttachmentResponse>> {
    let initiated = attachment_service::initiate(
        &state.db,
        &state.change_feed,
        &state.url_signer,
        req.experiment_id,
        auth.user_id(),
        auth.claims.device_id,
        &req.object_key,
        req.size_bytes,
        &req.mime_type,
        state.config.attachment_upload_url_ttl,
    )
    .await?;

    state.metrics.attachments_initiated_total.inc();

    Ok(Json(InitiateAttachmentResponse {
        attachment_id: initiated.attachment_id,
        upload_url: initiated.upload_url,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteAttachmentRequest {
    pub checksum: String,
    pub size_bytes: i64,
}

/// `POST /v1/attachments/{id}/complete`.
pub async fn complete(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteAttachmentRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    attachment_service::complete(
        &state.db,
        &state.change_feed,
        id,
        auth.user_id(),
        auth.claims.device_id,
        &req.checksum,
        req.size_bytes,
    )
    .await?;

    state.metrics.attachments_completed_total.inc();

    Ok(Json(serde_json::json!({ "completed": true })))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub download_url: String,
}

/// `GET /v1/attachments/{id}/download`.
pub async fn download(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DownloadResponse>> {
    let role = auth
        .role()
        .map_err(|_| common_http_errors::ApiError::unauthorized("invalid_role_claim"))?;

    let download_url = attachment_service::download(
        &state.db,
        &state.url_signer,
        id,
        auth.user_id(),
        role,
        state.config.attachment_download_url_ttl,
    )
    .await?;

    Ok(Json(DownloadResponse { download_url }))
}

/// `GET /v1/experiments/{id}/attachments`. Not named as its own bullet in
/// §6 but backed by `listByExperiment` in §4.7; exposed alongside the
/// experiment it's natural to browse attachments from.
pub async fn list_by_experiment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Attachment>>> {
    let role = auth
        .role()
        .map_err(|_| common_http_errors::ApiError::unauthorized("invalid_role_claim"))?;

    let attachments = attachment_service::list_by_experiment(&state.db, id, auth.user_id(), role).await?;
    Ok(Json(attachments))
}
