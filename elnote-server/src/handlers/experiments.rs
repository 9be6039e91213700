use axum::extract::{Path, State};
use axum::Json;
use common_auth::{ensure_role, AuthContext, Role};
use common_http_errors::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::AppState;
use crate::domain::experiments::{EffectiveView, ExperimentEntry};
use crate::handlers::map_guard;
use crate::services::experiment_service;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExperimentRequest {
    pub title: String,
    pub original_body: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExperimentResponse {
    pub experiment_id: Uuid,
    pub original_entry_id: Uuid,
}

/// `POST /v1/experiments` (owner).
pub async fn create_experiment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateExperimentRequest>,
) -> ApiResult<Json<CreateExperimentResponse>> {
    ensure_role(&auth, &[Role::Owner]).map_err(map_guard)?;
    let role = auth.role().map_err(|_| ApiError::unauthorized("invalid_role_claim"))?;

    let created = experiment_service::create_experiment(
        &state.db,
        &state.change_feed,
        auth.user_id(),
        auth.claims.device_id,
        role,
        &req.title,
        &req.original_body,
    )
    .await?;

    state.metrics.experiments_created_total.inc();

    Ok(Json(CreateExperimentResponse {
        experiment_id: created.experiment_id,
        original_entry_id: created.original_entry_id,
    }))
}

/// `GET /v1/experiments/{id}`.
pub async fn get_effective_view(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EffectiveView>> {
    let role = auth.role().map_err(|_| ApiError::unauthorized("invalid_role_claim"))?;
    let view = experiment_service::get_effective_view(&state.db, id, auth.user_id(), role).await?;
    Ok(Json(view))
}

/// `GET /v1/experiments/{id}/history`.
pub async fn get_history(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<ExperimentEntry>>> {
    let role = auth.role().map_err(|_| ApiError::unauthorized("invalid_role_claim"))?;
    let entries = experiment_service::get_history(&state.db, id, auth.user_id(), role).await?;
    Ok(Json(entries))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAddendumRequest {
    pub base_entry_id: Option<Uuid>,
    pub body: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAddendumResponse {
    pub entry_id: Uuid,
}

/// `POST /v1/experiments/{id}/addendums` (owner).
pub async fn add_addendum(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<AddAddendumRequest>,
) -> ApiResult<Json<AddAddendumResponse>> {
    ensure_role(&auth, &[Role::Owner]).map_err(map_guard)?;

    let result = experiment_service::add_addendum(
        &state.db,
        &state.change_feed,
        id,
        auth.user_id(),
        auth.claims.device_id,
        req.base_entry_id,
        &req.body,
    )
    .await;

    if matches!(result, Err(crate::domain::DomainError::Conflict { .. })) {
        state.metrics.conflicts_created_total.inc();
    }
    let entry_id = result?;

    state.metrics.addenda_created_total.inc();

    Ok(Json(AddAddendumResponse { entry_id }))
}

/// `POST /v1/experiments/{id}/complete` (owner).
pub async fn mark_completed(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    ensure_role(&auth, &[Role::Owner]).map_err(map_guard)?;

    experiment_service::mark_completed(
        &state.db,
        &state.change_feed,
        id,
        auth.user_id(),
        auth.claims.device_id,
    )
    .await?;

    Ok(Json(serde_json::json!({ "completed": true })))
}
