use axum::extract::{Path, Query, State};
use axum::Json;
use common_auth::{ensure_role, AuthContext, Role};
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::domain::experiments::{CommentRow, ProposalRow};
use crate::handlers::map_guard;
use crate::services::collaboration_service;
use common_http_errors::ApiResult;

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub body: String,
}

/// `POST /v1/experiments/{id}/comments` (admin, completed).
pub async fn create_comment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    ensure_role(&auth, &[Role::Admin]).map_err(map_guard)?;

    let comment_id = collaboration_service::create_comment(
        &state.db,
        &state.change_feed,
        id,
        auth.user_id(),
        auth.claims.device_id,
        &req.body,
    )
    .await?;

    Ok(Json(serde_json::json!({ "commentId": comment_id })))
}

/// `GET /v1/experiments/{id}/comments`.
pub async fn list_comments(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<CommentRow>>> {
    let comments = collaboration_service::list_comments(&state.db, id).await?;
    Ok(Json(comments))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProposalRequest {
    pub source_experiment_id: Uuid,
    pub title: String,
    pub body: String,
}

/// `POST /v1/proposals` (admin).
pub async fn create_proposal(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateProposalRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    ensure_role(&auth, &[Role::Admin]).map_err(map_guard)?;

    let proposal_id = collaboration_service::create_proposal(
        &state.db,
        &state.change_feed,
        req.source_experiment_id,
        auth.user_id(),
        auth.claims.device_id,
        &req.title,
        &req.body,
    )
    .await?;

    Ok(Json(serde_json::json!({ "proposalId": proposal_id })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProposalsQuery {
    pub source_experiment_id: Uuid,
}

/// `GET /v1/proposals?sourceExperimentId=...`.
pub async fn list_proposals(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(q): Query<ListProposalsQuery>,
) -> ApiResult<Json<Vec<ProposalRow>>> {
    let proposals = collaboration_service::list_proposals(&state.db, q.source_experiment_id).await?;
    Ok(Json(proposals))
}
