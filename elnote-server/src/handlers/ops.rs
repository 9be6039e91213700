use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use common_auth::{ensure_role, AuthContext, Role};
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::handlers::map_guard;
use crate::services::ops_service::{self, Dashboard, ForensicExport};
use crate::services::reconcile_service::{self, ReconcileParams};
use common_http_errors::ApiResult;

/// `GET /v1/ops/dashboard` (admin).
pub async fn dashboard(State(state): State<AppState>, auth: AuthContext) -> ApiResult<Json<Dashboard>> {
    ensure_role(&auth, &[Role::Admin, Role::Owner]).map_err(map_guard)?;
    let dashboard = ops_service::dashboard(&state.db).await?;
    Ok(Json(dashboard))
}

/// `GET /v1/ops/audit/verify` (admin). 200 when the chain is intact, 409
/// with the same body when a break is detected (§4.9/§7: a verification
/// failure is a `Conflict`, not an internal error).
pub async fn verify_audit(State(state): State<AppState>, auth: AuthContext) -> ApiResult<impl IntoResponse> {
    ensure_role(&auth, &[Role::Admin, Role::Owner]).map_err(map_guard)?;
    let verification = ops_service::verify_audit_chain(&state.db).await?;
    let status = if verification.valid { StatusCode::OK } else { StatusCode::CONFLICT };
    Ok((status, Json(verification)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    pub stale_after_seconds: Option<u64>,
    pub scan_limit: Option<i64>,
}

/// `POST /v1/ops/attachments/reconcile` (admin).
pub async fn reconcile(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<ReconcileRequest>,
) -> ApiResult<Json<crate::domain::reconcile::ReconcileRun>> {
    ensure_role(&auth, &[Role::Admin, Role::Owner]).map_err(map_guard)?;

    let stale_after = req
        .stale_after_seconds
        .map(std::time::Duration::from_secs)
        .unwrap_or(state.config.reconcile_stale_after);

    let scan_limit = req
        .scan_limit
        .unwrap_or(state.config.reconcile_scan_limit as i64)
        .clamp(
            crate::config::RECONCILE_SCAN_LIMIT_MIN as i64,
            crate::config::RECONCILE_SCAN_LIMIT_MAX as i64,
        );

    let timer = state.metrics.reconcile_duration_seconds.start_timer();
    let run = reconcile_service::reconcile(
        &state.db,
        &state.url_signer,
        &state.object_store,
        ReconcileParams { actor_user_id: auth.user_id(), stale_after, scan_limit },
    )
    .await;
    timer.observe_duration();
    let run = run?;

    const FINDING_KINDS: &[&str] = &[
        "initiated_stale",
        "completed_missing_checksum",
        "completed_missing_object",
        "completed_object_integrity_mismatch",
        "orphan_object",
        "object_probe_failed",
        "object_listing_failed",
    ];
    for kind in FINDING_KINDS {
        if let Some(count) = run.counters.get(kind).and_then(|v| v.as_u64()) {
            state.metrics.reconcile_findings_total.with_label_values(&[kind]).inc_by(count);
        }
    }

    Ok(Json(run))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForensicExportQuery {
    pub experiment_id: Uuid,
}

/// `GET /v1/ops/forensic/export?experimentId=` (admin).
pub async fn forensic_export(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<ForensicExportQuery>,
) -> ApiResult<Json<ForensicExport>> {
    ensure_role(&auth, &[Role::Admin, Role::Owner]).map_err(map_guard)?;
    let export = ops_service::forensic_export(&state.db, q.experiment_id, auth.user_id()).await?;
    Ok(Json(export))
}
