use common_audit::{append_audit, verify_chain, AuditActor, ChainVerification};
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::attachments::Attachment;
use crate::domain::conflicts::ConflictArtifact;
use crate::domain::experiments::{CommentRow, Experiment, ExperimentEntry, ProposalRow};
use crate::domain::signatures::Signature;
use crate::domain::{DomainError, DomainResult};
use crate::services::experiment_service::load_experiment;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub unresolved_findings_by_kind: Vec<(String, i64)>,
    pub experiment_status_counts: Vec<(String, i64)>,
    pub attachment_status_counts: Vec<(String, i64)>,
    pub recent_conflict_count: i64,
}

/// §4.9 `dashboard`.
pub async fn dashboard(pool: &PgPool) -> DomainResult<Dashboard> {
    let unresolved_findings_by_kind: Vec<(String, i64)> = sqlx::query_as(
        "SELECT finding_type, count(*) FROM reconcile_findings
         WHERE resolved_at IS NULL GROUP BY finding_type ORDER BY finding_type",
    )
    .fetch_all(pool)
    .await?;

    let experiment_status_counts: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status, count(*) FROM experiments GROUP BY status ORDER BY status",
    )
    .fetch_all(pool)
    .await?;

    let attachment_status_counts: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status, count(*) FROM attachments GROUP BY status ORDER BY status",
    )
    .fetch_all(pool)
    .await?;

    let recent_conflict_count: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM conflict_artifacts WHERE created_at > now() - interval '24 hours'",
    )
    .fetch_one(pool)
    .await?;

    Ok(Dashboard {
        unresolved_findings_by_kind,
        experiment_status_counts,
        attachment_status_counts,
        recent_conflict_count,
    })
}

/// §4.9 `verifyAuditChain`. Thin wrapper over the ledger's own walk.
pub async fn verify_audit_chain(pool: &PgPool) -> DomainResult<ChainVerification> {
    Ok(verify_chain(pool).await?)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForensicExport {
    pub experiment: Experiment,
    pub history: Vec<ExperimentEntry>,
    pub comments: Vec<CommentRow>,
    pub proposals: Vec<ProposalRow>,
    pub signatures: Vec<Signature>,
    pub attachments: Vec<Attachment>,
    pub deviations: Vec<ConflictArtifact>,
}

/// §4.9 `forensicExport`. Bundles the full evidentiary record for one
/// experiment. Exporting is itself an audited action.
pub async fn forensic_export(
    pool: &PgPool,
    experiment_id: Uuid,
    actor_user_id: Uuid,
) -> DomainResult<ForensicExport> {
    let experiment = load_experiment(pool, experiment_id).await?;

    let history: Vec<ExperimentEntry> = sqlx::query_as(
        "SELECT id, experiment_id, author_user_id, entry_type, supersedes_entry_id, body, created_at
         FROM experiment_entries WHERE experiment_id = $1 ORDER BY created_at ASC, id ASC",
    )
    .bind(experiment_id)
    .fetch_all(pool)
    .await?;

    let comments: Vec<CommentRow> = sqlx::query_as(
        "SELECT id, experiment_id, admin_user_id, body, created_at
         FROM comments WHERE experiment_id = $1 ORDER BY created_at ASC",
    )
    .bind(experiment_id)
    .fetch_all(pool)
    .await?;

    let proposals: Vec<ProposalRow> = sqlx::query_as(
        "SELECT id, source_experiment_id, admin_user_id, title, body, created_at
         FROM proposals WHERE source_experiment_id = $1 ORDER BY created_at ASC",
    )
    .bind(experiment_id)
    .fetch_all(pool)
    .await?;

    let signatures: Vec<Signature> = sqlx::query_as(
        "SELECT id, experiment_id, signer_user_id, signature_type, content_hash, signed_at
         FROM signatures WHERE experiment_id = $1 ORDER BY signed_at ASC",
    )
    .bind(experiment_id)
    .fetch_all(pool)
    .await?;

    let attachments: Vec<Attachment> = sqlx::query_as(
        "SELECT id, experiment_id, uploader_user_id, object_key, size_bytes, mime_type, status, checksum, created_at, completed_at
         FROM attachments WHERE experiment_id = $1 ORDER BY created_at ASC",
    )
    .bind(experiment_id)
    .fetch_all(pool)
    .await?;

    let deviations: Vec<ConflictArtifact> = sqlx::query_as(
        "SELECT id, owner_user_id, experiment_id, action_type, client_base_entry_id,
                server_latest_entry_id, payload, resolved_at, created_at
         FROM conflict_artifacts WHERE experiment_id = $1 ORDER BY created_at ASC",
    )
    .bind(experiment_id)
    .fetch_all(pool)
    .await?;

    let mut tx = pool.begin().await?;
    append_audit(
        &mut tx,
        AuditActor::user(actor_user_id),
        "experiment.forensic_export",
        "experiment",
        Some(experiment_id),
        json!({ "entryCount": history.len(), "attachmentCount": attachments.len() }),
    )
    .await
    .map_err(DomainError::from)?;
    tx.commit().await?;

    Ok(ForensicExport {
        experiment,
        history,
        comments,
        proposals,
        signatures,
        attachments,
        deviations,
    })
}
