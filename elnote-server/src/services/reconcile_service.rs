use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration as ChronoDuration, Utc};
use common_audit::{append_audit, AuditActor};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::attachments::Attachment;
use crate::domain::reconcile::{FindingType, ReconcileCounters, ReconcileRun};
use crate::domain::{DomainError, DomainResult};
use crate::object_store::{ObjectStoreInspector, ProbeOutcome};
use crate::url_signer::{Op, UrlSigner};

pub struct ReconcileParams {
    pub actor_user_id: Uuid,
    pub stale_after: StdDuration,
    pub scan_limit: i64,
}

/// §4.8 `reconcile`. Scans `attachments` and the object store for the seven
/// discrepancy kinds, recording one `ReconcileRun` plus a `ReconcileFinding`
/// row per discrepancy. Itself an audited action.
pub async fn reconcile(
    pool: &PgPool,
    signer: &Arc<dyn UrlSigner>,
    inspector: &Arc<dyn ObjectStoreInspector>,
    params: ReconcileParams,
) -> DomainResult<ReconcileRun> {
    let mut tx = pool.begin().await?;

    let run_id: Uuid = sqlx::query_scalar(
        "INSERT INTO reconcile_runs (actor_user_id, stale_after_seconds, scan_limit)
         VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(params.actor_user_id)
    .bind(params.stale_after.as_secs() as i64)
    .bind(params.scan_limit as i32)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    let mut counters = ReconcileCounters::default();

    let stale_before = Utc::now() - ChronoDuration::from_std(params.stale_after)
        .unwrap_or_else(|_| ChronoDuration::hours(24));

    let initiated_stale: Vec<Attachment> = sqlx::query_as(
        "SELECT id, experiment_id, uploader_user_id, object_key, size_bytes, mime_type, status, checksum, created_at, completed_at
         FROM attachments
         WHERE status = 'initiated' AND created_at < $1
         ORDER BY created_at ASC
         LIMIT $2",
    )
    .bind(stale_before)
    .bind(params.scan_limit)
    .fetch_all(pool)
    .await?;

    for attachment in &initiated_stale {
        record_finding(
            pool,
            run_id,
            FindingType::InitiatedStale,
            Some(attachment.id),
            json!({ "objectKey": attachment.object_key, "createdAt": attachment.created_at }),
        )
        .await?;
        counters.increment(FindingType::InitiatedStale);
    }

    let completed_missing_checksum: Vec<Attachment> = sqlx::query_as(
        "SELECT id, experiment_id, uploader_user_id, object_key, size_bytes, mime_type, status, checksum, created_at, completed_at
         FROM attachments
         WHERE status = 'completed' AND checksum IS NULL
         ORDER BY created_at ASC
         LIMIT $1",
    )
    .bind(params.scan_limit)
    .fetch_all(pool)
    .await?;

    for attachment in &completed_missing_checksum {
        record_finding(
            pool,
            run_id,
            FindingType::CompletedMissingChecksum,
            Some(attachment.id),
            json!({ "objectKey": attachment.object_key }),
        )
        .await?;
        counters.increment(FindingType::CompletedMissingChecksum);
    }

    let completed: Vec<Attachment> = sqlx::query_as(
        "SELECT id, experiment_id, uploader_user_id, object_key, size_bytes, mime_type, status, checksum, created_at, completed_at
         FROM attachments
         WHERE status = 'completed'
         ORDER BY created_at ASC
         LIMIT $1",
    )
    .bind(params.scan_limit)
    .fetch_all(pool)
    .await?;

    let mut known_object_keys = Vec::with_capacity(completed.len());

    for attachment in &completed {
        known_object_keys.push(attachment.object_key.clone());

        let download_url = match signer.sign(Op::Get, &attachment.object_key, Utc::now() + ChronoDuration::minutes(5)) {
            Ok(url) => url,
            Err(_) => {
                record_finding(
                    pool,
                    run_id,
                    FindingType::ObjectProbeFailed,
                    Some(attachment.id),
                    json!({ "objectKey": attachment.object_key, "reason": "sign_failed" }),
                )
                .await?;
                counters.increment(FindingType::ObjectProbeFailed);
                continue;
            }
        };

        match inspector.probe(&download_url).await {
            Ok(ProbeOutcome::Missing) => {
                record_finding(
                    pool,
                    run_id,
                    FindingType::CompletedMissingObject,
                    Some(attachment.id),
                    json!({ "objectKey": attachment.object_key }),
                )
                .await?;
                counters.increment(FindingType::CompletedMissingObject);
            }
            Ok(ProbeOutcome::Present { size_bytes, checksum }) => {
                let size_mismatch = size_bytes.is_some_and(|s| s != attachment.size_bytes);
                let checksum_mismatch = match (&checksum, &attachment.checksum) {
                    (Some(observed), Some(recorded)) => {
                        !observed.eq_ignore_ascii_case(recorded)
                    }
                    _ => false,
                };
                if size_mismatch || checksum_mismatch {
                    record_finding(
                        pool,
                        run_id,
                        FindingType::CompletedObjectIntegrityMismatch,
                        Some(attachment.id),
                        json!({
                            "objectKey": attachment.object_key,
                            "expectedSizeBytes": attachment.size_bytes,
                            "observedSizeBytes": size_bytes,
                            "expectedChecksum": attachment.checksum,
                            "observedChecksum": checksum,
                        }),
                    )
                    .await?;
                    counters.increment(FindingType::CompletedObjectIntegrityMismatch);
                }
            }
            Err(_) => {
                record_finding(
                    pool,
                    run_id,
                    FindingType::ObjectProbeFailed,
                    Some(attachment.id),
                    json!({ "objectKey": attachment.object_key }),
                )
                .await?;
                counters.increment(FindingType::ObjectProbeFailed);
            }
        }
    }

    match inspector.list_inventory().await {
        Ok(inventory) => {
            for key in inventory {
                if !known_object_keys.iter().any(|k| k == &key) {
                    record_finding(
                        pool,
                        run_id,
                        FindingType::OrphanObject,
                        None,
                        json!({ "objectKey": key }),
                    )
                    .await?;
                    counters.increment(FindingType::OrphanObject);
                }
            }
        }
        Err(_) => {
            record_finding(pool, run_id, FindingType::ObjectListingFailed, None, json!({}))
                .await?;
            counters.increment(FindingType::ObjectListingFailed);
        }
    }

    let mut tx = pool.begin().await?;

    let run: ReconcileRun = sqlx::query_as(
        "UPDATE reconcile_runs SET finished_at = now(), counters = $1 WHERE id = $2
         RETURNING id, actor_user_id, started_at, finished_at, stale_after_seconds, scan_limit, counters",
    )
    .bind(serde_json::to_value(&counters).map_err(|e| DomainError::Internal(anyhow::anyhow!(e)))?)
    .bind(run_id)
    .fetch_one(&mut *tx)
    .await?;

    append_audit(
        &mut tx,
        AuditActor::user(params.actor_user_id),
        "reconcile.run",
        "reconcile_run",
        Some(run_id),
        json!({ "totalFindings": counters.total() }),
    )
    .await?;

    tx.commit().await?;

    Ok(run)
}

async fn record_finding(
    pool: &PgPool,
    run_id: Uuid,
    kind: FindingType,
    attachment_id: Option<Uuid>,
    details: serde_json::Value,
) -> DomainResult<()> {
    sqlx::query(
        "INSERT INTO reconcile_findings (run_id, finding_type, attachment_id, details)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(run_id)
    .bind(kind.as_str())
    .bind(attachment_id)
    .bind(details)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn list_findings(
    pool: &PgPool,
    run_id: Uuid,
) -> DomainResult<Vec<crate::domain::reconcile::ReconcileFinding>> {
    let findings = sqlx::query_as(
        "SELECT id, run_id, finding_type, attachment_id, details, created_at, resolved_at
         FROM reconcile_findings WHERE run_id = $1 ORDER BY created_at ASC",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(findings)
}
