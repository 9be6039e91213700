use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration as ChronoDuration, Utc};
use common_audit::{append_audit, AuditActor};
use common_auth::Role;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::attachments::{Attachment, InitiatedAttachment};
use crate::domain::sync::NewSyncEvent;
use crate::domain::{DomainError, DomainResult};
use crate::services::experiment_service::load_experiment;
use crate::services::sync_service::{append_event, notify_commit, ChangeFeed};
use crate::url_signer::{Op, UrlSigner};

fn std_to_chrono(d: StdDuration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or_else(|_| ChronoDuration::seconds(900))
}

/// §4.7 `initiate`. Owner-only.
pub async fn initiate(
    pool: &PgPool,
    feed: &ChangeFeed,
    signer: &Arc<dyn UrlSigner>,
    experiment_id: Uuid,
    owner_user_id: Uuid,
    device_id: Uuid,
    object_key: &str,
    size_bytes: i64,
    mime_type: &str,
    upload_url_ttl: StdDuration,
) -> DomainResult<InitiatedAttachment> {
    let experiment = load_experiment(pool, experiment_id).await?;
    if experiment.owner_user_id != owner_user_id {
        return Err(DomainError::forbidden("not_owner"));
    }
    if size_bytes < 0 {
        return Err(DomainError::invalid_input("negative_size"));
    }
    if object_key.trim().is_empty() {
        return Err(DomainError::invalid_input("empty_object_key"));
    }

    let mut tx = pool.begin().await?;

    let attachment_id: Uuid = sqlx::query_scalar(
        "INSERT INTO attachments (experiment_id, uploader_user_id, object_key, size_bytes, mime_type, status)
         VALUES ($1, $2, $3, $4, $5, 'initiated') RETURNING id",
    )
    .bind(experiment_id)
    .bind(owner_user_id)
    .bind(object_key)
    .bind(size_bytes)
    .bind(mime_type)
    .fetch_one(&mut *tx)
    .await?;

    append_audit(
        &mut tx,
        AuditActor::user(owner_user_id),
        "attachment.initiate",
        "attachment",
        Some(attachment_id),
        json!({ "experimentId": experiment_id, "objectKey": object_key, "sizeBytes": size_bytes }),
    )
    .await?;

    let cursor = append_event(
        &mut tx,
        NewSyncEvent {
            owner_user_id,
            actor_user_id: Some(owner_user_id),
            device_id: Some(device_id),
            event_type: "attachment.initiated".to_string(),
            aggregate_type: "attachment".to_string(),
            aggregate_id: Some(attachment_id),
            payload: json!({ "attachmentId": attachment_id, "experimentId": experiment_id }),
        },
    )
    .await?;

    tx.commit().await?;
    notify_commit(feed, owner_user_id, cursor);

    let expires_at = Utc::now() + std_to_chrono(upload_url_ttl);
    let upload_url = signer.sign(Op::Put, object_key, expires_at)?;

    Ok(InitiatedAttachment { attachment_id, upload_url })
}

async fn load_attachment(pool: &PgPool, attachment_id: Uuid) -> DomainResult<Attachment> {
    let attachment: Option<Attachment> = sqlx::query_as(
        "SELECT id, experiment_id, uploader_user_id, object_key, size_bytes, mime_type, status, checksum, created_at, completed_at
         FROM attachments WHERE id = $1",
    )
    .bind(attachment_id)
    .fetch_optional(pool)
    .await?;

    attachment.ok_or_else(|| DomainError::not_found("attachment_not_found"))
}

/// §4.7 `complete`. Locks the row `FOR UPDATE` to serialize against
/// concurrent completions of the same upload (§5 locking discipline).
pub async fn complete(
    pool: &PgPool,
    feed: &ChangeFeed,
    attachment_id: Uuid,
    owner_user_id: Uuid,
    device_id: Uuid,
    checksum: &str,
    size_bytes: i64,
) -> DomainResult<()> {
    let experiment_id: Uuid;
    let experiment_owner: Uuid;

    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, Attachment>(
        "SELECT id, experiment_id, uploader_user_id, object_key, size_bytes, mime_type, status, checksum, created_at, completed_at
         FROM attachments WHERE id = $1 FOR UPDATE",
    )
    .bind(attachment_id)
    .fetch_optional(&mut *tx)
    .await?;

    let attachment = row.ok_or_else(|| DomainError::not_found("attachment_not_found"))?;

    let experiment = load_experiment(pool, attachment.experiment_id).await?;
    if experiment.owner_user_id != owner_user_id {
        return Err(DomainError::forbidden("not_owner"));
    }
    if attachment.status != "initiated" {
        return Err(DomainError::invalid_input("attachment_not_initiated"));
    }
    if attachment.size_bytes != size_bytes {
        return Err(DomainError::invalid_input("size_mismatch"));
    }

    experiment_id = attachment.experiment_id;
    experiment_owner = experiment.owner_user_id;

    sqlx::query(
        "UPDATE attachments SET status = 'completed', checksum = $1, completed_at = now() WHERE id = $2",
    )
    .bind(checksum)
    .bind(attachment_id)
    .execute(&mut *tx)
    .await?;

    append_audit(
        &mut tx,
        AuditActor::user(owner_user_id),
        "attachment.complete",
        "attachment",
        Some(attachment_id),
        json!({ "experimentId": experiment_id, "checksum": checksum }),
    )
    .await?;

    let cursor = append_event(
        &mut tx,
        NewSyncEvent {
            owner_user_id: experiment_owner,
            actor_user_id: Some(owner_user_id),
            device_id: Some(device_id),
            event_type: "attachment.completed".to_string(),
            aggregate_type: "attachment".to_string(),
            aggregate_id: Some(attachment_id),
            payload: json!({ "attachmentId": attachment_id, "experimentId": experiment_id }),
        },
    )
    .await?;

    tx.commit().await?;
    notify_commit(feed, experiment_owner, cursor);

    Ok(())
}

fn ensure_download_access(experiment_owner: Uuid, viewer: Uuid, role: Role, experiment_completed: bool) -> DomainResult<()> {
    if experiment_owner == viewer {
        return Ok(());
    }
    if role == Role::Admin && experiment_completed {
        return Ok(());
    }
    Err(DomainError::forbidden("not_visible"))
}

/// §4.7 `download`.
pub async fn download(
    pool: &PgPool,
    signer: &Arc<dyn UrlSigner>,
    attachment_id: Uuid,
    viewer: Uuid,
    role: Role,
    download_url_ttl: StdDuration,
) -> DomainResult<String> {
    let attachment = load_attachment(pool, attachment_id).await?;
    let experiment = load_experiment(pool, attachment.experiment_id).await?;
    ensure_download_access(experiment.owner_user_id, viewer, role, experiment.is_completed())?;

    if !attachment.is_completed() {
        return Err(DomainError::invalid_input("attachment_not_completed"));
    }

    let expires_at = Utc::now() + std_to_chrono(download_url_ttl);
    signer.sign(Op::Get, &attachment.object_key, expires_at)
}

/// §4.7 `listByExperiment`.
pub async fn list_by_experiment(
    pool: &PgPool,
    experiment_id: Uuid,
    viewer: Uuid,
    role: Role,
) -> DomainResult<Vec<Attachment>> {
    let experiment = load_experiment(pool, experiment_id).await?;
    ensure_download_access(experiment.owner_user_id, viewer, role, experiment.is_completed())?;

    let attachments = sqlx::query_as(
        "SELECT id, experiment_id, uploader_user_id, object_key, size_bytes, mime_type, status, checksum, created_at, completed_at
         FROM attachments WHERE experiment_id = $1 ORDER BY created_at DESC",
    )
    .bind(experiment_id)
    .fetch_all(pool)
    .await?;

    Ok(attachments)
}
