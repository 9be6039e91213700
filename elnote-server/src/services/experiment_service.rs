use chrono::Utc;
use common_audit::{append_audit, AuditActor};
use common_auth::Role;
use serde_json::json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::experiments::{EffectiveView, Experiment, ExperimentEntry};
use crate::domain::sync::NewSyncEvent;
use crate::domain::{DomainError, DomainResult};
use crate::services::sync_service::{append_event, notify_commit, ChangeFeed};

pub struct CreatedExperiment {
    pub experiment_id: Uuid,
    pub original_entry_id: Uuid,
}

/// §4.4 `createExperiment`. Role-gated to `owner`; a fresh `draft` experiment
/// plus its sole `original` entry are inserted in one transaction, then
/// audited and broadcast on the change feed.
pub async fn create_experiment(
    pool: &PgPool,
    feed: &ChangeFeed,
    owner_user_id: Uuid,
    device_id: Uuid,
    caller_role: Role,
    title: &str,
    original_body: &str,
) -> DomainResult<CreatedExperiment> {
    if caller_role != Role::Owner {
        return Err(DomainError::forbidden("role_not_owner"));
    }
    if title.trim().is_empty() {
        return Err(DomainError::invalid_input("empty_title"));
    }
    if original_body.trim().is_empty() {
        return Err(DomainError::invalid_input("empty_body"));
    }

    let mut tx = pool.begin().await?;

    let experiment_id: Uuid = sqlx::query_scalar(
        "INSERT INTO experiments (owner_user_id, title, status) VALUES ($1, $2, 'draft') RETURNING id",
    )
    .bind(owner_user_id)
    .bind(title)
    .fetch_one(&mut *tx)
    .await?;

    let original_entry_id: Uuid = sqlx::query_scalar(
        "INSERT INTO experiment_entries (experiment_id, author_user_id, entry_type, body)
         VALUES ($1, $2, 'original', $3) RETURNING id",
    )
    .bind(experiment_id)
    .bind(owner_user_id)
    .bind(original_body)
    .fetch_one(&mut *tx)
    .await?;

    append_audit(
        &mut tx,
        AuditActor::user(owner_user_id),
        "experiment.create",
        "experiment",
        Some(experiment_id),
        json!({ "title": title, "originalEntryId": original_entry_id }),
    )
    .await?;

    let cursor = append_event(
        &mut tx,
        NewSyncEvent {
            owner_user_id,
            actor_user_id: Some(owner_user_id),
            device_id: Some(device_id),
            event_type: "experiment.created".to_string(),
            aggregate_type: "experiment".to_string(),
            aggregate_id: Some(experiment_id),
            payload: json!({ "experimentId": experiment_id, "originalEntryId": original_entry_id }),
        },
    )
    .await?;

    tx.commit().await?;
    notify_commit(feed, owner_user_id, cursor);

    Ok(CreatedExperiment { experiment_id, original_entry_id })
}

async fn load_owner(pool: &PgPool, experiment_id: Uuid) -> DomainResult<Experiment> {
    let experiment: Option<Experiment> = sqlx::query_as(
        "SELECT id, owner_user_id, title, status, created_at, completed_at FROM experiments WHERE id = $1",
    )
    .bind(experiment_id)
    .fetch_optional(pool)
    .await?;

    experiment.ok_or_else(|| DomainError::not_found("experiment_not_found"))
}

fn ensure_owner(experiment: &Experiment, caller: Uuid) -> DomainResult<()> {
    if experiment.owner_user_id != caller {
        return Err(DomainError::forbidden("not_owner"));
    }
    Ok(())
}

/// §4.4 `addAddendum`. Locks the experiment row to serialize concurrent
/// addendum attempts on the same aggregate (§5 locking discipline), compares
/// the caller's declared base against the current latest entry, and either
/// inserts the addendum or records a [`ConflictArtifact`] and fails with
/// `Conflict`.
pub async fn add_addendum(
    pool: &PgPool,
    feed: &ChangeFeed,
    experiment_id: Uuid,
    owner_user_id: Uuid,
    device_id: Uuid,
    base_entry_id: Option<Uuid>,
    body: &str,
) -> DomainResult<Uuid> {
    if body.trim().is_empty() {
        return Err(DomainError::invalid_input("empty_body"));
    }

    let experiment = load_owner(pool, experiment_id).await?;
    ensure_owner(&experiment, owner_user_id)?;

    let mut tx = pool.begin().await?;

    // Row-level lock on the experiment aggregate: only one concurrent
    // addAddendum call on this experiment proceeds past this point at a time.
    sqlx::query("SELECT id FROM experiments WHERE id = $1 FOR UPDATE")
        .bind(experiment_id)
        .fetch_one(&mut *tx)
        .await?;

    let latest_entry_id: Uuid = sqlx::query_scalar(
        "SELECT id FROM experiment_entries
         WHERE experiment_id = $1
         ORDER BY created_at DESC, id DESC
         LIMIT 1",
    )
    .bind(experiment_id)
    .fetch_one(&mut *tx)
    .await?;

    if let Some(base) = base_entry_id {
        if base != latest_entry_id {
            let payload = json!({
                "clientBaseEntryId": base,
                "serverLatestEntryId": latest_entry_id,
            });

            let artifact_id: Uuid = sqlx::query_scalar(
                "INSERT INTO conflict_artifacts
                    (owner_user_id, experiment_id, action_type, client_base_entry_id, server_latest_entry_id, payload)
                 VALUES ($1, $2, 'addendum.create.stale_base', $3, $4, $5)
                 RETURNING id",
            )
            .bind(owner_user_id)
            .bind(experiment_id)
            .bind(base)
            .bind(latest_entry_id)
            .bind(&payload)
            .fetch_one(&mut *tx)
            .await?;

            let cursor = append_event(
                &mut tx,
                NewSyncEvent {
                    owner_user_id,
                    actor_user_id: Some(owner_user_id),
                    device_id: Some(device_id),
                    event_type: "conflict.stale_addendum".to_string(),
                    aggregate_type: "conflict_artifact".to_string(),
                    aggregate_id: Some(artifact_id),
                    payload: json!({
                        "conflictArtifactId": artifact_id,
                        "experimentId": experiment_id,
                        "clientBaseEntryId": base,
                        "serverLatestEntryId": latest_entry_id,
                    }),
                },
            )
            .await?;

            tx.commit().await?;
            notify_commit(feed, owner_user_id, cursor);

            return Err(DomainError::conflict(
                "stale_base",
                json!({
                    "conflictArtifactId": artifact_id,
                    "experimentId": experiment_id,
                    "clientBaseEntryId": base,
                    "serverLatestEntryId": latest_entry_id,
                }),
            ));
        }
    }

    let addendum_id: Uuid = sqlx::query_scalar(
        "INSERT INTO experiment_entries (experiment_id, author_user_id, entry_type, supersedes_entry_id, body)
         VALUES ($1, $2, 'addendum', $3, $4) RETURNING id",
    )
    .bind(experiment_id)
    .bind(owner_user_id)
    .bind(latest_entry_id)
    .bind(body)
    .fetch_one(&mut *tx)
    .await?;

    append_audit(
        &mut tx,
        AuditActor::user(owner_user_id),
        "experiment.addendum",
        "experiment_entry",
        Some(addendum_id),
        json!({ "experimentId": experiment_id, "supersedesEntryId": latest_entry_id }),
    )
    .await?;

    let cursor = append_event(
        &mut tx,
        NewSyncEvent {
            owner_user_id,
            actor_user_id: Some(owner_user_id),
            device_id: Some(device_id),
            event_type: "experiment.addendum_added".to_string(),
            aggregate_type: "experiment_entry".to_string(),
            aggregate_id: Some(addendum_id),
            payload: json!({ "experimentId": experiment_id, "entryId": addendum_id }),
        },
    )
    .await?;

    tx.commit().await?;
    notify_commit(feed, owner_user_id, cursor);

    Ok(addendum_id)
}

/// §4.4 `markCompleted`. Owner-only; the `experiments_guard` trigger makes
/// the downgrade-prevention and completed_at coalescing invariants hold even
/// under concurrent callers.
pub async fn mark_completed(
    pool: &PgPool,
    feed: &ChangeFeed,
    experiment_id: Uuid,
    owner_user_id: Uuid,
    device_id: Uuid,
) -> DomainResult<()> {
    let experiment = load_owner(pool, experiment_id).await?;
    ensure_owner(&experiment, owner_user_id)?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE experiments SET status = 'completed', completed_at = COALESCE(completed_at, now()) WHERE id = $1",
    )
    .bind(experiment_id)
    .execute(&mut *tx)
    .await?;

    append_audit(
        &mut tx,
        AuditActor::user(owner_user_id),
        "experiment.complete",
        "experiment",
        Some(experiment_id),
        json!({}),
    )
    .await?;

    let cursor = append_event(
        &mut tx,
        NewSyncEvent {
            owner_user_id,
            actor_user_id: Some(owner_user_id),
            device_id: Some(device_id),
            event_type: "experiment.completed".to_string(),
            aggregate_type: "experiment".to_string(),
            aggregate_id: Some(experiment_id),
            payload: json!({ "experimentId": experiment_id }),
        },
    )
    .await?;

    tx.commit().await?;
    notify_commit(feed, owner_user_id, cursor);

    Ok(())
}

fn ensure_viewable(experiment: &Experiment, viewer: Uuid, role: Role) -> DomainResult<()> {
    if experiment.owner_user_id == viewer {
        return Ok(());
    }
    if role == Role::Admin && experiment.is_completed() {
        return Ok(());
    }
    Err(DomainError::forbidden("not_visible"))
}

/// §4.4 `getEffectiveView`.
pub async fn get_effective_view(
    pool: &PgPool,
    experiment_id: Uuid,
    viewer: Uuid,
    role: Role,
) -> DomainResult<EffectiveView> {
    let experiment = load_owner(pool, experiment_id).await?;
    ensure_viewable(&experiment, viewer, role)?;

    let original_entry_id: Uuid = sqlx::query_scalar(
        "SELECT id FROM experiment_entries WHERE experiment_id = $1 AND entry_type = 'original'",
    )
    .bind(experiment_id)
    .fetch_one(pool)
    .await?;

    let latest_addendum = sqlx::query(
        "SELECT id, body FROM experiment_entries
         WHERE experiment_id = $1 AND entry_type = 'addendum'
         ORDER BY created_at DESC, id DESC
         LIMIT 1",
    )
    .bind(experiment_id)
    .fetch_optional(pool)
    .await?;

    let (effective_entry_id, effective_body, latest_addendum_id) = if let Some(row) = latest_addendum {
        let id: Uuid = row.try_get("id")?;
        let body: String = row.try_get("body")?;
        (id, body, Some(id))
    } else {
        let body: String = sqlx::query_scalar("SELECT body FROM experiment_entries WHERE id = $1")
            .bind(original_entry_id)
            .fetch_one(pool)
            .await?;
        (original_entry_id, body, None)
    };

    Ok(EffectiveView {
        experiment,
        original_entry_id,
        effective_entry_id,
        effective_body,
        latest_addendum_id,
    })
}

/// §4.4 `getHistory`.
pub async fn get_history(
    pool: &PgPool,
    experiment_id: Uuid,
    viewer: Uuid,
    role: Role,
) -> DomainResult<Vec<ExperimentEntry>> {
    let experiment = load_owner(pool, experiment_id).await?;
    ensure_viewable(&experiment, viewer, role)?;

    let entries = sqlx::query_as(
        "SELECT id, experiment_id, author_user_id, entry_type, supersedes_entry_id, body, created_at
         FROM experiment_entries
         WHERE experiment_id = $1
         ORDER BY created_at ASC, id ASC",
    )
    .bind(experiment_id)
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

/// Shared by the comment/proposal/signature services: confirms `experiment_id`
/// exists and returns it, independent of visibility rules (callers apply
/// their own role gates on top).
pub async fn load_experiment(pool: &PgPool, experiment_id: Uuid) -> DomainResult<Experiment> {
    load_owner(pool, experiment_id).await
}

/// The "most recent entry" body used by the signature subsystem (§4.6):
/// latest addendum if any, else the original.
pub async fn effective_body(pool: &PgPool, experiment_id: Uuid) -> DomainResult<String> {
    let view = get_effective_view_unchecked(pool, experiment_id).await?;
    Ok(view)
}

async fn get_effective_view_unchecked(pool: &PgPool, experiment_id: Uuid) -> DomainResult<String> {
    let latest = sqlx::query_scalar::<_, String>(
        "SELECT body FROM experiment_entries
         WHERE experiment_id = $1
         ORDER BY created_at DESC, id DESC
         LIMIT 1",
    )
    .bind(experiment_id)
    .fetch_optional(pool)
    .await?;

    latest.ok_or_else(|| DomainError::not_found("experiment_has_no_entries"))
}
