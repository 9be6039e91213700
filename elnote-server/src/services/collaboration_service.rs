use common_audit::{append_audit, AuditActor};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::experiments::{CommentRow, ProposalRow};
use crate::domain::sync::NewSyncEvent;
use crate::domain::{DomainError, DomainResult};
use crate::services::experiment_service::load_experiment;
use crate::services::sync_service::{append_event, notify_commit, ChangeFeed};

/// §4.5 `createComment`. Requires role == admin (checked by the handler's
/// route guard) AND the target experiment is `completed`.
pub async fn create_comment(
    pool: &PgPool,
    feed: &ChangeFeed,
    experiment_id: Uuid,
    admin_user_id: Uuid,
    device_id: Uuid,
    body: &str,
) -> DomainResult<Uuid> {
    if body.trim().is_empty() {
        return Err(DomainError::invalid_input("empty_body"));
    }

    let experiment = load_experiment(pool, experiment_id).await?;
    if !experiment.is_completed() {
        return Err(DomainError::forbidden("experiment_not_completed"));
    }

    let mut tx = pool.begin().await?;

    let comment_id: Uuid = sqlx::query_scalar(
        "INSERT INTO comments (experiment_id, admin_user_id, body) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(experiment_id)
    .bind(admin_user_id)
    .bind(body)
    .fetch_one(&mut *tx)
    .await?;

    append_audit(
        &mut tx,
        AuditActor::user(admin_user_id),
        "comment.create",
        "comment",
        Some(comment_id),
        json!({ "experimentId": experiment_id }),
    )
    .await?;

    let cursor = append_event(
        &mut tx,
        NewSyncEvent {
            owner_user_id: experiment.owner_user_id,
            actor_user_id: Some(admin_user_id),
            device_id: Some(device_id),
            event_type: "comment.created".to_string(),
            aggregate_type: "comment".to_string(),
            aggregate_id: Some(comment_id),
            payload: json!({ "experimentId": experiment_id, "commentId": comment_id }),
        },
    )
    .await?;

    tx.commit().await?;
    notify_commit(feed, experiment.owner_user_id, cursor);

    Ok(comment_id)
}

pub async fn list_comments(pool: &PgPool, experiment_id: Uuid) -> DomainResult<Vec<CommentRow>> {
    let comments = sqlx::query_as(
        "SELECT id, experiment_id, admin_user_id, body, created_at
         FROM comments WHERE experiment_id = $1 ORDER BY created_at ASC",
    )
    .bind(experiment_id)
    .fetch_all(pool)
    .await?;

    Ok(comments)
}

/// §4.5 `createProposal`.
pub async fn create_proposal(
    pool: &PgPool,
    feed: &ChangeFeed,
    source_experiment_id: Uuid,
    admin_user_id: Uuid,
    device_id: Uuid,
    title: &str,
    body: &str,
) -> DomainResult<Uuid> {
    if title.trim().is_empty() || body.trim().is_empty() {
        return Err(DomainError::invalid_input("empty_field"));
    }

    let experiment = load_experiment(pool, source_experiment_id).await?;
    if !experiment.is_completed() {
        return Err(DomainError::forbidden("experiment_not_completed"));
    }

    let mut tx = pool.begin().await?;

    let proposal_id: Uuid = sqlx::query_scalar(
        "INSERT INTO proposals (source_experiment_id, admin_user_id, title, body)
         VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(source_experiment_id)
    .bind(admin_user_id)
    .bind(title)
    .bind(body)
    .fetch_one(&mut *tx)
    .await?;

    append_audit(
        &mut tx,
        AuditActor::user(admin_user_id),
        "proposal.create",
        "proposal",
        Some(proposal_id),
        json!({ "sourceExperimentId": source_experiment_id }),
    )
    .await?;

    let cursor = append_event(
        &mut tx,
        NewSyncEvent {
            owner_user_id: experiment.owner_user_id,
            actor_user_id: Some(admin_user_id),
            device_id: Some(device_id),
            event_type: "proposal.created".to_string(),
            aggregate_type: "proposal".to_string(),
            aggregate_id: Some(proposal_id),
            payload: json!({ "sourceExperimentId": source_experiment_id, "proposalId": proposal_id }),
        },
    )
    .await?;

    tx.commit().await?;
    notify_commit(feed, experiment.owner_user_id, cursor);

    Ok(proposal_id)
}

pub async fn list_proposals(pool: &PgPool, source_experiment_id: Uuid) -> DomainResult<Vec<ProposalRow>> {
    let proposals = sqlx::query_as(
        "SELECT id, source_experiment_id, admin_user_id, title, body, created_at
         FROM proposals WHERE source_experiment_id = $1 ORDER BY created_at ASC",
    )
    .bind(source_experiment_id)
    .fetch_all(pool)
    .await?;

    Ok(proposals)
}
