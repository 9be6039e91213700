use common_audit::{append_audit, AuditActor};
use serde_json::json;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::signatures::{Signature, SignatureType, SignatureVerification};
use crate::domain::sync::NewSyncEvent;
use crate::domain::{DomainError, DomainResult};
use crate::services::experiment_service::{effective_body, load_experiment};
use crate::services::sync_service::{append_event, notify_commit, ChangeFeed};

fn content_hash(body: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hasher.finalize().to_vec()
}

/// §4.6 `sign`. Password re-verification happens at the handler layer
/// (`auth_service::verify_live_password`) before this is called, so this
/// function only enforces the role-pairing and completion-state rules.
pub async fn sign(
    pool: &PgPool,
    feed: &ChangeFeed,
    experiment_id: Uuid,
    signer_user_id: Uuid,
    device_id: Uuid,
    signature_type: SignatureType,
) -> DomainResult<Uuid> {
    let experiment = load_experiment(pool, experiment_id).await?;
    if !experiment.is_completed() {
        return Err(DomainError::invalid_input("experiment_not_completed"));
    }

    match signature_type {
        SignatureType::Author if experiment.owner_user_id != signer_user_id => {
            return Err(DomainError::forbidden("author_signature_requires_owner"));
        }
        SignatureType::Witness if experiment.owner_user_id == signer_user_id => {
            return Err(DomainError::forbidden("witness_signature_requires_non_owner"));
        }
        _ => {}
    }

    let body = effective_body(pool, experiment_id).await?;
    let hash = content_hash(&body);

    let mut tx = pool.begin().await?;

    let signature_id: Uuid = sqlx::query_scalar(
        "INSERT INTO signatures (experiment_id, signer_user_id, signature_type, content_hash)
         VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(experiment_id)
    .bind(signer_user_id)
    .bind(signature_type.as_str())
    .bind(&hash)
    .fetch_one(&mut *tx)
    .await?;

    append_audit(
        &mut tx,
        AuditActor::user(signer_user_id),
        "signature.create",
        "signature",
        Some(signature_id),
        json!({ "experimentId": experiment_id, "signatureType": signature_type.as_str() }),
    )
    .await?;

    let cursor = append_event(
        &mut tx,
        NewSyncEvent {
            owner_user_id: experiment.owner_user_id,
            actor_user_id: Some(signer_user_id),
            device_id: Some(device_id),
            event_type: "signature.created".to_string(),
            aggregate_type: "signature".to_string(),
            aggregate_id: Some(signature_id),
            payload: json!({ "experimentId": experiment_id, "signatureId": signature_id }),
        },
    )
    .await?;

    tx.commit().await?;
    notify_commit(feed, experiment.owner_user_id, cursor);

    Ok(signature_id)
}

/// §4.6 `verify`: recomputes the current effective-body hash and compares
/// it to every recorded signature. Once any addendum is written after a
/// signature, `integrityValid` flips to false for that signature's
/// comparison — this is the binding property asserted in §8.
pub async fn verify(pool: &PgPool, experiment_id: Uuid) -> DomainResult<SignatureVerification> {
    let _ = load_experiment(pool, experiment_id).await?;

    let signatures: Vec<Signature> = sqlx::query_as(
        "SELECT id, experiment_id, signer_user_id, signature_type, content_hash, signed_at
         FROM signatures WHERE experiment_id = $1 ORDER BY signed_at ASC",
    )
    .bind(experiment_id)
    .fetch_all(pool)
    .await?;

    let body = effective_body(pool, experiment_id).await?;
    let current_content_hash = content_hash(&body);

    let integrity_valid = signatures.iter().all(|s| s.content_hash == current_content_hash);

    Ok(SignatureVerification { signatures, current_content_hash, integrity_valid })
}
