use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use futures_util::TryStreamExt;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::canonical::{canonical_bytes, canonicalize};
use crate::model::{AuditActor, AuditError, AuditEvent, AuditResult, ChainVerification};

fn compute_event_hash(
    created_at: DateTime<Utc>,
    actor: AuditActor,
    event_type: &str,
    entity_type: &str,
    entity_id: Option<Uuid>,
    canonical_payload: &[u8],
    prev_hash: &[u8],
) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(created_at.to_rfc3339_opts(SecondsFormat::Nanos, true).as_bytes());
    hasher.update(b"|");
    hasher.update(actor.0.map(|id| id.to_string()).unwrap_or_default().as_bytes());
    hasher.update(b"|");
    hasher.update(event_type.as_bytes());
    hasher.update(b"|");
    hasher.update(entity_type.as_bytes());
    hasher.update(b"|");
    hasher.update(entity_id.map(|id| id.to_string()).unwrap_or_default().as_bytes());
    hasher.update(b"|");
    hasher.update(canonical_payload);
    hasher.update(b"|");
    hasher.update(hex::encode(prev_hash).as_bytes());
    hasher.finalize().to_vec()
}

/// Appends one event to the hash chain as part of `tx`. Reads the current
/// tail's `event_hash` with a plain `SELECT` (no `FOR UPDATE`): per-row id
/// assignment is monotonic, so two concurrent transactions may read the same
/// tail and produce sibling hashes off a common `prev_hash` — the chain
/// still verifies because `verify_chain` walks by id, not by time (§5).
pub async fn append_audit(
    tx: &mut Transaction<'_, Postgres>,
    actor: AuditActor,
    event_type: impl Into<String>,
    entity_type: impl Into<String>,
    entity_id: Option<Uuid>,
    payload: serde_json::Value,
) -> AuditResult<AuditEvent> {
    let event_type = event_type.into();
    let entity_type = entity_type.into();

    let prev_hash: Vec<u8> = sqlx::query_scalar(
        "SELECT event_hash FROM audit_log ORDER BY id DESC LIMIT 1",
    )
    .fetch_optional(&mut **tx)
    .await?
    .unwrap_or_default();

    let canonical_payload_value = canonicalize(&payload);
    let canonical_payload = canonical_bytes(&payload);
    // `TIMESTAMPTZ` stores microsecond precision; truncate before hashing so
    // the value we hash is exactly the value `verify_chain` reads back.
    let created_at = Utc::now().trunc_subsecs(6);
    let event_hash = compute_event_hash(
        created_at,
        actor,
        &event_type,
        &entity_type,
        entity_id,
        &canonical_payload,
        &prev_hash,
    );

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO audit_log
            (actor_user_id, event_type, entity_type, entity_id, payload, created_at, prev_hash, event_hash)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING id",
    )
    .bind(actor.0)
    .bind(&event_type)
    .bind(&entity_type)
    .bind(entity_id)
    .bind(&canonical_payload_value)
    .bind(created_at)
    .bind(&prev_hash)
    .bind(&event_hash)
    .fetch_one(&mut **tx)
    .await?;

    Ok(AuditEvent {
        id,
        actor_user_id: actor.0,
        event_type,
        entity_type,
        entity_id,
        payload: canonical_payload_value,
        created_at,
        prev_hash,
        event_hash,
    })
}

/// Walks the chain in id order, recomputing each row's hash. Returns the id
/// of the first row whose stored hash no longer matches what §3 predicts.
pub async fn verify_chain(pool: &PgPool) -> AuditResult<ChainVerification> {
    let mut rows = sqlx::query(
        "SELECT id, actor_user_id, event_type, entity_type, entity_id, payload, created_at, prev_hash, event_hash
         FROM audit_log ORDER BY id ASC",
    )
    .fetch(pool);

    let mut expected_prev: Vec<u8> = Vec::new();
    let mut rows_checked: i64 = 0;

    while let Some(row) = rows.try_next().await.map_err(AuditError::Database)? {
        let id: i64 = row.try_get("id")?;
        let actor_user_id: Option<Uuid> = row.try_get("actor_user_id")?;
        let event_type: String = row.try_get("event_type")?;
        let entity_type: String = row.try_get("entity_type")?;
        let entity_id: Option<Uuid> = row.try_get("entity_id")?;
        let payload: serde_json::Value = row.try_get("payload")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let prev_hash: Vec<u8> = row.try_get("prev_hash")?;
        let event_hash: Vec<u8> = row.try_get("event_hash")?;

        rows_checked += 1;

        if prev_hash != expected_prev {
            return Ok(ChainVerification {
                valid: false,
                first_bad_id: Some(id),
                rows_checked,
            });
        }

        let canonical_payload = canonical_bytes(&payload);
        let recomputed = compute_event_hash(
            created_at,
            AuditActor(actor_user_id),
            &event_type,
            &entity_type,
            entity_id,
            &canonical_payload,
            &prev_hash,
        );

        if recomputed != event_hash {
            return Ok(ChainVerification {
                valid: false,
                first_bad_id: Some(id),
                rows_checked,
            });
        }

        expected_prev = event_hash;
    }

    Ok(ChainVerification {
        valid: true,
        first_bad_id: None,
        rows_checked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_event_hash_is_deterministic() {
        let created_at = Utc::now();
        let a = compute_event_hash(
            created_at,
            AuditActor::user(Uuid::nil()),
            "login",
            "user",
            None,
            b"{}",
            b"",
        );
        let b = compute_event_hash(
            created_at,
            AuditActor::user(Uuid::nil()),
            "login",
            "user",
            None,
            b"{}",
            b"",
        );
        assert_eq!(a, b);
    }

    #[test]
    fn compute_event_hash_changes_with_prev_hash() {
        let created_at = Utc::now();
        let a = compute_event_hash(created_at, AuditActor::system(), "x", "y", None, b"{}", b"");
        let b = compute_event_hash(created_at, AuditActor::system(), "x", "y", None, b"{}", b"prev");
        assert_ne!(a, b);
    }
}
