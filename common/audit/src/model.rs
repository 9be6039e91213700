use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The user (if any) attributed to an audit event. Service-initiated events
/// (the reconciler, a scheduled job) carry `None`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct AuditActor(pub Option<Uuid>);

impl AuditActor {
    pub fn user(id: Uuid) -> Self {
        Self(Some(id))
    }

    pub fn system() -> Self {
        Self(None)
    }
}

/// A single row of the hash-chained audit log, per §3/§4.1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: i64,
    pub actor_user_id: Option<Uuid>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub prev_hash: Vec<u8>,
    pub event_hash: Vec<u8>,
}

/// Result of walking the chain in id order and recomputing each hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub valid: bool,
    pub first_bad_id: Option<i64>,
    pub rows_checked: i64,
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type AuditResult<T> = Result<T, AuditError>;
