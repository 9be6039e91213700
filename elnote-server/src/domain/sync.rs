use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    pub cursor: i64,
    pub owner_user_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub device_id: Option<Uuid>,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPage {
    pub events: Vec<SyncEvent>,
    pub next_cursor: i64,
}

/// Fields needed to append one change-feed row, mirroring §4.3's
/// `appendEvent` signature.
pub struct NewSyncEvent {
    pub owner_user_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub device_id: Option<Uuid>,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: Option<Uuid>,
    pub payload: serde_json::Value,
}

/// Broadcast on every transaction commit so per-viewer WebSocket tasks can
/// re-query `pull` for the delta (§4.3 Design Notes).
#[derive(Debug, Clone, Copy)]
pub struct CommitNotice {
    pub owner_user_id: Uuid,
    pub cursor: i64,
}

pub const DEFAULT_PULL_LIMIT: i64 = 100;
pub const MAX_PULL_LIMIT: i64 = 1000;
