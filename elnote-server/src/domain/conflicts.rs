use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictArtifact {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub experiment_id: Uuid,
    pub action_type: String,
    pub client_base_entry_id: Option<Uuid>,
    pub server_latest_entry_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
