use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub uploader_user_id: Uuid,
    pub object_key: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub status: String,
    pub checksum: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Attachment {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatedAttachment {
    pub attachment_id: Uuid,
    pub upload_url: String,
}
