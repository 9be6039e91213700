use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub title: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Experiment {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Original,
    Addendum,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Original => "original",
            EntryType::Addendum => "addendum",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentEntry {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub author_user_id: Uuid,
    pub entry_type: String,
    pub supersedes_entry_id: Option<Uuid>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// The projection described in §4.4: the original entry joined with the
/// latest addendum, if any.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveView {
    pub experiment: Experiment,
    pub original_entry_id: Uuid,
    pub effective_entry_id: Uuid,
    pub effective_body: String,
    pub latest_addendum_id: Option<Uuid>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRow {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub admin_user_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalRow {
    pub id: Uuid,
    pub source_experiment_id: Uuid,
    pub admin_user_id: Uuid,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
