use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One discrepancy kind the reconciler can surface (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    InitiatedStale,
    CompletedMissingChecksum,
    CompletedMissingObject,
    CompletedObjectIntegrityMismatch,
    OrphanObject,
    ObjectProbeFailed,
    ObjectListingFailed,
}

impl FindingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingType::InitiatedStale => "initiated_stale",
            FindingType::CompletedMissingChecksum => "completed_missing_checksum",
            FindingType::CompletedMissingObject => "completed_missing_object",
            FindingType::CompletedObjectIntegrityMismatch => "completed_object_integrity_mismatch",
            FindingType::OrphanObject => "orphan_object",
            FindingType::ObjectProbeFailed => "object_probe_failed",
            FindingType::ObjectListingFailed => "object_listing_failed",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRun {
    pub id: Uuid,
    pub actor_user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stale_after_seconds: i64,
    pub scan_limit: i32,
    pub counters: serde_json::Value,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileFinding {
    pub id: Uuid,
    pub run_id: Uuid,
    pub finding_type: String,
    pub attachment_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ReconcileCounters {
    pub initiated_stale: u32,
    pub completed_missing_checksum: u32,
    pub completed_missing_object: u32,
    pub completed_object_integrity_mismatch: u32,
    pub orphan_object: u32,
    pub object_probe_failed: u32,
    pub object_listing_failed: u32,
}

impl ReconcileCounters {
    pub fn increment(&mut self, kind: FindingType) {
        let field = match kind {
            FindingType::InitiatedStale => &mut self.initiated_stale,
            FindingType::CompletedMissingChecksum => &mut self.completed_missing_checksum,
            FindingType::CompletedMissingObject => &mut self.completed_missing_object,
            FindingType::CompletedObjectIntegrityMismatch => {
                &mut self.completed_object_integrity_mismatch
            }
            FindingType::OrphanObject => &mut self.orphan_object,
            FindingType::ObjectProbeFailed => &mut self.object_probe_failed,
            FindingType::ObjectListingFailed => &mut self.object_listing_failed,
        };
        *field += 1;
    }

    pub fn total(&self) -> u32 {
        self.initiated_stale
            + self.completed_missing_checksum
            + self.completed_missing_object
            + self.completed_object_integrity_mismatch
            + self.orphan_object
            + self.object_probe_failed
            + self.object_listing_failed
    }
}
