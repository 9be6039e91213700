use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::sync::{CommitNotice, NewSyncEvent, SyncEvent, SyncPage, DEFAULT_PULL_LIMIT, MAX_PULL_LIMIT};
use crate::domain::{DomainError, DomainResult};

/// In-process fan-out: every commit publishes `(owner_user_id, cursor)` here.
/// Per-viewer WebSocket tasks subscribe and re-query `pull` for the delta
/// rather than streaming raw payloads off the channel, so a lagged receiver
/// never serves stale event bodies.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<CommitNotice>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CommitNotice> {
        self.sender.subscribe()
    }

    fn publish(&self, notice: CommitNotice) {
        // No subscribers is the common case (no open WS connections); the
        // send simply returns an error we don't care about.
        let _ = self.sender.send(notice);
    }
}

/// Appends one row to `sync_events` inside the caller's transaction and
/// returns the assigned cursor. The caller is responsible for publishing the
/// returned cursor to [`ChangeFeed`] only after the transaction commits.
pub async fn append_event(
    tx: &mut Transaction<'_, Postgres>,
    event: NewSyncEvent,
) -> DomainResult<i64> {
    let cursor: i64 = sqlx::query_scalar(
        "INSERT INTO sync_events
            (owner_user_id, actor_user_id, device_id, event_type, aggregate_type, aggregate_id, payload)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING cursor",
    )
    .bind(event.owner_user_id)
    .bind(event.actor_user_id)
    .bind(event.device_id)
    .bind(&event.event_type)
    .bind(&event.aggregate_type)
    .bind(event.aggregate_id)
    .bind(&event.payload)
    .fetch_one(&mut **tx)
    .await?;

    Ok(cursor)
}

/// Publishes a commit notice after the owning transaction has committed.
pub fn notify_commit(feed: &ChangeFeed, owner_user_id: Uuid, cursor: i64) {
    feed.publish(CommitNotice { owner_user_id, cursor });
}

/// Returns events owned by `viewer_user_id` with `cursor > cursor`, ascending,
/// capped at `limit` (defaults and bounds per §4.3/§8 boundary behaviors).
pub async fn pull(
    pool: &PgPool,
    viewer_user_id: Uuid,
    cursor: i64,
    limit: Option<i64>,
) -> DomainResult<SyncPage> {
    let limit = match limit {
        None => DEFAULT_PULL_LIMIT,
        Some(l) if l <= 0 => {
            return Err(DomainError::invalid_input("invalid_limit"));
        }
        Some(l) => l.min(MAX_PULL_LIMIT),
    };

    let events: Vec<SyncEvent> = sqlx::query_as(
        "SELECT cursor, owner_user_id, actor_user_id, device_id, event_type, aggregate_type, aggregate_id, payload, created_at
         FROM sync_events
         WHERE owner_user_id = $1 AND cursor > $2
         ORDER BY cursor ASC
         LIMIT $3",
    )
    .bind(viewer_user_id)
    .bind(cursor)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let next_cursor = events.last().map(|e| e.cursor).unwrap_or(cursor);

    Ok(SyncPage { events, next_cursor })
}

/// Lists conflicts for `viewer_user_id`, newest first, for `GET /sync/conflicts`.
pub async fn list_conflicts(
    pool: &PgPool,
    viewer_user_id: Uuid,
    limit: i64,
) -> DomainResult<Vec<crate::domain::conflicts::ConflictArtifact>> {
    let limit = limit.clamp(1, MAX_PULL_LIMIT);
    let conflicts = sqlx::query_as(
        "SELECT id, owner_user_id, experiment_id, action_type, client_base_entry_id,
                server_latest_entry_id, payload, resolved_at, created_at
         FROM conflict_artifacts
         WHERE owner_user_id = $1
         ORDER BY created_at DESC
         LIMIT $2",
    )
    .bind(viewer_user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_feed_delivers_to_subscriber() {
        let feed = ChangeFeed::new(16);
        let mut rx = feed.subscribe();
        let owner = Uuid::new_v4();
        feed.publish(CommitNotice { owner_user_id: owner, cursor: 42 });
        let notice = rx.try_recv().expect("notice delivered");
        assert_eq!(notice.owner_user_id, owner);
        assert_eq!(notice.cursor, 42);
    }

    #[test]
    fn lagged_subscriber_reports_lag_not_panic() {
        let feed = ChangeFeed::new(2);
        let mut rx = feed.subscribe();
        let owner = Uuid::new_v4();
        for cursor in 0..5 {
            feed.publish(CommitNotice { owner_user_id: owner, cursor });
        }
        // The slow-client case from §5: a lagged receiver surfaces
        // `RecvError::Lagged` rather than silently dropping data forever.
        match rx.try_recv() {
            Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            other => panic!("expected Lagged, got {other:?}"),
        }
    }
}
