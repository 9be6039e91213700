use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::Json;
use common_auth::AuthContext;
use common_http_errors::{ApiError, ApiResult};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::app::AppState;
use crate::domain::conflicts::ConflictArtifact;
use crate::domain::sync::SyncPage;
use crate::services::sync_service;

#[derive(Deserialize)]
pub struct PullQuery {
    pub cursor: i64,
    pub limit: Option<i64>,
}

/// `GET /v1/sync/pull?cursor=&limit=`.
pub async fn pull(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<PullQuery>,
) -> ApiResult<Json<SyncPage>> {
    if q.cursor < 0 {
        return Err(ApiError::invalid_input("negative_cursor"));
    }
    let page = sync_service::pull(&state.db, auth.user_id(), q.cursor, q.limit).await?;
    Ok(Json(page))
}

#[derive(Deserialize)]
pub struct ConflictsQuery {
    #[serde(default = "default_conflicts_limit")]
    pub limit: i64,
}

fn default_conflicts_limit() -> i64 {
    100
}

/// `GET /v1/sync/conflicts?limit=`.
pub async fn list_conflicts(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<ConflictsQuery>,
) -> ApiResult<Json<Vec<ConflictArtifact>>> {
    let conflicts = sync_service::list_conflicts(&state.db, auth.user_id(), q.limit).await?;
    Ok(Json(conflicts))
}

#[derive(Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub cursor: i64,
}

/// Depth of the per-connection outbound queue named in §5's backpressure
/// rule: once it fills, the viewer is dropped rather than buffered forever.
const WS_QUEUE_DEPTH: usize = 64;

/// `GET /v1/sync/ws?cursor=`. Upgrades to a long-lived per-viewer task that
/// re-pulls the delta on every commit notice rather than streaming raw
/// broadcast payloads, so a lagged receiver never serves a stale body.
pub async fn ws_handler(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let owner_user_id = auth.user_id();
    ws.on_upgrade(move |socket| handle_socket(socket, state, owner_user_id, q.cursor))
}

async fn handle_socket(socket: WebSocket, state: AppState, owner_user_id: Uuid, initial_cursor: i64) {
    state.metrics.ws_connections_active.inc();

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::channel::<SyncPage>(WS_QUEUE_DEPTH);

    let pool = state.db.clone();
    let mut feed_rx = state.change_feed.subscribe();

    let producer = tokio::spawn(async move {
        let mut cursor = initial_cursor;

        // Flush anything already pending at connect time before waiting on
        // the feed for new commits.
        if let Ok(page) = sync_service::pull(&pool, owner_user_id, cursor, None).await {
            if !page.events.is_empty() {
                cursor = page.next_cursor;
                if tx.send(page).await.is_err() {
                    return;
                }
            }
        }

        loop {
            match feed_rx.recv().await {
                Ok(notice) if notice.owner_user_id == owner_user_id && notice.cursor > cursor => {
                    match sync_service::pull(&pool, owner_user_id, cursor, None).await {
                        Ok(page) => {
                            if page.events.is_empty() {
                                continue;
                            }
                            cursor = page.next_cursor;
                            if tx.send(page).await.is_err() {
                                return;
                            }
                        }
                        Err(_) => return,
                    }
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    // Some commit notices were dropped; re-pull from the
                    // last cursor we know about to close the gap.
                    if let Ok(page) = sync_service::pull(&pool, owner_user_id, cursor, None).await {
                        if !page.events.is_empty() {
                            cursor = page.next_cursor;
                            if tx.send(page).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    });

    loop {
        tokio::select! {
            page = rx.recv() => {
                let Some(page) = page else { break };
                let Ok(body) = serde_json::to_string(&page) else { break };
                if sink.send(Message::Text(body)).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                }
            }
        }
    }

    producer.abort();
    state.metrics.ws_connections_active.dec();
}
