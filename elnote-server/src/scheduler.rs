use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::object_store::ObjectStoreInspector;
use crate::services::reconcile_service::{self, ReconcileParams};
use crate::url_signer::UrlSigner;

/// §4.9's process-wide reconcile scheduler. Runs on a fixed interval under
/// the identity named by `RECONCILE_SCHEDULE_ACTOR_EMAIL`, and exits between
/// work units rather than mid-scan on shutdown (§5 cancellation).
pub fn spawn(
    pool: PgPool,
    signer: Arc<dyn UrlSigner>,
    inspector: Arc<dyn ObjectStoreInspector>,
    config: Arc<AppConfig>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let Some(actor_user_id) = resolve_actor(&pool, &config.reconcile_schedule_actor_email).await
        else {
            tracing::warn!(
                email = %config.reconcile_schedule_actor_email,
                "reconcile schedule actor not found; scheduler will not run"
            );
            return;
        };

        if config.reconcile_schedule_run_on_startup {
            run_once(&pool, &signer, &inspector, actor_user_id, &config).await;
        }

        let mut ticker = interval(config.reconcile_schedule_interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    run_once(&pool, &signer, &inspector, actor_user_id, &config).await;
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("reconcile scheduler shutting down");
                    return;
                }
            }
        }
    });
}

async fn resolve_actor(pool: &PgPool, email: &str) -> Option<uuid::Uuid> {
    sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await
        .ok()
        .flatten()
}

async fn run_once(
    pool: &PgPool,
    signer: &Arc<dyn UrlSigner>,
    inspector: &Arc<dyn ObjectStoreInspector>,
    actor_user_id: uuid::Uuid,
    config: &AppConfig,
) {
    let params = ReconcileParams {
        actor_user_id,
        stale_after: config.reconcile_stale_after,
        scan_limit: config.reconcile_scan_limit as i64,
    };

    match reconcile_service::reconcile(pool, signer, inspector, params).await {
        Ok(run) => {
            tracing::info!(run_id = %run.id, "scheduled reconcile run completed");
        }
        Err(err) => {
            tracing::error!(error = ?err, "scheduled reconcile run failed");
        }
    }
}
