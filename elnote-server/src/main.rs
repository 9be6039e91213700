use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use common_auth::{JwtConfig, JwtVerifier};
use common_observability::ElnoteMetrics;
use elnote_server::config;
use elnote_server::object_store::HttpObjectStoreInspector;
use elnote_server::services::auth_service;
use elnote_server::services::sync_service::ChangeFeed;
use elnote_server::url_signer::HmacUrlSigner;
use elnote_server::{build_router, AppState};
use reqwest::Client;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = config::load().context("failed to load configuration")?;
    info!(?config, "loaded configuration");

    let db = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!("./migrations").run(&db).await.context("failed to run migrations")?;

    let jwt_config = JwtConfig::new(config.jwt_secret.clone(), config.jwt_issuer.clone());
    let jwt_verifier = Arc::new(JwtVerifier::new(jwt_config));

    let url_signer: Arc<dyn elnote_server::url_signer::UrlSigner> = Arc::new(HmacUrlSigner::new(
        config.object_store_sign_secret.clone(),
        config.object_store_public_base_url.clone(),
        config.object_store_bucket.clone(),
    ));

    let http_client = Client::builder().build().context("failed to build HTTP client")?;

    let object_store: Arc<dyn elnote_server::object_store::ObjectStoreInspector> = Arc::new(
        HttpObjectStoreInspector::new(http_client.clone(), config.object_store_inventory_url.clone()),
    );

    let change_feed = ChangeFeed::new(config.sync_broadcast_capacity);
    let metrics = Arc::new(ElnoteMetrics::new());
    let config = Arc::new(config);

    auth_service::ensure_default_admin(&db, &config.default_admin_email)
        .await
        .context("failed to seed default admin")?;

    let shutdown = CancellationToken::new();
    if config.reconcile_schedule_enabled {
        elnote_server::scheduler::spawn(
            db.clone(),
            url_signer.clone(),
            object_store.clone(),
            config.clone(),
            shutdown.clone(),
        );
    }

    let state = AppState {
        db,
        jwt_verifier,
        url_signer,
        object_store,
        change_feed,
        config: config.clone(),
        metrics,
        http_client,
    };

    let app = build_router(state);

    let addr: SocketAddr = config.http_addr.parse().context("HTTP_ADDR must be a valid socket address")?;
    let listener = TcpListener::bind(addr).await.context("failed to bind HTTP listener")?;

    info!(%addr, "starting elnote-server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
    token.cancel();
}
