use std::sync::Arc;

use axum::extract::FromRef;
use common_auth::JwtVerifier;
use common_observability::ElnoteMetrics;
use reqwest::Client;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::object_store::ObjectStoreInspector;
use crate::services::sync_service::ChangeFeed;
use crate::url_signer::UrlSigner;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub jwt_verifier: Arc<JwtVerifier>,
    pub url_signer: Arc<dyn UrlSigner>,
    pub object_store: Arc<dyn ObjectStoreInspector>,
    pub change_feed: ChangeFeed,
    pub config: Arc<AppConfig>,
    pub metrics: Arc<ElnoteMetrics>,
    pub http_client: Client,
}

impl FromRef<AppState> for Arc<JwtVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt_verifier.clone()
    }
}

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl FromRef<AppState> for ChangeFeed {
    fn from_ref(state: &AppState) -> Self {
        state.change_feed.clone()
    }
}
