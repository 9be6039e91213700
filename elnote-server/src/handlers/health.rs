use axum::extract::State;
use axum::Json;
use serde::Serialize;
use sqlx::PgPool;

#[derive(Serialize)]
pub struct HealthBody {
    status: &'static str,
}

/// `GET /healthz`. Unauthenticated and exempt from the TLS gate. Pings the
/// pool rather than just returning 200 so a wedged database shows up here
/// before a caller notices through a mutating route.
pub async fn healthz(State(pool): State<PgPool>) -> Json<HealthBody> {
    let status = match sqlx::query("SELECT 1").execute(&pool).await {
        Ok(_) => "ok",
        Err(_) => "degraded",
    };
    Json(HealthBody { status })
}
