use axum::http::{HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{body::Body, Router};
use prometheus::{Encoder, TextEncoder};
use tower_http::cors::{Any, CorsLayer};

use crate::app::AppState;
use crate::handlers::{attachments, auth, collaboration, experiments, health, ops, signatures, sync};

/// §4.10's TLS gate: reverse proxies terminate TLS and forward
/// `X-Forwarded-Proto: https`, so that header (or a direct TLS connection,
/// which this process never terminates itself) is what's checked.
async fn require_tls(
    axum::extract::State(state): axum::extract::State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.require_tls {
        return next.run(req).await;
    }

    let proto_ok = req
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("https"))
        .unwrap_or(false);

    if proto_ok {
        return next.run(req).await;
    }

    Response::builder()
        .status(StatusCode::UPGRADE_REQUIRED)
        .header("X-Content-Type-Options", HeaderValue::from_static("nosniff"))
        .body(Body::from("TLS required"))
        .expect("static response body")
}

/// Records every emitted error response's code/status.
async fn http_error_metrics(
    axum::extract::State(state): axum::extract::State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let resp = next.run(req).await;
    let status = resp.status();
    if status.as_u16() >= 400 {
        let code = resp
            .headers()
            .get("X-Error-Code")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        state
            .metrics
            .http_errors_total
            .with_label_values(&[&code, status.as_str()])
            .inc();
    }
    resp
}

async fn metrics_endpoint(axum::extract::State(state): axum::extract::State<AppState>) -> (StatusCode, String) {
    let encoder = TextEncoder::new();
    let families = state.metrics.registry.gather();
    let mut buf = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut buf) {
        return (StatusCode::INTERNAL_SERVER_ERROR, format!("metrics encode error: {err}"));
    }
    (StatusCode::OK, String::from_utf8_lossy(&buf).to_string())
}

/// Adds the `nosniff` header to every response, success or error — `ApiError`
/// already sets it on its own, but plain `Json<T>` success bodies don't.
async fn nosniff(req: Request<Body>, next: Next) -> Response {
    let mut resp = next.run(req).await;
    resp.headers_mut()
        .insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    resp
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route("/v1/auth/login", post(auth::login))
        .route("/v1/auth/refresh", post(auth::refresh))
        .route("/v1/auth/logout", post(auth::logout))
        .route("/v1/auth/admin/reset", post(auth::admin_reset))
        .route("/v1/experiments", post(experiments::create_experiment))
        .route("/v1/experiments/:id", get(experiments::get_effective_view))
        .route("/v1/experiments/:id/history", get(experiments::get_history))
        .route("/v1/experiments/:id/addendums", post(experiments::add_addendum))
        .route("/v1/experiments/:id/complete", post(experiments::mark_completed))
        .route("/v1/experiments/:id/attachments", get(attachments::list_by_experiment))
        .route(
            "/v1/experiments/:id/comments",
            post(collaboration::create_comment).get(collaboration::list_comments),
        )
        .route("/v1/experiments/:id/signatures/verify", get(signatures::verify))
        .route(
            "/v1/proposals",
            post(collaboration::create_proposal).get(collaboration::list_proposals),
        )
        .route("/v1/sync/pull", get(sync::pull))
        .route("/v1/sync/conflicts", get(sync::list_conflicts))
        .route("/v1/sync/ws", get(sync::ws_handler))
        .route("/v1/attachments/initiate", post(attachments::initiate))
        .route("/v1/attachments/:id/complete", post(attachments::complete))
        .route("/v1/attachments/:id/download", get(attachments::download))
        .route("/v1/ops/dashboard", get(ops::dashboard))
        .route("/v1/ops/audit/verify", get(ops::verify_audit))
        .route("/v1/ops/attachments/reconcile", post(ops::reconcile))
        .route("/v1/ops/forensic/export", get(ops::forensic_export))
        .route("/v1/signatures", post(signatures::sign))
        .layer(middleware::from_fn_with_state(state.clone(), require_tls));

    let open = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/metrics", get(metrics_endpoint));

    protected
        .merge(open)
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(state, http_error_metrics))
        .layer(middleware::from_fn(nosniff))
        .layer(cors)
}
