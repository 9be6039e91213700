use axum::http::StatusCode;
use axum::response::IntoResponse;
use common_http_errors::ApiError;
use serde_json::json;
use uuid::Uuid;

#[test]
fn invalid_input_maps_to_400() {
    let resp = ApiError::invalid_input("empty_title").into_response();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "empty_title");
}

#[test]
fn unauthorized_maps_to_401() {
    let resp = ApiError::unauthorized("invalid_credentials").into_response();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "invalid_credentials");
}

#[test]
fn forbidden_maps_to_403() {
    let resp = ApiError::forbidden("not_owner").into_response();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "not_owner");
}

#[test]
fn not_found_maps_to_404() {
    let resp = ApiError::not_found("experiment_not_found").into_response();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "experiment_not_found");
}

#[test]
fn conflict_carries_detail_and_status() {
    let detail = json!({"conflictArtifactId": Uuid::nil()});
    let resp = ApiError::conflict("stale_base", Some(detail)).into_response();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "stale_base");
}

#[test]
fn internal_never_leaks_message_as_code() {
    let resp = ApiError::internal("db connection refused").into_response();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "internal_error");
}

#[test]
fn every_response_carries_nosniff() {
    let resp = ApiError::not_found("x").into_response();
    assert_eq!(resp.headers().get("X-Content-Type-Options").unwrap(), "nosniff");
}
