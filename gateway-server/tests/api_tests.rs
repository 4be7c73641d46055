use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use gateway_server::state::AppState;

fn test_app() -> axum::Router {
    let state = AppState::new_test();
    gateway_server::create_router(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn run_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/run")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn run_rejects_unsupported_language() {
    let response = test_app()
        .oneshot(run_request(json!({ "language": "cobol", "code": "DISPLAY 1" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body.get("error").is_some());
}

#[tokio::test]
async fn run_rejects_malformed_body() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/run")
                .header("content-type", "application/json")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    // Spec §6.1: malformed request bodies map to 400, not axum's default 422.
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn run_accepts_a_supported_language_request() {
    let response = test_app()
        .oneshot(run_request(json!({ "language": "python", "code": "print(1)" })))
        .await
        .unwrap();

    // Either the interpreter is present and this succeeds, or it's absent
    // and the process runner reports a spawn failure inside a 200 — either
    // way the request itself must be accepted, never rejected as malformed.
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body.get("exitCode").is_some());
    assert!(body.get("durationMs").is_some());
}
