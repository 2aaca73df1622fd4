mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use base64::Engine;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use common::*;
use design_pipeline::routes::{router, AppState};
use design_pipeline::variants::VariantRunner;

fn app(reasoning: FakeReasoning, synthesis: FakeSynthesis) -> axum::Router {
    let orchestrator = Arc::new(orchestrator(Arc::new(reasoning), Arc::new(synthesis)));
    router(AppState {
        variants: Arc::new(VariantRunner::new(orchestrator.clone(), 2)),
        orchestrator,
    })
}

fn quiet_app() -> axum::Router {
    app(FakeReasoning::failing(), FakeSynthesis::default())
}

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn design_body(angles: &[&str]) -> Value {
    json!({
        "angles": angles,
        "parameters": {
            "theme": "Spring",
            "style": "Minimal",
            "color": "Pastel",
            "material": "Canvas"
        },
        "templates": [{ "angle": "top", "data": b64(&png("top-template")) }]
    })
}

async fn post(app: axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn generates_every_requested_angle() {
    let (status, body) = post(quiet_app(), "/api/designs", design_body(&["top", "45degree"])).await;

    assert_eq!(status, StatusCode::OK);
    let images = body["images"].as_array().unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0]["angle"], "top");
    assert_eq!(images[1]["angle"], "45degree");
    assert_eq!(images[0]["data"], b64(b"generated-1"));
    assert_eq!(body["canonical_prompt"]["kind"], "fallback");
}

#[tokio::test]
async fn missing_templates_are_a_bad_request() {
    let mut body = design_body(&["top"]);
    body["templates"] = json!([]);
    let (status, body) = post(quiet_app(), "/api/designs", body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["class"], "client");
    assert_eq!(body["stage"], "resolving_angles");
}

#[tokio::test]
async fn non_image_upload_is_rejected() {
    let mut body = design_body(&["top"]);
    body["templates"] = json!([{ "angle": "top", "data": b64(b"plain text") }]);
    let (status, body) = post(quiet_app(), "/api/designs", body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("template for 'top'"));
}

#[tokio::test]
async fn angle_failure_reports_position_and_progress() {
    let (status, body) = post(
        app(FakeReasoning::failing(), FakeSynthesis::failing_on(2)),
        "/api/designs",
        design_body(&["top", "side", "bottom"]),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["class"], "server");
    assert_eq!(body["stage"], "generating_remaining_angles");
    assert_eq!(body["angle_index"], 2);
    assert_eq!(body["angle"], "side");
    assert_eq!(body["completed_angles"], json!(["top"]));
}

#[tokio::test]
async fn variants_return_one_entry_per_run() {
    let mut body = design_body(&["top", "side"]);
    body["count"] = json!(3);
    let (status, body) = post(quiet_app(), "/api/designs/variants", body).await;

    assert_eq!(status, StatusCode::OK);
    let variants = body["variants"].as_array().unwrap();
    let indices: Vec<u64> = variants.iter().map(|v| v["index"].as_u64().unwrap()).collect();
    assert_eq!(indices, vec![1, 2, 3]);
    assert!(variants.iter().all(|v| v["design"]["images"].as_array().map(Vec::len) == Some(2)));
}
