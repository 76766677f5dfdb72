//! HTTP surface: routing, request validation and the failure-to-status mapping.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::Router;
use serde_json::json;
use tower::ServiceExt;

use text2video_backend::api::{router, AppState};
use text2video_backend::generation::GeneratorBackend;
use text2video_backend::usage::UsageCounters;

use common::mocks::{self, ComfyMock};
use common::{body_json, get_request, post_json};

fn app(backends: Vec<GeneratorBackend>, usage: UsageCounters) -> Router {
    let orchestrator = common::orchestrator(Some(common::enhancer(&common::dead_url())), backends, usage);
    router(AppState::new(orchestrator))
}

fn working_comfy() -> GeneratorBackend {
    let url = common::spawn(mocks::comfyui(Arc::new(ComfyMock::default())));
    common::comfy_backend(&url)
}

#[tokio::test]
async fn root_reports_running() {
    let response = app(Vec::new(), UsageCounters::in_memory().unwrap()).oneshot(get_request("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "running");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn health_lists_generators_and_session_state() {
    let app = app(vec![working_comfy()], UsageCounters::in_memory().unwrap());
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["generators"], json!(["comfyui"]));
    assert!(body["browser_session"].is_null());
    assert!(body["external_provider"].is_null());
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn health_names_the_external_provider() {
    let app = app(vec![common::external_backend(&common::dead_url(), None)], UsageCounters::in_memory().unwrap());
    let body = body_json(app.oneshot(get_request("/health")).await.unwrap()).await;

    assert_eq!(body["generators"], json!(["external"]));
    assert_eq!(body["external_provider"], "replicate");
}

#[tokio::test]
async fn generate_image_returns_the_tagged_artifact() {
    let app = app(vec![working_comfy()], UsageCounters::in_memory().unwrap());
    let response = app
        .oneshot(post_json("/generate-image", json!({ "text": "a cat in space" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "generated");
    assert_eq!(body["type"], "image");
    assert_eq!(body["source_generator"], "comfyui");
    assert_eq!(body["prompt"]["original"], "a cat in space");
    assert_eq!(body["prompt"]["was_enhanced"], false);
    assert!(body["artifact"]["url"].as_str().unwrap().contains("/view?"));
    assert_eq!(body["failed_attempts"], json!([]));
}

#[tokio::test]
async fn generate_video_echoes_duration() {
    let app = app(vec![working_comfy()], UsageCounters::in_memory().unwrap());
    let response = app
        .oneshot(post_json("/generate-video", json!({ "prompt": "ocean waves", "duration": 3, "enhance": false })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["type"], "video");
    assert_eq!(body["duration"], 3);
}

#[tokio::test]
async fn generate_video_reports_the_default_duration() {
    let app = app(vec![working_comfy()], UsageCounters::in_memory().unwrap());
    let response = app
        .oneshot(post_json("/generate-video", json!({ "prompt": "ocean waves", "enhance": false })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["duration"], 5);
}

#[tokio::test]
async fn oversized_duration_is_a_bad_request() {
    let comfy = Arc::new(ComfyMock::default());
    let url = common::spawn(mocks::comfyui(comfy.clone()));
    let app = app(vec![common::comfy_backend(&url)], UsageCounters::in_memory().unwrap());

    let response = app
        .oneshot(post_json("/generate-video", json!({ "prompt": "waves", "duration": u32::MAX, "enhance": false })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].as_str().unwrap().contains("at most"));
    assert_eq!(comfy.jobs(), 0);
}

#[tokio::test]
async fn blank_text_is_a_bad_request() {
    let app = app(vec![working_comfy()], UsageCounters::in_memory().unwrap());
    let response = app.oneshot(post_json("/generate-image", json!({ "text": "   " }))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn unknown_generator_is_a_bad_request() {
    let app = app(vec![working_comfy()], UsageCounters::in_memory().unwrap());
    let response = app
        .oneshot(post_json("/generate-image", json!({ "text": "a fox", "generator": "dalle" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn zero_duration_is_a_bad_request() {
    let app = app(vec![working_comfy()], UsageCounters::in_memory().unwrap());
    let response = app
        .oneshot(post_json("/generate-video", json!({ "prompt": "waves", "duration": 0 })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn every_refused_request_is_counted() {
    let usage = UsageCounters::in_memory().unwrap();
    let app = app(vec![working_comfy()], usage.clone());

    let refused = [
        post_json("/generate-video", json!({ "prompt": "waves", "duration": 0 })),
        post_json("/generate-image", json!({ "text": "a fox", "generator": "dalle" })),
        post_json("/generate-image", json!({ "text": "   " })),
    ];
    for request in refused {
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let body = body_json(app.oneshot(get_request("/stats")).await.unwrap()).await;
    assert_eq!(body["endpoint_stats"]["video_generations"]["count"], 1);
    assert_eq!(body["endpoint_stats"]["image_generations"]["count"], 2);
    assert_eq!(body["endpoint_stats"]["failed_generations"]["count"], 3);
}

#[tokio::test]
async fn pinned_rejection_maps_to_422() {
    let backends = vec![working_comfy(), common::external_backend(&common::dead_url(), None)];
    let app = app(backends, UsageCounters::in_memory().unwrap());
    let response = app
        .oneshot(post_json("/generate-video", json!({ "prompt": "waves", "generator": "external" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "rejected");
    assert_eq!(body["attempts"][0]["generator"], "external");
}

#[tokio::test]
async fn all_unreachable_maps_to_503() {
    let app = app(vec![common::comfy_backend(&common::dead_url())], UsageCounters::in_memory().unwrap());
    let response = app.oneshot(post_json("/generate-image", json!({ "text": "a fox" }))).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "unreachable");
    assert_eq!(body["attempts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn mixed_failures_map_to_502() {
    let backends = vec![common::comfy_backend(&common::dead_url()), common::external_backend(&common::dead_url(), None)];
    let app = app(backends, UsageCounters::in_memory().unwrap());
    let response = app.oneshot(post_json("/generate-image", json!({ "text": "a fox" }))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert!(body["kind"].is_null());
    assert_eq!(body["attempts"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn enhance_prompt_falls_back_when_model_is_down() {
    let app = app(Vec::new(), UsageCounters::in_memory().unwrap());
    let response = app
        .oneshot(post_json("/enhance-prompt", json!({ "text": "a red fox" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["original"], "a red fox");
    assert_eq!(body["enhanced"], "a red fox");
    assert_eq!(body["was_enhanced"], false);
}

#[tokio::test]
async fn stats_reflect_requests() {
    let usage = UsageCounters::in_memory().unwrap();
    let app = app(vec![working_comfy()], usage.clone());

    let response = app
        .clone()
        .oneshot(post_json("/generate-image", json!({ "text": "a fox" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get_request("/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["endpoint_stats"]["image_generations"]["count"], 1);
    assert_eq!(body["endpoint_stats"]["backend:comfyui"]["count"], 1);
    assert_eq!(body["today"]["total_requests"], 1);
    assert_eq!(body["total_all_time"], 1);
}
