//! Minimal stand-ins for ComfyUI, Ollama, Replicate, Hugging Face and a
//! W3C WebDriver server.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

// ---------------------------------------------------------------------------
// ComfyUI
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ComfyMock {
    pub queued: Mutex<Vec<Value>>,
    pub queue_full: AtomicBool,
    pub never_finish: AtomicBool,
    pub fail_job: AtomicBool,
}

impl ComfyMock {
    /// Positive prompt text of every queued job, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.queued
            .lock()
            .unwrap()
            .iter()
            .map(|body| body["prompt"]["6"]["inputs"]["text"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn jobs(&self) -> usize {
        self.queued.lock().unwrap().len()
    }
}

pub fn comfyui(mock: Arc<ComfyMock>) -> Router {
    Router::new()
        .route("/system_stats", get(comfy_stats))
        .route("/prompt", post(comfy_queue))
        .route("/history/:id", get(comfy_history))
        .with_state(mock)
}

async fn comfy_stats() -> Json<Value> {
    Json(json!({ "system": { "os": "posix", "python_version": "3.11" }, "devices": [] }))
}

async fn comfy_queue(State(mock): State<Arc<ComfyMock>>, Json(body): Json<Value>) -> Response {
    if mock.queue_full.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "queue is full").into_response();
    }
    mock.queued.lock().unwrap().push(body);
    Json(json!({ "prompt_id": "p1", "number": 0, "node_errors": {} })).into_response()
}

async fn comfy_history(State(mock): State<Arc<ComfyMock>>, Path(id): Path<String>) -> Json<Value> {
    if mock.never_finish.load(Ordering::SeqCst) {
        return Json(json!({}));
    }
    if mock.fail_job.load(Ordering::SeqCst) {
        return Json(json!({ id: { "status": { "status_str": "error", "completed": false }, "outputs": {} } }));
    }
    Json(json!({
        id: {
            "status": { "status_str": "success", "completed": true },
            "outputs": {
                "9": { "images": [{ "filename": "t2v_00001_.png", "subfolder": "", "type": "output" }] }
            }
        }
    }))
}

// ---------------------------------------------------------------------------
// Ollama
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct OllamaMock {
    pub requests: Mutex<Vec<Value>>,
    pub reply: Mutex<String>,
    pub delay: Mutex<Option<Duration>>,
}

impl OllamaMock {
    pub fn replying(reply: &str) -> Arc<Self> {
        let mock = OllamaMock::default();
        *mock.reply.lock().unwrap() = reply.to_string();
        Arc::new(mock)
    }
}

pub fn ollama(mock: Arc<OllamaMock>) -> Router {
    Router::new().route("/api/generate", post(ollama_generate)).with_state(mock)
}

async fn ollama_generate(State(mock): State<Arc<OllamaMock>>, Json(body): Json<Value>) -> Json<Value> {
    mock.requests.lock().unwrap().push(body);
    let delay = *mock.delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    let reply = mock.reply.lock().unwrap().clone();
    Json(json!({ "model": "llama3.2", "response": reply, "done": true }))
}

// ---------------------------------------------------------------------------
// Replicate and Hugging Face
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ProviderMock {
    pub hits: AtomicUsize,
    pub polls: AtomicUsize,
    pub auth: Mutex<Vec<String>>,
    pub inputs: Mutex<Vec<Value>>,
    /// When set, predictions start as `processing` and finish on the second poll.
    pub async_base: Mutex<Option<String>>,
}

pub fn replicate(mock: Arc<ProviderMock>) -> Router {
    Router::new()
        .route("/v1/models/:owner/:name/predictions", post(replicate_create))
        .route("/v1/predictions/:id", get(replicate_get))
        .route("/models/:owner/:name", post(huggingface_infer))
        .with_state(mock)
}

fn record_auth(mock: &ProviderMock, headers: &HeaderMap) {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    mock.auth.lock().unwrap().push(auth);
}

async fn replicate_create(
    State(mock): State<Arc<ProviderMock>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    mock.hits.fetch_add(1, Ordering::SeqCst);
    record_auth(&mock, &headers);
    mock.inputs.lock().unwrap().push(body["input"].clone());
    let base = mock.async_base.lock().unwrap().clone();
    match base {
        Some(base) => Json(json!({
            "id": "r1",
            "status": "processing",
            "output": null,
            "urls": { "get": format!("{}/v1/predictions/r1", base) }
        })),
        None => Json(json!({
            "id": "r1",
            "status": "succeeded",
            "output": ["https://replicate.delivery/r1/out-0.png"],
            "urls": { "get": "unused" }
        })),
    }
}

async fn replicate_get(State(mock): State<Arc<ProviderMock>>, Path(id): Path<String>) -> Json<Value> {
    let polls = mock.polls.fetch_add(1, Ordering::SeqCst) + 1;
    if polls < 2 {
        Json(json!({ "id": id, "status": "processing", "output": null }))
    } else {
        Json(json!({ "id": id, "status": "succeeded", "output": "https://replicate.delivery/r1/out.mp4" }))
    }
}

async fn huggingface_infer(
    State(mock): State<Arc<ProviderMock>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    mock.hits.fetch_add(1, Ordering::SeqCst);
    record_auth(&mock, &headers);
    mock.inputs.lock().unwrap().push(body);
    ([(header::CONTENT_TYPE, "image/png")], vec![0x89u8, b'P', b'N', b'G']).into_response()
}

// ---------------------------------------------------------------------------
// WebDriver
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct DriverMock {
    pub sessions_created: AtomicUsize,
    pub sessions_deleted: AtomicUsize,
    /// Number of upcoming `POST /session` calls to fail.
    pub fail_sessions: AtomicUsize,
    /// Fail the next navigation with `invalid session id`.
    pub kill_next_navigate: AtomicBool,
    /// Never show a result element.
    pub no_result: AtomicBool,
    pub clicks: AtomicUsize,
    pub typed: Mutex<Vec<String>>,
}

pub fn webdriver(mock: Arc<DriverMock>) -> Router {
    Router::new()
        .route("/session", post(wd_new_session))
        .route("/session/:sid", delete(wd_delete_session))
        .route("/session/:sid/url", post(wd_navigate))
        .route("/session/:sid/element", post(wd_find_element))
        .route("/session/:sid/elements", post(wd_find_elements))
        .route("/session/:sid/element/:eid/clear", post(wd_ok))
        .route("/session/:sid/element/:eid/value", post(wd_send_keys))
        .route("/session/:sid/element/:eid/click", post(wd_click))
        .route("/session/:sid/element/:eid/attribute/:name", get(wd_attribute))
        .with_state(mock)
}

fn wd_error(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({ "value": { "error": error, "message": error, "stacktrace": "" } }))).into_response()
}

async fn wd_new_session(State(mock): State<Arc<DriverMock>>) -> Response {
    let pending_failures = mock.fail_sessions.load(Ordering::SeqCst);
    if pending_failures > 0 {
        mock.fail_sessions.store(pending_failures - 1, Ordering::SeqCst);
        return wd_error(StatusCode::INTERNAL_SERVER_ERROR, "session not created");
    }
    let n = mock.sessions_created.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({ "value": { "sessionId": format!("s{}", n), "capabilities": {} } })).into_response()
}

async fn wd_delete_session(State(mock): State<Arc<DriverMock>>) -> Json<Value> {
    mock.sessions_deleted.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "value": null }))
}

async fn wd_navigate(State(mock): State<Arc<DriverMock>>) -> Response {
    if mock.kill_next_navigate.swap(false, Ordering::SeqCst) {
        return wd_error(StatusCode::NOT_FOUND, "invalid session id");
    }
    Json(json!({ "value": null })).into_response()
}

async fn wd_find_element(Json(body): Json<Value>) -> Response {
    let using = body["using"].as_str().unwrap_or_default();
    let value = body["value"].as_str().unwrap_or_default();
    if using == "css selector" && value == "textarea" {
        return Json(json!({ "value": { ELEMENT_KEY: "input-1" } })).into_response();
    }
    if using == "xpath" && value.contains("Generate") {
        return Json(json!({ "value": { ELEMENT_KEY: "button-1" } })).into_response();
    }
    wd_error(StatusCode::NOT_FOUND, "no such element")
}

async fn wd_find_elements(State(mock): State<Arc<DriverMock>>) -> Json<Value> {
    if mock.no_result.load(Ordering::SeqCst) || mock.clicks.load(Ordering::SeqCst) == 0 {
        return Json(json!({ "value": [] }));
    }
    Json(json!({ "value": [{ ELEMENT_KEY: "img-1" }] }))
}

async fn wd_ok() -> Json<Value> {
    Json(json!({ "value": null }))
}

async fn wd_send_keys(State(mock): State<Arc<DriverMock>>, Json(body): Json<Value>) -> Json<Value> {
    mock.typed.lock().unwrap().push(body["text"].as_str().unwrap_or_default().to_string());
    Json(json!({ "value": null }))
}

async fn wd_click(State(mock): State<Arc<DriverMock>>) -> Json<Value> {
    mock.clicks.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "value": null }))
}

async fn wd_attribute(State(mock): State<Arc<DriverMock>>) -> Json<Value> {
    let n = mock.clicks.load(Ordering::SeqCst);
    Json(json!({ "value": format!("blob:https://lmarena.ai/generated-{}", n) }))
}
