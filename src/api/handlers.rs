//! Axum request handlers for the HTTP API.
use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::routes::AppState;
use crate::error::AppResult;
use crate::generation::{GenerationOutcome, GenerationRequest, GeneratorKind, MediaKind};
use crate::usage::UsageStats;

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct EnhanceBody {
    pub text: String,
    #[serde(default = "default_true")]
    pub enhance: bool,
}

#[derive(Debug, Deserialize)]
pub struct ImageBody {
    pub text: String,
    #[serde(default = "default_true")]
    pub enhance: bool,
    pub generator: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VideoBody {
    pub prompt: String,
    pub duration: Option<u32>,
    #[serde(default = "default_true")]
    pub enhance: bool,
    pub generator: Option<String>,
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Text2Video generation backend",
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let orchestrator = &state.orchestrator;
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "enhancer_enabled": orchestrator.enhancer_enabled(),
        "generators": orchestrator.fallback_chain(),
        "browser_session": orchestrator.browser_session_state(),
        "external_provider": orchestrator.external_provider().map(|p| p.to_string()),
    }))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> AppResult<Json<UsageStats>> {
    Ok(Json(state.orchestrator.usage().stats()?))
}

pub async fn enhance_prompt(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EnhanceBody>,
) -> AppResult<Json<Value>> {
    let prompt = state.orchestrator.enhance_only(&body.text, body.enhance).await?;
    Ok(Json(json!({
        "original": prompt.original_text,
        "enhanced": prompt.enhanced_text,
        "was_enhanced": prompt.was_enhanced,
        "timestamp": Utc::now(),
    })))
}

pub async fn generate_image(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ImageBody>,
) -> AppResult<Json<Value>> {
    let mut request = GenerationRequest::image(body.text).with_enhance(body.enhance);
    if let Some(generator) = parse_generator(&state, MediaKind::Image, body.generator.as_deref())? {
        request = request.pinned_to(generator);
    }
    let outcome = state.orchestrator.generate(request).await?;
    Ok(Json(outcome_body(&outcome)))
}

pub async fn generate_video(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VideoBody>,
) -> AppResult<Json<Value>> {
    let mut request = GenerationRequest::video(body.prompt, body.duration).with_enhance(body.enhance);
    if let Some(generator) = parse_generator(&state, MediaKind::Video, body.generator.as_deref())? {
        request = request.pinned_to(generator);
    }
    let outcome = state.orchestrator.generate(request).await?;
    Ok(Json(outcome_body(&outcome)))
}

fn parse_generator(state: &AppState, kind: MediaKind, raw: Option<&str>) -> AppResult<Option<GeneratorKind>> {
    let parsed = raw.map(str::trim).filter(|s| !s.is_empty()).map(str::parse).transpose();
    if parsed.is_err() {
        state.orchestrator.record_invalid(kind);
    }
    parsed
}

fn outcome_body(outcome: &GenerationOutcome) -> Value {
    let mut body = json!({
        "status": "generated",
        "type": outcome.artifact.kind,
        "prompt": outcome.prompt,
        "source_generator": outcome.artifact.source_generator,
        "artifact": outcome.artifact.data,
        "failed_attempts": outcome.failed_attempts,
        "timestamp": Utc::now(),
    });
    if let Some(seconds) = outcome.params.duration_seconds {
        body["duration"] = json!(seconds);
    }
    body
}
