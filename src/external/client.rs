//! Hosted generation APIs (Replicate, Hugging Face Inference).
//!
//! Both need a bearer token. A provider without a token is never contacted:
//! the submit fails as `Rejected` so the fallback chain moves on.
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, BackendFailure};
use crate::generation::poll::{PollPolicy, PollStatus};
use crate::generation::types::{Artifact, ArtifactData, GenerationParams, GeneratorKind, MediaKind};

const GENERATOR: GeneratorKind = GeneratorKind::External;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalProvider {
    Replicate,
    HuggingFace,
}

impl fmt::Display for ExternalProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalProvider::Replicate => f.write_str("replicate"),
            ExternalProvider::HuggingFace => f.write_str("huggingface"),
        }
    }
}

impl FromStr for ExternalProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replicate" => Ok(ExternalProvider::Replicate),
            "huggingface" | "hf" => Ok(ExternalProvider::HuggingFace),
            other => Err(AppError::Config(format!("Unknown external provider '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub token: Option<String>,
    pub image_model: String,
    pub video_model: Option<String>,
}

impl ProviderEndpoint {
    fn model_for(&self, kind: MediaKind) -> Option<&str> {
        match kind {
            MediaKind::Image => Some(self.image_model.as_str()),
            MediaKind::Video => self.video_model.as_deref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExternalApiSettings {
    pub provider: ExternalProvider,
    pub timeout: Duration,
    pub poll: PollPolicy,
    pub replicate: ProviderEndpoint,
    pub huggingface: ProviderEndpoint,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    output: Option<Value>,
    error: Option<Value>,
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: Option<String>,
}

#[derive(Clone)]
pub struct ExternalApiAdapter {
    client: Client,
    settings: ExternalApiSettings,
}

impl ExternalApiAdapter {
    pub fn new(settings: ExternalApiSettings) -> Self {
        ExternalApiAdapter { client: Client::new(), settings }
    }

    pub fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    pub fn provider(&self) -> ExternalProvider {
        self.settings.provider
    }

    /// Whether the selected provider has credentials.
    pub fn has_token(&self) -> bool {
        self.endpoint().token.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    fn endpoint(&self) -> &ProviderEndpoint {
        match self.settings.provider {
            ExternalProvider::Replicate => &self.settings.replicate,
            ExternalProvider::HuggingFace => &self.settings.huggingface,
        }
    }

    pub async fn submit(
        &self,
        prompt: &str,
        kind: MediaKind,
        params: GenerationParams,
    ) -> Result<Artifact, BackendFailure> {
        let provider = self.settings.provider;
        let endpoint = self.endpoint();
        let token = endpoint
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BackendFailure::rejected(GENERATOR, format!("no API token configured for {}", provider)))?;
        let model = endpoint
            .model_for(kind)
            .ok_or_else(|| BackendFailure::rejected(GENERATOR, format!("no {} model configured for {}", kind, provider)))?;

        tracing::info!("Submitting {} generation to {} model {}", kind, provider, model);
        let data = match provider {
            ExternalProvider::Replicate => self.replicate(endpoint, token, model, prompt, kind, params).await?,
            ExternalProvider::HuggingFace => self.huggingface(endpoint, token, model, prompt).await?,
        };
        Ok(Artifact { kind, data, source_generator: GENERATOR })
    }

    async fn replicate(
        &self,
        endpoint: &ProviderEndpoint,
        token: &str,
        model: &str,
        prompt: &str,
        kind: MediaKind,
        params: GenerationParams,
    ) -> Result<ArtifactData, BackendFailure> {
        let url = format!("{}/v1/models/{}/predictions", endpoint.base_url.trim_end_matches('/'), model);
        let mut input = json!({ "prompt": prompt });
        if let (MediaKind::Video, Some(seconds)) = (kind, params.duration_seconds) {
            input["duration"] = Value::from(seconds);
        }
        let request = self
            .client
            .post(&url)
            .header("Prefer", "wait")
            .json(&json!({ "input": input }));
        let prediction = self.prediction(request, token).await?;

        let status = prediction_status(&prediction)?;
        let prediction = match status {
            PollStatus::Ready(_) => prediction,
            PollStatus::Pending => {
                let get_url = prediction
                    .urls
                    .as_ref()
                    .and_then(|u| u.get.clone())
                    .ok_or_else(|| BackendFailure::invalid_response(GENERATOR, "prediction has no status URL"))?;
                let get_url = get_url.as_str();
                let polled = self
                    .settings
                    .poll
                    .run(|_| async move {
                        let p = self.prediction(self.client.get(get_url), token).await?;
                        Ok::<_, BackendFailure>(match prediction_status(&p)? {
                            PollStatus::Ready(_) => PollStatus::Ready(p),
                            PollStatus::Pending => PollStatus::Pending,
                        })
                    })
                    .await?;
                polled.map_err(|e| {
                    BackendFailure::timeout(
                        GENERATOR,
                        format!("prediction {} not finished after {} polls", prediction.id, e.attempts),
                    )
                })?
            }
        };

        prediction
            .output
            .as_ref()
            .and_then(first_url)
            .map(ArtifactData::Url)
            .ok_or_else(|| BackendFailure::invalid_response(GENERATOR, format!("prediction {} has no output URL", prediction.id)))
    }

    async fn prediction(&self, request: RequestBuilder, token: &str) -> Result<Prediction, BackendFailure> {
        let response = request
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| BackendFailure::from_transport(GENERATOR, "replicate", &e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendFailure::from_status(GENERATOR, status, &body));
        }
        response
            .json()
            .await
            .map_err(|e| BackendFailure::invalid_response(GENERATOR, format!("prediction response: {}", e)))
    }

    async fn huggingface(
        &self,
        endpoint: &ProviderEndpoint,
        token: &str,
        model: &str,
        prompt: &str,
    ) -> Result<ArtifactData, BackendFailure> {
        let url = format!("{}/models/{}", endpoint.base_url.trim_end_matches('/'), model);
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .json(&json!({ "inputs": prompt }))
            .send()
            .await
            .map_err(|e| BackendFailure::from_transport(GENERATOR, "huggingface", &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendFailure::from_status(GENERATOR, status, &body));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !(content_type.starts_with("image/") || content_type.starts_with("video/")) {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendFailure::invalid_response(
                GENERATOR,
                format!("expected media, got '{}': {}", content_type, body.trim()),
            ));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendFailure::from_transport(GENERATOR, "huggingface body", &e))?;
        Ok(ArtifactData::Bytes { content_type, bytes: bytes.to_vec() })
    }
}

fn prediction_status(p: &Prediction) -> Result<PollStatus<()>, BackendFailure> {
    match p.status.as_str() {
        "succeeded" => Ok(PollStatus::Ready(())),
        "failed" | "canceled" => {
            let reason = p.error.as_ref().map(Value::to_string).unwrap_or_else(|| p.status.clone());
            Err(BackendFailure::rejected(GENERATOR, format!("prediction {} {}: {}", p.id, p.status, reason)))
        }
        _ => Ok(PollStatus::Pending),
    }
}

fn first_url(output: &Value) -> Option<String> {
    match output {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_url),
        Value::Object(map) => map.get("url").and_then(first_url),
        _ => None,
    }
}
