//! Thin HTTP client for ComfyUI endpoints.
//!
//! - `system_stats` probes `/system_stats` to check the server is up.
//! - `queue_prompt` posts a job graph to `/prompt` and returns its `prompt_id`.
//! - `job_status` reads `/history/{prompt_id}` and reduces it to a `JobStatus`.
//! - `view_url` builds the `/view?...` reference for an output file.
use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BackendFailure;
use crate::generation::types::GeneratorKind;

const GENERATOR: GeneratorKind = GeneratorKind::ComfyUI;

#[derive(Debug, Serialize)]
struct QueuePromptRequest<'a> {
    prompt: &'a Value,
    client_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueuePromptResponse {
    prompt_id: String,
    #[serde(default)]
    node_errors: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub outputs: HashMap<String, OutputNode>,
    pub status: Option<StatusInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputNode {
    #[serde(default)]
    pub images: Vec<OutputFile>,
    #[serde(default)]
    pub gifs: Vec<OutputFile>,
    #[serde(default)]
    pub videos: Vec<OutputFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputFile {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_output_type")]
    pub file_type: String,
}

fn default_output_type() -> String {
    "output".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusInfo {
    pub status_str: Option<String>,
    pub completed: Option<bool>,
}

/// Where a queued job stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Not in history yet: queued or running.
    Pending,
    Done(Vec<OutputFile>),
    Failed(String),
}

impl HistoryEntry {
    pub fn to_status(&self) -> JobStatus {
        let status_str = self.status.as_ref().and_then(|s| s.status_str.as_deref());
        if status_str == Some("error") {
            return JobStatus::Failed("ComfyUI reported an execution error".to_string());
        }
        let completed = self.status.as_ref().and_then(|s| s.completed).unwrap_or(!self.outputs.is_empty());
        if !completed {
            return JobStatus::Pending;
        }
        let mut node_ids: Vec<&String> = self.outputs.keys().collect();
        node_ids.sort();
        let files = node_ids
            .into_iter()
            .flat_map(|id| {
                let node = &self.outputs[id];
                node.images.iter().chain(node.gifs.iter()).chain(node.videos.iter()).cloned()
            })
            .filter(|f| f.file_type != "temp")
            .collect();
        JobStatus::Done(files)
    }
}

#[derive(Clone)]
pub struct ComfyUIClient {
    client: Client,
    base_url: String,
}

impl ComfyUIClient {
    pub fn new(base_url: String) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        ComfyUIClient { client: Client::new(), base_url: base }
    }

    /// Quick liveness probe.
    pub async fn system_stats(&self, timeout: Duration) -> Result<Value, BackendFailure> {
        let url = format!("{}/system_stats", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| BackendFailure::unreachable(GENERATOR, format!("ComfyUI not available: {}", e)))?;
        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| BackendFailure::from_transport(GENERATOR, "system_stats", &e))
        } else {
            Err(BackendFailure::unreachable(
                GENERATOR,
                format!("ComfyUI not available: status {}", response.status()),
            ))
        }
    }

    /// Queue a job graph with ComfyUI.
    ///
    /// A full queue (429/503) comes back as `Rejected` so callers can move on
    /// without waiting out a timeout.
    pub async fn queue_prompt(&self, graph: &Value, client_id: &str) -> Result<String, BackendFailure> {
        let url = format!("{}/prompt", self.base_url);
        tracing::info!("Sending prompt to ComfyUI at URL: {}", url);
        tracing::debug!("Prompt payload: {}", graph);

        let response = self
            .client
            .post(&url)
            .json(&QueuePromptRequest { prompt: graph, client_id })
            .send()
            .await
            .map_err(|e| BackendFailure::from_transport(GENERATOR, "queue prompt", &e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_else(|_| "Unable to read error body".to_string());
            tracing::error!("Failed to queue prompt. Status: {}, Body: {}", status, error_body);
            let mut failure = BackendFailure::from_status(GENERATOR, status, &error_body);
            if matches!(status, StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE) {
                failure.message = format!("job queue full: {}", failure.message);
            }
            return Err(failure);
        }

        let parsed: QueuePromptResponse = response
            .json()
            .await
            .map_err(|e| BackendFailure::invalid_response(GENERATOR, format!("queue response: {}", e)))?;
        if parsed.node_errors.as_object().is_some_and(|errs| !errs.is_empty()) {
            return Err(BackendFailure::rejected(GENERATOR, format!("node errors: {}", parsed.node_errors)));
        }
        tracing::info!("Successfully queued prompt {}", parsed.prompt_id);
        Ok(parsed.prompt_id)
    }

    /// Look up a job in `/history/{prompt_id}`.
    pub async fn job_status(&self, prompt_id: &str) -> Result<JobStatus, BackendFailure> {
        let url = format!("{}/history/{}", self.base_url, prompt_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BackendFailure::from_transport(GENERATOR, "history", &e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendFailure::from_status(GENERATOR, status, &body));
        }

        let history: HashMap<String, HistoryEntry> = response
            .json()
            .await
            .map_err(|e| BackendFailure::invalid_response(GENERATOR, format!("history response: {}", e)))?;

        Ok(history.get(prompt_id).map(HistoryEntry::to_status).unwrap_or(JobStatus::Pending))
    }

    /// Reference to an output file via ComfyUI's `/view` endpoint.
    pub fn view_url(&self, file: &OutputFile) -> Result<String, BackendFailure> {
        let params = [
            ("filename", file.filename.as_str()),
            ("subfolder", file.subfolder.as_str()),
            ("type", file.file_type.as_str()),
        ];
        reqwest::Url::parse_with_params(&format!("{}/view", self.base_url), &params)
            .map(|u| u.to_string())
            .map_err(|e| BackendFailure::rejected(GENERATOR, format!("invalid ComfyUI URL: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(v: Value) -> HistoryEntry {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn completed_history_yields_output_files() {
        let e = entry(json!({
            "status": { "status_str": "success", "completed": true },
            "outputs": {
                "9": { "images": [{ "filename": "t2v_00001_.png", "subfolder": "", "type": "output" }] },
                "12": { "images": [{ "filename": "preview.png", "subfolder": "", "type": "temp" }] }
            }
        }));
        assert_eq!(
            e.to_status(),
            JobStatus::Done(vec![OutputFile {
                filename: "t2v_00001_.png".into(),
                subfolder: "".into(),
                file_type: "output".into()
            }])
        );
    }

    #[test]
    fn error_status_is_failed_and_incomplete_is_pending() {
        let failed = entry(json!({ "status": { "status_str": "error", "completed": false }, "outputs": {} }));
        assert!(matches!(failed.to_status(), JobStatus::Failed(_)));
        let running = entry(json!({ "status": { "status_str": "running", "completed": false }, "outputs": {} }));
        assert_eq!(running.to_status(), JobStatus::Pending);
    }

    #[test]
    fn view_url_escapes_query_values() {
        let client = ComfyUIClient::new("http://localhost:8188/".into());
        let file = OutputFile { filename: "a b.png".into(), subfolder: "x/y".into(), file_type: "output".into() };
        assert_eq!(
            client.view_url(&file).unwrap(),
            "http://localhost:8188/view?filename=a+b.png&subfolder=x%2Fy&type=output"
        );
    }
}
