//! ComfyUI generator: submit a job graph, then poll history until it finishes.
use std::time::Duration;

use uuid::Uuid;

use crate::comfyui::client::{ComfyUIClient, JobStatus};
use crate::comfyui::workflow::{self, GraphSettings};
use crate::error::BackendFailure;
use crate::generation::poll::{PollPolicy, PollStatus};
use crate::generation::types::{Artifact, ArtifactData, GenerationParams, GeneratorKind, MediaKind};

const GENERATOR: GeneratorKind = GeneratorKind::ComfyUI;

#[derive(Debug, Clone)]
pub struct ComfyUISettings {
    pub timeout: Duration,
    pub preflight_timeout: Duration,
    pub poll: PollPolicy,
    pub graph: GraphSettings,
    pub image_workflow: Option<String>,
    pub video_workflow: Option<String>,
}

#[derive(Clone)]
pub struct ComfyUIAdapter {
    client: ComfyUIClient,
    settings: ComfyUISettings,
}

impl ComfyUIAdapter {
    pub fn new(client: ComfyUIClient, settings: ComfyUISettings) -> Self {
        ComfyUIAdapter { client, settings }
    }

    pub fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    pub async fn submit(
        &self,
        prompt: &str,
        kind: MediaKind,
        params: GenerationParams,
    ) -> Result<Artifact, BackendFailure> {
        self.client.system_stats(self.settings.preflight_timeout).await?;

        let graph = self.job_graph(prompt, kind, params).await?;
        let client_id = Uuid::new_v4().to_string();
        let prompt_id = self.client.queue_prompt(&graph, &client_id).await?;

        let client = &self.client;
        let id = prompt_id.as_str();
        let polled = self
            .settings
            .poll
            .run(|attempt| async move {
                tracing::debug!(prompt_id = id, attempt, "Polling ComfyUI history");
                match client.job_status(id).await? {
                    JobStatus::Pending => Ok::<_, BackendFailure>(PollStatus::Pending),
                    JobStatus::Done(files) => Ok(PollStatus::Ready(files)),
                    JobStatus::Failed(msg) => Err(BackendFailure::rejected(GENERATOR, msg)),
                }
            })
            .await?;

        let files = polled.map_err(|exhausted| {
            BackendFailure::timeout(
                GENERATOR,
                format!("job {} not finished after {} polls", prompt_id, exhausted.attempts),
            )
        })?;

        let file = files
            .first()
            .ok_or_else(|| BackendFailure::invalid_response(GENERATOR, format!("job {} finished without outputs", prompt_id)))?;
        let url = self.client.view_url(file)?;
        tracing::info!("ComfyUI job {} produced {}", prompt_id, file.filename);

        Ok(Artifact { kind, data: ArtifactData::Url(url), source_generator: GENERATOR })
    }

    async fn job_graph(
        &self,
        prompt: &str,
        kind: MediaKind,
        params: GenerationParams,
    ) -> Result<serde_json::Value, BackendFailure> {
        let template = match kind {
            MediaKind::Image => self.settings.image_workflow.as_deref(),
            MediaKind::Video => self.settings.video_workflow.as_deref(),
        };
        let base = match template {
            Some(path) => workflow::load_template(path)
                .await
                .map_err(|e| BackendFailure::rejected(GENERATOR, format!("workflow {}: {}", path, e)))?,
            None => workflow::default_graph(kind, &self.settings.graph),
        };
        let seed = Uuid::new_v4().as_u64_pair().0 >> 11;
        workflow::prepare_graph(base, kind, prompt, params, &self.settings.graph, seed)
            .map_err(|e| BackendFailure::rejected(GENERATOR, e.to_string()))
    }
}
