//! The closed set of generator backends.
use std::time::Duration;

use crate::comfyui::ComfyUIAdapter;
use crate::error::BackendFailure;
use crate::external::ExternalApiAdapter;
use crate::generation::types::{Artifact, GenerationParams, GeneratorKind, MediaKind};
use crate::web::WebAutomationAdapter;

#[derive(Clone)]
pub enum GeneratorBackend {
    ComfyUI(ComfyUIAdapter),
    WebAutomation(WebAutomationAdapter),
    External(ExternalApiAdapter),
}

impl GeneratorBackend {
    pub fn kind(&self) -> GeneratorKind {
        match self {
            GeneratorBackend::ComfyUI(_) => GeneratorKind::ComfyUI,
            GeneratorBackend::WebAutomation(_) => GeneratorKind::Web,
            GeneratorBackend::External(_) => GeneratorKind::External,
        }
    }

    /// Upper bound for one `submit`, enforced by the orchestrator.
    pub fn timeout(&self) -> Duration {
        match self {
            GeneratorBackend::ComfyUI(a) => a.timeout(),
            GeneratorBackend::WebAutomation(a) => a.timeout(),
            GeneratorBackend::External(a) => a.timeout(),
        }
    }

    pub async fn submit(
        &self,
        prompt: &str,
        kind: MediaKind,
        params: GenerationParams,
    ) -> Result<Artifact, BackendFailure> {
        match self {
            GeneratorBackend::ComfyUI(a) => a.submit(prompt, kind, params).await,
            GeneratorBackend::WebAutomation(a) => a.submit(prompt, kind, params).await,
            GeneratorBackend::External(a) => a.submit(prompt, kind, params).await,
        }
    }
}
