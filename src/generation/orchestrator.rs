//! Generation orchestration: optional prompt enhancement, then a walk over the
//! configured generators until one produces an artifact.
use std::time::Duration;

use crate::enhancer::EnhancerClient;
use crate::error::{AggregatedFailure, BackendFailure, GenerationError};
use crate::external::ExternalProvider;
use crate::generation::backend::GeneratorBackend;
use crate::generation::types::{
    Artifact, EnhancedPrompt, GenerationOutcome, GenerationParams, GenerationRequest, GeneratorKind, MediaKind,
};
use crate::usage::{UsageCategory, UsageCounters};
use crate::web::SessionState;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Fallback order. Kinds without a configured backend are skipped.
    pub priority: Vec<GeneratorKind>,
    pub enhance_timeout: Duration,
    pub default_video_duration: u32,
    /// Longest clip a request may ask for, in seconds.
    pub max_video_duration: u32,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        OrchestratorSettings {
            priority: GeneratorKind::ALL.to_vec(),
            enhance_timeout: Duration::from_secs(30),
            default_video_duration: 5,
            max_video_duration: 60,
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    enhancer: Option<EnhancerClient>,
    backends: Vec<GeneratorBackend>,
    usage: UsageCounters,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        enhancer: Option<EnhancerClient>,
        backends: Vec<GeneratorBackend>,
        usage: UsageCounters,
        settings: OrchestratorSettings,
    ) -> Self {
        Orchestrator { enhancer, backends, usage, settings }
    }

    pub fn usage(&self) -> &UsageCounters {
        &self.usage
    }

    pub fn backend(&self, kind: GeneratorKind) -> Option<&GeneratorBackend> {
        self.backends.iter().find(|b| b.kind() == kind)
    }

    /// Configured generators in fallback order.
    pub fn fallback_chain(&self) -> Vec<GeneratorKind> {
        self.settings.priority.iter().copied().filter(|k| self.backend(*k).is_some()).collect()
    }

    pub fn enhancer_enabled(&self) -> bool {
        self.enhancer.is_some()
    }

    /// State of the shared browser session, if the web generator is configured.
    pub fn browser_session_state(&self) -> Option<SessionState> {
        self.backends.iter().find_map(|b| match b {
            GeneratorBackend::WebAutomation(web) => Some(web.sessions().state()),
            _ => None,
        })
    }

    /// Hosted API the external generator talks to, if it is configured.
    pub fn external_provider(&self) -> Option<ExternalProvider> {
        self.backends.iter().find_map(|b| match b {
            GeneratorBackend::External(external) => Some(external.provider()),
            _ => None,
        })
    }

    /// Close the browser session, if any.
    pub async fn shutdown(&self) {
        for backend in &self.backends {
            if let GeneratorBackend::WebAutomation(web) = backend {
                web.sessions().shutdown().await;
            }
        }
    }

    /// Rewrite `text` through the language model without generating anything.
    pub async fn enhance_only(&self, text: &str, enhance: bool) -> Result<EnhancedPrompt, GenerationError> {
        self.usage.record(UsageCategory::PromptEnhancements);
        let text = validate_text(text)?;
        Ok(self.prepare_prompt(text, enhance).await)
    }

    /// Count a request that was refused before reaching `generate`.
    pub fn record_invalid(&self, kind: MediaKind) {
        self.usage.record(UsageCategory::for_media(kind));
        self.usage.record(UsageCategory::FailedGenerations);
    }

    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutcome, GenerationError> {
        self.usage.record(UsageCategory::for_media(request.kind));
        let result = self.run(request).await;
        match &result {
            Ok(outcome) => self.usage.record(UsageCategory::Backend(outcome.artifact.source_generator)),
            Err(_) => self.usage.record(UsageCategory::FailedGenerations),
        }
        result
    }

    async fn run(&self, request: GenerationRequest) -> Result<GenerationOutcome, GenerationError> {
        let text = validate_text(&request.raw_text)?;
        self.validate_duration(&request)?;
        let params = self.params_for(&request);
        let prompt = self.prepare_prompt(text, request.enhance).await;

        if let Some(pinned) = request.requested_generator {
            let backend = self.backend(pinned).ok_or_else(|| {
                GenerationError::Backend(BackendFailure::rejected(pinned, "generator is not configured"))
            })?;
            tracing::info!("Generating {} with pinned generator {}", request.kind, pinned);
            let artifact = self
                .attempt(backend, prompt.effective_text(), request.kind, params)
                .await
                .map_err(GenerationError::Backend)?;
            return Ok(GenerationOutcome { artifact, prompt, params, failed_attempts: Vec::new() });
        }

        let mut failures = Vec::new();
        for kind in &self.settings.priority {
            let Some(backend) = self.backend(*kind) else {
                tracing::debug!("Skipping unconfigured generator {}", kind);
                continue;
            };
            match self.attempt(backend, prompt.effective_text(), request.kind, params).await {
                Ok(artifact) => {
                    tracing::info!(
                        "Generated {} with {} after {} failed attempt(s)",
                        request.kind,
                        kind,
                        failures.len()
                    );
                    return Ok(GenerationOutcome { artifact, prompt, params, failed_attempts: failures });
                }
                Err(failure) => {
                    tracing::warn!("Generator {} failed, trying next: {}", kind, failure);
                    failures.push(failure);
                }
            }
        }

        let aggregated = AggregatedFailure { attempts: failures };
        tracing::error!("{}", aggregated);
        Err(GenerationError::Aggregated(aggregated))
    }

    async fn attempt(
        &self,
        backend: &GeneratorBackend,
        prompt: &str,
        kind: MediaKind,
        params: GenerationParams,
    ) -> Result<Artifact, BackendFailure> {
        let limit = backend.timeout();
        match tokio::time::timeout(limit, backend.submit(prompt, kind, params)).await {
            Ok(result) => result,
            Err(_) => Err(BackendFailure::timeout(backend.kind(), format!("no result within {:?}", limit))),
        }
    }

    async fn prepare_prompt(&self, text: &str, enhance: bool) -> EnhancedPrompt {
        if !enhance {
            return EnhancedPrompt::unchanged(text);
        }
        let Some(enhancer) = &self.enhancer else {
            tracing::debug!("Prompt enhancement disabled, using original text");
            return EnhancedPrompt::unchanged(text);
        };
        match enhancer.enhance(text, self.settings.enhance_timeout).await {
            Ok(prompt) => prompt,
            Err(e) => {
                tracing::warn!("{}; continuing with original prompt", e);
                EnhancedPrompt::unchanged(text)
            }
        }
    }

    fn validate_duration(&self, request: &GenerationRequest) -> Result<(), GenerationError> {
        if request.kind != MediaKind::Video {
            return Ok(());
        }
        match request.duration_seconds {
            Some(0) => Err(GenerationError::InvalidRequest("duration must be at least 1 second".to_string())),
            Some(seconds) if seconds > self.settings.max_video_duration => Err(GenerationError::InvalidRequest(
                format!("duration must be at most {} seconds", self.settings.max_video_duration),
            )),
            _ => Ok(()),
        }
    }

    fn params_for(&self, request: &GenerationRequest) -> GenerationParams {
        match request.kind {
            MediaKind::Video => GenerationParams {
                duration_seconds: Some(request.duration_seconds.unwrap_or(self.settings.default_video_duration)),
            },
            MediaKind::Image => {
                if request.duration_seconds.is_some() {
                    tracing::debug!("Ignoring duration on image request");
                }
                GenerationParams::default()
            }
        }
    }
}

fn validate_text(text: &str) -> Result<&str, GenerationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GenerationError::InvalidRequest("text must not be empty".to_string()));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_rejected() {
        assert!(matches!(validate_text("   \n"), Err(GenerationError::InvalidRequest(_))));
        assert_eq!(validate_text("  a fox ").unwrap(), "a fox");
    }

    #[tokio::test]
    async fn empty_chain_reports_no_generator() {
        let usage = UsageCounters::in_memory().unwrap();
        let orchestrator = Orchestrator::new(None, Vec::new(), usage.clone(), OrchestratorSettings::default());

        let err = orchestrator.generate(GenerationRequest::image("a fox")).await.unwrap_err();
        match err {
            GenerationError::Aggregated(agg) => assert!(agg.attempts.is_empty()),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(usage.endpoint_count(UsageCategory::ImageGenerations).unwrap(), 1);
        assert_eq!(usage.endpoint_count(UsageCategory::FailedGenerations).unwrap(), 1);
    }

    #[tokio::test]
    async fn video_duration_defaults_when_missing() {
        let usage = UsageCounters::in_memory().unwrap();
        let orchestrator = Orchestrator::new(None, Vec::new(), usage, OrchestratorSettings::default());
        let params = orchestrator.params_for(&GenerationRequest::video("waves", None));
        assert_eq!(params.duration_seconds, Some(5));
        let params = orchestrator.params_for(&GenerationRequest::image("waves"));
        assert_eq!(params.duration_seconds, None);
    }

    #[tokio::test]
    async fn out_of_range_durations_are_invalid_and_counted() {
        let usage = UsageCounters::in_memory().unwrap();
        let orchestrator = Orchestrator::new(None, Vec::new(), usage.clone(), OrchestratorSettings::default());

        for duration in [0, 61, u32::MAX] {
            let err = orchestrator.generate(GenerationRequest::video("waves", Some(duration))).await.unwrap_err();
            assert!(matches!(err, GenerationError::InvalidRequest(_)), "duration {}", duration);
        }
        assert_eq!(usage.endpoint_count(UsageCategory::VideoGenerations).unwrap(), 3);
        assert_eq!(usage.endpoint_count(UsageCategory::FailedGenerations).unwrap(), 3);
    }
}
