//! Prompt enhancement through a local Ollama server.
//!
//! - `enhance` posts to `/api/generate` and returns the model's rewrite.
//! - Any failure surfaces as `EnhancementUnavailable`; callers fall back to the
//!   original text.
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::EnhancementUnavailable;
use crate::generation::types::EnhancedPrompt;

const SYSTEM_INSTRUCTION: &str = "You rewrite short prompts for AI image and video generation. \
Make the prompt more detailed and visually descriptive while keeping the core concept. \
Reply with the rewritten prompt only.";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    system: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

#[derive(Clone)]
pub struct EnhancerClient {
    client: Client,
    base_url: String,
    model: String,
    max_chars: usize,
}

impl EnhancerClient {
    pub fn new(base_url: String, model: String, max_chars: usize) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        EnhancerClient { client: Client::new(), base_url: base, model, max_chars }
    }

    /// Ask the language model for a richer description of `text`.
    ///
    /// Input longer than the configured maximum is truncated, never dropped.
    pub async fn enhance(&self, text: &str, timeout: Duration) -> Result<EnhancedPrompt, EnhancementUnavailable> {
        let input = truncate_chars(text, self.max_chars);
        if input.len() < text.len() {
            tracing::warn!(
                max_chars = self.max_chars,
                original_chars = text.chars().count(),
                "Prompt too long for enhancement, truncating"
            );
        }

        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt: format!("Original: {}", input),
            system: SYSTEM_INSTRUCTION,
            stream: false,
        };
        tracing::debug!("Enhancing prompt via {} with model {}", url, self.model);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| unavailable(format!("request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable(format!("status {}: {}", status, body.trim())));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| unavailable(format!("unreadable response: {}", e)))?;

        match parsed.response.map(|s| s.trim().to_string()) {
            Some(enhanced) if !enhanced.is_empty() => {
                tracing::info!("Prompt enhanced ({} -> {} chars)", text.len(), enhanced.len());
                Ok(EnhancedPrompt::enhanced(text, enhanced))
            }
            _ => Err(unavailable("model returned no text")),
        }
    }
}

fn unavailable(reason: impl Into<String>) -> EnhancementUnavailable {
    EnhancementUnavailable { reason: reason.into() }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
