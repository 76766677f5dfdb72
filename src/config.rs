//! Env-driven configuration for the service and the CLI.
//!
//! Values are read from the process environment; `dotenv` is loaded on demand
//! by the binaries. Defaults are provided for convenience during development.
//! Empty values count as unset.
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::comfyui::workflow::GraphSettings;
use crate::comfyui::{ComfyUIAdapter, ComfyUIClient, ComfyUISettings};
use crate::enhancer::EnhancerClient;
use crate::error::{AppError, AppResult};
use crate::external::{ExternalApiAdapter, ExternalApiSettings, ExternalProvider, ProviderEndpoint};
use crate::generation::poll::PollPolicy;
use crate::generation::{GeneratorBackend, GeneratorKind, Orchestrator, OrchestratorSettings};
use crate::usage::UsageCounters;
use crate::web::{BrowserOptions, SessionManager, WebAutomationAdapter, WebAutomationSettings, WebDriverClient};

const COMFYUI_PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: String,
    pub usage_db_path: String,

    pub enhancer_enabled: bool,
    pub ollama_url: String,
    pub ollama_model: String,
    pub enhance_timeout: Duration,
    pub enhance_max_chars: usize,

    pub comfyui_url: String,
    pub comfyui_timeout: Duration,
    pub comfyui_poll: PollPolicy,
    pub comfyui_image_workflow: Option<String>,
    pub comfyui_video_workflow: Option<String>,
    pub comfyui_checkpoint: String,
    pub comfyui_filename_prefix: String,
    pub video_frame_rate: u32,
    pub video_default_duration: u32,
    pub video_max_duration: u32,

    pub webdriver_url: Option<String>,
    pub web_site_url: String,
    pub web_timeout: Duration,
    pub web_acquire_timeout: Duration,
    pub web_max_waiters: usize,
    pub web_headless: bool,
    pub web_poll_interval: Duration,

    pub external_provider: ExternalProvider,
    pub external_timeout: Duration,
    pub replicate: ProviderEndpoint,
    pub huggingface: ProviderEndpoint,

    pub generator_priority: Vec<GeneratorKind>,
}

impl Config {
    pub fn dotenv_load() {
        dotenv::dotenv().ok();
    }

    pub fn new() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let comfyui_poll = PollPolicy {
            max_attempts: parse_or(&get, "COMFYUI_POLL_ATTEMPTS", 60)?,
            interval: Duration::from_millis(parse_or(&get, "COMFYUI_POLL_INTERVAL_MS", 1000)?),
            backoff: parse_or(&get, "COMFYUI_POLL_BACKOFF", 1.5)?,
            max_interval: Duration::from_secs(10),
        };

        let generator_priority = match get("GENERATOR_PRIORITY") {
            Some(raw) => parse_priority(&raw)?,
            None => GeneratorKind::ALL.to_vec(),
        };

        let video_default_duration = parse_or(&get, "VIDEO_DEFAULT_DURATION", 5)?;
        let video_max_duration = parse_or(&get, "VIDEO_MAX_DURATION", 60)?;
        if video_default_duration == 0 || video_default_duration > video_max_duration {
            return Err(AppError::Config(format!(
                "VIDEO_DEFAULT_DURATION must be between 1 and VIDEO_MAX_DURATION ({})",
                video_max_duration
            )));
        }

        Ok(Config {
            api_host: or("API_HOST", "127.0.0.1"),
            api_port: or("API_PORT", "8000"),
            usage_db_path: or("USAGE_DB_PATH", "usage_stats.db"),

            enhancer_enabled: parse_bool(&get, "ENHANCER_ENABLED", true)?,
            ollama_url: or("OLLAMA_URL", "http://localhost:11434"),
            ollama_model: or("OLLAMA_MODEL", "llama3.2"),
            enhance_timeout: secs(&get, "ENHANCE_TIMEOUT_SECS", 30)?,
            enhance_max_chars: parse_or(&get, "ENHANCE_MAX_CHARS", 2000)?,

            comfyui_url: get("COMFYUI_URL")
                .or_else(|| get("COMFY_URL"))
                .unwrap_or_else(|| "http://localhost:8188".to_string()),
            comfyui_timeout: secs(&get, "COMFYUI_TIMEOUT_SECS", 300)?,
            comfyui_poll,
            comfyui_image_workflow: get("COMFYUI_IMAGE_WORKFLOW"),
            comfyui_video_workflow: get("COMFYUI_VIDEO_WORKFLOW"),
            comfyui_checkpoint: or("COMFYUI_CHECKPOINT", "sd_xl_base_1.0.safetensors"),
            comfyui_filename_prefix: or("COMFYUI_FILENAME_PREFIX", "text2video"),
            video_frame_rate: parse_or(&get, "VIDEO_FRAME_RATE", 8)?,
            video_default_duration,
            video_max_duration,

            webdriver_url: get("WEBDRIVER_URL"),
            web_site_url: or("WEB_SITE_URL", "https://lmarena.ai"),
            web_timeout: secs(&get, "WEB_TIMEOUT_SECS", 120)?,
            web_acquire_timeout: secs(&get, "WEB_ACQUIRE_TIMEOUT_SECS", 60)?,
            web_max_waiters: parse_or(&get, "WEB_MAX_WAITERS", 8)?,
            web_headless: parse_bool(&get, "WEB_HEADLESS", true)?,
            web_poll_interval: Duration::from_millis(parse_or(&get, "WEB_POLL_INTERVAL_MS", 2000)?),

            external_provider: get("EXTERNAL_PROVIDER")
                .map(|p| p.parse::<ExternalProvider>())
                .transpose()?
                .unwrap_or(ExternalProvider::Replicate),
            external_timeout: secs(&get, "EXTERNAL_TIMEOUT_SECS", 180)?,
            replicate: ProviderEndpoint {
                base_url: or("REPLICATE_API_URL", "https://api.replicate.com"),
                token: get("REPLICATE_API_TOKEN"),
                image_model: or("REPLICATE_MODEL", "black-forest-labs/flux-schnell"),
                video_model: get("REPLICATE_VIDEO_MODEL"),
            },
            huggingface: ProviderEndpoint {
                base_url: or("HF_API_URL", "https://api-inference.huggingface.co"),
                token: get("HF_API_TOKEN"),
                image_model: or("HF_MODEL", "stabilityai/stable-diffusion-xl-base-1.0"),
                video_model: get("HF_VIDEO_MODEL"),
            },

            generator_priority,
        })
    }

    pub fn print_env_vars(&self) {
        tracing::info!("API: {}:{}", self.api_host, self.api_port);
        tracing::info!("USAGE_DB_PATH: {}", self.usage_db_path);
        tracing::info!(
            "Enhancer: {} ({} @ {})",
            if self.enhancer_enabled { "enabled" } else { "disabled" },
            self.ollama_model,
            self.ollama_url
        );
        tracing::info!(
            "COMFYUI_URL: {} (timeout {:?}, polling for up to {:?})",
            self.comfyui_url,
            self.comfyui_timeout,
            self.comfyui_poll.total_wait()
        );
        tracing::info!("WEBDRIVER_URL: {} -> {}", self.webdriver_url.as_deref().unwrap_or("<unset>"), self.web_site_url);
        tracing::info!(
            "External provider: {} (replicate token {}, hf token {})",
            self.external_provider,
            redact(&self.replicate.token),
            redact(&self.huggingface.token)
        );
        let order: Vec<&str> = self.generator_priority.iter().map(|k| k.as_str()).collect();
        tracing::info!("GENERATOR_PRIORITY: {}", order.join(","));
    }

    pub fn enhancer(&self) -> Option<EnhancerClient> {
        self.enhancer_enabled
            .then(|| EnhancerClient::new(self.ollama_url.clone(), self.ollama_model.clone(), self.enhance_max_chars))
    }

    pub fn comfyui_adapter(&self) -> ComfyUIAdapter {
        let settings = ComfyUISettings {
            timeout: self.comfyui_timeout,
            preflight_timeout: COMFYUI_PREFLIGHT_TIMEOUT,
            poll: self.comfyui_poll,
            graph: GraphSettings {
                checkpoint: self.comfyui_checkpoint.clone(),
                filename_prefix: self.comfyui_filename_prefix.clone(),
                frame_rate: self.video_frame_rate,
                default_duration: self.video_default_duration,
            },
            image_workflow: self.comfyui_image_workflow.clone(),
            video_workflow: self.comfyui_video_workflow.clone(),
        };
        ComfyUIAdapter::new(ComfyUIClient::new(self.comfyui_url.clone()), settings)
    }

    /// The web generator needs a WebDriver endpoint; without one it is left out.
    pub fn web_adapter(&self) -> Option<WebAutomationAdapter> {
        let url = self.webdriver_url.clone()?;
        let driver = WebDriverClient::new(
            url,
            BrowserOptions { headless: self.web_headless, command_timeout: self.web_timeout },
        );
        let sessions = SessionManager::new(driver, self.web_max_waiters);
        let settings = WebAutomationSettings {
            site_url: self.web_site_url.clone(),
            job_timeout: self.web_timeout,
            acquire_timeout: self.web_acquire_timeout,
            result_poll_interval: self.web_poll_interval,
        };
        Some(WebAutomationAdapter::new(sessions, settings))
    }

    pub fn external_adapter(&self) -> ExternalApiAdapter {
        ExternalApiAdapter::new(ExternalApiSettings {
            provider: self.external_provider,
            timeout: self.external_timeout,
            poll: PollPolicy::fixed(90, Duration::from_secs(2)),
            replicate: self.replicate.clone(),
            huggingface: self.huggingface.clone(),
        })
    }

    pub fn backends(&self) -> Vec<GeneratorBackend> {
        let mut backends = vec![GeneratorBackend::ComfyUI(self.comfyui_adapter())];
        if let Some(web) = self.web_adapter() {
            backends.push(GeneratorBackend::WebAutomation(web));
        }
        backends.push(GeneratorBackend::External(self.external_adapter()));
        backends
    }

    pub fn orchestrator(&self, usage: UsageCounters) -> Orchestrator {
        Orchestrator::new(
            self.enhancer(),
            self.backends(),
            usage,
            OrchestratorSettings {
                priority: self.generator_priority.clone(),
                enhance_timeout: self.enhance_timeout,
                default_video_duration: self.video_default_duration,
                max_video_duration: self.video_max_duration,
            },
        )
    }
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> AppResult<T>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| AppError::Config(format!("{}='{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

fn secs<G>(get: &G, key: &str, default: u64) -> AppResult<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    parse_or(get, key, default).map(Duration::from_secs)
}

fn parse_bool<G>(get: &G, key: &str, default: bool) -> AppResult<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(AppError::Config(format!("{}='{}' is not a boolean", key, v))),
        },
    }
}

fn parse_priority(raw: &str) -> AppResult<Vec<GeneratorKind>> {
    let mut order = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let kind: GeneratorKind = name
            .parse()
            .map_err(|_| AppError::Config(format!("GENERATOR_PRIORITY: unknown generator '{}'", name)))?;
        if !order.contains(&kind) {
            order.push(kind);
        }
    }
    if order.is_empty() {
        return Err(AppError::Config("GENERATOR_PRIORITY is empty".to_string()));
    }
    Ok(order)
}

fn redact(token: &Option<String>) -> &'static str {
    if token.is_some() {
        "set"
    } else {
        "<unset>"
    }
}
