//! Text-to-image/video generation backend library
//!
//! Modules:
//! - `api`: Axum HTTP handlers and router setup used by the binary.
//! - `enhancer`: Prompt rewriting through a local Ollama model.
//! - `comfyui`: ComfyUI REST client, job graphs and the ComfyUI generator.
//! - `web`: WebDriver client, the shared browser session and the web generator.
//! - `external`: Hosted generation APIs (Replicate, Hugging Face).
//! - `generation`: Shared types, polling, and the fallback orchestrator.
//! - `usage`: SQLite-backed usage counters.
//! - `config`: Env-driven configuration loader.
//! - `error`: Common error types and alias.
//!
//! Re-exports are provided for common types: `Config`, `Orchestrator`,
//! `GenerationRequest`, `UsageCounters` and the error types.
pub mod api;
pub mod comfyui;
pub mod config;
pub mod enhancer;
pub mod error;
pub mod external;
pub mod generation;
pub mod usage;
pub mod web;

pub use config::Config;
pub use error::{AppError, AppResult, BackendFailure, FailureKind, GenerationError};
pub use generation::{GenerationRequest, GeneratorKind, MediaKind, Orchestrator};
pub use usage::UsageCounters;
