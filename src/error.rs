//! Common error types.
//!
//! `AppError` is the crate-wide error, `AppResult` its alias. The generation
//! failure taxonomy (`FailureKind`, `BackendFailure`, `AggregatedFailure`,
//! `GenerationError`) lives here too so adapters, the orchestrator and the HTTP
//! layer share one vocabulary.
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::generation::types::GeneratorKind;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("ComfyUI error: {0}")]
    ComfyUI(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Usage store error: {0}")]
    Usage(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

pub type AppResult<T> = Result<T, AppError>;

/// Why a single backend did not produce an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unreachable,
    Rejected,
    Timeout,
    InvalidResponse,
}

impl FailureKind {
    /// Map a non-success HTTP status from a backend onto the taxonomy.
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        match status.as_u16() {
            408 | 504 => FailureKind::Timeout,
            429 | 503 => FailureKind::Rejected,
            400..=499 => FailureKind::Rejected,
            _ => FailureKind::Unreachable,
        }
    }

    /// Map a transport-level reqwest error onto the taxonomy.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            FailureKind::Timeout
        } else if err.is_decode() || err.is_body() {
            FailureKind::InvalidResponse
        } else if let Some(status) = err.status() {
            FailureKind::from_status(status)
        } else {
            FailureKind::Unreachable
        }
    }

    fn status_code(self) -> StatusCode {
        match self {
            FailureKind::Unreachable => StatusCode::SERVICE_UNAVAILABLE,
            FailureKind::Rejected => StatusCode::UNPROCESSABLE_ENTITY,
            FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            FailureKind::InvalidResponse => StatusCode::BAD_GATEWAY,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Unreachable => "unreachable",
            FailureKind::Rejected => "rejected",
            FailureKind::Timeout => "timeout",
            FailureKind::InvalidResponse => "invalid_response",
        };
        f.write_str(s)
    }
}

/// A tagged failure from one generator backend.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{generator} {kind}: {message}")]
pub struct BackendFailure {
    pub generator: GeneratorKind,
    pub kind: FailureKind,
    pub message: String,
}

impl BackendFailure {
    pub fn new(generator: GeneratorKind, kind: FailureKind, message: impl Into<String>) -> Self {
        BackendFailure { generator, kind, message: message.into() }
    }

    pub fn unreachable(generator: GeneratorKind, message: impl Into<String>) -> Self {
        Self::new(generator, FailureKind::Unreachable, message)
    }

    pub fn rejected(generator: GeneratorKind, message: impl Into<String>) -> Self {
        Self::new(generator, FailureKind::Rejected, message)
    }

    pub fn timeout(generator: GeneratorKind, message: impl Into<String>) -> Self {
        Self::new(generator, FailureKind::Timeout, message)
    }

    pub fn invalid_response(generator: GeneratorKind, message: impl Into<String>) -> Self {
        Self::new(generator, FailureKind::InvalidResponse, message)
    }

    /// Classify a reqwest error raised while talking to `generator`.
    pub fn from_transport(generator: GeneratorKind, context: &str, err: &reqwest::Error) -> Self {
        Self::new(generator, FailureKind::from_transport(err), format!("{}: {}", context, err))
    }

    /// Classify a non-success response status, keeping the body for diagnostics.
    pub fn from_status(generator: GeneratorKind, status: reqwest::StatusCode, body: &str) -> Self {
        Self::new(
            generator,
            FailureKind::from_status(status),
            format!("status {}: {}", status, body.trim()),
        )
    }
}

/// Every candidate in the fallback chain failed.
#[derive(Debug, Clone, Error, Serialize)]
#[error("all generators failed: {}", summarize(.attempts))]
pub struct AggregatedFailure {
    pub attempts: Vec<BackendFailure>,
}

impl AggregatedFailure {
    /// The shared failure kind when every attempt failed the same way.
    pub fn uniform_kind(&self) -> Option<FailureKind> {
        let first = self.attempts.first()?.kind;
        self.attempts.iter().all(|a| a.kind == first).then_some(first)
    }

    pub fn is_mixed(&self) -> bool {
        !self.attempts.is_empty() && self.uniform_kind().is_none()
    }
}

fn summarize(attempts: &[BackendFailure]) -> String {
    if attempts.is_empty() {
        return "no generator configured".to_string();
    }
    attempts
        .iter()
        .map(|a| format!("{}={}", a.generator, a.kind))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The local language model could not rewrite the prompt. Always absorbed.
#[derive(Debug, Clone, Error)]
#[error("prompt enhancement unavailable: {reason}")]
pub struct EnhancementUnavailable {
    pub reason: String,
}

#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("invalid generation request: {0}")]
    InvalidRequest(String),

    /// The caller pinned a generator and it failed; surfaced verbatim.
    #[error(transparent)]
    Backend(BackendFailure),

    #[error(transparent)]
    Aggregated(AggregatedFailure),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::Validation(msg)
            | AppError::Generation(GenerationError::InvalidRequest(msg)) => {
                (StatusCode::BAD_REQUEST, json!({ "error": msg }))
            }
            AppError::Generation(GenerationError::Backend(failure)) => (
                failure.kind.status_code(),
                json!({
                    "error": self.to_string(),
                    "kind": failure.kind,
                    "attempts": [failure],
                }),
            ),
            AppError::Generation(GenerationError::Aggregated(agg)) => {
                let status = agg
                    .uniform_kind()
                    .map(FailureKind::status_code)
                    .unwrap_or(StatusCode::BAD_GATEWAY);
                (
                    status,
                    json!({
                        "error": self.to_string(),
                        "kind": agg.uniform_kind(),
                        "attempts": agg.attempts,
                    }),
                )
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": self.to_string() })),
        };
        if status.is_server_error() {
            tracing::error!(%status, "request failed: {}", self);
        } else {
            tracing::info!(%status, "request rejected: {}", self);
        }
        (status, Json(body)).into_response()
    }
}
