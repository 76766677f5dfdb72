//! Request, prompt and artifact types shared by the orchestrator and adapters.
use std::fmt;
use std::str::FromStr;

use base64::Engine;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{AppError, BackendFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GeneratorKind {
    #[serde(rename = "comfyui")]
    ComfyUI,
    #[serde(rename = "web")]
    Web,
    #[serde(rename = "external")]
    External,
}

impl GeneratorKind {
    pub const ALL: [GeneratorKind; 3] = [GeneratorKind::ComfyUI, GeneratorKind::Web, GeneratorKind::External];

    pub fn as_str(self) -> &'static str {
        match self {
            GeneratorKind::ComfyUI => "comfyui",
            GeneratorKind::Web => "web",
            GeneratorKind::External => "external",
        }
    }
}

impl fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeneratorKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "comfyui" | "comfy" => Ok(GeneratorKind::ComfyUI),
            "web" | "browser" => Ok(GeneratorKind::Web),
            "external" | "api" => Ok(GeneratorKind::External),
            other => Err(AppError::Validation(format!("Unsupported generator '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub raw_text: String,
    pub enhance: bool,
    pub requested_generator: Option<GeneratorKind>,
    pub kind: MediaKind,
    /// Only read for `MediaKind::Video`.
    pub duration_seconds: Option<u32>,
}

impl GenerationRequest {
    pub fn image(text: impl Into<String>) -> Self {
        GenerationRequest {
            raw_text: text.into(),
            enhance: true,
            requested_generator: None,
            kind: MediaKind::Image,
            duration_seconds: None,
        }
    }

    pub fn video(text: impl Into<String>, duration_seconds: Option<u32>) -> Self {
        GenerationRequest {
            raw_text: text.into(),
            enhance: true,
            requested_generator: None,
            kind: MediaKind::Video,
            duration_seconds,
        }
    }

    pub fn with_enhance(mut self, enhance: bool) -> Self {
        self.enhance = enhance;
        self
    }

    pub fn pinned_to(mut self, generator: GeneratorKind) -> Self {
        self.requested_generator = Some(generator);
        self
    }
}

/// Per-submit parameters beyond the prompt text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationParams {
    pub duration_seconds: Option<u32>,
}

/// The prompt actually handed to generators, with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnhancedPrompt {
    #[serde(rename = "original")]
    pub original_text: String,
    #[serde(rename = "enhanced")]
    pub enhanced_text: String,
    pub was_enhanced: bool,
}

impl EnhancedPrompt {
    pub fn enhanced(original: impl Into<String>, enhanced: impl Into<String>) -> Self {
        EnhancedPrompt { original_text: original.into(), enhanced_text: enhanced.into(), was_enhanced: true }
    }

    pub fn unchanged(original: impl Into<String>) -> Self {
        let original = original.into();
        EnhancedPrompt { enhanced_text: original.clone(), original_text: original, was_enhanced: false }
    }

    pub fn effective_text(&self) -> &str {
        &self.enhanced_text
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactData {
    Url(String),
    Bytes { content_type: String, bytes: Vec<u8> },
}

impl ArtifactData {
    pub fn url(&self) -> Option<&str> {
        match self {
            ArtifactData::Url(u) => Some(u),
            ArtifactData::Bytes { .. } => None,
        }
    }
}

impl Serialize for ArtifactData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(2))?;
        match self {
            ArtifactData::Url(url) => {
                map.serialize_entry("url", url)?;
            }
            ArtifactData::Bytes { content_type, bytes } => {
                map.serialize_entry("content_type", content_type)?;
                map.serialize_entry(
                    "data_base64",
                    &base64::engine::general_purpose::STANDARD.encode(bytes),
                )?;
            }
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub kind: MediaKind,
    pub data: ArtifactData,
    pub source_generator: GeneratorKind,
}

/// A successful generation, with the failures of backends tried before the winner.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub artifact: Artifact,
    pub prompt: EnhancedPrompt,
    /// Parameters the winning generator ran with, defaults filled in.
    pub params: GenerationParams,
    pub failed_attempts: Vec<BackendFailure>,
}
