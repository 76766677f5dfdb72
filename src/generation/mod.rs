pub mod backend;
pub mod orchestrator;
pub mod poll;
pub mod types;

pub use backend::GeneratorBackend;
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use types::{
    Artifact, ArtifactData, EnhancedPrompt, GenerationOutcome, GenerationParams, GenerationRequest, GeneratorKind,
    MediaKind,
};
