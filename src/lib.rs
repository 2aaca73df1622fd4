pub mod angles;
pub mod config;
pub mod consistency;
pub mod error;
pub mod gemini;
pub mod models;
pub mod pipeline;
pub mod prompt_optimizer;
pub mod providers;
pub mod routes;
pub mod spec_extractor;
pub mod synthesizer;
pub mod variants;

pub use angles::TemplateSet;
pub use error::{ErrorClass, PipelineError, PipelineStage};
pub use models::{
    AngleRequest, DesignParameters, DesignParametersInput, DesignSpecification, GenerationResult,
    ImageAsset, ImageRole,
};
pub use pipeline::{PipelineOrchestrator, PipelineSettings};
pub use providers::{MultimodalSynthesis, TextReasoning};
