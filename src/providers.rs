//! Remote model capabilities the pipeline depends on.
//!
//! The orchestrator only talks to these traits, so the Gemini client and
//! test fakes are interchangeable.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::models::ImageAsset;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP status={status} body={body}")]
    Status { status: u16, body: String },
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("request blocked: {0}")]
    Blocked(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct TextRequest {
    pub system_instructions: String,
    pub input: String,
    pub images: Vec<ImageAsset>,
    /// Ask the model for a JSON document instead of prose.
    pub expect_json: bool,
}

#[derive(Debug, Clone)]
pub enum SynthesisOutput {
    Image { bytes: Bytes, mime_type: String },
    /// The model refused (safety filter, prohibited content, ...).
    Blocked { reason: String },
    /// The call succeeded but carried no image, for a reason other than a block.
    NoImage { text: Option<String> },
}

#[async_trait]
pub trait TextReasoning: Send + Sync {
    /// Empty text is a normal outcome, not an error.
    async fn generate(&self, request: TextRequest) -> Result<String, RemoteError>;
}

#[async_trait]
pub trait MultimodalSynthesis: Send + Sync {
    /// `images` are sent in the given order; callers decide what goes first.
    async fn generate(
        &self,
        prompt: &str,
        images: &[ImageAsset],
    ) -> Result<SynthesisOutput, RemoteError>;
}
