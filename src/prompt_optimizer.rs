use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::angles::describe_angle;
use crate::models::DesignParameters;
use crate::providers::{RemoteError, TextReasoning, TextRequest};

const MIN_PROMPT_CHARS: usize = 20;
const MAX_PROMPT_CHARS: usize = 4000;

const OPTIMIZER_INSTRUCTIONS: &str = "You are an expert prompt engineer for a product image generation model. \
Turn the structured design parameters you receive into one detailed image-generation instruction. \
The instruction must: apply the design onto the product shown in the attached template image while keeping its exact shape and proportions; \
describe colors, patterns, materials and surface details concretely; respect the requested camera view; \
ask for a clean studio background and photorealistic lighting; forbid added text or watermarks unless a logo is supplied. \
Reply with the instruction only, no preamble, no markdown.";

/// What the prompt is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptRole {
    Canonical { angle: String },
    /// One of several independent takes on the same parameters.
    Variant { angle: String, index: usize, total: usize },
}

impl PromptRole {
    pub fn angle(&self) -> &str {
        match self {
            PromptRole::Canonical { angle } | PromptRole::Variant { angle, .. } => angle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PromptSource {
    Optimized,
    Fallback { reason: String },
}

#[derive(Debug, Clone)]
pub struct OptimizedPrompt {
    pub text: String,
    pub source: PromptSource,
}

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("unusable output ({0})")]
    Unusable(&'static str),
}

pub struct PromptOptimizer<'a> {
    reasoning: &'a dyn TextReasoning,
    timeout: Duration,
}

impl<'a> PromptOptimizer<'a> {
    pub fn new(reasoning: &'a dyn TextReasoning, timeout: Duration) -> Self {
        Self { reasoning, timeout }
    }

    /// Always yields a usable prompt; falls back to [`fallback_prompt`] when
    /// the remote path fails for any reason.
    pub async fn optimize(&self, params: &DesignParameters, role: &PromptRole) -> OptimizedPrompt {
        match self.try_optimize(params, role).await {
            Ok(text) => {
                info!("✨ Optimized prompt for '{}' ({} chars)", role.angle(), text.len());
                OptimizedPrompt {
                    text,
                    source: PromptSource::Optimized,
                }
            }
            Err(e) => {
                warn!(
                    "🔄 Prompt optimization failed for '{}': {}; using template prompt",
                    role.angle(),
                    e
                );
                OptimizedPrompt {
                    text: fallback_prompt(params, role),
                    source: PromptSource::Fallback { reason: e.to_string() },
                }
            }
        }
    }

    pub async fn try_optimize(
        &self,
        params: &DesignParameters,
        role: &PromptRole,
    ) -> Result<String, OptimizeError> {
        let request = TextRequest {
            system_instructions: OPTIMIZER_INSTRUCTIONS.to_string(),
            input: structured_input(params, role),
            images: Vec::new(),
            expect_json: false,
        };
        let raw = tokio::time::timeout(self.timeout, self.reasoning.generate(request))
            .await
            .map_err(|_| OptimizeError::Timeout(self.timeout))??;
        clean_output(&raw)
    }
}

fn structured_input(params: &DesignParameters, role: &PromptRole) -> String {
    let mut input = json!({
        "product_type": params.product_type,
        "theme": params.theme,
        "style": params.style,
        "color": params.color,
        "material": params.material,
        "description": params.description,
        "camera_view": describe_angle(role.angle()),
        "has_style_reference_image": params.style_reference().is_some(),
        "has_brand_logo": params.logo().is_some(),
    });
    if let PromptRole::Variant { index, total, .. } = role {
        input["variation"] = json!({ "index": index, "total": total });
    }
    input.to_string()
}

fn clean_output(raw: &str) -> Result<String, OptimizeError> {
    let mut text = raw.trim();
    if let Some(inner) = text.strip_prefix("```") {
        // drop an optional language tag on the fence line
        let inner = inner.split_once('\n').map(|(_, rest)| rest).unwrap_or(inner);
        text = inner.strip_suffix("```").unwrap_or(inner).trim();
    }
    let text = text.trim_matches(|c: char| c == '"' || c == '\'').trim();
    if text.is_empty() {
        return Err(OptimizeError::Unusable("empty"));
    }
    if text.chars().count() < MIN_PROMPT_CHARS {
        return Err(OptimizeError::Unusable("too short"));
    }
    Ok(text.chars().take(MAX_PROMPT_CHARS).collect())
}

/// Deterministic template prompt built from the same parameters.
pub fn fallback_prompt(params: &DesignParameters, role: &PromptRole) -> String {
    let mut prompt = format!(
        "Create a professional product design image of the {product} shown in the template image, seen from a {view}. \
Keep the product's exact shape, silhouette and proportions from the template and apply the new surface design to it.",
        product = params.product_type,
        view = describe_angle(role.angle()),
    );
    for (label, value) in params.labeled_fields() {
        prompt.push_str(&format!("\n{label}: {value}."));
    }
    if params.style_reference().is_some() {
        prompt.push_str("\nFollow the visual style of the attached style reference image.");
    }
    if params.logo().is_some() {
        prompt.push_str("\nPlace the attached brand logo cleanly on the product, undistorted.");
    }
    if let PromptRole::Variant { index, total, .. } = role {
        prompt.push_str(&format!(
            "\nThis is design variation {} of {}; give it a distinct interpretation of the parameters.",
            index, total
        ));
    }
    prompt.push_str(
        "\nClean studio background, soft even lighting, photorealistic detail, \
no added text or watermarks.",
    );
    prompt
}
