use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{DesignSpecification, ImageAsset, ImageRole};
use crate::providers::{RemoteError, TextReasoning, TextRequest};

const EXTRACTOR_INSTRUCTIONS: &str = "You are a meticulous product design analyst. \
Inspect the attached product image and describe exactly what is visible on it, not what might be intended. \
Return a single JSON object with these keys, each an array of short strings: \
primary_colors, secondary_colors, patterns, branding_elements, structural_features, materials. \
Name colors concretely (e.g. \"dusty rose #D8A7B1\"), describe patterns with scale and placement, \
list every logo, wordmark or label with its position. Use an empty array when nothing applies. \
Output JSON only.";

/// What the extractor knows about the product beyond the image.
#[derive(Debug, Clone)]
pub struct ProductContext {
    pub product_type: String,
    pub angle: String,
}

/// Why no specification came back. Never surfaced to pipeline callers.
#[derive(Debug, Error)]
pub enum ExtractionDegraded {
    #[error("remote call failed: {0}")]
    Remote(#[from] RemoteError),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed specification: {0}")]
    Malformed(String),
    #[error("specification has no colors, patterns or branding")]
    Empty,
}

pub struct SpecExtractor<'a> {
    reasoning: &'a dyn TextReasoning,
    timeout: Duration,
}

impl<'a> SpecExtractor<'a> {
    pub fn new(reasoning: &'a dyn TextReasoning, timeout: Duration) -> Self {
        Self { reasoning, timeout }
    }

    /// `None` means "fall back to visual-only consistency".
    pub async fn extract(
        &self,
        canonical: &ImageAsset,
        context: &ProductContext,
    ) -> Option<DesignSpecification> {
        match self.try_extract(canonical, context).await {
            Ok(spec) => {
                info!(
                    "🔍 Extracted design specification: {} primary colors, {} patterns, \
{} branding elements",
                    spec.primary_colors.len(),
                    spec.patterns.len(),
                    spec.branding_elements.len()
                );
                Some(spec)
            }
            Err(e) => {
                warn!(
                    "⚠️ Spec extraction degraded, continuing with visual-only consistency: {}",
                    e
                );
                None
            }
        }
    }

    pub async fn try_extract(
        &self,
        canonical: &ImageAsset,
        context: &ProductContext,
    ) -> Result<DesignSpecification, ExtractionDegraded> {
        let request = TextRequest {
            system_instructions: EXTRACTOR_INSTRUCTIONS.to_string(),
            input: format!(
                "Product type: {}. This is the {} view of the finished design. \
Extract its design specification.",
                context.product_type, context.angle
            ),
            images: vec![canonical.with_role(ImageRole::Canonical)],
            expect_json: true,
        };
        let raw = tokio::time::timeout(self.timeout, self.reasoning.generate(request))
            .await
            .map_err(|_| ExtractionDegraded::Timeout(self.timeout))??;

        let spec = parse_specification(&raw)?;
        if spec.is_usable() {
            Ok(spec)
        } else {
            Err(ExtractionDegraded::Empty)
        }
    }
}

/// Parses the model's reply, tolerating code fences and surrounding prose.
pub fn parse_specification(raw: &str) -> Result<DesignSpecification, ExtractionDegraded> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &raw[s..=e],
        _ => return Err(ExtractionDegraded::Malformed("no JSON object in response".into())),
    };
    serde_json::from_str::<DesignSpecification>(json)
        .map(DesignSpecification::normalized)
        .map_err(|e| ExtractionDegraded::Malformed(e.to_string()))
}
