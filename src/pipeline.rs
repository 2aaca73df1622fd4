//! The multi-angle consistency pipeline.
//!
//! One run goes `ResolvingAngles -> GeneratingCanonical -> ExtractingSpec ->
//! GeneratingRemainingAngles -> Complete`, or ends in `Failed`. The first
//! requested angle is generated on its own and becomes the canonical design;
//! every later angle is generated sequentially against that image (and the
//! extracted specification, when one is usable). Any synthesis failure is
//! fatal to the whole request: callers get either every angle or an error
//! naming the stage and angle that broke.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::angles::{resolve, TemplateSet};
use crate::consistency::{self, with_parameter_context, AngleView};
use crate::error::{PipelineError, PipelineStage};
use crate::models::{AngleRequest, DesignParameters, GenerationResult, ImageRole};
use crate::prompt_optimizer::{PromptOptimizer, PromptRole};
use crate::providers::{MultimodalSynthesis, TextReasoning};
use crate::spec_extractor::{ProductContext, SpecExtractor};
use crate::synthesizer::{ImageSynthesizer, SynthesisInputs};

pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Applied to every remote call individually.
    pub remote_timeout: Duration,
}

pub struct PipelineOrchestrator {
    reasoning: Arc<dyn TextReasoning>,
    synthesis: Arc<dyn MultimodalSynthesis>,
    settings: PipelineSettings,
}

impl PipelineOrchestrator {
    pub fn new(
        reasoning: Arc<dyn TextReasoning>,
        synthesis: Arc<dyn MultimodalSynthesis>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            reasoning,
            synthesis,
            settings,
        }
    }

    pub async fn run_pipeline(
        &self,
        angles: &AngleRequest,
        params: &DesignParameters,
        templates: &TemplateSet,
    ) -> Result<GenerationResult, PipelineError> {
        let role = PromptRole::Canonical { angle: angles.canonical().to_string() };
        self.run(angles, params, templates, role).await
    }

    /// Same as [`run_pipeline`](Self::run_pipeline) but the canonical prompt is
    /// asked for variation `index` of `total`.
    pub async fn run_variant(
        &self,
        angles: &AngleRequest,
        params: &DesignParameters,
        templates: &TemplateSet,
        index: usize,
        total: usize,
    ) -> Result<GenerationResult, PipelineError> {
        let role = PromptRole::Variant { angle: angles.canonical().to_string(), index, total };
        self.run(angles, params, templates, role).await
    }

    async fn run(
        &self,
        angles: &AngleRequest,
        params: &DesignParameters,
        templates: &TemplateSet,
        role: PromptRole,
    ) -> Result<GenerationResult, PipelineError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("pipeline", %request_id, angles = angles.len());
        self.execute(request_id, angles, params, templates, role).instrument(span).await
    }

    async fn execute(
        &self,
        request_id: Uuid,
        angles: &AngleRequest,
        params: &DesignParameters,
        templates: &TemplateSet,
        role: PromptRole,
    ) -> Result<GenerationResult, PipelineError> {
        let started_at = Utc::now();
        let timeout = self.settings.remote_timeout;
        let synthesizer = ImageSynthesizer::new(self.synthesis.as_ref(), timeout);
        let mut tracker = StageTracker::new();

        info!(
            "🚀 Starting design pipeline for {} angle(s): {}",
            angles.len(),
            angles.as_slice().join(", ")
        );

        let resolved = resolve(angles, templates).map_err(|e| tracker.fail(e))?;

        tracker.advance(PipelineStage::GeneratingCanonical);
        let canonical = resolved.canonical();
        let prompt = PromptOptimizer::new(self.reasoning.as_ref(), timeout)
            .optimize(params, &role)
            .await;
        let canonical_inputs = SynthesisInputs {
            canonical: None,
            template: &canonical.template,
            reference: params.style_reference(),
            logo: params.logo(),
        };
        let canonical_image = synthesizer
            .synthesize(&prompt.text, canonical_inputs)
            .await
            .map_err(|source| {
                tracker.fail(PipelineError::CanonicalGenerationFailed {
                    angle: canonical.angle.clone(),
                    source,
                })
            })?;
        info!("✅ Canonical design established for '{}'", canonical.angle);
        let canonical_ref = canonical_image.with_role(ImageRole::Canonical);
        let mut images = vec![(canonical.angle.clone(), canonical_image)];

        tracker.advance(PipelineStage::ExtractingSpec);
        let context = ProductContext {
            product_type: params.product_type.clone(),
            angle: canonical.angle.clone(),
        };
        let specification = SpecExtractor::new(self.reasoning.as_ref(), timeout)
            .extract(&canonical_ref, &context)
            .await;

        tracker.advance(PipelineStage::GeneratingRemainingAngles);
        let total = angles.len();
        for (offset, entry) in resolved.remaining().iter().enumerate() {
            let index = offset + 2;
            let view = AngleView::new(&entry.angle);
            let angle_prompt = match &specification {
                Some(spec) => consistency::build(spec, &view),
                None => consistency::visual_reference_prompt(&view),
            };
            let angle_prompt = with_parameter_context(angle_prompt, params);
            info!(
                "🎯 Generating angle {}/{} '{}' (spec: {})",
                index,
                total,
                entry.angle,
                specification.is_some()
            );

            let inputs = SynthesisInputs {
                canonical: Some(&canonical_ref),
                template: &entry.template,
                reference: params.style_reference(),
                logo: params.logo(),
            };
            match synthesizer.synthesize(&angle_prompt, inputs).await {
                Ok(image) => images.push((entry.angle.clone(), image)),
                Err(source) => {
                    let completed = images.iter().map(|(a, _)| a.clone()).collect();
                    return Err(tracker.fail(PipelineError::AngleGenerationFailed {
                        index,
                        angle: entry.angle.clone(),
                        completed,
                        total,
                        source,
                    }));
                }
            }
        }

        tracker.advance(PipelineStage::Complete);
        let result = GenerationResult::assemble(
            request_id,
            angles,
            images,
            specification,
            prompt.source,
            started_at,
        )
        .map_err(|e| tracker.fail(e))?;
        info!("✅ Design pipeline complete with {} angle(s)", result.len());
        Ok(result)
    }
}

struct StageTracker {
    current: PipelineStage,
}

impl StageTracker {
    fn new() -> Self {
        Self { current: PipelineStage::ResolvingAngles }
    }

    fn advance(&mut self, next: PipelineStage) {
        debug!(from = ?self.current, to = ?next, "stage transition");
        self.current = next;
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        error!(stage = ?self.current, class = ?err.class(), "❌ Pipeline failed: {}", err);
        self.current = PipelineStage::Failed;
        err
    }
}
