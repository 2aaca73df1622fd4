use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::angles::{resolve, TemplateSet};
use crate::error::PipelineError;
use crate::models::{AngleRequest, DesignParameters, GenerationResult};
use crate::pipeline::PipelineOrchestrator;

/// Upper bound on variants per request and on concurrent variant runs.
pub const MAX_VARIANTS: usize = 8;

#[derive(Debug)]
pub struct VariantOutcome {
    /// 1-based.
    pub index: usize,
    pub result: Result<GenerationResult, PipelineError>,
}

/// Runs several independent pipeline runs over the same inputs.
pub struct VariantRunner {
    orchestrator: Arc<PipelineOrchestrator>,
    concurrency: usize,
}

impl VariantRunner {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, concurrency: usize) -> Self {
        Self {
            orchestrator,
            concurrency: concurrency.clamp(1, MAX_VARIANTS),
        }
    }

    /// Outcomes come back ordered by variant index. A failed variant does not
    /// stop the others.
    pub async fn run_variants(
        &self,
        angles: Arc<AngleRequest>,
        params: Arc<DesignParameters>,
        templates: Arc<TemplateSet>,
        count: usize,
    ) -> Result<Vec<VariantOutcome>, PipelineError> {
        if count == 0 || count > MAX_VARIANTS {
            return Err(PipelineError::InvalidRequest(format!(
                "variant count must be between 1 and {MAX_VARIANTS}"
            )));
        }
        // reject missing templates once, before fanning out
        resolve(&angles, &templates)?;

        info!(
            "🔀 Generating {} design variant(s), up to {} at a time",
            count, self.concurrency
        );
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for index in 1..=count {
            let orchestrator = Arc::clone(&self.orchestrator);
            let angles = Arc::clone(&angles);
            let params = Arc::clone(&params);
            let templates = Arc::clone(&templates);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let result = orchestrator
                    .run_variant(&angles, &params, &templates, index, count)
                    .await;
                VariantOutcome { index, result }
            });
        }

        let mut outcomes = Vec::with_capacity(count);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    if let Err(e) = &outcome.result {
                        warn!("⚠️ Variant {} failed: {}", outcome.index, e);
                    }
                    outcomes.push(outcome);
                }
                // tasks are never aborted and the set outlives them, so a
                // join error is always a panic
                Err(e) => match e.try_into_panic() {
                    Ok(payload) => std::panic::resume_unwind(payload),
                    Err(e) => unreachable!("variant task cancelled: {e}"),
                },
            }
        }
        outcomes.sort_by_key(|o| o.index);
        debug_assert_eq!(outcomes.len(), count);
        Ok(outcomes)
    }
}
