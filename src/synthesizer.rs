use std::time::Duration;
use tracing::{error, info};

use crate::error::SynthesisError;
use crate::models::{ImageAsset, ImageRole};
use crate::providers::{MultimodalSynthesis, SynthesisOutput};

/// Images for one synthesis call. The canonical reference is absent only for
/// the canonical angle itself.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInputs<'a> {
    pub canonical: Option<&'a ImageAsset>,
    pub template: &'a ImageAsset,
    pub reference: Option<&'a ImageAsset>,
    pub logo: Option<&'a ImageAsset>,
}

impl SynthesisInputs<'_> {
    /// Canonical first (primary anchor), then template, reference, logo.
    pub fn ordered(&self) -> Vec<ImageAsset> {
        [self.canonical, Some(self.template), self.reference, self.logo]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }
}

pub struct ImageSynthesizer<'a> {
    synthesis: &'a dyn MultimodalSynthesis,
    timeout: Duration,
}

impl<'a> ImageSynthesizer<'a> {
    pub fn new(synthesis: &'a dyn MultimodalSynthesis, timeout: Duration) -> Self {
        Self { synthesis, timeout }
    }

    pub async fn synthesize(
        &self,
        prompt: &str,
        inputs: SynthesisInputs<'_>,
    ) -> Result<ImageAsset, SynthesisError> {
        let images = inputs.ordered();
        info!(
            "🎨 Synthesizing image with {} reference image(s), prompt: {}",
            images.len(),
            preview(prompt, 100)
        );

        let output = tokio::time::timeout(self.timeout, self.synthesis.generate(prompt, &images))
            .await
            .map_err(|_| SynthesisError::Timeout(self.timeout))??;

        match output {
            SynthesisOutput::Image { bytes, mime_type } if !bytes.is_empty() => {
                info!("✅ Received {} image ({} bytes)", mime_type, bytes.len());
                Ok(ImageAsset::new(bytes, mime_type, ImageRole::Result))
            }
            SynthesisOutput::Image { .. } => {
                error!("❌ Image payload in response was empty");
                Err(SynthesisError::NoImage { text: None })
            }
            SynthesisOutput::Blocked { reason } => {
                error!("❌ Image generation blocked: {}", reason);
                Err(SynthesisError::Blocked { reason })
            }
            SynthesisOutput::NoImage { text } => {
                let snippet = text.as_deref().map(|t| preview(t, 80));
                error!("⚠️ No image data found in response (text: {:?})", snippet);
                Err(SynthesisError::NoImage { text })
            }
        }
    }
}

fn preview(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(max).collect::<String>())
    }
}
