#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use design_pipeline::models::{DesignParametersInput, ImageAsset, ImageRole};
use design_pipeline::providers::{
    MultimodalSynthesis, RemoteError, SynthesisOutput, TextReasoning, TextRequest,
};
use design_pipeline::{DesignParameters, PipelineOrchestrator, PipelineSettings};

pub const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// PNG signature followed by a tag, enough for MIME sniffing.
pub fn png(tag: &str) -> Vec<u8> {
    let mut out = PNG_MAGIC.to_vec();
    out.extend_from_slice(tag.as_bytes());
    out
}

pub fn template(tag: &str) -> ImageAsset {
    ImageAsset::new(png(tag), "image/png", ImageRole::Template)
}

pub fn spring_params() -> DesignParameters {
    DesignParametersInput {
        theme: "Spring".into(),
        style: "Minimal".into(),
        color: "Pastel".into(),
        material: "Canvas".into(),
        ..Default::default()
    }
    .validate()
    .unwrap()
}

#[derive(Clone)]
pub enum Reply {
    Text(String),
    Fail,
    Hang,
}

/// Text model fake. Prompt-optimization calls (plain text) and spec
/// extraction calls (JSON) are scripted separately.
pub struct FakeReasoning {
    pub optimize: Reply,
    pub extract: Reply,
    pub calls: Mutex<Vec<TextRequest>>,
}

impl FakeReasoning {
    pub fn new(optimize: Reply, extract: Reply) -> Self {
        Self { optimize, extract, calls: Mutex::new(Vec::new()) }
    }

    pub fn failing() -> Self {
        Self::new(Reply::Fail, Reply::Fail)
    }

    pub fn extraction_calls(&self) -> usize {
        self.calls.lock().unwrap().iter().filter(|r| r.expect_json).count()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TextReasoning for FakeReasoning {
    async fn generate(&self, request: TextRequest) -> Result<String, RemoteError> {
        let reply = if request.expect_json { self.extract.clone() } else { self.optimize.clone() };
        self.calls.lock().unwrap().push(request);
        match reply {
            Reply::Text(text) => Ok(text),
            Reply::Fail => Err(RemoteError::Status { status: 503, body: "UNAVAILABLE".into() }),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(String::new())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SynthCall {
    pub prompt: String,
    pub images: Vec<ImageAsset>,
}

/// Image model fake that records every call and returns `generated-<n>`.
pub struct FakeSynthesis {
    pub calls: Mutex<Vec<SynthCall>>,
    /// 1-based call number that fails.
    pub fail_on_call: Option<usize>,
    pub fail_when_prompt_contains: Option<String>,
    pub failure: fn() -> RemoteError,
    pub delay: Option<Duration>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl Default for FakeSynthesis {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on_call: None,
            fail_when_prompt_contains: None,
            failure: || RemoteError::Status { status: 429, body: "RESOURCE_EXHAUSTED".into() },
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl FakeSynthesis {
    pub fn failing_on(call: usize) -> Self {
        Self { fail_on_call: Some(call), ..Default::default() }
    }

    pub fn calls(&self) -> Vec<SynthCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MultimodalSynthesis for FakeSynthesis {
    async fn generate(
        &self,
        prompt: &str,
        images: &[ImageAsset],
    ) -> Result<SynthesisOutput, RemoteError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(SynthCall { prompt: prompt.to_string(), images: images.to_vec() });
            calls.len()
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let prompt_fails = self
            .fail_when_prompt_contains
            .as_deref()
            .is_some_and(|s| prompt.contains(s));
        if self.fail_on_call == Some(n) || prompt_fails {
            return Err((self.failure)());
        }
        Ok(SynthesisOutput::Image {
            bytes: Bytes::from(format!("generated-{n}")),
            mime_type: "image/png".into(),
        })
    }
}

pub fn orchestrator(
    reasoning: Arc<FakeReasoning>,
    synthesis: Arc<FakeSynthesis>,
) -> PipelineOrchestrator {
    orchestrator_with_timeout(reasoning, synthesis, Duration::from_secs(5))
}

pub fn orchestrator_with_timeout(
    reasoning: Arc<FakeReasoning>,
    synthesis: Arc<FakeSynthesis>,
    timeout: Duration,
) -> PipelineOrchestrator {
    let settings = PipelineSettings { remote_timeout: timeout };
    PipelineOrchestrator::new(reasoning, synthesis, settings)
}
