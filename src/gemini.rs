use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::Cursor;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::models::ImageAsset;
use crate::providers::{
    MultimodalSynthesis, RemoteError, SynthesisOutput, TextReasoning, TextRequest,
};

/// Finish reasons that mean the model refused rather than simply not drawing.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "IMAGE_SAFETY",
    "PROHIBITED_CONTENT",
    "IMAGE_PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
    "RECITATION",
];

const PLACEHOLDER_COLORS: [[u8; 3]; 5] = [
    [0x3B, 0x82, 0xF6],
    [0xEF, 0x44, 0x44],
    [0x10, 0xB9, 0x81],
    [0xF5, 0x9E, 0x0B],
    [0x8B, 0x5C, 0xF6],
];

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let Value::String(s) = val {
                        if s.len() > 100 {
                            *s = format!("{}...[truncated {} chars]", &s[..50], s.len() - 50);
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

fn loggable(value: &Value) -> String {
    let mut copy = value.clone();
    truncate_base64_in_json(&mut copy);
    serde_json::to_string(&copy).unwrap_or_default()
}

fn inline_part(image: &ImageAsset) -> Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type(),
            "data": base64::engine::general_purpose::STANDARD.encode(image.bytes()),
        }
    })
}

pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    image_model: String,
    text_model: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.api_base.trim_end_matches('/').to_string(),
            image_model: config.image_model.clone(),
            text_model: config.text_model.clone(),
        }
    }

    pub fn is_demo(&self) -> bool {
        self.api_key.is_none()
    }

    async fn perform_api_call(
        &self,
        model: &str,
        body: &Value,
    ) -> Result<GeminiResponse, RemoteError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| RemoteError::Unavailable("no GEMINI_API_KEY configured".into()))?;
        let url = format!("{}/models/{}:generateContent?key={}", self.base_url, model, api_key);

        info!("🔗 Making request to: {}", url.replace(api_key, "***"));
        debug!("📤 Request body: {}", loggable(body));

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        let response_text = response
            .text()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        if !status.is_success() {
            error!("❌ API Error response: {}", response_text);
            return Err(RemoteError::Status { status: status.as_u16(), body: response_text });
        }

        if let Ok(value) = serde_json::from_str::<Value>(&response_text) {
            debug!("📥 Raw Gemini API response: {}", loggable(&value));
        }

        serde_json::from_str(&response_text)
            .map_err(|e| RemoteError::Decode(format!("parse error: {}", e)))
    }

    fn placeholder_image(
        prompt: &str,
        reference_count: usize,
    ) -> Result<SynthesisOutput, RemoteError> {
        let pick = (prompt.len() + reference_count) % PLACEHOLDER_COLORS.len();
        let [r, g, b] = PLACEHOLDER_COLORS[pick];
        let (w, h) = (512u32, 512u32);
        let img = image::RgbImage::from_fn(w, h, |x, y| {
            // fade toward white along the diagonal
            let t = (x + y) as f32 / (w + h) as f32 * 0.4;
            let mix = |c: u8| (c as f32 + (255.0 - c as f32) * t) as u8;
            image::Rgb([mix(r), mix(g), mix(b)])
        });
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png)
            .map_err(|e| RemoteError::Unavailable(format!("placeholder encoding failed: {}", e)))?;
        Ok(SynthesisOutput::Image {
            bytes: Bytes::from(buf.into_inner()),
            mime_type: "image/png".into(),
        })
    }
}

#[async_trait]
impl TextReasoning for GeminiClient {
    async fn generate(&self, request: TextRequest) -> Result<String, RemoteError> {
        if self.is_demo() {
            info!("Using demo mode - no text reasoning available");
            return Err(RemoteError::Unavailable("demo mode".into()));
        }

        let mut parts: Vec<Value> = request.images.iter().map(inline_part).collect();
        parts.push(json!({ "text": request.input }));
        let mut generation_config = json!({
            "temperature": 0.4,
            "topK": 40,
            "topP": 0.95,
            "maxOutputTokens": 2048
        });
        if request.expect_json {
            generation_config["responseMimeType"] = json!("application/json");
        }
        let body = json!({
            "systemInstruction": { "parts": [{ "text": request.system_instructions }] },
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": generation_config
        });

        info!("Generating text with Gemini API ({})...", self.text_model);
        let parsed = self.perform_api_call(&self.text_model, &body).await?;
        let text = extract_text(&parsed)?;
        if text.is_empty() {
            warn!("⚠️ Gemini returned no text content");
        }
        Ok(text)
    }
}

#[async_trait]
impl MultimodalSynthesis for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        images: &[ImageAsset],
    ) -> Result<SynthesisOutput, RemoteError> {
        if self.is_demo() {
            info!("Using demo mode - generating placeholder image");
            return Self::placeholder_image(prompt, images.len());
        }

        let mut parts = vec![json!({ "text": prompt })];
        parts.extend(images.iter().map(inline_part));
        let body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "temperature": 0.4,
                "topP": 0.95,
                "topK": 64,
                "candidateCount": 1
            }
        });

        info!("Generating image with Gemini API ({})...", self.image_model);
        let parsed = self.perform_api_call(&self.image_model, &body).await?;
        interpret_image_response(&parsed)
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text { text: String },
    Other(Value),
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

fn extract_text(resp: &GeminiResponse) -> Result<String, RemoteError> {
    if let Some(reason) = resp.prompt_feedback.as_ref().and_then(|f| f.block_reason.clone()) {
        return Err(RemoteError::Blocked(reason));
    }
    let text = resp
        .candidates
        .iter()
        .flat_map(|c| c.content.parts.iter())
        .filter_map(|p| match p {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("");
    Ok(text.trim().to_string())
}

fn interpret_image_response(resp: &GeminiResponse) -> Result<SynthesisOutput, RemoteError> {
    if let Some(reason) = resp.prompt_feedback.as_ref().and_then(|f| f.block_reason.clone()) {
        return Ok(SynthesisOutput::Blocked { reason });
    }

    for c in &resp.candidates {
        for p in &c.content.parts {
            if let Part::Inline { inline_data } = p {
                info!("🎯 Found image data with mime type: {}", inline_data.mime_type);
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(inline_data.data.as_bytes())
                    .map_err(|e| RemoteError::Decode(format!("invalid base64 image data: {}", e)))?;
                return Ok(SynthesisOutput::Image {
                    bytes: Bytes::from(bytes),
                    mime_type: inline_data.mime_type.clone(),
                });
            }
        }
    }

    if let Some(reason) = resp
        .candidates
        .iter()
        .filter_map(|c| c.finish_reason.as_deref())
        .find(|r| BLOCKING_FINISH_REASONS.contains(r))
    {
        return Ok(SynthesisOutput::Blocked { reason: reason.to_string() });
    }

    info!("⚠️ No inline image data found in response structure");
    let text = extract_text(resp).ok().filter(|t| !t.is_empty());
    Ok(SynthesisOutput::NoImage { text })
}
