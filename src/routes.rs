use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::angles::TemplateSet;
use crate::error::{ErrorClass, PipelineError, PipelineStage};
use crate::models::{
    AngleRequest, DesignParameters, DesignParametersInput, DesignSpecification, GenerationResult,
    ImageAsset, ImageRole,
};
use crate::pipeline::PipelineOrchestrator;
use crate::prompt_optimizer::PromptSource;
use crate::variants::VariantRunner;

/// Base64 images make bodies large; allow a handful of multi-megabyte uploads.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub variants: Arc<VariantRunner>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/designs", post(generate_design))
        .route("/api/designs/variants", post(generate_variants))
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

#[serde_as]
#[derive(Debug, Deserialize)]
pub struct TemplateUpload {
    /// Unlabeled uploads are the generic template.
    #[serde(default)]
    pub angle: Option<String>,
    #[serde_as(as = "Base64")]
    pub data: Vec<u8>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
pub struct DesignRequest {
    pub angles: Vec<String>,
    #[serde(default)]
    pub parameters: DesignParametersInput,
    #[serde(default)]
    pub templates: Vec<TemplateUpload>,
    #[serde_as(as = "Option<Base64>")]
    pub logo: Option<Vec<u8>>,
    #[serde_as(as = "Option<Base64>")]
    pub style_reference: Option<Vec<u8>>,
}

#[derive(Debug, Deserialize)]
pub struct VariantsRequest {
    #[serde(flatten)]
    pub design: DesignRequest,
    pub count: usize,
}

impl DesignRequest {
    fn into_inputs(self) -> Result<(AngleRequest, DesignParameters, TemplateSet), PipelineError> {
        let angles = AngleRequest::new(&self.angles)?;
        let mut params = self.parameters.validate()?;
        if let Some(logo) = self.logo {
            params = params.with_logo(upload(logo, ImageRole::Logo, "logo")?);
        }
        if let Some(reference) = self.style_reference {
            let reference = upload(reference, ImageRole::Reference, "style reference")?;
            params = params.with_style_reference(reference);
        }

        let mut templates = TemplateSet::new();
        let mut has_generic = false;
        for t in self.templates {
            match t.angle.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
                Some(angle) => {
                    let what = format!("template for '{angle}'");
                    let asset = upload(t.data, ImageRole::Template, &what)?;
                    templates.insert(angle, asset);
                }
                None if has_generic => {
                    return Err(PipelineError::InvalidRequest(
                        "at most one unlabeled template may be uploaded".into(),
                    ));
                }
                None => {
                    templates.set_generic(upload(t.data, ImageRole::Template, "generic template")?);
                    has_generic = true;
                }
            }
        }
        Ok((angles, params, templates))
    }
}

fn upload(data: Vec<u8>, role: ImageRole, what: &str) -> Result<ImageAsset, PipelineError> {
    ImageAsset::sniff(data, role)
        .map_err(|e| PipelineError::InvalidRequest(format!("{what}: {e}")))
}

#[serde_as]
#[derive(Debug, Serialize)]
pub struct GeneratedImage {
    pub angle: String,
    pub mime_type: String,
    #[serde_as(as = "Base64")]
    pub data: Bytes,
}

#[derive(Debug, Serialize)]
pub struct DesignResponse {
    pub request_id: Uuid,
    pub images: Vec<GeneratedImage>,
    pub specification: Option<DesignSpecification>,
    pub canonical_prompt: PromptSource,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl From<GenerationResult> for DesignResponse {
    fn from(result: GenerationResult) -> Self {
        let images = result
            .iter()
            .map(|(angle, image)| GeneratedImage {
                angle: angle.to_string(),
                mime_type: image.mime_type().to_string(),
                data: image.bytes().clone(),
            })
            .collect();
        Self {
            request_id: result.request_id,
            images,
            specification: result.specification,
            canonical_prompt: result.canonical_prompt_source,
            started_at: result.started_at,
            completed_at: result.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub class: ErrorClass,
    pub stage: PipelineStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub completed_angles: Vec<String>,
}

impl From<&PipelineError> for ErrorBody {
    fn from(err: &PipelineError) -> Self {
        let (angle_index, angle, completed_angles) = match err {
            PipelineError::AngleGenerationFailed {
                index,
                angle,
                completed,
                ..
            } => (Some(*index), Some(angle.clone()), completed.clone()),
            PipelineError::CanonicalGenerationFailed { angle, .. } => {
                (Some(1), Some(angle.clone()), Vec::new())
            }
            _ => (None, None, Vec::new()),
        };
        Self {
            error: err.to_string(),
            class: err.class(),
            stage: err.stage(),
            angle_index,
            angle,
            completed_angles,
        }
    }
}

pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

fn status_for(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::Client => StatusCode::BAD_REQUEST,
        ErrorClass::Server => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (status_for(self.0.class()), Json(ErrorBody::from(&self.0))).into_response()
    }
}

pub async fn generate_design(
    State(state): State<AppState>,
    Json(body): Json<DesignRequest>,
) -> Result<Json<DesignResponse>, ApiError> {
    let (angles, params, templates) = body.into_inputs()?;
    tracing::info!("🚀 Generating design for {} angle(s)", angles.len());
    let result = state.orchestrator.run_pipeline(&angles, &params, &templates).await?;
    Ok(Json(result.into()))
}

#[derive(Debug, Serialize)]
pub struct VariantBody {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub design: Option<DesignResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct VariantsResponse {
    pub variants: Vec<VariantBody>,
}

pub async fn generate_variants(
    State(state): State<AppState>,
    Json(body): Json<VariantsRequest>,
) -> Result<Json<VariantsResponse>, ApiError> {
    let count = body.count;
    let (angles, params, templates) = body.design.into_inputs()?;
    tracing::info!("🎯 Generating {} variant(s) for {} angle(s)", count, angles.len());
    let outcomes = state
        .variants
        .run_variants(Arc::new(angles), Arc::new(params), Arc::new(templates), count)
        .await?;

    if outcomes.iter().all(|o| o.result.is_err()) {
        if let Some(first) = outcomes.into_iter().find_map(|o| o.result.err()) {
            return Err(first.into());
        }
        return Ok(Json(VariantsResponse { variants: Vec::new() }));
    }

    let variants = outcomes
        .into_iter()
        .map(|o| match o.result {
            Ok(result) => VariantBody {
                index: o.index,
                design: Some(result.into()),
                error: None,
            },
            Err(e) => VariantBody {
                index: o.index,
                design: None,
                error: Some(ErrorBody::from(&e)),
            },
        })
        .collect();
    tracing::info!("✅ Variants generated");
    Ok(Json(VariantsResponse { variants }))
}
