use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{AssetError, PipelineError};
use crate::prompt_optimizer::PromptSource;

const MAX_FIELD_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 2000;
const DEFAULT_PRODUCT_TYPE: &str = "product";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRole {
    Template,
    Reference,
    Logo,
    Canonical,
    Result,
}

/// Image bytes plus MIME type and the role the image plays in a request.
///
/// Assets are immutable; [`ImageAsset::with_role`] shares the underlying
/// buffer rather than copying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    bytes: Bytes,
    mime_type: String,
    role: ImageRole,
}

impl ImageAsset {
    pub fn new(bytes: impl Into<Bytes>, mime_type: impl Into<String>, role: ImageRole) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            role,
        }
    }

    /// Builds an asset whose MIME type is taken from the payload's magic bytes.
    pub fn sniff(bytes: impl Into<Bytes>, role: ImageRole) -> Result<Self, AssetError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(AssetError::Empty);
        }
        let format = image::guess_format(&bytes).map_err(|_| AssetError::UnrecognizedFormat)?;
        let mime_type = format.to_mime_type();
        if !matches!(mime_type, "image/png" | "image/jpeg" | "image/webp") {
            return Err(AssetError::UnsupportedMime(mime_type.to_string()));
        }
        Ok(Self { bytes, mime_type: mime_type.to_string(), role })
    }

    pub fn with_role(&self, role: ImageRole) -> Self {
        Self { bytes: self.bytes.clone(), mime_type: self.mime_type.clone(), role }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn role(&self) -> ImageRole {
        self.role
    }
}

/// Ordered, non-empty list of distinct view angles. The first entry is the
/// canonical angle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AngleRequest {
    angles: Vec<String>,
}

impl AngleRequest {
    pub fn new<I, S>(angles: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for raw in angles {
            let angle = raw.as_ref().trim();
            if angle.is_empty() {
                return Err(invalid("angle identifiers must not be blank"));
            }
            if !seen.insert(angle.to_string()) {
                return Err(invalid(format!("angle '{angle}' requested more than once")));
            }
            out.push(angle.to_string());
        }
        if out.is_empty() {
            return Err(invalid("at least one angle must be requested"));
        }
        Ok(Self { angles: out })
    }

    pub fn canonical(&self) -> &str {
        &self.angles[0]
    }

    /// Angles after the canonical one, in request order.
    pub fn remaining(&self) -> &[String] {
        &self.angles[1..]
    }

    pub fn as_slice(&self) -> &[String] {
        &self.angles
    }

    pub fn len(&self) -> usize {
        self.angles.len()
    }
}

/// Raw, unvalidated design parameters as they arrive at the boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DesignParametersInput {
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub material: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub product_type: Option<String>,
}

impl DesignParametersInput {
    pub fn validate(self) -> Result<DesignParameters, PipelineError> {
        let theme = clean_field("theme", &self.theme, MAX_FIELD_LEN)?;
        let style = clean_field("style", &self.style, MAX_FIELD_LEN)?;
        let color = clean_field("color", &self.color, MAX_FIELD_LEN)?;
        let material = clean_field("material", &self.material, MAX_FIELD_LEN)?;
        let description = clean_field("description", &self.description, MAX_DESCRIPTION_LEN)?;
        let product_type = self.product_type.as_deref().unwrap_or_default();
        let product_type = clean_field("product_type", product_type, MAX_FIELD_LEN)?;

        if [&theme, &style, &color, &material, &description].iter().all(|f| f.is_empty()) {
            return Err(invalid(
                "at least one of theme, style, color, material or description is required",
            ));
        }

        Ok(DesignParameters {
            theme,
            style,
            color,
            material,
            description,
            product_type: if product_type.is_empty() {
                DEFAULT_PRODUCT_TYPE.to_string()
            } else {
                product_type
            },
            logo: None,
            style_reference: None,
        })
    }
}

fn invalid(message: impl Into<String>) -> PipelineError {
    PipelineError::InvalidRequest(message.into())
}

fn clean_field(name: &str, value: &str, max: usize) -> Result<String, PipelineError> {
    let value = value.trim();
    if value.chars().count() > max {
        return Err(PipelineError::InvalidRequest(format!("{name} exceeds {max} characters")));
    }
    Ok(value.to_string())
}

/// Validated design parameters shared by every angle of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignParameters {
    pub theme: String,
    pub style: String,
    pub color: String,
    pub material: String,
    pub description: String,
    pub product_type: String,
    logo: Option<ImageAsset>,
    style_reference: Option<ImageAsset>,
}

impl DesignParameters {
    pub fn with_logo(mut self, logo: ImageAsset) -> Self {
        self.logo = Some(logo.with_role(ImageRole::Logo));
        self
    }

    pub fn with_style_reference(mut self, reference: ImageAsset) -> Self {
        self.style_reference = Some(reference.with_role(ImageRole::Reference));
        self
    }

    pub fn logo(&self) -> Option<&ImageAsset> {
        self.logo.as_ref()
    }

    pub fn style_reference(&self) -> Option<&ImageAsset> {
        self.style_reference.as_ref()
    }

    /// Non-empty `(label, value)` pairs in a fixed order.
    pub fn labeled_fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("Theme", self.theme.as_str()),
            ("Style", self.style.as_str()),
            ("Color", self.color.as_str()),
            ("Material", self.material.as_str()),
            ("Description", self.description.as_str()),
        ]
        .into_iter()
        .filter(|(_, v)| !v.is_empty())
        .collect()
    }
}

/// Structured description of what the canonical image actually shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignSpecification {
    #[serde(default)]
    pub primary_colors: Vec<String>,
    #[serde(default)]
    pub secondary_colors: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub branding_elements: Vec<String>,
    #[serde(default)]
    pub structural_features: Vec<String>,
    #[serde(default)]
    pub materials: Vec<String>,
}

impl DesignSpecification {
    /// A specification only counts if it pins down colors, patterns or branding.
    pub fn is_usable(&self) -> bool {
        !(self.primary_colors.is_empty()
            && self.secondary_colors.is_empty()
            && self.patterns.is_empty()
            && self.branding_elements.is_empty())
    }

    /// Trims entries, drops blanks and removes case-insensitive duplicates.
    pub fn normalized(self) -> Self {
        fn clean(items: Vec<String>) -> Vec<String> {
            let mut seen = HashSet::new();
            items
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
                .collect()
        }
        Self {
            primary_colors: clean(self.primary_colors),
            secondary_colors: clean(self.secondary_colors),
            patterns: clean(self.patterns),
            branding_elements: clean(self.branding_elements),
            structural_features: clean(self.structural_features),
            materials: clean(self.materials),
        }
    }
}

/// Complete angle -> image mapping for one request, in request order.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub request_id: Uuid,
    images: Vec<(String, ImageAsset)>,
    pub specification: Option<DesignSpecification>,
    pub canonical_prompt_source: PromptSource,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl GenerationResult {
    /// Checks that `images` covers exactly the requested angles and orders
    /// the entries to match the request.
    pub fn assemble(
        request_id: Uuid,
        angles: &AngleRequest,
        mut images: Vec<(String, ImageAsset)>,
        specification: Option<DesignSpecification>,
        canonical_prompt_source: PromptSource,
        started_at: DateTime<Utc>,
    ) -> Result<Self, PipelineError> {
        let missing: Vec<String> = angles
            .as_slice()
            .iter()
            .filter(|a| !images.iter().any(|(k, _)| k == *a))
            .cloned()
            .collect();
        let mut seen = HashSet::new();
        let unexpected: Vec<String> = images
            .iter()
            .filter(|(k, _)| !angles.as_slice().contains(k) || !seen.insert(k.as_str()))
            .map(|(k, _)| k.clone())
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(PipelineError::IncompleteResult { missing, unexpected });
        }

        images.sort_by_key(|(k, _)| angles.as_slice().iter().position(|a| a == k));
        Ok(Self {
            request_id,
            images,
            specification,
            canonical_prompt_source,
            started_at,
            completed_at: Utc::now(),
        })
    }

    pub fn get(&self, angle: &str) -> Option<&ImageAsset> {
        self.images.iter().find(|(k, _)| k == angle).map(|(_, v)| v)
    }

    pub fn angles(&self) -> impl Iterator<Item = &str> {
        self.images.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ImageAsset)> {
        self.images.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }
}
