use tracing::{debug, info};

use crate::error::PipelineError;
use crate::models::{AngleRequest, ImageAsset, ImageRole};

/// Uploaded templates: angle-specific ones in upload order, plus an optional
/// unlabeled one.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    by_angle: Vec<(String, ImageAsset)>,
    generic: Option<ImageAsset>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A later upload for the same angle replaces the earlier one but keeps
    /// its upload position.
    pub fn insert(&mut self, angle: impl Into<String>, asset: ImageAsset) {
        let angle = angle.into().trim().to_string();
        let asset = asset.with_role(ImageRole::Template);
        match self.by_angle.iter_mut().find(|(a, _)| *a == angle) {
            Some(slot) => slot.1 = asset,
            None => self.by_angle.push((angle, asset)),
        }
    }

    pub fn with_angle(mut self, angle: impl Into<String>, asset: ImageAsset) -> Self {
        self.insert(angle, asset);
        self
    }

    pub fn set_generic(&mut self, asset: ImageAsset) {
        self.generic = Some(asset.with_role(ImageRole::Template));
    }

    pub fn with_generic(mut self, asset: ImageAsset) -> Self {
        self.set_generic(asset);
        self
    }

    pub fn get(&self, angle: &str) -> Option<&ImageAsset> {
        self.by_angle.iter().find(|(a, _)| a == angle).map(|(_, t)| t)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Dedicated,
    Generic,
    Fallback { from_angle: String },
}

#[derive(Debug, Clone)]
pub struct ResolvedTemplate {
    pub angle: String,
    pub template: ImageAsset,
    pub source: TemplateSource,
}

/// Total angle -> template mapping, in request order.
#[derive(Debug, Clone)]
pub struct ResolvedAngles {
    entries: Vec<ResolvedTemplate>,
}

impl ResolvedAngles {
    pub fn canonical(&self) -> &ResolvedTemplate {
        &self.entries[0]
    }

    pub fn remaining(&self) -> &[ResolvedTemplate] {
        &self.entries[1..]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedTemplate> {
        self.entries.iter()
    }
}

/// Maps every requested angle to a template.
///
/// Missing angles borrow a fallback template, chosen as: the canonical
/// angle's own template, else the earliest requested angle that has one.
/// When no requested angle has a template the generic upload serves every
/// angle, and only without one does the first upload for an unrequested
/// angle become the fallback.
pub fn resolve(
    angles: &AngleRequest,
    templates: &TemplateSet,
) -> Result<ResolvedAngles, PipelineError> {
    let requested = angles
        .as_slice()
        .iter()
        .find_map(|a| templates.get(a).map(|t| (a.as_str(), t)));

    let entries = match (requested, templates.generic.as_ref()) {
        (Some((from_angle, fallback)), _) => {
            with_fallback(angles, templates, from_angle, fallback)
        }
        (None, Some(generic)) => {
            info!(
                "🧩 No requested angle has a template; using the generic template for all {} angles",
                angles.len()
            );
            angles
                .as_slice()
                .iter()
                .map(|a| ResolvedTemplate {
                    angle: a.clone(),
                    template: generic.clone(),
                    source: TemplateSource::Generic,
                })
                .collect()
        }
        (None, None) => match templates.by_angle.first() {
            Some((from_angle, fallback)) => {
                with_fallback(angles, templates, from_angle, fallback)
            }
            None => return Err(PipelineError::MissingTemplate),
        },
    };

    Ok(ResolvedAngles { entries })
}

fn with_fallback(
    angles: &AngleRequest,
    templates: &TemplateSet,
    from_angle: &str,
    fallback: &ImageAsset,
) -> Vec<ResolvedTemplate> {
    angles
        .as_slice()
        .iter()
        .map(|a| match templates.get(a) {
            Some(t) => ResolvedTemplate {
                angle: a.clone(),
                template: t.clone(),
                source: TemplateSource::Dedicated,
            },
            None => {
                debug!("Angle '{}' has no template, falling back to '{}'", a, from_angle);
                ResolvedTemplate {
                    angle: a.clone(),
                    template: fallback.clone(),
                    source: TemplateSource::Fallback { from_angle: from_angle.to_string() },
                }
            }
        })
        .collect()
}

/// Camera description used in prompts for a view angle.
pub fn describe_angle(angle: &str) -> String {
    let normalized = angle.trim().to_lowercase().replace(['_', ' '], "-");
    let known = match normalized.as_str() {
        "top" => "top-down view, camera looking straight down at the product",
        "45degree" | "45-degree" | "45deg" => "three-quarter view from a 45 degree elevated angle",
        "three-quarter" => "three-quarter view showing the front and one side",
        "side" => "side profile view at eye level",
        "bottom" => "bottom view showing the underside of the product",
        "front" => "straight-on front view at eye level",
        "back" => "straight-on rear view at eye level",
        _ => return format!("{} view", angle.trim()),
    };
    known.to_string()
}
