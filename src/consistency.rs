use crate::angles::describe_angle;
use crate::models::{DesignParameters, DesignSpecification};

/// A view angle with its camera description, as used in prompts.
#[derive(Debug, Clone)]
pub struct AngleView {
    pub angle: String,
    pub description: String,
}

impl AngleView {
    pub fn new(angle: &str) -> Self {
        Self {
            angle: angle.to_string(),
            description: describe_angle(angle),
        }
    }
}

/// Renders the extracted specification as hard constraints. Only the camera
/// viewpoint is allowed to change.
pub fn build(spec: &DesignSpecification, view: &AngleView) -> String {
    let mut out = String::from(
        "STRICT DESIGN CONSISTENCY MODE. The first attached image is the canonical design of this product. \
Reproduce that exact design on the product from a new camera angle.\n\nDESIGN SPECIFICATION (mandatory):\n",
    );

    let rules: [(&[String], &str); 6] = [
        (spec.primary_colors.as_slice(), "MUST preserve the primary color palette exactly"),
        (spec.secondary_colors.as_slice(), "MUST preserve the secondary/accent colors exactly"),
        (
            spec.patterns.as_slice(),
            "MUST use the identical pattern(s), same scale, placement and orientation",
        ),
        (
            spec.branding_elements.as_slice(),
            "MUST reproduce the branding elements in the same position and style",
        ),
        (spec.structural_features.as_slice(), "MUST keep the structural features unchanged"),
        (spec.materials.as_slice(), "MUST render the same materials and surface finish"),
    ];
    for (items, rule) in rules {
        if !items.is_empty() {
            out.push_str(&format!("- {}: {}\n", rule, items.join(", ")));
        }
    }

    out.push_str(&format!(
        "\nTHE ONLY PERMITTED CHANGE: camera angle. Show the product as a {} ({}). \
Do not add, remove, recolor or restyle any element listed above. \
Use the second attached image (product template for this view) only for shape and perspective.",
        view.description, view.angle
    ));
    out
}

/// Prompt for when no usable specification exists: copy the canonical image.
pub fn visual_reference_prompt(view: &AngleView) -> String {
    format!(
        "The first attached image shows the finished design of this product. \
Generate the same product with exactly the same design, colors, patterns, materials and logo placement, \
viewed as a {} ({}). Change nothing except the camera angle. \
Use the second attached image (product template for this view) only for shape and perspective.",
        view.description, view.angle
    )
}

/// Original design parameters appended as secondary context.
pub fn with_parameter_context(prompt: String, params: &DesignParameters) -> String {
    let fields = params.labeled_fields();
    if fields.is_empty() {
        return prompt;
    }
    let context = fields
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join("; ");
    format!(
        "{prompt}\n\nOriginal design brief for the {} \
(secondary context only, the canonical image takes precedence): {context}.",
        params.product_type
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DesignParametersInput;

    fn spec() -> DesignSpecification {
        DesignSpecification {
            primary_colors: vec!["pastel pink".into(), "mint".into()],
            patterns: vec!["cherry blossom repeat".into()],
            ..Default::default()
        }
    }

    #[test]
    fn renders_only_populated_fields() {
        let prompt = build(&spec(), &AngleView::new("side"));
        assert!(prompt.contains("MUST preserve the primary color palette exactly: pastel pink, mint"));
        assert!(prompt.contains(
            "MUST use the identical pattern(s), same scale, placement and orientation: cherry blossom repeat"
        ));
        assert!(!prompt.contains("branding elements"));
        assert!(prompt.contains("side profile view at eye level (side)"));
    }

    #[test]
    fn visual_prompt_has_no_specification_language() {
        let prompt = visual_reference_prompt(&AngleView::new("45degree"));
        assert!(!prompt.contains("DESIGN SPECIFICATION"));
        assert!(!prompt.contains("MUST"));
        assert!(prompt.contains("45 degree"));
    }

    #[test]
    fn parameter_context_is_appended() {
        let params = DesignParametersInput {
            theme: "Spring".into(),
            color: "Pastel".into(),
            ..Default::default()
        }
        .validate()
        .unwrap();
        let prompt = with_parameter_context("base".into(), &params);
        assert!(prompt.starts_with("base\n\n"));
        assert!(prompt.ends_with("Theme: Spring; Color: Pastel."));
    }
}
