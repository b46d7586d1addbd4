mod antipattern;
mod geometry;
mod hooks;
mod material;
mod refs;
mod shadow;
pub(crate) mod text;
mod unicode;

use sg_core::{GuardConfig, SanitizeOutput};

/// Rule categories in the order the pipeline applies them.
pub const RULE_CATEGORIES: &[&str] = &[
    "shadow",
    "hooks",
    "unicode",
    "geometry",
    "geometry-reversal",
    "ref-geometry",
    "bounding-sphere",
    "antipattern",
    "material",
];

/// Runs the ordered rewrite rules over validated unit code.
pub fn sanitize_source(source: &str, config: &GuardConfig) -> SanitizeOutput {
    let host_bindings = config.host_bindings();
    let mut fixes = Vec::new();

    let text = shadow::strip_shadowing(source, &host_bindings, &mut fixes);
    let text = hooks::hoist_hooks(&text, config.sanitizer.hoist_pass_limit, &mut fixes);
    let text = unicode::normalize_unicode(&text, &mut fixes);
    let text = geometry::convert_inline_geometry(&text, &mut fixes);
    let text = geometry::reverse_imperative_geometry(&text, &mut fixes);
    let text = refs::fix_ref_set_from_points(&text, &mut fixes);
    let text = refs::strip_bounding_sphere(&text, &mut fixes);
    let warnings = antipattern::detect_render_time_ref_positions(&text);
    let text = material::convert_inline_material(&text, &mut fixes);

    for fix in &fixes {
        log::info!("sanitizer [{}] {}", fix.category, fix.description);
    }
    for warning in &warnings {
        log::warn!("sanitizer [antipattern] {}", warning);
    }

    SanitizeOutput {
        sanitized_text: text,
        fixes_applied: fixes,
        warnings,
    }
}
