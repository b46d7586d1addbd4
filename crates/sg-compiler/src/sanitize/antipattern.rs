use std::sync::OnceLock;

use regex::Regex;

use super::text::{line_of, mask_literals, matching_close, slice};

/// Reports `.map(...)` callbacks that copy a ref's `.current` position into
/// element props while rendering. Detection only; the text is not changed.
pub(crate) fn detect_render_time_ref_positions(text: &str) -> Vec<String> {
    let mask = mask_literals(text);
    let mut warnings = Vec::new();
    for found in map_call_regex().find_iter(&mask) {
        let paren = found.end() - 1;
        let Some(close) = matching_close(&mask, paren) else {
            continue;
        };
        let callback = slice(&mask, paren, close);
        let Some(position) = ref_position_regex().find(callback) else {
            continue;
        };
        warnings.push(format!(
            "line {}: .map() callback bakes a ref's .current position into element props at render time; it will not follow the ref",
            line_of(text, paren + position.start())
        ));
    }
    warnings
}

fn map_call_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\.\s*map\s*\(").expect("map call regex"))
}

fn ref_position_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\bposition\s*:\s*[^,}\n]*\.current\b").expect("ref position regex")
    })
}

#[cfg(test)]
mod antipattern_tests {
    use super::*;

    #[test]
    fn flags_ref_position_inside_map_callback() {
        let text = "const dots = items.map((item, i) =>\n  React.createElement('mesh', { key: i, position: refs[i].current.position })\n);";
        let warnings = detect_render_time_ref_positions(text);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("line 2:"));
    }

    #[test]
    fn ignores_plain_positions_and_refs_outside_map() {
        let text = "items.map((p) => React.createElement('mesh', { position: p }));\nconst x = { position: ref.current.position };";
        assert!(detect_render_time_ref_positions(text).is_empty());
    }
}
