use std::sync::OnceLock;

use regex::Regex;
use sg_core::FixRecord;

use super::text::{
    apply_edits, enclosing_open, mask_literals, matching_close, next_non_space,
    preceded_by_binding_token, root_identifier_positions, slice, TextEdit,
};

const INLINE_CATEGORY: &str = "geometry";
const REVERSAL_CATEGORY: &str = "geometry-reversal";

/// Instance methods that only exist on constructed geometry objects.
const IMPERATIVE_GEOMETRY_METHODS: &[&str] = &[
    "rotateX",
    "rotateY",
    "rotateZ",
    "translate",
    "scale",
    "center",
    "setAttribute",
    "getAttribute",
    "deleteAttribute",
    "setIndex",
    "computeVertexNormals",
    "computeBoundingBox",
    "computeBoundingSphere",
    "applyMatrix4",
    "applyQuaternion",
    "toNonIndexed",
    "setFromPoints",
    "normalizeNormals",
    "lookAt",
    "dispose",
    "clone",
    "copy",
];

/// Arguments of a matched constructor call: trimmed source text and the
/// matching slice of the literal mask.
pub(crate) struct ConstructorArgs<'a> {
    pub text: &'a str,
    pub mask: &'a str,
}

/// Rewrites `new [THREE.]<Class>(args)` passed directly as an element-creation
/// child into the declarative element. Constructions that are stored, returned
/// or used as a property value are left alone.
pub(crate) fn convert_inline_constructions(
    text: &str,
    pattern: &Regex,
    category: &str,
    element_props: fn(&ConstructorArgs<'_>) -> String,
    fixes: &mut Vec<FixRecord>,
) -> String {
    let mask = mask_literals(text);
    let bytes = mask.as_bytes();
    let mut edits: Vec<TextEdit> = Vec::new();

    for captures in pattern.captures_iter(&mask) {
        let (Some(whole), Some(class)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let start = whole.start();
        if start > 0 && bytes[start - 1] == b'.' {
            continue;
        }
        if edits
            .iter()
            .any(|edit| edit.start <= start && start < edit.end)
        {
            continue;
        }
        if preceded_by_binding_token(&mask, start) || !is_element_child(&mask, start) {
            continue;
        }
        let paren = whole.end() - 1;
        let Some(close) = matching_close(&mask, paren) else {
            continue;
        };

        let raw = slice(text, paren + 1, close);
        let lead = raw.len() - raw.trim_start().len();
        let trail = raw.len() - raw.trim_end().len();
        let args = ConstructorArgs {
            text: raw.trim(),
            mask: slice(&mask, paren + 1 + lead, close.saturating_sub(trail)),
        };
        let element = lower_first(class.as_str());
        let props = element_props(&args);
        edits.push(TextEdit::replace(
            start,
            close + 1,
            format!("React.createElement('{}', {})", element, props),
        ));
        fixes.push(FixRecord::new(
            category,
            format!(
                "converted inline new {}(...) to declarative '{}' element",
                class.as_str(),
                element
            ),
        ));
    }
    apply_edits(text, edits)
}

pub(crate) fn convert_inline_geometry(text: &str, fixes: &mut Vec<FixRecord>) -> String {
    convert_inline_constructions(
        text,
        geometry_constructor_regex(),
        INLINE_CATEGORY,
        geometry_props,
        fixes,
    )
}

fn geometry_props(args: &ConstructorArgs<'_>) -> String {
    if args.text.is_empty() {
        return "null".to_string();
    }
    format!("{{ args: [{}] }}", args.text)
}

/// The construction sits directly in the argument list of an element-creation
/// call.
fn is_element_child(mask: &str, position: usize) -> bool {
    let Some(open) = enclosing_open(mask, position) else {
        return false;
    };
    if mask.as_bytes()[open] != b'(' {
        return false;
    }
    let callee = mask[..open].trim_end();
    let Some(prefix) = callee.strip_suffix("createElement") else {
        return false;
    };
    prefix
        .bytes()
        .last()
        .map_or(true, |byte| byte == b'.' || !super::text::is_identifier_byte(byte))
}

/// Turns a declarative geometry binding back into a constructed instance when
/// the code later calls an instance-only method on it.
pub(crate) fn reverse_imperative_geometry(text: &str, fixes: &mut Vec<FixRecord>) -> String {
    let mask = mask_literals(text);
    let bytes = mask.as_bytes();
    let mut edits = Vec::new();

    for captures in declarative_binding_regex().captures_iter(&mask) {
        let (Some(whole), Some(name), Some(call)) =
            (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };
        let quote = whole.end() - 1;
        let Some(close_quote) = mask[quote + 1..]
            .find(bytes[quote] as char)
            .map(|offset| quote + 1 + offset)
        else {
            continue;
        };
        let element = slice(text, quote + 1, close_quote);
        if !element.ends_with("Geometry") {
            continue;
        }
        let Some(paren) = mask[call.end()..].find('(').map(|offset| call.end() + offset) else {
            continue;
        };
        let Some(call_close) = matching_close(&mask, paren) else {
            continue;
        };
        let Some(method) = imperative_use(&mask, name.as_str(), call_close) else {
            continue;
        };

        let args = declarative_args(text, &mask, paren, call_close).unwrap_or_default();
        let class = upper_first(element);
        edits.push(TextEdit::replace(
            call.start(),
            call_close + 1,
            format!("new THREE.{}({})", class, args),
        ));
        fixes.push(FixRecord::new(
            REVERSAL_CATEGORY,
            format!(
                "reverted '{}' binding '{}' to new THREE.{}(...) because of .{}() call",
                element,
                name.as_str(),
                class,
                method
            ),
        ));
    }
    apply_edits(text, edits)
}

fn imperative_use<'a>(mask: &'a str, name: &str, after: usize) -> Option<&'a str> {
    let bytes = mask.as_bytes();
    for position in root_identifier_positions(mask, name) {
        if position <= after {
            continue;
        }
        let Some(dot) = next_non_space(mask, position + name.len()) else {
            continue;
        };
        if bytes[dot] != b'.' {
            continue;
        }
        let Some(method_start) = next_non_space(mask, dot + 1) else {
            continue;
        };
        let method_end = (method_start..bytes.len())
            .find(|index| !super::text::is_identifier_byte(bytes[*index]))
            .unwrap_or(bytes.len());
        let method = slice(mask, method_start, method_end);
        let called = next_non_space(mask, method_end).is_some_and(|index| bytes[index] == b'(');
        if called && IMPERATIVE_GEOMETRY_METHODS.contains(&method) {
            return Some(method);
        }
    }
    None
}

fn declarative_args(text: &str, mask: &str, paren: usize, call_close: usize) -> Option<String> {
    let call_mask = slice(mask, paren, call_close);
    let found = args_key_regex().find(call_mask)?;
    let open = paren + found.end() - 1;
    let close = matching_close(mask, open)?;
    Some(slice(text, open + 1, close).trim().to_string())
}

pub(crate) fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(crate) fn upper_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn geometry_constructor_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\bnew\s+(?:THREE\.)?([A-Z][A-Za-z0-9]*Geometry)\s*\(")
            .expect("geometry constructor regex")
    })
}

fn declarative_binding_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r#"\b(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*((?:React\.)?createElement)\s*\(\s*['"]"#,
        )
        .expect("declarative binding regex")
    })
}

fn args_key_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\bargs\s*:\s*\[").expect("args key regex"))
}

#[cfg(test)]
mod geometry_tests {
    use super::*;

    fn inline(text: &str) -> (String, Vec<FixRecord>) {
        let mut fixes = Vec::new();
        let out = convert_inline_geometry(text, &mut fixes);
        (out, fixes)
    }

    fn reverse(text: &str) -> (String, Vec<FixRecord>) {
        let mut fixes = Vec::new();
        let out = reverse_imperative_geometry(text, &mut fixes);
        (out, fixes)
    }

    #[test]
    fn converts_inline_child_geometry() {
        let (out, fixes) = inline("React.createElement('mesh', null, new THREE.BoxGeometry(1,1,1))");
        assert_eq!(
            out,
            "React.createElement('mesh', null, React.createElement('boxGeometry', { args: [1,1,1] }))"
        );
        assert_eq!(fixes[0].category, "geometry");

        let (out, _) = inline("createElement('mesh', null, new PlaneGeometry())");
        assert_eq!(
            out,
            "createElement('mesh', null, React.createElement('planeGeometry', null))"
        );
    }

    #[test]
    fn leaves_stored_returned_and_non_child_constructions() {
        let text = "const g = new THREE.BoxGeometry(1, 1, 1);\nfunction f() { return new THREE.SphereGeometry(2); }\nconst props = { geometry: new THREE.BoxGeometry() };\nconst make = () => new THREE.TorusGeometry(1, 0.2);\nmesh.add(new THREE.BoxGeometry());\nReact.createElement('mesh', { geometry: new THREE.BoxGeometry() });";
        let (out, fixes) = inline(text);
        assert_eq!(out, text);
        assert!(fixes.is_empty());
    }

    #[test]
    fn reverses_declarative_binding_used_imperatively() {
        let (out, fixes) = reverse(
            "const geo = React.createElement('boxGeometry', { args: [1, 2, 3] });\ngeo.translate(0, 1, 0);",
        );
        assert_eq!(
            out,
            "const geo = new THREE.BoxGeometry(1, 2, 3);\ngeo.translate(0, 1, 0);"
        );
        assert_eq!(fixes[0].category, "geometry-reversal");

        let (out, _) = reverse("let s = createElement('sphereGeometry');\ns.rotateX(1);");
        assert_eq!(out, "let s = new THREE.SphereGeometry();\ns.rotateX(1);");
    }

    #[test]
    fn keeps_declarative_binding_without_imperative_calls() {
        let text = "const geo = React.createElement('boxGeometry', { args: [1] });\ngeo.scale.set(1, 1, 1);\nconst m = React.createElement('mesh', null);\nm.translate(1);";
        let (out, fixes) = reverse(text);
        assert_eq!(out, text);
        assert!(fixes.is_empty());
    }

    #[test]
    fn case_helpers() {
        assert_eq!(lower_first("BoxGeometry"), "boxGeometry");
        assert_eq!(upper_first("meshStandardMaterial"), "MeshStandardMaterial");
        assert_eq!(lower_first(""), "");
    }
}
