use std::sync::OnceLock;

use regex::Regex;
use sg_core::FixRecord;

use super::geometry::{convert_inline_constructions, ConstructorArgs};
use super::text::matching_close;

const CATEGORY: &str = "material";

pub(crate) fn convert_inline_material(text: &str, fixes: &mut Vec<FixRecord>) -> String {
    convert_inline_constructions(
        text,
        material_constructor_regex(),
        CATEGORY,
        material_props,
        fixes,
    )
}

/// A lone object-literal argument becomes the element props; anything else
/// is passed through `args`.
fn material_props(args: &ConstructorArgs<'_>) -> String {
    if args.text.is_empty() {
        return "null".to_string();
    }
    let single_object = args.mask.starts_with('{')
        && matching_close(args.mask, 0) == Some(args.mask.len() - 1);
    if single_object {
        return args.text.to_string();
    }
    format!("{{ args: [{}] }}", args.text)
}

fn material_constructor_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\bnew\s+(?:THREE\.)?([A-Z][A-Za-z0-9]*Material)\s*\(")
            .expect("material constructor regex")
    })
}

#[cfg(test)]
mod material_tests {
    use super::*;

    fn convert(text: &str) -> (String, Vec<FixRecord>) {
        let mut fixes = Vec::new();
        let out = convert_inline_material(text, &mut fixes);
        (out, fixes)
    }

    #[test]
    fn unwraps_single_object_argument_into_props() {
        let (out, fixes) = convert(
            "React.createElement('mesh', null, geo, new THREE.MeshStandardMaterial({ color: 'red', wireframe: true }))",
        );
        assert_eq!(
            out,
            "React.createElement('mesh', null, geo, React.createElement('meshStandardMaterial', { color: 'red', wireframe: true }))"
        );
        assert_eq!(
            fixes[0].description,
            "converted inline new MeshStandardMaterial(...) to declarative 'meshStandardMaterial' element"
        );
    }

    #[test]
    fn wraps_other_arguments_and_handles_empty_calls() {
        let (out, _) = convert("createElement('points', null, new PointsMaterial(opts, extra))");
        assert_eq!(
            out,
            "createElement('points', null, React.createElement('pointsMaterial', { args: [opts, extra] }))"
        );
        let (out, _) = convert("createElement('mesh', null, new THREE.MeshNormalMaterial())");
        assert_eq!(
            out,
            "createElement('mesh', null, React.createElement('meshNormalMaterial', null))"
        );
        let (out, _) = convert("createElement('mesh', null, new THREE.MeshBasicMaterial({ a: 1 }, { b: 2 }))");
        assert_eq!(
            out,
            "createElement('mesh', null, React.createElement('meshBasicMaterial', { args: [{ a: 1 }, { b: 2 }] }))"
        );
    }

    #[test]
    fn leaves_stored_materials() {
        let text = "const mat = new THREE.MeshPhongMaterial({ color: 1 });";
        let (out, fixes) = convert(text);
        assert_eq!(out, text);
        assert!(fixes.is_empty());
    }
}
