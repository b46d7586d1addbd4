use std::sync::OnceLock;

use regex::Regex;
use sg_core::FixRecord;

use super::text::{apply_edits, line_of, mask_literals, TextEdit};

const SET_FROM_POINTS_CATEGORY: &str = "ref-geometry";
const BOUNDING_SPHERE_CATEGORY: &str = "bounding-sphere";
const BOUNDING_SPHERE_MARKER: &str = "void 0 /* computeBoundingSphere call removed */";

/// `X.current.setFromPoints(...)` targets the object behind the ref, which is
/// usually a line or points object rather than its geometry.
pub(crate) fn fix_ref_set_from_points(text: &str, fixes: &mut Vec<FixRecord>) -> String {
    let mask = mask_literals(text);
    let bytes = mask.as_bytes();
    let mut edits = Vec::new();
    for captures in ref_set_from_points_regex().captures_iter(&mask) {
        let (Some(target), Some(name)) = (captures.get(1), captures.get(2)) else {
            continue;
        };
        if target.start() > 0 && bytes[target.start() - 1] == b'.' {
            continue;
        }
        let name = name.as_str();
        edits.push(TextEdit::replace(
            target.start(),
            target.end(),
            format!("({0}.current.geometry || {0}.current)", name),
        ));
        fixes.push(FixRecord::new(
            SET_FROM_POINTS_CATEGORY,
            format!(
                "routed {}.current.setFromPoints to the ref geometry (line {})",
                name,
                line_of(text, target.start())
            ),
        ));
    }
    apply_edits(text, edits)
}

/// Strips `computeBoundingSphere()` calls, which throw on geometries whose
/// position attribute is not populated yet.
pub(crate) fn strip_bounding_sphere(text: &str, fixes: &mut Vec<FixRecord>) -> String {
    let mask = mask_literals(text);
    let bytes = mask.as_bytes();
    let mut edits = Vec::new();
    for found in bounding_sphere_regex().find_iter(&mask) {
        if found.start() > 0 && bytes[found.start() - 1] == b'.' {
            continue;
        }
        edits.push(TextEdit::replace(
            found.start(),
            found.end(),
            BOUNDING_SPHERE_MARKER,
        ));
        fixes.push(FixRecord::new(
            BOUNDING_SPHERE_CATEGORY,
            format!(
                "removed computeBoundingSphere() call (line {})",
                line_of(text, found.start())
            ),
        ));
    }
    apply_edits(text, edits)
}

fn ref_set_from_points_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\b(([A-Za-z_$][\w$]*)\.current)\s*\.\s*setFromPoints\s*\(")
            .expect("ref setFromPoints regex")
    })
}

fn bounding_sphere_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\b[A-Za-z_$][\w$]*(?:\s*\??\.\s*[A-Za-z_$][\w$]*)*\s*\??\.\s*computeBoundingSphere\s*\(\s*\)")
            .expect("bounding sphere regex")
    })
}

#[cfg(test)]
mod refs_tests {
    use super::*;

    #[test]
    fn wraps_ref_set_from_points_target() {
        let mut fixes = Vec::new();
        let out = fix_ref_set_from_points("lineRef.current.setFromPoints(points);", &mut fixes);
        assert_eq!(
            out,
            "(lineRef.current.geometry || lineRef.current).setFromPoints(points);"
        );
        assert_eq!(fixes.len(), 1);

        let mut again = Vec::new();
        assert_eq!(fix_ref_set_from_points(&out, &mut again), out);
        assert!(again.is_empty());
    }

    #[test]
    fn leaves_geometry_set_from_points_alone() {
        let text = "geometry.setFromPoints(points); a.b.current.setFromPoints(p);";
        let mut fixes = Vec::new();
        assert_eq!(fix_ref_set_from_points(text, &mut fixes), text);
        assert!(fixes.is_empty());
    }

    #[test]
    fn replaces_bounding_sphere_calls_with_marker() {
        let mut fixes = Vec::new();
        let out = strip_bounding_sphere(
            "ref.current.geometry.computeBoundingSphere();\nconst f = () => geo?.computeBoundingSphere();\n// geo.computeBoundingSphere()",
            &mut fixes,
        );
        assert_eq!(
            out,
            "void 0 /* computeBoundingSphere call removed */;\nconst f = () => void 0 /* computeBoundingSphere call removed */;\n// geo.computeBoundingSphere()"
        );
        assert_eq!(fixes.len(), 2);
        assert_eq!(fixes[1].description, "removed computeBoundingSphere() call (line 2)");
    }
}
