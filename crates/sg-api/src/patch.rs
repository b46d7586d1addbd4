use sg_core::{PatchEdit, SceneGuardError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub code: String,
    pub unmatched: Vec<PatchEdit>,
}

impl PatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.unmatched.is_empty()
    }
}

/// Applies edits verbatim and in order, each replacing the first occurrence
/// of its search text in the code produced by the previous edits.
pub fn apply_patch(code: &str, edits: &[PatchEdit]) -> PatchOutcome {
    let mut patched = code.to_string();
    let mut unmatched = Vec::new();
    for edit in edits {
        if edit.search_text.is_empty() || !patched.contains(&edit.search_text) {
            unmatched.push(edit.clone());
            continue;
        }
        patched = patched.replacen(&edit.search_text, &edit.replace_text, 1);
    }
    PatchOutcome {
        code: patched,
        unmatched,
    }
}

pub(crate) fn unmatched_error(unmatched: &[PatchEdit]) -> SceneGuardError {
    let listed = unmatched
        .iter()
        .map(|edit| format!("{:?}", edit.search_text))
        .collect::<Vec<_>>()
        .join(", ");
    SceneGuardError::new(
        "PATCH_APPLY_FAILED",
        format!("Patch could not be applied; search text not found: {}.", listed),
    )
}

#[cfg(test)]
mod patch_tests {
    use super::*;

    #[test]
    fn applies_edits_in_order_on_first_occurrence() {
        let outcome = apply_patch(
            "const a = 1;\nconst a2 = 1;",
            &[
                PatchEdit::new("= 1", "= 2"),
                PatchEdit::new("const a = 2", "let a = 2"),
            ],
        );
        assert!(outcome.is_complete());
        assert_eq!(outcome.code, "let a = 2;\nconst a2 = 1;");
    }

    #[test]
    fn collects_unmatched_and_empty_edits() {
        let outcome = apply_patch(
            "foo();",
            &[
                PatchEdit::new("bar()", "baz()"),
                PatchEdit::new("", "x"),
                PatchEdit::new("foo", "qux"),
            ],
        );
        assert_eq!(outcome.code, "qux();");
        assert_eq!(outcome.unmatched.len(), 2);
        let error = unmatched_error(&outcome.unmatched);
        assert_eq!(error.code, "PATCH_APPLY_FAILED");
        assert_eq!(
            error.message,
            "Patch could not be applied; search text not found: \"bar()\", \"\"."
        );
    }
}
