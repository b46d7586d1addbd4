use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use sg_core::FixRecord;

use super::text::{
    apply_edits, mask_literals, next_non_space, removal_range, root_identifier_positions, slice,
    statement_end, TextEdit,
};

const CATEGORY: &str = "shadow";
const RENAME_PREFIX: &str = "user_";

/// Removes module syntax and every declaration that would shadow a binding the
/// host injects into the unit scope.
pub(crate) fn strip_shadowing(
    text: &str,
    host_bindings: &BTreeSet<String>,
    fixes: &mut Vec<FixRecord>,
) -> String {
    let text = remove_imports(text, fixes);
    let text = strip_exports(&text, fixes);
    let text = drop_host_destructuring(&text, host_bindings, fixes);
    let text = drop_host_declarations(&text, host_bindings, fixes);
    rename_host_functions(&text, host_bindings, fixes)
}

fn remove_imports(text: &str, fixes: &mut Vec<FixRecord>) -> String {
    let mask = mask_literals(text);
    let bytes = mask.as_bytes();
    let mut edits = Vec::new();
    for found in import_regex().find_iter(&mask) {
        let keyword_start = found.end() - "import".len();
        let Some(next) = next_non_space(&mask, found.end()) else {
            continue;
        };
        if matches!(bytes[next], b'(' | b'.') {
            continue;
        }
        let Some(quote) = mask[found.end()..]
            .find(['\'', '"'])
            .map(|offset| found.end() + offset)
        else {
            continue;
        };
        if mask[found.end()..quote].contains([';', '(', ')', '=']) {
            continue;
        }
        let quote_char = bytes[quote] as char;
        let Some(close) = mask[quote + 1..]
            .find(quote_char)
            .map(|offset| quote + 1 + offset)
        else {
            continue;
        };
        let mut end = close + 1;
        if let Some(next) = next_non_space(&mask, end) {
            if bytes[next] == b';' && !mask[end..next].contains('\n') {
                end = next + 1;
            }
        }
        let module = slice(text, quote + 1, close).to_string();
        let (start, end) = removal_range(text, keyword_start, end);
        edits.push(TextEdit::remove(start, end));
        fixes.push(FixRecord::new(
            CATEGORY,
            format!("removed import from '{}'", module),
        ));
    }
    apply_edits(text, edits)
}

fn strip_exports(text: &str, fixes: &mut Vec<FixRecord>) -> String {
    let mask = mask_literals(text);
    let mut edits = Vec::new();

    for captures in export_list_regex().captures_iter(&mask) {
        let Some(statement) = captures.get(1) else {
            continue;
        };
        let (start, end) = removal_range(text, statement.start(), statement.end());
        edits.push(TextEdit::remove(start, end));
        fixes.push(FixRecord::new(CATEGORY, "removed export list statement"));
    }

    for captures in export_default_name_regex().captures_iter(&mask) {
        let (Some(statement), Some(name)) = (captures.get(1), captures.get(2)) else {
            continue;
        };
        let (start, end) = removal_range(text, statement.start(), statement.end());
        edits.push(TextEdit::remove(start, end));
        fixes.push(FixRecord::new(
            CATEGORY,
            format!("removed 'export default {}' statement", name.as_str()),
        ));
    }

    for captures in export_prefix_regex().captures_iter(&mask) {
        let Some(prefix) = captures.get(1) else {
            continue;
        };
        edits.push(TextEdit::remove(prefix.start(), prefix.end()));
        fixes.push(FixRecord::new(
            CATEGORY,
            format!("stripped '{}' prefix", prefix.as_str().trim_end()),
        ));
    }

    apply_edits(text, edits)
}

fn drop_host_destructuring(
    text: &str,
    host_bindings: &BTreeSet<String>,
    fixes: &mut Vec<FixRecord>,
) -> String {
    let mask = mask_literals(text);
    let mut edits = Vec::new();
    for captures in destructuring_regex().captures_iter(&mask) {
        let (Some(whole), Some(entries)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let entry_texts = split_entries(slice(text, entries.start(), entries.end()));
        let (colliding, kept): (Vec<&str>, Vec<&str>) = entry_texts
            .iter()
            .copied()
            .partition(|entry| host_bindings.contains(binding_name(entry)));
        if colliding.is_empty() {
            continue;
        }
        let names = colliding
            .iter()
            .map(|entry| binding_name(entry))
            .collect::<Vec<_>>()
            .join(", ");
        if kept.is_empty() {
            let end = statement_end(&mask, whole.end());
            let (start, end) = removal_range(text, whole.start(), end);
            edits.push(TextEdit::remove(start, end));
            fixes.push(FixRecord::new(
                CATEGORY,
                format!("removed destructuring of host bindings {}", names),
            ));
        } else {
            edits.push(TextEdit::replace(
                entries.start(),
                entries.end(),
                format!(" {} ", kept.join(", ")),
            ));
            fixes.push(FixRecord::new(
                CATEGORY,
                format!("dropped host bindings {} from destructuring", names),
            ));
        }
    }
    apply_edits(text, edits)
}

/// Drops declarators whose name collides with a host binding. The whole
/// statement goes when every declarator collides.
fn drop_host_declarations(
    text: &str,
    host_bindings: &BTreeSet<String>,
    fixes: &mut Vec<FixRecord>,
) -> String {
    let mask = mask_literals(text);
    let bytes = mask.as_bytes();
    let mut edits = Vec::new();
    let mut covered = 0usize;
    for captures in declaration_regex().captures_iter(&mask) {
        let (Some(whole), Some(first)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        if whole.start() < covered {
            continue;
        }
        let end = statement_end(&mask, first.start());
        let mut list_end = end;
        if list_end > first.start() && bytes[list_end - 1] == b';' {
            list_end -= 1;
        }
        while list_end > first.start() && bytes[list_end - 1].is_ascii_whitespace() {
            list_end -= 1;
        }

        let (colliding, kept): (Vec<&str>, Vec<&str>) =
            split_declarators(&mask, first.start(), list_end)
                .into_iter()
                .map(|(start, end)| slice(text, start, end).trim())
                .partition(|declarator| host_bindings.contains(declarator_name(declarator)));
        if colliding.is_empty() {
            continue;
        }
        let names = colliding
            .iter()
            .map(|declarator| format!("'{}'", declarator_name(declarator)))
            .collect::<Vec<_>>()
            .join(", ");
        let plural = if colliding.len() == 1 { "" } else { "s" };
        if kept.is_empty() {
            let (start, end) = removal_range(text, whole.start(), end);
            edits.push(TextEdit::remove(start, end));
            fixes.push(FixRecord::new(
                CATEGORY,
                format!("removed declaration shadowing host binding{} {}", plural, names),
            ));
        } else {
            edits.push(TextEdit::replace(first.start(), list_end, kept.join(", ")));
            fixes.push(FixRecord::new(
                CATEGORY,
                format!("dropped host binding{} {} from declaration", plural, names),
            ));
        }
        covered = end;
    }
    apply_edits(text, edits)
}

fn rename_host_functions(
    text: &str,
    host_bindings: &BTreeSet<String>,
    fixes: &mut Vec<FixRecord>,
) -> String {
    let mask = mask_literals(text);
    let names = function_regex()
        .captures_iter(&mask)
        .filter_map(|captures| captures.get(1))
        .map(|name| name.as_str())
        .filter(|name| host_bindings.contains(*name))
        .collect::<BTreeSet<_>>();

    let mut edits = Vec::new();
    for name in names {
        let renamed = format!("{}{}", RENAME_PREFIX, name);
        for position in root_identifier_positions(&mask, name) {
            edits.push(TextEdit::replace(position, position + name.len(), renamed.clone()));
        }
        fixes.push(FixRecord::new(
            CATEGORY,
            format!("renamed function '{}' to '{}'", name, renamed),
        ));
    }
    apply_edits(text, edits)
}

fn split_entries(entries: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (index, byte) in entries.bytes().enumerate() {
        match byte {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                parts.push(&entries[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&entries[start..]);
    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

/// Byte ranges of the comma separated declarators in `mask[start..end]`.
fn split_declarators(mask: &str, start: usize, end: usize) -> Vec<(usize, usize)> {
    let bytes = mask.as_bytes();
    let mut ranges = Vec::new();
    let mut depth = 0usize;
    let mut from = start;
    for index in start..end {
        match bytes[index] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                ranges.push((from, index));
                from = index + 1;
            }
            _ => {}
        }
    }
    ranges.push((from, end));
    ranges
        .into_iter()
        .filter(|(from, to)| !mask[*from..*to].trim().is_empty())
        .collect()
}

fn declarator_name(declarator: &str) -> &str {
    declarator
        .split(|ch: char| !(ch.is_alphanumeric() || ch == '_' || ch == '$'))
        .next()
        .unwrap_or("")
}

fn binding_name(entry: &str) -> &str {
    let entry = entry.trim();
    let entry = entry.strip_prefix("...").unwrap_or(entry);
    let target = entry
        .split_once(':')
        .map_or(entry, |(_, alias)| alias);
    target
        .split_once('=')
        .map_or(target, |(name, _)| name)
        .trim()
}

fn import_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?m)^[ \t]*import\b").expect("import regex"))
}

fn export_list_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r#"(?m)^[ \t]*(export\s*\{[^{}]*\}(?:\s*from\s*(?:'[^'\n]*'|"[^"\n]*"))?[ \t]*;?)"#,
        )
        .expect("export list regex")
    })
}

fn export_default_name_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(export\s+default\s+([A-Za-z_$][\w$]*)[ \t]*;?)[ \t]*$")
            .expect("export default name regex")
    })
}

fn export_prefix_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(export\s+(?:default\s+)?)(?:async\s+)?(?:function|class|const|let|var)\b")
            .expect("export prefix regex")
    })
}

fn destructuring_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\b(?:const|let|var)\s*\{([^{}]*)\}\s*=").expect("destructuring regex")
    })
}

fn declaration_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\b(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=").expect("declaration regex")
    })
}

fn function_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\bfunction\s+([A-Za-z_$][\w$]*)\s*\(").expect("function regex")
    })
}

#[cfg(test)]
mod shadow_tests {
    use super::*;

    fn hosts() -> BTreeSet<String> {
        ["React", "THREE", "useState", "useFrame", "params", "Box"]
            .iter()
            .map(|name| (*name).to_string())
            .collect()
    }

    fn run(text: &str) -> (String, Vec<FixRecord>) {
        let mut fixes = Vec::new();
        let out = strip_shadowing(text, &hosts(), &mut fixes);
        (out, fixes)
    }

    #[test]
    fn removes_imports_and_export_syntax() {
        let (out, fixes) = run(
            "import React, { useState } from 'react';\nimport * as THREE from \"three\"\nexport default function Scene() {\n  return null;\n}\nexport { Scene };\nexport default Scene;\n",
        );
        assert_eq!(out, "function Scene() {\n  return null;\n}\n");
        assert_eq!(fixes.len(), 5);
        assert!(fixes.iter().all(|fix| fix.category == "shadow"));
        assert_eq!(fixes[0].description, "removed import from 'react'");
    }

    #[test]
    fn keeps_dynamic_import_and_import_inside_strings() {
        let text = "const m = import('x');\nconst s = \"import a from 'b'\";\n";
        let (out, fixes) = run(text);
        assert_eq!(out, text);
        assert!(fixes.is_empty());
    }

    #[test]
    fn drops_colliding_destructuring_fully_or_partially() {
        let (out, _) = run("const { useState, useFrame } = React;\nconst x = 1;\n");
        assert_eq!(out, "const x = 1;\n");

        let (out, fixes) = run("const { useState, helper: local = 2 } = lib;\n");
        assert_eq!(out, "const { helper: local = 2 } = lib;\n");
        assert_eq!(
            fixes[0].description,
            "dropped host bindings useState from destructuring"
        );
    }

    #[test]
    fn removes_direct_host_declarations() {
        let (out, fixes) = run("const params = {\n  speed: 1,\n};\nconst THREE = window.THREE\nrun();\n");
        assert_eq!(out, "run();\n");
        assert_eq!(fixes.len(), 2);
    }

    #[test]
    fn drops_only_colliding_declarators_from_a_list() {
        let (out, fixes) = run("const params = {}, speed = 2;\nconsole.log(speed);");
        assert_eq!(out, "const speed = 2;\nconsole.log(speed);");
        assert_eq!(fixes.len(), 1);
        assert_eq!(
            fixes[0].description,
            "dropped host binding 'params' from declaration"
        );

        let (out, _) = run("let a = f(1, 2), Box = { w: 1, h: 2 }, b = [3, 4]\nrun(a, b);");
        assert_eq!(out, "let a = f(1, 2), b = [3, 4]\nrun(a, b);");

        let (out, fixes) = run("var React = 1, params = 2;\nrun();");
        assert_eq!(out, "run();");
        assert_eq!(
            fixes[0].description,
            "removed declaration shadowing host bindings 'React', 'params'"
        );
    }

    #[test]
    fn checks_declarators_after_a_non_colliding_first_name() {
        let (out, fixes) = run("const label = 'a, b', useFrame = null;\n");
        assert_eq!(out, "const label = 'a, b';\n");
        assert_eq!(fixes.len(), 1);

        let (again, fixes) = run(&out);
        assert_eq!(again, out);
        assert!(fixes.is_empty());
    }

    #[test]
    fn renames_colliding_function_and_root_references() {
        let (out, fixes) = run(
            "function Box(props) { return props.size; }\nReact.createElement(Box, { Box: 1, size: scene.Box });\n",
        );
        assert_eq!(
            out,
            "function user_Box(props) { return props.size; }\nReact.createElement(user_Box, { Box: 1, size: scene.Box });\n"
        );
        assert_eq!(fixes[0].description, "renamed function 'Box' to 'user_Box'");
    }

    #[test]
    fn shadow_stripping_is_idempotent() {
        let text = "import x from 'y';\nexport const a = 1;\nconst { useState, b } = React;\nfunction params() {}\n";
        let (once, _) = run(text);
        let (twice, fixes) = run(&once);
        assert_eq!(once, twice);
        assert!(fixes.is_empty());
    }
}
