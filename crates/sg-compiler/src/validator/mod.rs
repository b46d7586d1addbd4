mod globals;
mod scope;

use std::collections::{BTreeMap, BTreeSet};

use sg_core::{GuardConfig, SourceLocation, ValidationError, ValidationErrorKind, ValidationReport};
use sg_parser::{diagnostic_location, parse_program};

use self::globals::JS_GLOBALS;
use self::scope::{build_scope_tree, ScopeTree};

/// Parses unit code and reports undefined identifiers, use-before-declaration
/// and declarative/imperative geometry confusion.
pub fn validate_source(source: &str, config: &GuardConfig) -> ValidationReport {
    let program = match parse_program(source) {
        Ok(program) => program,
        Err(error) => {
            let location =
                diagnostic_location(&error).unwrap_or(SourceLocation { line: 1, column: 1 });
            log::info!("validator rejected unit: {}", error.message);
            return ValidationReport::from_parts(
                vec![ValidationError {
                    kind: ValidationErrorKind::Syntax,
                    identifier_name: None,
                    line: location.line,
                    column: location.column,
                    message: error.message,
                }],
                Vec::new(),
            );
        }
    };

    let tree = build_scope_tree(&program);
    let mut allowlist: BTreeSet<String> = config.host_bindings();
    allowlist.extend(JS_GLOBALS.iter().map(|name| (*name).to_string()));

    let (errors, mut warnings) = resolve_usages(&tree, &allowlist);
    warnings.extend(tree.category_warnings.iter().cloned());
    for warning in &warnings {
        log::warn!("validator: {}", warning);
    }
    ValidationReport::from_parts(errors, warnings)
}

fn resolve_usages(
    tree: &ScopeTree,
    allowlist: &BTreeSet<String>,
) -> (Vec<ValidationError>, Vec<String>) {
    let mut undefined: BTreeMap<&str, SourceLocation> = BTreeMap::new();
    let mut tdz: Vec<(SourceLocation, String)> = Vec::new();

    for (id, scope) in tree.scopes.iter().enumerate() {
        for (name, locations) in &scope.usages {
            if allowlist.contains(name) {
                continue;
            }
            let Some(first_use) = locations.iter().min().copied() else {
                continue;
            };
            if let Some(declaration) = scope.declarations.get(name) {
                if !declaration.hoisted && first_use < declaration.location {
                    tdz.push((
                        first_use,
                        format!(
                            "'{}' is used on line {} before its declaration on line {}",
                            name, first_use.line, declaration.location.line
                        ),
                    ));
                }
                continue;
            }
            if tree
                .ancestors(id)
                .any(|ancestor| ancestor.declarations.contains_key(name))
            {
                continue;
            }
            undefined
                .entry(name.as_str())
                .and_modify(|earliest| *earliest = (*earliest).min(first_use))
                .or_insert(first_use);
        }
    }

    let mut errors: Vec<ValidationError> = undefined
        .into_iter()
        .map(|(name, location)| ValidationError {
            kind: ValidationErrorKind::UndefinedIdentifier,
            identifier_name: Some(name.to_string()),
            line: location.line,
            column: location.column,
            message: format!("'{}' is not defined", name),
        })
        .collect();
    errors.sort_by_key(|error| (error.line, error.column));

    tdz.sort();
    let warnings = tdz.into_iter().map(|(_, message)| message).collect();
    (errors, warnings)
}
