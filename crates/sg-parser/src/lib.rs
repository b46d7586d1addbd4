pub mod ast;
mod lexer;
mod parser;

use std::sync::OnceLock;

use regex::Regex;
use sg_core::{SceneGuardError, SourceLocation};

pub use lexer::{tokenize, TemplateToken, Token, TokenKind};
pub use parser::parse_program;

/// Recovers the `(line:column)` suffix that parse diagnostics carry, falling
/// back to the error span when the message has none.
pub fn diagnostic_location(error: &SceneGuardError) -> Option<SourceLocation> {
    if let Some(captures) = location_suffix_regex().captures(&error.message) {
        let line = captures.get(1)?.as_str().parse::<usize>().ok()?;
        let column = captures.get(2)?.as_str().parse::<usize>().ok()?;
        return Some(SourceLocation { line, column });
    }
    error.span.as_ref().map(|span| span.start)
}

fn location_suffix_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\((\d+):(\d+)\)").expect("location suffix regex"))
}
