use sg_core::{SceneGuardError, SourceLocation, SourceSpan};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    PrivateName(String),
    Number(String),
    String(String),
    Template(TemplateToken),
    Regex(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateToken {
    pub quasis: Vec<String>,
    pub expressions: Vec<Vec<Token>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: SourceLocation,
    pub newline_before: bool,
}

const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-",
    "*", "/", "%", "&", "|", "^", "!", "~", "?", ":", "=", ".", "@",
];

const REGEX_PRECEDING_KEYWORDS: &[&str] = &[
    "return",
    "typeof",
    "instanceof",
    "in",
    "of",
    "new",
    "delete",
    "void",
    "throw",
    "case",
    "do",
    "else",
    "yield",
    "await",
];

pub fn tokenize(source: &str) -> Result<Vec<Token>, SceneGuardError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token(tokens.last())?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

pub(crate) fn parse_error(message: impl AsRef<str>, location: SourceLocation) -> SceneGuardError {
    SceneGuardError::with_span(
        "JS_PARSE_ERROR",
        format!(
            "{} ({}:{})",
            message.as_ref(),
            location.line,
            location.column
        ),
        SourceSpan::point(location),
    )
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn location(&self) -> SourceLocation {
        SourceLocation {
            line: self.line,
            column: self.column,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn starts_with(&self, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(index, ch)| self.peek_at(index) == Some(ch))
    }

    /// Skips whitespace and comments, returning whether a line break was crossed.
    fn skip_trivia(&mut self) -> Result<bool, SceneGuardError> {
        let mut newline = false;
        while let Some(ch) = self.peek() {
            if ch == '\n' || ch == '\r' || ch == '\u{2028}' || ch == '\u{2029}' {
                newline = true;
                self.bump();
            } else if ch.is_whitespace() || ch == '\u{feff}' {
                self.bump();
            } else if self.starts_with("//") {
                while let Some(next) = self.peek() {
                    if next == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else if self.starts_with("/*") {
                let start = self.location();
                self.bump();
                self.bump();
                loop {
                    if self.starts_with("*/") {
                        self.bump();
                        self.bump();
                        break;
                    }
                    match self.bump() {
                        Some('\n') => newline = true,
                        Some(_) => {}
                        None => return Err(parse_error("Unterminated comment", start)),
                    }
                }
            } else {
                break;
            }
        }
        Ok(newline)
    }

    fn next_token(&mut self, previous: Option<&Token>) -> Result<Token, SceneGuardError> {
        let newline_before = self.skip_trivia()?;
        let location = self.location();
        let Some(ch) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                location,
                newline_before,
            });
        };

        let kind = if is_identifier_start(ch) || (ch == '\\' && self.peek_at(1) == Some('u')) {
            TokenKind::Identifier(self.read_identifier_name())
        } else if ch == '#' && self.peek_at(1).is_some_and(is_identifier_start) {
            self.bump();
            TokenKind::PrivateName(self.read_identifier_name())
        } else if ch.is_ascii_digit()
            || (ch == '.' && self.peek_at(1).is_some_and(|next| next.is_ascii_digit()))
        {
            TokenKind::Number(self.read_number())
        } else if ch == '"' || ch == '\'' {
            TokenKind::String(self.read_string(ch)?)
        } else if ch == '`' {
            TokenKind::Template(self.read_template()?)
        } else if ch == '/' && regex_allowed(previous.map(|token| &token.kind)) {
            TokenKind::Regex(self.read_regex()?)
        } else {
            TokenKind::Punct(self.read_punctuator(location)?)
        };

        Ok(Token {
            kind,
            location,
            newline_before,
        })
    }

    fn read_identifier_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(ch) = self.peek() {
            if is_identifier_part(ch) {
                name.push(ch);
                self.bump();
            } else if ch == '\\' && self.peek_at(1) == Some('u') {
                // Unicode escapes are kept verbatim; names only need to be stable.
                name.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        name
    }

    fn read_number(&mut self) -> String {
        let mut text = String::new();
        if self.peek() == Some('0')
            && matches!(
                self.peek_at(1),
                Some('x' | 'X' | 'b' | 'B' | 'o' | 'O')
            )
        {
            for _ in 0..2 {
                if let Some(ch) = self.bump() {
                    text.push(ch);
                }
            }
            while let Some(ch) = self.peek() {
                if ch.is_ascii_hexdigit() || ch == '_' || ch == 'n' {
                    text.push(ch);
                    self.bump();
                } else {
                    break;
                }
            }
            return text;
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() || ch == '_' || ch == '.' {
                text.push(ch);
                self.bump();
            } else if (ch == 'e' || ch == 'E')
                && (self.peek_at(1).is_some_and(|next| next.is_ascii_digit())
                    || (matches!(self.peek_at(1), Some('+' | '-'))
                        && self.peek_at(2).is_some_and(|next| next.is_ascii_digit())))
            {
                text.push(ch);
                self.bump();
                if let Some(sign) = self.peek().filter(|next| *next == '+' || *next == '-') {
                    text.push(sign);
                    self.bump();
                }
            } else if ch == 'n' {
                text.push(ch);
                self.bump();
                break;
            } else {
                break;
            }
        }
        text
    }

    fn read_escape(&mut self, out: &mut String) {
        match self.bump() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\r') => {
                if self.peek() == Some('\n') {
                    self.bump();
                }
            }
            Some('\n') => {}
            Some(other) => out.push(other),
            None => {}
        }
    }

    fn read_string(&mut self, quote: char) -> Result<String, SceneGuardError> {
        let start = self.location();
        self.bump();
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(parse_error("Unterminated string constant", start));
                }
                Some(ch) if ch == quote => {
                    self.bump();
                    return Ok(value);
                }
                Some('\\') => {
                    self.bump();
                    self.read_escape(&mut value);
                }
                Some(ch) => {
                    value.push(ch);
                    self.bump();
                }
            }
        }
    }

    fn read_template(&mut self) -> Result<TemplateToken, SceneGuardError> {
        let start = self.location();
        self.bump();
        let mut quasis = Vec::new();
        let mut expressions = Vec::new();
        let mut current = String::new();
        loop {
            match self.peek() {
                None => return Err(parse_error("Unterminated template", start)),
                Some('`') => {
                    self.bump();
                    quasis.push(current);
                    return Ok(TemplateToken {
                        quasis,
                        expressions,
                    });
                }
                Some('\\') => {
                    self.bump();
                    self.read_escape(&mut current);
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    self.bump();
                    self.bump();
                    quasis.push(std::mem::take(&mut current));
                    expressions.push(self.read_template_substitution(start)?);
                }
                Some(ch) => {
                    current.push(ch);
                    self.bump();
                }
            }
        }
    }

    fn read_template_substitution(
        &mut self,
        template_start: SourceLocation,
    ) -> Result<Vec<Token>, SceneGuardError> {
        let mut tokens: Vec<Token> = Vec::new();
        let mut depth = 0usize;
        loop {
            let token = self.next_token(tokens.last())?;
            match &token.kind {
                TokenKind::Eof => {
                    return Err(parse_error("Unterminated template", template_start));
                }
                TokenKind::Punct("{") => depth += 1,
                TokenKind::Punct("}") if depth == 0 => {
                    tokens.push(Token {
                        kind: TokenKind::Eof,
                        location: token.location,
                        newline_before: token.newline_before,
                    });
                    return Ok(tokens);
                }
                TokenKind::Punct("}") => depth -= 1,
                _ => {}
            }
            tokens.push(token);
        }
    }

    fn read_regex(&mut self) -> Result<String, SceneGuardError> {
        let start = self.location();
        let mut text = String::new();
        if let Some(slash) = self.bump() {
            text.push(slash);
        }
        let mut in_class = false;
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(parse_error("Unterminated regular expression", start));
                }
                Some('\\') => {
                    text.push('\\');
                    if let Some(escaped) = self.bump() {
                        text.push(escaped);
                    }
                }
                Some('[') => {
                    in_class = true;
                    text.push('[');
                }
                Some(']') => {
                    in_class = false;
                    text.push(']');
                }
                Some('/') if !in_class => {
                    text.push('/');
                    break;
                }
                Some(ch) => text.push(ch),
            }
        }
        while let Some(flag) = self.peek().filter(|ch| is_identifier_part(*ch)) {
            text.push(flag);
            self.bump();
        }
        Ok(text)
    }

    fn read_punctuator(
        &mut self,
        location: SourceLocation,
    ) -> Result<&'static str, SceneGuardError> {
        for punct in PUNCTUATORS {
            if !self.starts_with(punct) {
                continue;
            }
            // `a?.5:b` is a conditional, not optional chaining.
            if *punct == "?." && self.peek_at(2).is_some_and(|ch| ch.is_ascii_digit()) {
                continue;
            }
            for _ in 0..punct.chars().count() {
                self.bump();
            }
            return Ok(*punct);
        }
        let ch = self.peek().unwrap_or(' ');
        Err(parse_error(format!("Unexpected character '{}'", ch), location))
    }
}

fn regex_allowed(previous: Option<&TokenKind>) -> bool {
    match previous {
        None => true,
        Some(TokenKind::Punct(punct)) => !matches!(*punct, ")" | "]" | "}"),
        Some(TokenKind::Identifier(name)) => REGEX_PRECEDING_KEYWORDS.contains(&name.as_str()),
        Some(TokenKind::Eof) => true,
        Some(_) => false,
    }
}

pub(crate) fn is_identifier_start(ch: char) -> bool {
    ch == '$' || ch == '_' || ch.is_alphabetic()
}

pub(crate) fn is_identifier_part(ch: char) -> bool {
    ch == '$' || ch == '_' || ch == '\u{200c}' || ch == '\u{200d}' || ch.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("tokenize should pass")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn tokenize_distinguishes_division_from_regex() {
        let division = kinds("a / b / c");
        assert_eq!(division[1], TokenKind::Punct("/"));
        assert_eq!(division[3], TokenKind::Punct("/"));

        let regex = kinds("const r = /ab[/]c/gi;");
        assert_eq!(regex[3], TokenKind::Regex("/ab[/]c/gi".to_string()));

        let after_return = kinds("return /x/.test(s)");
        assert_eq!(after_return[1], TokenKind::Regex("/x/".to_string()));
    }

    #[test]
    fn tokenize_reads_strings_with_escapes() {
        let tokens = kinds(r#"'it\'s' "a\nb""#);
        assert_eq!(tokens[0], TokenKind::String("it's".to_string()));
        assert_eq!(tokens[1], TokenKind::String("a\nb".to_string()));
    }

    #[test]
    fn tokenize_splits_template_substitutions_including_nested_braces() {
        let tokens = kinds("`a${ {x: 1}.x }b${`in${y}`}`");
        let TokenKind::Template(template) = &tokens[0] else {
            panic!("expected template token");
        };
        assert_eq!(template.quasis, vec!["a", "b", ""]);
        assert_eq!(template.expressions.len(), 2);
        assert!(matches!(
            template.expressions[1][0].kind,
            TokenKind::Template(_)
        ));
    }

    #[test]
    fn tokenize_tracks_lines_columns_and_newlines() {
        let tokens = tokenize("a\n  /* c\n */ b").expect("tokenize");
        assert_eq!(tokens[0].location, SourceLocation { line: 1, column: 1 });
        assert_eq!(tokens[1].location, SourceLocation { line: 3, column: 5 });
        assert!(tokens[1].newline_before);
    }

    #[test]
    fn tokenize_prefers_longest_punctuator_and_handles_numbers() {
        let tokens = kinds("a >>>= 0x1F ?? .5e-3 ?.b 1_000n");
        assert_eq!(tokens[1], TokenKind::Punct(">>>="));
        assert_eq!(tokens[2], TokenKind::Number("0x1F".to_string()));
        assert_eq!(tokens[3], TokenKind::Punct("??"));
        assert_eq!(tokens[4], TokenKind::Number(".5e-3".to_string()));
        assert_eq!(tokens[5], TokenKind::Punct("?."));
        assert_eq!(tokens[7], TokenKind::Number("1_000n".to_string()));
    }

    #[test]
    fn tokenize_reports_unterminated_literals_with_location() {
        let error = tokenize("const a = 'oops\n").expect_err("unterminated string");
        assert_eq!(error.code, "JS_PARSE_ERROR");
        assert!(error.message.contains("(1:11)"));

        let error = tokenize("`abc").expect_err("unterminated template");
        assert!(error.message.starts_with("Unterminated template"));
    }
}
