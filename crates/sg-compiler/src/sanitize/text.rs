//! Byte-offset helpers shared by the rewrite rules.
//!
//! Every rule matches against a mask of the source in which string, template
//! and comment contents (and regex bodies) are blanked with spaces of the same
//! byte length. Offsets found in the mask are therefore valid offsets into the
//! original text, and rules never fire inside literals.

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TextEdit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

impl TextEdit {
    pub fn replace(start: usize, end: usize, replacement: impl Into<String>) -> Self {
        Self {
            start,
            end,
            replacement: replacement.into(),
        }
    }

    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::replace(at, at, text)
    }

    pub fn remove(start: usize, end: usize) -> Self {
        Self::replace(start, end, "")
    }
}

pub(crate) fn mask_literals(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut index = 0usize;
    let mut brace_depth = 0usize;
    let mut template_resume_depths: Vec<usize> = Vec::new();
    let mut previous_code: Option<char> = None;

    while index < chars.len() {
        let ch = chars[index];
        let next = chars.get(index + 1).copied();

        if ch == '/' && next == Some('/') {
            out.push_str("//");
            index += 2;
            while index < chars.len() && chars[index] != '\n' {
                blank(&mut out, chars[index]);
                index += 1;
            }
            continue;
        }

        if ch == '/' && next == Some('*') {
            out.push_str("/*");
            index += 2;
            while index < chars.len() {
                if chars[index] == '*' && chars.get(index + 1) == Some(&'/') {
                    out.push_str("*/");
                    index += 2;
                    break;
                }
                blank(&mut out, chars[index]);
                index += 1;
            }
            continue;
        }

        if ch == '\'' || ch == '"' {
            out.push(ch);
            index = mask_quoted(&chars, index + 1, ch, &mut out);
            previous_code = Some(ch);
            continue;
        }

        if ch == '`' {
            out.push('`');
            let (next_index, opened) = mask_template_text(&chars, index + 1, &mut out);
            index = next_index;
            if opened {
                template_resume_depths.push(brace_depth);
                brace_depth += 1;
            }
            previous_code = Some('`');
            continue;
        }

        if ch == '/' && regex_may_start(previous_code) {
            out.push('/');
            index = mask_regex_body(&chars, index + 1, &mut out);
            previous_code = Some('/');
            continue;
        }

        if ch == '{' {
            brace_depth += 1;
        } else if ch == '}' {
            brace_depth = brace_depth.saturating_sub(1);
            if template_resume_depths.last() == Some(&brace_depth) {
                template_resume_depths.pop();
                out.push('}');
                let (next_index, opened) = mask_template_text(&chars, index + 1, &mut out);
                index = next_index;
                if opened {
                    template_resume_depths.push(brace_depth);
                    brace_depth += 1;
                }
                previous_code = Some('`');
                continue;
            }
        }

        out.push(ch);
        if !ch.is_whitespace() {
            previous_code = Some(ch);
        }
        index += 1;
    }
    out
}

fn blank(out: &mut String, ch: char) {
    if ch == '\n' {
        out.push('\n');
        return;
    }
    for _ in 0..ch.len_utf8() {
        out.push(' ');
    }
}

fn mask_quoted(chars: &[char], mut index: usize, quote: char, out: &mut String) -> usize {
    while index < chars.len() {
        let ch = chars[index];
        if ch == '\\' {
            blank(out, ch);
            index += 1;
            if let Some(escaped) = chars.get(index) {
                blank(out, *escaped);
                index += 1;
            }
            continue;
        }
        if ch == quote {
            out.push(ch);
            return index + 1;
        }
        if ch == '\n' {
            return index;
        }
        blank(out, ch);
        index += 1;
    }
    index
}

/// Masks template text up to the closing backtick or the next `${`.
/// Returns the next index and whether a substitution was opened.
fn mask_template_text(chars: &[char], mut index: usize, out: &mut String) -> (usize, bool) {
    while index < chars.len() {
        let ch = chars[index];
        if ch == '\\' {
            blank(out, ch);
            index += 1;
            if let Some(escaped) = chars.get(index) {
                blank(out, *escaped);
                index += 1;
            }
            continue;
        }
        if ch == '`' {
            out.push('`');
            return (index + 1, false);
        }
        if ch == '$' && chars.get(index + 1) == Some(&'{') {
            out.push_str("${");
            return (index + 2, true);
        }
        blank(out, ch);
        index += 1;
    }
    (index, false)
}

fn mask_regex_body(chars: &[char], mut index: usize, out: &mut String) -> usize {
    let mut in_class = false;
    while index < chars.len() {
        let ch = chars[index];
        match ch {
            '\n' => return index,
            '\\' => {
                blank(out, ch);
                index += 1;
                if let Some(escaped) = chars.get(index) {
                    if *escaped == '\n' {
                        return index;
                    }
                    blank(out, *escaped);
                    index += 1;
                }
                continue;
            }
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => {
                out.push('/');
                return index + 1;
            }
            _ => {}
        }
        blank(out, ch);
        index += 1;
    }
    index
}

fn regex_may_start(previous: Option<char>) -> bool {
    match previous {
        None => true,
        Some(ch) => "(,=:[!&|?{};+-*%<>~^".contains(ch),
    }
}

pub(crate) fn is_identifier_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'$' || byte == b'_'
}

/// Index of the bracket closing the one opened at `open`, counting all three
/// bracket kinds together.
pub(crate) fn matching_close(mask: &str, open: usize) -> Option<usize> {
    let bytes = mask.as_bytes();
    let mut depth = 0usize;
    for (index, byte) in bytes.iter().enumerate().skip(open) {
        match byte {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

/// Innermost bracket opened before `position` and not closed before it.
pub(crate) fn enclosing_open(mask: &str, position: usize) -> Option<usize> {
    let bytes = mask.as_bytes();
    let mut depth = 0usize;
    let mut index = position.min(bytes.len());
    while index > 0 {
        index -= 1;
        match bytes[index] {
            b')' | b']' | b'}' => depth += 1,
            b'(' | b'[' | b'{' => {
                if depth == 0 {
                    return Some(index);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

pub(crate) fn prev_non_space(mask: &str, position: usize) -> Option<usize> {
    let bytes = mask.as_bytes();
    (0..position.min(bytes.len()))
        .rev()
        .find(|index| !bytes[*index].is_ascii_whitespace())
}

pub(crate) fn next_non_space(mask: &str, position: usize) -> Option<usize> {
    let bytes = mask.as_bytes();
    (position..bytes.len()).find(|index| !bytes[*index].is_ascii_whitespace())
}

/// Identifier that ends right before `end`, ignoring whitespace in between.
pub(crate) fn word_before(mask: &str, end: usize) -> &str {
    let bytes = mask.as_bytes();
    let Some(last) = prev_non_space(mask, end) else {
        return "";
    };
    if !is_identifier_byte(bytes[last]) {
        return "";
    }
    let mut start = last;
    while start > 0 && is_identifier_byte(bytes[start - 1]) {
        start -= 1;
    }
    mask.get(start..last + 1).unwrap_or("")
}

/// Whether the code right before `position` ends with one of the tokens that
/// mark a stored or returned value.
pub(crate) fn preceded_by_binding_token(mask: &str, position: usize) -> bool {
    let Some(last) = prev_non_space(mask, position) else {
        return false;
    };
    let bytes = mask.as_bytes();
    match bytes[last] {
        b'=' | b':' => true,
        b'>' => last > 0 && bytes[last - 1] == b'=',
        _ => word_before(mask, position) == "return",
    }
}

/// Positions where `name` occurs as a free-standing identifier: not part of a
/// longer identifier, not a member property, not an object-literal key.
pub(crate) fn root_identifier_positions(mask: &str, name: &str) -> Vec<usize> {
    let mut positions = Vec::new();
    if name.is_empty() {
        return positions;
    }
    let bytes = mask.as_bytes();
    let mut offset = 0usize;
    while let Some(found) = mask.get(offset..).and_then(|rest| rest.find(name)) {
        let start = offset + found;
        let end = start + name.len();
        offset = end;
        let left_ok = start == 0 || !is_identifier_byte(bytes[start - 1]);
        let right_ok = end >= bytes.len() || !is_identifier_byte(bytes[end]);
        if !left_ok || !right_ok {
            continue;
        }
        if prev_non_space(mask, start).is_some_and(|index| bytes[index] == b'.') {
            continue;
        }
        let is_key = next_non_space(mask, end).is_some_and(|index| bytes[index] == b':')
            && prev_non_space(mask, start)
                .is_some_and(|index| bytes[index] == b'{' || bytes[index] == b',');
        if is_key {
            continue;
        }
        positions.push(start);
    }
    positions
}

/// End (exclusive) of the statement that continues at `from`: the first `;`
/// at bracket depth zero, or a line break where the statement cannot continue.
pub(crate) fn statement_end(mask: &str, from: usize) -> usize {
    let bytes = mask.as_bytes();
    let mut depth = 0usize;
    let mut index = from;
    while index < bytes.len() {
        match bytes[index] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                if depth == 0 {
                    return index;
                }
                depth -= 1;
            }
            b';' if depth == 0 => return index + 1,
            b'\n' if depth == 0 => {
                let dangling = prev_non_space(mask, index)
                    .is_some_and(|last| b"=+-*/,(&|?:.".contains(&bytes[last]));
                let continued = next_non_space(mask, index)
                    .is_some_and(|next| b".?:".contains(&bytes[next]));
                if !dangling && !continued {
                    return index;
                }
            }
            _ => {}
        }
        index += 1;
    }
    bytes.len()
}

/// Extends a removal so it swallows its own line when nothing else is on it,
/// otherwise the horizontal whitespace after it.
pub(crate) fn removal_range(text: &str, start: usize, end: usize) -> (usize, usize) {
    let bytes = text.as_bytes();
    let line_start = slice(text, 0, start)
        .rfind('\n')
        .map_or(0, |index| index + 1);
    let mut after = end;
    while after < bytes.len() && (bytes[after] == b' ' || bytes[after] == b'\t') {
        after += 1;
    }
    let alone_before = slice(text, line_start, start).trim().is_empty();
    let alone_after = after >= bytes.len() || bytes[after] == b'\n';
    if alone_before && alone_after {
        let line_end = if after < bytes.len() { after + 1 } else { after };
        if line_end == after && line_start > 0 {
            return (line_start - 1, after);
        }
        return (line_start, line_end);
    }
    (start, after)
}

pub(crate) fn line_of(text: &str, position: usize) -> usize {
    let end = position.min(text.len());
    text.as_bytes()[..end].iter().filter(|byte| **byte == b'\n').count() + 1
}

pub(crate) fn slice(text: &str, start: usize, end: usize) -> &str {
    text.get(start..end).unwrap_or("")
}

/// Applies non-overlapping edits. Edits that overlap an earlier one or do not
/// fall on character boundaries are dropped.
pub(crate) fn apply_edits(text: &str, mut edits: Vec<TextEdit>) -> String {
    edits.sort_by_key(|edit| (edit.start, edit.end));
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for edit in edits {
        if edit.start < cursor
            || edit.end < edit.start
            || edit.end > text.len()
            || !text.is_char_boundary(edit.start)
            || !text.is_char_boundary(edit.end)
        {
            continue;
        }
        out.push_str(&text[cursor..edit.start]);
        out.push_str(&edit.replacement);
        cursor = edit.end;
    }
    out.push_str(&text[cursor..]);
    out
}
