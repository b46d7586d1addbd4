use sg_core::FixRecord;

use super::text::{mask_literals, prev_non_space};

const CATEGORY: &str = "unicode";

const SUPERSCRIPT_DIGITS: [char; 10] = ['⁰', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹'];
const SUBSCRIPT_DIGITS: [char; 10] = ['₀', '₁', '₂', '₃', '₄', '₅', '₆', '₇', '₈', '₉'];

const SYMBOLS: &[(char, &str)] = &[
    ('×', "x"),
    ('·', "*"),
    ('÷', "/"),
    ('−', "-"),
    ('–', "-"),
    ('≤', "<="),
    ('≥', ">="),
    ('≠', "!="),
    ('√', "sqrt"),
    ('∞', "inf"),
    ('π', "pi"),
    ('α', "alpha"),
    ('β', "beta"),
    ('γ', "gamma"),
    ('δ', "delta"),
    ('ε', "epsilon"),
    ('θ', "theta"),
    ('λ', "lambda"),
    ('μ', "mu"),
    ('σ', "sigma"),
    ('φ', "phi"),
    ('ω', "omega"),
    ('Δ', "Delta"),
    ('Ω', "Omega"),
];

/// Rewrites math notation inside string and template literal text so labels
/// render with plain fonts: digit runs in superscript become `^digits`,
/// subscript digits become plain digits and a fixed symbol table maps to
/// ASCII. Code, comments and regex bodies are never touched, so identifiers
/// such as `π` keep their meaning.
pub(crate) fn normalize_unicode(text: &str, fixes: &mut Vec<FixRecord>) -> String {
    if text.is_ascii() {
        return text.to_string();
    }
    let mask = mask_literals(text);
    let mut out = String::with_capacity(text.len());
    let mut replaced: Vec<char> = Vec::new();
    let mut in_superscript = false;

    for (offset, ch) in text.char_indices() {
        if !in_string_text(&mask, offset, ch) {
            in_superscript = false;
            out.push(ch);
            continue;
        }
        if let Some(digit) = SUPERSCRIPT_DIGITS.iter().position(|found| *found == ch) {
            if !in_superscript {
                out.push('^');
            }
            out.push(digit_char(digit));
            in_superscript = true;
            note(&mut replaced, ch);
            continue;
        }
        in_superscript = false;
        if let Some(digit) = SUBSCRIPT_DIGITS.iter().position(|found| *found == ch) {
            out.push(digit_char(digit));
            note(&mut replaced, ch);
            continue;
        }
        if let Some((_, ascii)) = SYMBOLS.iter().find(|(symbol, _)| *symbol == ch) {
            out.push_str(ascii);
            note(&mut replaced, ch);
            continue;
        }
        out.push(ch);
    }

    if !replaced.is_empty() {
        fixes.push(FixRecord::new(
            CATEGORY,
            format!(
                "replaced non-ASCII math notation in string text: {}",
                replaced.iter().collect::<String>()
            ),
        ));
    }
    out
}

/// A masked character belongs to string or template text when the nearest
/// code byte before it opens a literal or resumes a template after `${...}`.
fn in_string_text(mask: &str, offset: usize, ch: char) -> bool {
    if mask[offset..].starts_with(ch) {
        return false;
    }
    prev_non_space(mask, offset)
        .is_some_and(|index| matches!(mask.as_bytes()[index], b'\'' | b'"' | b'`' | b'}'))
}

fn digit_char(digit: usize) -> char {
    char::from_digit(digit as u32, 10).unwrap_or('0')
}

fn note(replaced: &mut Vec<char>, ch: char) {
    if !replaced.contains(&ch) {
        replaced.push(ch);
    }
}
