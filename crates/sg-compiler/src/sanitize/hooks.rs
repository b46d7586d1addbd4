use std::sync::OnceLock;

use regex::Regex;
use sg_core::FixRecord;

use super::text::{
    apply_edits, enclosing_open, line_of, mask_literals, matching_close, next_non_space,
    prev_non_space, removal_range, slice, word_before, TextEdit,
};

const CATEGORY: &str = "hooks";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Control,
    Function,
    Other,
}

#[derive(Debug, Clone, Copy)]
struct Block {
    open: usize,
    close: usize,
    kind: BlockKind,
}

#[derive(Debug, Clone)]
struct HoistedCall {
    start: usize,
    end: usize,
    target: Option<usize>,
    hook: String,
    line: usize,
}

/// Moves hook registrations out of conditional and loop blocks so they run in
/// a stable order on every render. Repeats until a pass changes nothing or the
/// pass limit is reached.
pub(crate) fn hoist_hooks(text: &str, pass_limit: usize, fixes: &mut Vec<FixRecord>) -> String {
    let mut current = text.to_string();
    for _ in 0..pass_limit {
        let (next, hoisted) = hoist_pass(&current);
        if hoisted.is_empty() {
            break;
        }
        fixes.extend(hoisted);
        current = next;
    }
    current
}

fn hoist_pass(text: &str) -> (String, Vec<FixRecord>) {
    let mask = mask_literals(text);
    let bytes = mask.as_bytes();
    let blocks = classify_blocks(&mask);
    let mut calls: Vec<HoistedCall> = Vec::new();

    for captures in hook_call_regex().captures_iter(&mask) {
        let (Some(whole), Some(hook)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let call_start = whole.start();
        if call_start > 0 && bytes[call_start - 1] == b'.' {
            continue;
        }
        if calls
            .iter()
            .any(|call| call.start <= call_start && call_start < call.end)
        {
            continue;
        }

        let Some(target) = hoist_target(&blocks, call_start) else {
            continue;
        };

        let start = declaration_prefix_regex()
            .find(&mask[..call_start])
            .map_or(call_start, |prefix| prefix.start());
        let at_boundary = prev_non_space(&mask, start).map_or(true, |index| {
            matches!(bytes[index], b'{' | b';' | b'}')
                || (mask[index + 1..start].contains('\n')
                    && !b"=+-*/,(&|?:.".contains(&bytes[index]))
        });
        if !at_boundary {
            continue;
        }

        let paren = whole.end() - 1;
        let Some(close) = matching_close(&mask, paren) else {
            continue;
        };
        let mut end = close + 1;
        if let Some(next) = next_non_space(&mask, end) {
            if bytes[next] == b';' && !mask[end..next].contains('\n') {
                end = next + 1;
            }
        }

        calls.push(HoistedCall {
            start,
            end,
            target,
            hook: hook.as_str().to_string(),
            line: line_of(text, call_start),
        });
    }

    if calls.is_empty() {
        return (text.to_string(), Vec::new());
    }

    let mut edits = Vec::new();
    let mut fixes = Vec::new();
    let mut top_level = Vec::new();
    let mut per_function: Vec<(usize, Vec<String>)> = Vec::new();
    for call in &calls {
        let statement = slice(text, call.start, call.end).to_string();
        let (start, end) = removal_range(text, call.start, call.end);
        edits.push(TextEdit::remove(start, end));
        match call.target {
            None => top_level.push(statement),
            Some(open) => match per_function.iter_mut().find(|(found, _)| *found == open) {
                Some((_, statements)) => statements.push(statement),
                None => per_function.push((open, vec![statement])),
            },
        }
        fixes.push(FixRecord::new(
            CATEGORY,
            format!(
                "hoisted {} call out of conditional block (line {})",
                call.hook, call.line
            ),
        ));
    }

    if !top_level.is_empty() {
        edits.push(TextEdit::insert(0, format!("{}\n", top_level.join("\n"))));
    }
    for (open, statements) in per_function {
        let inserted = statements
            .iter()
            .map(|statement| format!("\n{}", statement))
            .collect::<String>();
        edits.push(TextEdit::insert(open + 1, inserted));
    }

    (apply_edits(text, edits), fixes)
}

/// `None` when the call is not inside a conditional block of its own
/// function, otherwise the insertion target: `Some(None)` for the top of the
/// program, `Some(Some(open))` for the body opened at `open`.
fn hoist_target(blocks: &[Block], position: usize) -> Option<Option<usize>> {
    let enclosing = blocks
        .iter()
        .filter(|block| block.open < position && position < block.close)
        .collect::<Vec<_>>();
    let function = enclosing
        .iter()
        .rev()
        .find(|block| block.kind == BlockKind::Function);
    let floor = function.map_or(0, |block| block.open + 1);
    let conditional = enclosing
        .iter()
        .any(|block| block.kind == BlockKind::Control && block.open >= floor);
    if !conditional {
        return None;
    }
    Some(function.map(|block| block.open))
}

fn classify_blocks(mask: &str) -> Vec<Block> {
    let bytes = mask.as_bytes();
    let mut stack: Vec<(usize, BlockKind)> = Vec::new();
    let mut blocks = Vec::new();
    for (index, byte) in bytes.iter().enumerate() {
        match byte {
            b'{' => stack.push((index, classify_brace(mask, index))),
            b'}' => {
                if let Some((open, kind)) = stack.pop() {
                    blocks.push(Block {
                        open,
                        close: index,
                        kind,
                    });
                }
            }
            _ => {}
        }
    }
    for (open, kind) in stack {
        blocks.push(Block {
            open,
            close: bytes.len(),
            kind,
        });
    }
    blocks.sort_by_key(|block| block.open);
    blocks
}

fn classify_brace(mask: &str, open: usize) -> BlockKind {
    let bytes = mask.as_bytes();
    let Some(previous) = prev_non_space(mask, open) else {
        return BlockKind::Other;
    };
    match bytes[previous] {
        b'>' if previous > 0 && bytes[previous - 1] == b'=' => BlockKind::Function,
        b')' => {
            let Some(paren) = enclosing_open(mask, previous) else {
                return BlockKind::Other;
            };
            match word_before(mask, paren) {
                "if" | "for" | "while" | "switch" | "catch" | "with" => BlockKind::Control,
                "" => BlockKind::Other,
                _ => BlockKind::Function,
            }
        }
        _ => match word_before(mask, open) {
            "else" | "do" | "try" | "finally" => BlockKind::Control,
            _ => BlockKind::Other,
        },
    }
}

fn hook_call_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r"\b(?:React\.)?(useState|useEffect|useLayoutEffect|useMemo|useRef|useCallback|useReducer|useContext|useFrame|useThree)\s*\(",
        )
        .expect("hook call regex")
    })
}

fn declaration_prefix_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\b(?:const|let|var)\s+(?:[\w$]+|\[[^\[\]]*\]|\{[^{}]*\})\s*=\s*$")
            .expect("declaration prefix regex")
    })
}
