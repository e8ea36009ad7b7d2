//! Text-based scope resolver for languages without a grammar, and the
//! fallback when tree-sitter fails. Trees it builds are never precise.
//!
//! Brace languages are split at `{`/`}` with strings and comments skipped;
//! the statement text in front of each brace decides what the block is.
//! Python nests by indentation and Ruby by `def`/`do`/`end` keywords.

use super::{Guard, GuardKind, RawScope, RawScopeKind, ScopeResolver, ScopeSkeleton, ScopeTree};
use crate::catalog::{Language, LifecycleTable};
use crate::error::Result;
use crate::matcher::SourceFile;
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

static CLASS_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)(?:class|struct|interface|enum|extension|protocol|record)(?:\s+([A-Za-z_$][\w$]*))?")
        .expect("Invalid regex")
});
static ANONYMOUS_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bnew\s+[\w.<>]+\s*\([^)]*\)\s*$").expect("Invalid regex")
});
static JS_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([\w$]+)\s*\(")
        .expect("Invalid regex")
});
static ANONYMOUS_FUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bfunction\b|\bfunc\s*\(").expect("Invalid regex"));
static GO_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^func\s*(?:\([^)]*\)\s*)?([A-Za-z_]\w*)\s*[\[(]").expect("Invalid regex")
});
static SWIFT_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)func\s+([A-Za-z_]\w*)|^(?:[@\w]+\s+)*(init|deinit)\b")
        .expect("Invalid regex")
});
static METHOD_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:[\w$<>\[\],.?*&@~]+\s+)*(?:[\w$]+::)*([\w$~]+)\s*\([^;]*\)\s*(?:(?:const|override|noexcept|final|async|throws\s+[\w.,\s]+|:\s*[^=]+|->\s*[\w<>\[\]?.:&*\s]+)\s*)*$",
    )
    .expect("Invalid regex")
});
static ASSIGNED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:export|const|let|var|public|private|protected|readonly|static)\s+)*(?:this\.|self\.)?([\w$]+)\s*(?::[^=]*)?[:=]\s*(?:async\s+)?",
    )
    .expect("Invalid regex")
});
static CPP_LAMBDA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[[^\]]*\]\s*(?:\([^)]*\))?\s*(?:mutable)?\s*(?:->\s*[\w:<>]+)?\s*$")
        .expect("Invalid regex")
});
static PY_DEF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:async\s+)?def\s+([A-Za-z_]\w*)").expect("Invalid regex"));
static PY_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^class\s+([A-Za-z_]\w*)").expect("Invalid regex"));
static PY_WITH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:async\s+)?with\s+(.+):").expect("Invalid regex"));
static RUBY_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(class|module|def|begin|if|unless|while|until|case|for)\b\s*([\w.?!=]*)")
        .expect("Invalid regex")
});
static RUBY_DO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\.|\b)([A-Za-z_]\w*[?!]?)\s*(?:\([^)]*\))?\s+do\s*(?:\|[^|]*\|)?\s*$")
        .expect("Invalid regex")
});
static PY_LAMBDA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\blambda\b").expect("Invalid regex"));
static RETURN_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*return\b").expect("Invalid regex"));

const CONTROL_KEYWORDS: &[&str] = &[
    "if", "else", "for", "foreach", "while", "switch", "catch", "try", "do", "with", "synchronized",
    "using", "lock", "guard", "repeat", "case", "default", "when", "return", "get", "set",
    "willSet", "didSet", "function", "func", "new", "throw", "typeof", "await", "in",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicScopeResolver;

impl HeuristicScopeResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn skeleton(&self, source: &SourceFile) -> ScopeSkeleton {
        let mut skeleton = match source.language {
            Language::Python => indentation_blocks(&source.text),
            Language::Ruby => keyword_blocks(&source.text),
            language => brace_blocks(&source.text, language),
        };
        line_statements(source, &mut skeleton);
        skeleton
    }
}

impl ScopeResolver for HeuristicScopeResolver {
    fn is_precise(&self) -> bool {
        false
    }

    fn resolve(&self, source: &SourceFile, lifecycle: &LifecycleTable) -> Result<ScopeTree> {
        Ok(ScopeTree::build(
            self.skeleton(source),
            source.text.len(),
            false,
            lifecycle,
        ))
    }
}

/// What a `{` opens, judged from the statement in front of it.
#[derive(Debug, Clone, PartialEq)]
enum Block {
    Scope(RawScope),
    Guard(GuardKind),
    Plain,
}

struct OpenBlock {
    header_start: usize,
    brace: usize,
    block: Block,
    extra_guard: Option<Guard>,
}

fn brace_blocks(text: &str, language: Language) -> ScopeSkeleton {
    let bytes = text.as_bytes();
    let mut skeleton = ScopeSkeleton::default();
    let mut stack: Vec<OpenBlock> = Vec::new();
    let mut statement_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' | b'`' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = line_end(bytes, i);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = text[i + 2..].find("*/").map_or(bytes.len(), |p| i + 2 + p + 2);
                continue;
            }
            b'#' if language == Language::Cpp && at_line_start(bytes, i) => {
                i = line_end(bytes, i);
                statement_start = i;
                continue;
            }
            b'{' => {
                let (header_start, header) = last_segment(text, statement_start, i);
                let (block, extra_guard) = classify(header, header_start, language);
                stack.push(OpenBlock {
                    header_start,
                    brace: i,
                    block,
                    extra_guard,
                });
                statement_start = i + 1;
            }
            b'}' => {
                if let Some(open) = stack.pop() {
                    close_block(&mut skeleton, open, i + 1);
                }
                statement_start = i + 1;
            }
            b';' => statement_start = i + 1,
            _ => {}
        }
        i += 1;
    }

    while let Some(open) = stack.pop() {
        close_block(&mut skeleton, open, bytes.len());
    }
    skeleton
}

fn close_block(skeleton: &mut ScopeSkeleton, open: OpenBlock, end: usize) {
    match open.block {
        Block::Scope(mut scope) => {
            scope.span = open.brace..end;
            skeleton.scopes.push(scope);
        }
        Block::Guard(kind) => skeleton.guards.push(Guard {
            kind,
            span: open.header_start..end,
        }),
        Block::Plain => {}
    }
    if let Some(mut guard) = open.extra_guard {
        if guard.span.end == 0 {
            guard.span.end = end;
        }
        skeleton.guards.push(guard);
    }
}

/// Last line of the statement before `end` whose start is outside any
/// parentheses, skipping blank trailing lines.
fn last_segment(text: &str, start: usize, end: usize) -> (usize, &str) {
    let header = &text[start..end];
    let mut depth = 0i32;
    let mut cuts = vec![0];
    for (offset, c) in header.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            '\n' if depth <= 0 => cuts.push(offset + 1),
            _ => {}
        }
    }
    let mut upper = header.len();
    for &cut in cuts.iter().rev() {
        let segment = &header[cut..upper];
        if !segment.trim().is_empty() {
            let leading = segment.len() - segment.trim_start().len();
            return (start + cut + leading, segment.trim());
        }
        upper = cut;
    }
    (end, "")
}

fn classify(header: &str, header_start: usize, language: Language) -> (Block, Option<Guard>) {
    let first_word = header
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .next()
        .unwrap_or("");

    if header.is_empty() {
        return (Block::Plain, None);
    }
    if first_word == "finally" {
        return (Block::Guard(GuardKind::Finally), None);
    }
    if header == "defer" {
        return (Block::Guard(GuardKind::Deferred), None);
    }
    if first_word == "try" || first_word == "using" {
        let guard = managed_parens(header, header_start);
        return (Block::Plain, guard);
    }

    if ANONYMOUS_CLASS.is_match(header) {
        return (Block::Scope(RawScope::new(RawScopeKind::Class, 0..0)), None);
    }
    if !header.contains('(') && !header.contains("=>") {
        if let Some(caps) = CLASS_HEADER.captures(header) {
            let name = caps.get(1).map(|m| m.as_str().to_string());
            return (Block::Scope(RawScope::new(RawScopeKind::Class, 0..0).named(name)), None);
        }
    }

    let returned = first_word == "return";
    let closure = |name: Option<String>| {
        RawScope::new(RawScopeKind::Closure, 0..0)
            .named(name)
            .with_callee(callee_of(header))
            .returned(returned)
    };
    let function = |name: &str| RawScope::new(RawScopeKind::Function, 0..0).named(Some(name.to_string()));

    match language {
        Language::Go => {
            if let Some(caps) = GO_FUNCTION.captures(header) {
                return (Block::Scope(function(&caps[1])), None);
            }
            if ANONYMOUS_FUNCTION.is_match(header) {
                let guard = (first_word == "defer").then(|| Guard {
                    kind: GuardKind::Deferred,
                    span: header_start..0,
                });
                return (Block::Scope(closure(assigned_name(header))), guard);
            }
            return (Block::Plain, None);
        }
        Language::Swift => {
            if let Some(caps) = SWIFT_FUNCTION.captures(header) {
                let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
                return (Block::Scope(function(name)), None);
            }
            if CONTROL_KEYWORDS.contains(&first_word) && !returned {
                return (Block::Plain, None);
            }
            if (header.starts_with("var ") || header.starts_with("let ")) && !header.contains('=') {
                return (Block::Plain, None);
            }
            return (Block::Scope(closure(assigned_name(header))), None);
        }
        _ => {}
    }

    if let Some(caps) = JS_FUNCTION.captures(header) {
        return (Block::Scope(function(&caps[1])), None);
    }
    if header.ends_with("=>") || header.ends_with("->") || ANONYMOUS_FUNCTION.is_match(header) {
        return (Block::Scope(closure(assigned_name(header))), None);
    }
    if language == Language::Cpp && CPP_LAMBDA.is_match(header) && header.contains("](") {
        return (Block::Scope(closure(assigned_name(header))), None);
    }
    if let Some(caps) = METHOD_HEADER.captures(header) {
        let name = &caps[1];
        let words_before = &header[..caps.get(1).map_or(0, |m| m.start())];
        let is_control = CONTROL_KEYWORDS.contains(&name)
            || CONTROL_KEYWORDS.contains(&first_word)
            || words_before.trim_end().ends_with('.')
            || words_before.contains('=');
        if !is_control {
            return (Block::Scope(function(name)), None);
        }
    }
    (Block::Plain, None)
}

/// `try (...)` resource list as a managed guard.
fn managed_parens(header: &str, header_start: usize) -> Option<Guard> {
    let open = header.find('(')?;
    let mut depth = 0;
    for (offset, c) in header[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let start = header_start + open;
                    return Some(Guard {
                        kind: GuardKind::Managed,
                        span: start..start + offset + 1,
                    });
                }
            }
            _ => {}
        }
    }
    None
}

fn assigned_name(header: &str) -> Option<String> {
    ASSIGNED_NAME
        .captures(header)
        .filter(|caps| caps.get(0).is_some_and(|m| m.end() < header.len()))
        .map(|caps| caps[1].to_string())
}

/// Name of the call a closure is passed to: the identifier before the last
/// unclosed `(`, or before the final argument list of a trailing closure.
fn callee_of(header: &str) -> Option<String> {
    let bytes = header.as_bytes();
    let mut depth = 0i32;
    let mut paren = None;
    for (i, &b) in bytes.iter().enumerate().rev() {
        match b {
            b')' => depth += 1,
            b'(' if depth == 0 => {
                paren = Some(i);
                break;
            }
            b'(' => depth -= 1,
            _ => {}
        }
    }
    let paren = match paren {
        Some(p) => p,
        None if header.ends_with(')') => {
            let mut depth = 0;
            let mut found = None;
            for (i, &b) in bytes.iter().enumerate().rev() {
                match b {
                    b')' => depth += 1,
                    b'(' => {
                        depth -= 1;
                        if depth == 0 {
                            found = Some(i);
                            break;
                        }
                    }
                    _ => {}
                }
            }
            found?
        }
        None => header.len(),
    };
    let before = header[..paren].trim_end();
    let name: String = before
        .chars()
        .rev()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    (!name.is_empty()).then_some(name)
}

fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    if quote == b'"' && bytes[start..].starts_with(b"\"\"\"") {
        let rest = &bytes[start + 3..];
        return rest
            .windows(3)
            .position(|w| w == b"\"\"\"")
            .map_or(bytes.len(), |p| start + 3 + p + 3);
    }
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' if quote != b'`' => return i,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn line_end(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |p| from + p)
}

fn at_line_start(bytes: &[u8], at: usize) -> bool {
    bytes[..at]
        .iter()
        .rev()
        .take_while(|&&b| b != b'\n')
        .all(|b| b.is_ascii_whitespace())
}

/// Byte ranges of each line without its newline.
fn lines(text: &str) -> impl Iterator<Item = Range<usize>> + '_ {
    let mut offset = 0;
    text.split_inclusive('\n').map(move |line| {
        let start = offset;
        offset += line.len();
        start..start + line.trim_end_matches(['\n', '\r']).len()
    })
}

fn indent_of(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

struct IndentBlock {
    indent: usize,
    start: usize,
    block: Block,
}

fn indentation_blocks(text: &str) -> ScopeSkeleton {
    let mut skeleton = ScopeSkeleton::default();
    let mut stack: Vec<IndentBlock> = Vec::new();
    let mut last_content_end = 0;
    let mut depth = 0i32;
    let mut in_docstring: Option<&str> = None;

    for range in lines(text) {
        let line = &text[range.clone()];
        let trimmed = line.trim();

        if let Some(delim) = in_docstring {
            if trimmed.contains(delim) {
                in_docstring = None;
            }
            last_content_end = range.end;
            continue;
        }
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if depth <= 0 {
            let indent = indent_of(line);
            while stack.last().is_some_and(|top| indent <= top.indent) {
                if let Some(top) = stack.pop() {
                    close_indent_block(&mut skeleton, top, last_content_end);
                }
            }

            let start = range.start + (line.len() - line.trim_start().len());
            let block = if let Some(caps) = PY_DEF.captures(trimmed) {
                Block::Scope(
                    RawScope::new(RawScopeKind::Function, 0..0).named(Some(caps[1].to_string())),
                )
            } else if let Some(caps) = PY_CLASS.captures(trimmed) {
                Block::Scope(
                    RawScope::new(RawScopeKind::Class, 0..0).named(Some(caps[1].to_string())),
                )
            } else if trimmed.starts_with("finally") && trimmed.trim_end().ends_with(':') {
                Block::Guard(GuardKind::Finally)
            } else {
                Block::Plain
            };

            if let Some(caps) = PY_WITH.captures(trimmed) {
                if let Some(items) = caps.get(1) {
                    let items_start = start + items.start();
                    skeleton.guards.push(Guard {
                        kind: GuardKind::Managed,
                        span: items_start..start + items.end(),
                    });
                }
            }
            if block != Block::Plain {
                stack.push(IndentBlock {
                    indent,
                    start,
                    block,
                });
            }
        }

        let lambda = PY_LAMBDA
            .find_iter(line)
            .map(|m| m.start())
            .find(|&at| is_python_code(line, at));
        if let Some(at) = lambda {
            let header = &line[..at];
            skeleton.scopes.push(
                RawScope::new(RawScopeKind::Closure, range.start + at..range.end)
                    .with_callee(callee_of(header.trim_end()))
                    .returned(RETURN_LINE.is_match(header)),
            );
        }

        for delim in ["\"\"\"", "'''"] {
            if trimmed.matches(delim).count() % 2 == 1 {
                in_docstring = Some(delim);
                break;
            }
        }
        depth += bracket_delta(line);
        last_content_end = range.end;
    }

    while let Some(top) = stack.pop() {
        close_indent_block(&mut skeleton, top, text.len());
    }
    skeleton
}

fn close_indent_block(skeleton: &mut ScopeSkeleton, open: IndentBlock, end: usize) {
    let span = open.start..end.max(open.start + 1);
    match open.block {
        Block::Scope(mut scope) => {
            scope.span = span;
            skeleton.scopes.push(scope);
        }
        Block::Guard(kind) => skeleton.guards.push(Guard { kind, span }),
        Block::Plain => {}
    }
}

/// Whether byte `at` of a Python line lies outside string literals and comments.
fn is_python_code(line: &str, at: usize) -> bool {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if i >= at {
            return quote.is_none();
        }
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '#' => return false,
            None if c == '"' || c == '\'' => quote = Some(c),
            None => {}
        }
    }
    quote.is_none()
}

fn bracket_delta(line: &str) -> i32 {
    let code = line.split('#').next().unwrap_or(line);
    code.chars()
        .map(|c| match c {
            '(' | '[' | '{' => 1,
            ')' | ']' | '}' => -1,
            _ => 0,
        })
        .sum()
}

struct KeywordBlock {
    start: usize,
    block: Block,
    ensure: Option<usize>,
}

fn keyword_blocks(text: &str) -> ScopeSkeleton {
    let mut skeleton = ScopeSkeleton::default();
    let mut stack: Vec<KeywordBlock> = Vec::new();

    for range in lines(text) {
        let line = &text[range.clone()];
        let code = line.split(" #").next().unwrap_or(line);
        let trimmed = code.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let start = range.start + (line.len() - line.trim_start().len());

        if trimmed == "ensure" {
            if let Some(top) = stack.last_mut() {
                top.ensure = Some(start);
            }
            continue;
        }
        if trimmed == "end" || trimmed.starts_with("end.") || trimmed.starts_with("end)") {
            if let Some(top) = stack.pop() {
                close_keyword_block(&mut skeleton, top, range.end);
            }
            continue;
        }

        let opened = if let Some(caps) = RUBY_OPEN.captures(trimmed) {
            let name = caps
                .get(2)
                .map(|m| m.as_str().trim_start_matches("self.").to_string());
            match &caps[1] {
                "class" | "module" => {
                    Some(Block::Scope(RawScope::new(RawScopeKind::Class, 0..0).named(name)))
                }
                "def" if trimmed.contains(" = ") && !trimmed.ends_with('=') => None,
                "def" => Some(Block::Scope(
                    RawScope::new(RawScopeKind::Function, 0..0).named(name),
                )),
                _ => Some(Block::Plain),
            }
        } else if let Some(caps) = RUBY_DO.captures(trimmed) {
            Some(Block::Scope(
                RawScope::new(RawScopeKind::Closure, 0..0)
                    .with_callee(Some(caps[1].to_string()))
                    .returned(RETURN_LINE.is_match(trimmed)),
            ))
        } else {
            None
        };

        if let Some(block) = opened {
            let open = KeywordBlock {
                start,
                block,
                ensure: None,
            };
            if trimmed.ends_with(" end") || trimmed.ends_with(";end") {
                close_keyword_block(&mut skeleton, open, range.end);
            } else {
                stack.push(open);
            }
        }
    }

    while let Some(top) = stack.pop() {
        close_keyword_block(&mut skeleton, top, text.len());
    }
    skeleton
}

fn close_keyword_block(skeleton: &mut ScopeSkeleton, open: KeywordBlock, end: usize) {
    if let Some(ensure) = open.ensure {
        skeleton.guards.push(Guard {
            kind: GuardKind::Finally,
            span: ensure..end,
        });
    }
    if let Block::Scope(mut scope) = open.block {
        scope.span = open.start..end;
        skeleton.scopes.push(scope);
    }
}

/// `return` lines and statement-level `defer` in every language.
fn line_statements(source: &SourceFile, skeleton: &mut ScopeSkeleton) {
    let text = &source.text;
    for range in lines(text) {
        let line = &text[range.clone()];
        let trimmed = line.trim_start();
        let start = range.start + (line.len() - trimmed.len());
        if RETURN_LINE.is_match(trimmed) {
            skeleton.returns.push(start..range.end);
        }
        if source.language == Language::Go
            && trimmed.starts_with("defer ")
            && !trimmed.trim_end().ends_with('{')
        {
            skeleton.guards.push(Guard {
                kind: GuardKind::Deferred,
                span: start..range.end,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RuleCatalog;
    use crate::scope::{Position, ScopeKind};

    fn resolve(display: &str, language: Language, text: &str) -> (SourceFile, ScopeTree) {
        let source = SourceFile::from_text(display, language, text);
        let catalog = RuleCatalog::builtin().unwrap();
        let tree = HeuristicScopeResolver::new()
            .resolve(&source, catalog.lifecycle())
            .unwrap();
        (source, tree)
    }

    fn at(source: &SourceFile, needle: &str) -> Range<usize> {
        let start = source.text.find(needle).unwrap();
        start..start + needle.len()
    }

    #[test]
    fn test_swift_lifecycle_methods() {
        let (source, tree) = resolve(
            "Clock.swift",
            Language::Swift,
            r#"
class ClockController: UIViewController {
    var timer: Timer?

    override func viewDidLoad() {
        super.viewDidLoad()
        timer = Timer.scheduledTimer(withTimeInterval: 1, repeats: true) { _ in
            self.tick() // "}" in a comment
        }
    }

    deinit {
        timer?.invalidate()
    }
}
"#,
        );
        assert!(!tree.is_precise());

        let load = tree.scope_for(&at(&source, "Timer.scheduledTimer"));
        assert_eq!(tree.get(load).kind, ScopeKind::LifecycleCallback);
        assert_eq!(tree.get(load).name.as_deref(), Some("viewDidLoad"));

        let closure = tree.scope_for(&at(&source, "self.tick()"));
        assert_eq!(tree.get(closure).kind, ScopeKind::Closure);
        assert_eq!(tree.get(closure).parent, Some(load));

        let deinit = tree.scope_for(&at(&source, "timer?.invalidate"));
        assert_eq!(tree.get(deinit).name.as_deref(), Some("deinit"));
        assert_eq!(tree.owner(deinit), tree.owner(load));
    }

    #[test]
    fn test_javascript_arrow_and_hook() {
        let (source, tree) = resolve(
            "a.js",
            Language::JavaScript,
            "function App() {\n  useEffect(() => {\n    const t = setInterval(f, 5);\n    return () => {\n      clearInterval(t);\n    };\n  }, []);\n  if (x) { y(); }\n}\n",
        );
        let hook = tree.scope_for(&at(&source, "setInterval"));
        assert_eq!(tree.get(hook).name.as_deref(), Some("useEffect"));
        let cleanup = tree.scope_for(&at(&source, "clearInterval"));
        assert!(tree.get(cleanup).returned);
        assert_eq!(tree.get(cleanup).parent, Some(hook));

        let plain = tree.scope_for(&at(&source, "y()"));
        assert_eq!(tree.get(plain).name.as_deref(), Some("App"));
    }

    #[test]
    fn test_go_defer_lines_and_literals() {
        let (source, tree) = resolve(
            "main.go",
            Language::Go,
            "package main\n\nfunc run() {\n\tt := time.NewTicker(d)\n\tdefer t.Stop()\n\tdefer func() {\n\t\tf.Close()\n\t}()\n}\n",
        );
        let stop = at(&source, "t.Stop()");
        let run = tree.scope_for(&stop);
        assert_eq!(tree.get(run).name.as_deref(), Some("run"));
        assert_eq!(tree.position_of(&stop, run), Position::Deferred);

        let closure = tree.scope_for(&at(&source, "f.Close()"));
        assert_eq!(tree.get(closure).kind, ScopeKind::Closure);
        assert!(tree.get(closure).deferred);
    }

    #[test]
    fn test_python_indentation() {
        let (source, tree) = resolve(
            "svc.py",
            Language::Python,
            "class Service:\n    def __init__(self):\n        self.f = open(\n            'log')\n\n    def close(self):\n        self.f.close()\n\ndef main():\n    with open('x') as g:\n        pass\n",
        );
        let init = tree.scope_for(&at(&source, "open(\n"));
        assert_eq!(tree.get(init).kind, ScopeKind::Method);
        let close = tree.scope_for(&at(&source, "self.f.close"));
        assert_eq!(tree.get(close).name.as_deref(), Some("close"));
        assert_eq!(tree.enclosing_class(init), tree.enclosing_class(close));

        let managed = at(&source, "open('x')");
        let main = tree.scope_for(&managed);
        assert_eq!(tree.get(main).name.as_deref(), Some("main"));
        assert_eq!(tree.position_of(&managed, main), Position::Managed);
    }

    #[test]
    fn test_python_lambda_needs_the_keyword_in_code() {
        let (source, tree) = resolve(
            "cb.py",
            Language::Python,
            "def main():\n    lambda_count = 1\n    print(\"lambda\")  # lambda here\n    handler = lambda e: sock.close()\n",
        );
        let closures: Vec<_> = tree
            .scopes()
            .iter()
            .filter(|s| s.kind == ScopeKind::Closure)
            .collect();
        assert_eq!(closures.len(), 1);
        let close = tree.scope_for(&at(&source, "sock.close()"));
        assert_eq!(tree.get(close).kind, ScopeKind::Closure);

        let count = tree.scope_for(&at(&source, "lambda_count"));
        assert_eq!(tree.get(count).name.as_deref(), Some("main"));
    }

    #[test]
    fn test_is_python_code() {
        assert!(is_python_code("f = lambda: 1", 4));
        assert!(!is_python_code("s = 'lambda'", 5));
        assert!(!is_python_code("x = 1  # lambda", 9));
        assert!(is_python_code(r#"s = "a\"b"; lambda: 0"#, 12));
    }

    #[test]
    fn test_ruby_ensure_and_blocks() {
        let (source, tree) = resolve(
            "io.rb",
            Language::Ruby,
            "def read(path)\n  f = File.open(path)\n  f.read\nensure\n  f.close\nend\n\nFile.open(path) do |g|\n  g.read\nend\n",
        );
        let close = at(&source, "f.close");
        let read = tree.scope_for(&close);
        assert_eq!(tree.get(read).name.as_deref(), Some("read"));
        assert_eq!(tree.position_of(&close, read), Position::Finally);

        let block = tree.scope_for(&at(&source, "g.read"));
        assert_eq!(tree.get(block).kind, ScopeKind::Closure);
    }

    #[test]
    fn test_cpp_methods_and_preprocessor() {
        let (source, tree) = resolve(
            "io.cpp",
            Language::Cpp,
            "#include <cstdio>\n#define X {\nvoid Reader::load() const {\n  FILE* fp = fopen(\"a\", \"r\");\n  if (fp) {\n    fclose(fp);\n  }\n}\n",
        );
        let scope = tree.scope_for(&at(&source, "fclose"));
        assert_eq!(tree.get(scope).name.as_deref(), Some("load"));
    }
}
