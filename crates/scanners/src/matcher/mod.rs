//! Pattern matching: run a rule's acquisition and cleanup patterns against
//! one file.
//!
//! [`AstGrepMatcher`] and [`RegexMatcher`] implement the same
//! [`PatternMatcher`] trait. [`MatcherChain`] picks structural matching when
//! the binary is available and degrades a single (file, rule) pair to textual
//! matching when ast-grep times out, fails, or prints something unparseable.
//! Results carry their [`MatchMode`] so later stages can tell them apart.

pub mod imports;
pub mod process;
pub mod search;
pub mod source;
pub mod structural;
pub mod textual;

pub use imports::ImportAliases;
pub use process::{ChildGuard, ToolCommand, ToolOutput};
pub use search::TextSearch;
pub use source::SourceFile;
pub use structural::AstGrepMatcher;
pub use textual::RegexMatcher;

use crate::catalog::{ResourceKind, ResourceRule, Role};
use crate::core::{CancellationToken, Diagnostic, MatchMode};
use crate::error::{Result, ScanError};
use crate::scope::{Position, ScopeId, ScopeTree};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::{debug, info};

pub trait PatternMatcher: Send + Sync {
    fn mode(&self) -> MatchMode;

    /// Matches every applicable pattern of `rule` in `source`.
    fn match_rule(
        &self,
        source: &SourceFile,
        rule: &ResourceRule,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawMatch>>;
}

/// Capture name to captured text, whitespace-normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Bindings(BTreeMap<String, String>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, text: &str) {
        self.0.insert(name.to_string(), normalize_whitespace(text));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Bindings {
    fn from(pairs: [(&str, &str); N]) -> Self {
        let mut bindings = Self::new();
        for (name, text) in pairs {
            bindings.insert(name, text);
        }
        bindings
    }
}

/// Drops whitespace, keeping a single space only between two word characters.
pub fn normalize_whitespace(text: &str) -> String {
    let is_word = |c: char| c.is_alphanumeric() || c == '_' || c == '$';
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.trim().chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && out.chars().last().is_some_and(is_word) && is_word(c) {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}

/// Matcher output before scope resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMatch {
    pub rule_id: String,
    pub role: Role,
    pub pattern_index: usize,
    pub span: Range<usize>,
    pub bindings: Bindings,
    pub text: String,
    pub mode: MatchMode,
}

/// A match resolved against the file's scope tree. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub rule_id: String,
    pub role: Role,
    pub kind: ResourceKind,
    pub path: String,
    pub span: Range<usize>,
    pub line: usize,
    pub column: usize,
    pub bindings: Bindings,
    pub text: String,
    pub scope: ScopeId,
    pub position: Position,
    pub mode: MatchMode,
}

impl Match {
    pub fn resolve(raw: RawMatch, rule: &ResourceRule, source: &SourceFile, tree: &ScopeTree) -> Self {
        let leading = raw.text.len() - raw.text.trim_start().len();
        let start = (raw.span.start + leading).min(raw.span.end);
        let span = start..raw.span.end.max(start);
        let (line, column) = source.line_col(span.start);
        let scope = tree.scope_for(&span);
        let position = tree.position_of(&span, scope);

        Self {
            rule_id: raw.rule_id,
            role: raw.role,
            kind: rule.kind.clone(),
            path: source.display.clone(),
            span,
            line,
            column,
            bindings: raw.bindings,
            text: raw.text,
            scope,
            position,
            mode: raw.mode,
        }
    }

    pub fn contains(&self, other: &Match) -> bool {
        self.span.start <= other.span.start
            && other.span.end <= self.span.end
            && self.span != other.span
    }
}

/// Raw matches for one file plus the degradations that happened on the way.
#[derive(Debug, Default)]
pub struct FileMatches {
    pub matches: Vec<RawMatch>,
    pub diagnostics: Vec<Diagnostic>,
    pub degraded_rules: usize,
    pub rules_run: usize,
}

pub struct MatcherChain {
    structural: Option<AstGrepMatcher>,
    textual: RegexMatcher,
    gaps: RegexMatcher,
}

impl MatcherChain {
    pub fn new(structural: Option<AstGrepMatcher>) -> Self {
        Self {
            structural,
            textual: RegexMatcher::new(),
            gaps: RegexMatcher::gap_filler(),
        }
    }

    pub fn textual_only() -> Self {
        Self::new(None)
    }

    pub fn structural_available(&self) -> bool {
        self.structural.is_some()
    }

    /// Runs every rule against one file. Only cancellation is an error;
    /// structural failures degrade that rule to textual matching.
    pub fn match_file(
        &self,
        source: &SourceFile,
        rules: &[ResourceRule],
        cancel: &CancellationToken,
    ) -> Result<FileMatches> {
        let mut out = FileMatches::default();

        for rule in rules {
            cancel.check()?;
            if !rule.anchors_present(&source.text) {
                continue;
            }
            out.rules_run += 1;

            let aliased = source.imports.affects(rule.textual_calls());
            if aliased {
                debug!(file = %source.display, rule = %rule.id, "import aliases: matching textually");
            }
            let structural = self
                .structural
                .as_ref()
                .filter(|_| rule.has_structural() && !aliased);
            let Some(structural) = structural else {
                out.matches
                    .extend(self.textual.match_rule(source, rule, cancel)?);
                continue;
            };

            match structural.match_rule(source, rule, cancel) {
                Ok(found) => {
                    out.matches.extend(found);
                    out.matches.extend(self.gaps.match_rule(source, rule, cancel)?);
                }
                Err(ScanError::Cancelled) => return Err(ScanError::Cancelled),
                Err(err) => {
                    info!(
                        file = %source.display,
                        rule = %rule.id,
                        "structural matcher degraded to textual: {}",
                        err
                    );
                    out.diagnostics.push(
                        Diagnostic::from_error(&err)
                            .with_path(source.display.clone())
                            .with_rule(rule.id.clone()),
                    );
                    out.degraded_rules += 1;
                    out.matches
                        .extend(self.textual.match_rule(source, rule, cancel)?);
                }
            }
        }

        debug!(
            file = %source.display,
            rules = out.rules_run,
            matches = out.matches.len(),
            "matched file"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Language, RuleCatalog};

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  this . timer "), "this.timer");
        assert_eq!(normalize_whitespace("new   Foo(a,\n b)"), "new Foo(a,b)");
        assert_eq!(normalize_whitespace("(e)  =>"), "(e)=>");
    }

    #[test]
    fn test_chain_skips_unanchored_rules() {
        let catalog = RuleCatalog::builtin().unwrap();
        let source = SourceFile::from_text(
            "a.js",
            Language::JavaScript,
            "const t = setInterval(tick, 100);\n",
        );
        let out = MatcherChain::textual_only()
            .match_file(
                &source,
                catalog.rules_for(Language::JavaScript),
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(out.rules_run, 1);
        assert!(out
            .matches
            .iter()
            .all(|m| m.rule_id == "js.timer.interval" && m.mode == MatchMode::Textual));
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_chain_stops_on_cancel() {
        let catalog = RuleCatalog::builtin().unwrap();
        let source = SourceFile::from_text("a.js", Language::JavaScript, "setInterval(f)");
        let token = CancellationToken::new();
        token.cancel();
        let result = MatcherChain::textual_only().match_file(
            &source,
            catalog.rules_for(Language::JavaScript),
            &token,
        );
        assert!(matches!(result, Err(ScanError::Cancelled)));
    }
}
