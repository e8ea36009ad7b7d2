//! Regex fallback matcher. Named groups act as bindings.

use crate::catalog::{ResourceRule, Role, TextualPattern};
use crate::core::{CancellationToken, MatchMode};
use crate::error::{Result, ScanError};
use crate::matcher::source::SourceFile;
use crate::matcher::{Bindings, PatternMatcher, RawMatch};
use regex::Regex;
use std::borrow::Cow;

#[derive(Debug, Clone, Copy, Default)]
pub struct RegexMatcher {
    gaps_only: bool,
}

impl RegexMatcher {
    pub fn new() -> Self {
        Self { gaps_only: false }
    }

    /// Runs only roles with no structural pattern at all, to complement a
    /// successful structural pass.
    pub fn gap_filler() -> Self {
        Self { gaps_only: true }
    }
}

impl PatternMatcher for RegexMatcher {
    fn mode(&self) -> MatchMode {
        MatchMode::Textual
    }

    fn match_rule(
        &self,
        source: &SourceFile,
        rule: &ResourceRule,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawMatch>> {
        let mut matches = Vec::new();

        for role in [Role::Acquire, Role::Cleanup] {
            let patterns = rule.patterns(role);
            if self.gaps_only && patterns.iter().any(|p| p.structural.is_some()) {
                continue;
            }
            for (pattern_index, pattern) in patterns.iter().enumerate() {
                let Some(textual) = &pattern.textual else {
                    continue;
                };
                cancel.check()?;
                let regex = regex_for(textual, source, rule)?;

                for caps in regex.captures_iter(&source.text) {
                    let Some(whole) = caps.get(0) else {
                        continue;
                    };
                    if whole.is_empty() || source.is_comment_line(whole.start()) {
                        continue;
                    }

                    let mut bindings = Bindings::new();
                    for name in regex.capture_names().flatten() {
                        if let Some(group) = caps.name(name) {
                            bindings.insert(name, group.as_str());
                        }
                    }

                    matches.push(RawMatch {
                        rule_id: rule.id.clone(),
                        role,
                        pattern_index,
                        span: whole.range(),
                        bindings,
                        text: whole.as_str().to_string(),
                        mode: MatchMode::Textual,
                    });
                }
            }
        }

        Ok(matches)
    }
}

/// The pattern's regex, recompiled when the file's imports rebind one of
/// its calls.
fn regex_for<'a>(
    pattern: &'a TextualPattern,
    source: &SourceFile,
    rule: &ResourceRule,
) -> Result<Cow<'a, Regex>> {
    if !source.imports.affects(pattern.calls.iter().map(String::as_str)) {
        return Ok(Cow::Borrowed(&pattern.regex));
    }
    Regex::new(&source.imports.expand(&pattern.source))
        .map(Cow::Owned)
        .map_err(|e| ScanError::malformed(&rule.id, format!("aliased pattern: {}", e)))
}
