use crate::catalog::lifecycle::LifecycleTable;
use crate::catalog::rule::{
    CleanupContext, Language, PatternSpec, ResourceKind, ResourceRule, TextualPattern,
};
use crate::core::{Diagnostic, Severity};
use crate::error::{Result, ScanError};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    lifecycle: Option<LifecycleTable>,
    #[serde(default)]
    rules: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    id: String,
    language: String,
    kind: String,
    category: String,
    severity: String,
    #[serde(default)]
    anchors: Vec<String>,
    summary: String,
    #[serde(default)]
    remediation: Option<String>,
    acquire: Vec<RawPattern>,
    cleanup: Vec<RawPattern>,
    #[serde(default = "default_contexts")]
    contexts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawPattern {
    #[serde(default)]
    structural: Option<String>,
    #[serde(default)]
    textual: Option<String>,
}

fn default_contexts() -> Vec<String> {
    vec!["same_scope".to_string(), "finally".to_string()]
}

/// Result of loading one rule document: the rules that validated, the
/// lifecycle section if present, and one diagnostic per dropped rule.
#[derive(Debug, Default)]
pub struct LoadedDocument {
    pub rules: Vec<ResourceRule>,
    pub lifecycle: Option<LifecycleTable>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parses a rule document. Only a document that is not JSON at all fails;
/// individual bad rules are dropped with a diagnostic.
pub fn parse_document(text: &str, origin: &str) -> Result<LoadedDocument> {
    let doc: RawDocument = serde_json::from_str(text)?;
    let mut loaded = LoadedDocument {
        lifecycle: doc.lifecycle,
        ..LoadedDocument::default()
    };

    for (index, value) in doc.rules.into_iter().enumerate() {
        let fallback_id = value
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}#{}", origin, index));

        match parse_rule(value, &fallback_id) {
            Ok(rule) => loaded.rules.push(rule),
            Err(err) => {
                warn!(origin, rule = %fallback_id, "dropping rule: {}", err);
                loaded
                    .diagnostics
                    .push(Diagnostic::from_error(&err).with_path(origin));
            }
        }
    }

    Ok(loaded)
}

fn parse_rule(value: Value, fallback_id: &str) -> Result<ResourceRule> {
    let raw: RawRule = serde_json::from_value(value)
        .map_err(|e| ScanError::malformed(fallback_id, e.to_string()))?;
    let id = raw.id.trim().to_string();
    let malformed = |reason: String| ScanError::malformed(id.clone(), reason);

    if id.is_empty() {
        return Err(ScanError::malformed(fallback_id, "empty rule id"));
    }
    let language = Language::parse(&raw.language)
        .ok_or_else(|| malformed(format!("unknown language `{}`", raw.language)))?;
    let severity = Severity::parse(&raw.severity)
        .ok_or_else(|| malformed(format!("unknown severity `{}`", raw.severity)))?;
    if raw.kind.trim().is_empty() {
        return Err(malformed("empty resource kind".to_string()));
    }
    if raw.category.trim().is_empty() {
        return Err(malformed("empty category".to_string()));
    }
    if raw.acquire.is_empty() {
        return Err(malformed("no acquisition patterns".to_string()));
    }
    if raw.cleanup.is_empty() {
        return Err(malformed("no cleanup patterns".to_string()));
    }

    let mut contexts = Vec::new();
    for name in &raw.contexts {
        let context = CleanupContext::parse(name)
            .ok_or_else(|| malformed(format!("unknown cleanup context `{}`", name)))?;
        if !contexts.contains(&context) {
            contexts.push(context);
        }
    }
    if contexts.is_empty() {
        return Err(malformed("no cleanup contexts".to_string()));
    }

    let acquire = compile_patterns(&raw.acquire, "acquire").map_err(&malformed)?;
    let cleanup = compile_patterns(&raw.cleanup, "cleanup").map_err(&malformed)?;

    Ok(ResourceRule {
        id,
        language,
        kind: ResourceKind::new(raw.kind.trim()),
        category: raw.category.trim().to_string(),
        severity,
        acquire,
        cleanup,
        anchors: raw.anchors.into_iter().filter(|a| !a.is_empty()).collect(),
        summary: raw.summary,
        remediation: raw.remediation,
        contexts,
    })
}

fn compile_patterns(raw: &[RawPattern], role: &str) -> std::result::Result<Vec<PatternSpec>, String> {
    raw.iter()
        .enumerate()
        .map(|(index, pattern)| {
            let structural = pattern
                .structural
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            let textual = match pattern.textual.as_deref().filter(|s| !s.is_empty()) {
                Some(source) => Some(
                    TextualPattern::compile(source)
                        .map_err(|e| format!("{}#{}: bad regex: {}", role, index, e))?,
                ),
                None => None,
            };
            if structural.is_none() && textual.is_none() {
                return Err(format!("{}#{} has neither a structural nor a textual form", role, index));
            }
            Ok(PatternSpec {
                structural,
                textual,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DiagnosticKind;

    const GOOD: &str = r#"{
        "id": "js.timer.interval",
        "language": "javascript",
        "kind": "timer",
        "category": "async-resources",
        "severity": "critical",
        "summary": "interval",
        "acquire": [{"textual": "(?P<T>\\w+) = setInterval\\("}],
        "cleanup": [{"structural": "clearInterval($T)"}]
    }"#;

    #[test]
    fn test_good_rule_uses_default_contexts() {
        let doc = format!(r#"{{"rules": [{}]}}"#, GOOD);
        let loaded = parse_document(&doc, "test").unwrap();
        assert_eq!(loaded.rules.len(), 1);
        assert!(loaded.diagnostics.is_empty());
        let rule = &loaded.rules[0];
        assert_eq!(rule.contexts, vec![CleanupContext::SameScope, CleanupContext::Finally]);
        assert!(rule.has_structural());
    }

    #[test]
    fn test_bad_rules_are_dropped_individually() {
        let doc = format!(
            r#"{{"rules": [
                {good},
                {{"id": "no.lang", "language": "cobol", "kind": "k", "category": "c",
                  "severity": "info", "summary": "s",
                  "acquire": [{{"textual": "a"}}], "cleanup": [{{"textual": "b"}}]}},
                {{"id": "bad.regex", "language": "go", "kind": "k", "category": "c",
                  "severity": "info", "summary": "s",
                  "acquire": [{{"textual": "(unclosed"}}], "cleanup": [{{"textual": "b"}}]}},
                {{"id": "empty.pattern", "language": "go", "kind": "k", "category": "c",
                  "severity": "info", "summary": "s",
                  "acquire": [{{}}], "cleanup": [{{"textual": "b"}}]}},
                {{"id": "bad.context", "language": "go", "kind": "k", "category": "c",
                  "severity": "info", "summary": "s", "contexts": ["someday"],
                  "acquire": [{{"textual": "a"}}], "cleanup": [{{"textual": "b"}}]}},
                {{"language": "go"}},
                42
            ]}}"#,
            good = GOOD
        );
        let loaded = parse_document(&doc, "rules.json").unwrap();
        assert_eq!(loaded.rules.len(), 1);
        assert_eq!(loaded.diagnostics.len(), 6);
        assert!(loaded
            .diagnostics
            .iter()
            .all(|d| d.kind == DiagnosticKind::MalformedRule));
        assert!(loaded
            .diagnostics
            .iter()
            .any(|d| d.rule_id.as_deref() == Some("rules.json#6")));
    }

    #[test]
    fn test_non_json_document_fails() {
        assert!(parse_document("not json", "x").is_err());
    }
}
