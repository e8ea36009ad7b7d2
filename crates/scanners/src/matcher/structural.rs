//! Structural matching through the external `ast-grep` binary.

use crate::catalog::{ResourceRule, Role};
use crate::core::{CancellationToken, MatchMode};
use crate::error::{Result, ScanError};
use crate::matcher::process::{probe_version, ToolCommand};
use crate::matcher::source::SourceFile;
use crate::matcher::{Bindings, PatternMatcher, RawMatch};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, trace};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct AstGrepMatcher {
    binary: PathBuf,
    version: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AstGrepRecord {
    text: String,
    range: AstGrepRange,
    rule_id: Option<String>,
    #[serde(default)]
    meta_variables: Option<AstGrepMetaVariables>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AstGrepRange {
    byte_offset: AstGrepByteOffset,
}

#[derive(Debug, Deserialize)]
struct AstGrepByteOffset {
    start: usize,
    end: usize,
}

#[derive(Debug, Serialize)]
struct InlineRule<'a> {
    id: String,
    language: &'a str,
    severity: &'static str,
    rule: InlinePattern<'a>,
}

#[derive(Debug, Serialize)]
struct InlinePattern<'a> {
    pattern: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct AstGrepMetaVariables {
    #[serde(default)]
    single: HashMap<String, AstGrepCapture>,
}

#[derive(Debug, Deserialize)]
struct AstGrepCapture {
    text: String,
}

impl AstGrepMatcher {
    /// Locates ast-grep: the explicit override, else `ast-grep`, else `sg`
    /// when its version output identifies it as ast-grep.
    pub fn probe(binary_override: Option<&Path>, timeout: Duration) -> Result<Self> {
        let candidates: Vec<(PathBuf, bool)> = match binary_override {
            Some(path) => vec![(path.to_path_buf(), false)],
            None => vec![
                (PathBuf::from("ast-grep"), false),
                (PathBuf::from("sg"), true),
            ],
        };

        for (binary, must_identify) in candidates {
            let Some(version) = probe_version(&binary, &["--version"], PROBE_TIMEOUT) else {
                trace!(binary = %binary.display(), "ast-grep probe failed");
                continue;
            };
            if must_identify && !version.to_ascii_lowercase().contains("ast-grep") {
                debug!(binary = %binary.display(), "`sg` is not ast-grep: {}", version);
                continue;
            }
            debug!(binary = %binary.display(), %version, "structural matcher available");
            return Ok(Self {
                binary,
                version,
                timeout,
            });
        }

        Err(ScanError::ToolUnavailable {
            tool: "ast-grep".to_string(),
            reason: "neither `ast-grep` nor `sg` could be run".to_string(),
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// One YAML document per structural pattern, ids `acquire#N` / `cleanup#N`.
    pub fn inline_rules(rule: &ResourceRule, language: &str) -> Result<String> {
        let mut documents = Vec::new();
        for role in [Role::Acquire, Role::Cleanup] {
            for (index, pattern) in rule.patterns(role).iter().enumerate() {
                let Some(structural) = &pattern.structural else {
                    continue;
                };
                let inline = InlineRule {
                    id: format!("{}#{}", role, index),
                    language,
                    severity: "warning",
                    rule: InlinePattern {
                        pattern: structural,
                    },
                };
                documents.push(serde_yaml::to_string(&inline)?);
            }
        }
        Ok(documents.join("---\n"))
    }

    /// Parses `--json=stream` output: one JSON object per line.
    pub fn parse_stream(stdout: &str, rule: &ResourceRule) -> Result<Vec<RawMatch>> {
        let mut matches = Vec::new();
        for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let record: AstGrepRecord = serde_json::from_str(line)?;
            let Some((role, pattern_index)) = record.rule_id.as_deref().and_then(parse_rule_id)
            else {
                trace!(rule = %rule.id, "ignoring record without a pattern id");
                continue;
            };

            let mut bindings = Bindings::new();
            if let Some(meta) = record.meta_variables {
                for (name, capture) in meta.single {
                    bindings.insert(&name, &capture.text);
                }
            }

            matches.push(RawMatch {
                rule_id: rule.id.clone(),
                role,
                pattern_index,
                span: record.range.byte_offset.start..record.range.byte_offset.end,
                bindings,
                text: record.text,
                mode: MatchMode::Structural,
            });
        }
        Ok(matches)
    }
}

fn parse_rule_id(id: &str) -> Option<(Role, usize)> {
    let (role, index) = id.split_once('#')?;
    let role = match role {
        "acquire" => Role::Acquire,
        "cleanup" => Role::Cleanup,
        _ => return None,
    };
    Some((role, index.parse().ok()?))
}

impl PatternMatcher for AstGrepMatcher {
    fn mode(&self) -> MatchMode {
        MatchMode::Structural
    }

    fn match_rule(
        &self,
        source: &SourceFile,
        rule: &ResourceRule,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawMatch>> {
        let rules = Self::inline_rules(rule, source.language.ast_grep_name(&source.path))?;
        if rules.is_empty() {
            return Ok(Vec::new());
        }

        let output = ToolCommand::new(&self.binary, self.timeout)
            .arg("scan")
            .arg("--inline-rules")
            .arg(&rules)
            .arg("--json=stream")
            .arg(&source.path)
            .run(cancel)?;

        // Some ast-grep releases exit 1 whenever a rule matched.
        match output.code() {
            Some(0) | Some(1) => {}
            other => {
                let stderr = output.stderr_lossy();
                return Err(ScanError::tool_failed(
                    "ast-grep",
                    format!(
                        "exit status {:?}: {}",
                        other,
                        stderr.lines().next().unwrap_or("").trim()
                    ),
                ));
            }
        }
        if output.truncated {
            return Err(ScanError::tool_failed("ast-grep", "output incomplete"));
        }

        let matches = Self::parse_stream(&output.stdout_lossy(), rule)
            .map_err(|e| ScanError::tool_failed("ast-grep", format!("unparseable output: {}", e)))?;
        debug!(
            file = %source.display,
            rule = %rule.id,
            matches = matches.len(),
            elapsed_ms = output.elapsed.as_millis() as u64,
            "structural match"
        );
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RuleCatalog;

    fn interval_rule() -> ResourceRule {
        RuleCatalog::builtin()
            .unwrap()
            .rule("js.timer.interval")
            .unwrap()
            .clone()
    }

    #[test]
    fn test_inline_rules_are_yaml_documents() {
        let doc = AstGrepMatcher::inline_rules(&interval_rule(), "javascript").unwrap();
        let documents: Vec<serde_yaml::Value> = serde_yaml::Deserializer::from_str(&doc)
            .map(serde_yaml::Value::deserialize)
            .collect::<std::result::Result<_, _>>()
            .unwrap();

        assert_eq!(documents.len(), 6);
        assert_eq!(documents[0]["id"].as_str(), Some("acquire#0"));
        assert_eq!(documents[0]["language"].as_str(), Some("javascript"));
        assert_eq!(
            documents[0]["rule"]["pattern"].as_str(),
            Some("const $T = setInterval($$$ARGS)")
        );
        assert_eq!(documents[5]["id"].as_str(), Some("cleanup#0"));
        assert_eq!(documents[5]["rule"]["pattern"].as_str(), Some("clearInterval($T)"));
        assert!(!doc.contains("textual"));
    }

    #[test]
    fn test_inline_rules_keep_yaml_metacharacters() {
        let mut rule = interval_rule();
        rule.acquire[0].structural = Some("x: {a: $A} # \"quoted\" 'single'".to_string());
        let doc = AstGrepMatcher::inline_rules(&rule, "javascript").unwrap();
        let first = serde_yaml::Deserializer::from_str(&doc).next().unwrap();
        let value = serde_yaml::Value::deserialize(first).unwrap();
        assert_eq!(
            value["rule"]["pattern"].as_str(),
            Some("x: {a: $A} # \"quoted\" 'single'")
        );
    }

    #[test]
    fn test_parse_stream_records() {
        let stdout = r#"{"text":"const timer = setInterval(tick, 1000)","range":{"byteOffset":{"start":10,"end":47},"start":{"line":1,"column":2},"end":{"line":1,"column":39}},"file":"a.js","ruleId":"acquire#0","severity":"warning","metaVariables":{"single":{"T":{"text":"timer","range":{"byteOffset":{"start":16,"end":21}}}},"multi":{"ARGS":[]},"transformed":{}}}
{"text":"clearInterval( timer )","range":{"byteOffset":{"start":60,"end":82}},"ruleId":"cleanup#0","metaVariables":{"single":{"T":{"text":" timer "}},"multi":{}}}
{"text":"x","range":{"byteOffset":{"start":0,"end":1}},"ruleId":"unrelated"}
"#;
        let matches = AstGrepMatcher::parse_stream(stdout, &interval_rule()).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].role, Role::Acquire);
        assert_eq!(matches[0].span, 10..47);
        assert_eq!(matches[0].bindings.get("T"), Some("timer"));
        assert_eq!(matches[1].role, Role::Cleanup);
        assert_eq!(matches[1].bindings.get("T"), Some("timer"));
        assert!(matches.iter().all(|m| m.mode == MatchMode::Structural));
    }

    #[test]
    fn test_parse_stream_rejects_garbage() {
        assert!(AstGrepMatcher::parse_stream("not json\n", &interval_rule()).is_err());
    }

    #[test]
    fn test_parse_rule_id() {
        assert_eq!(parse_rule_id("cleanup#3"), Some((Role::Cleanup, 3)));
        assert_eq!(parse_rule_id("acquire"), None);
        assert_eq!(parse_rule_id("other#1"), None);
    }
}
