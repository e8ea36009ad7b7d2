use crate::core::Severity;
use crate::matcher::imports::{placeholder_calls, ImportAliases};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    TypeScript,
    Python,
    Go,
    Java,
    Swift,
    Cpp,
    Ruby,
}

impl Language {
    pub const ALL: [Language; 8] = [
        Self::JavaScript,
        Self::TypeScript,
        Self::Python,
        Self::Go,
        Self::Java,
        Self::Swift,
        Self::Cpp,
        Self::Ruby,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "javascript" | "js" => Some(Self::JavaScript),
            "typescript" | "ts" => Some(Self::TypeScript),
            "python" | "py" => Some(Self::Python),
            "go" | "golang" => Some(Self::Go),
            "java" => Some(Self::Java),
            "swift" => Some(Self::Swift),
            "cpp" | "c++" | "c" => Some(Self::Cpp),
            "ruby" | "rb" => Some(Self::Ruby),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            "ts" | "tsx" | "mts" | "cts" => Some(Self::TypeScript),
            "py" | "pyw" => Some(Self::Python),
            "go" => Some(Self::Go),
            "java" => Some(Self::Java),
            "swift" => Some(Self::Swift),
            "c" | "cc" | "cpp" | "cxx" | "h" | "hh" | "hpp" | "hxx" => Some(Self::Cpp),
            "rb" => Some(Self::Ruby),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Python => "python",
            Self::Go => "go",
            Self::Java => "java",
            Self::Swift => "swift",
            Self::Cpp => "cpp",
            Self::Ruby => "ruby",
        }
    }

    /// Language id passed to ast-grep; TSX needs its own grammar.
    pub fn ast_grep_name(&self, path: &Path) -> &'static str {
        let is_tsx = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("tsx"))
            .unwrap_or(false);
        match self {
            Self::TypeScript if is_tsx => "tsx",
            other => other.as_str(),
        }
    }

    pub fn line_comment(&self) -> &'static str {
        match self {
            Self::Python | Self::Ruby => "#",
            _ => "//",
        }
    }

    pub fn has_block_comments(&self) -> bool {
        !matches!(self, Self::Python | Self::Ruby)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource kinds are data: any string a rule file declares.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKind(String);

impl ResourceKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Acquire,
    Cleanup,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acquire => write!(f, "acquire"),
            Self::Cleanup => write!(f, "cleanup"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextualPattern {
    pub source: String,
    /// Compiled with every `@{...}` call placeholder at its default spelling.
    pub regex: Regex,
    pub calls: Vec<String>,
}

impl TextualPattern {
    pub fn compile(source: &str) -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            source: source.to_string(),
            regex: Regex::new(&ImportAliases::default().expand(source))?,
            calls: placeholder_calls(source),
        })
    }
}

/// One acquisition or cleanup pattern; at least one form is present.
#[derive(Debug, Clone)]
pub struct PatternSpec {
    pub structural: Option<String>,
    pub textual: Option<TextualPattern>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupContext {
    SameScope,
    Finally,
    ReturnedClosure,
    PairedLifecycle,
    TeardownMethod,
}

impl CleanupContext {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "same_scope" => Some(Self::SameScope),
            "finally" => Some(Self::Finally),
            "returned_closure" => Some(Self::ReturnedClosure),
            "paired_lifecycle" => Some(Self::PairedLifecycle),
            "teardown_method" => Some(Self::TeardownMethod),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SameScope => "same_scope",
            Self::Finally => "finally",
            Self::ReturnedClosure => "returned_closure",
            Self::PairedLifecycle => "paired_lifecycle",
            Self::TeardownMethod => "teardown_method",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResourceRule {
    pub id: String,
    pub language: Language,
    pub kind: ResourceKind,
    pub category: String,
    pub severity: Severity,
    pub acquire: Vec<PatternSpec>,
    pub cleanup: Vec<PatternSpec>,
    pub anchors: Vec<String>,
    pub summary: String,
    pub remediation: Option<String>,
    pub contexts: Vec<CleanupContext>,
}

impl ResourceRule {
    pub fn patterns(&self, role: Role) -> &[PatternSpec] {
        match role {
            Role::Acquire => &self.acquire,
            Role::Cleanup => &self.cleanup,
        }
    }

    pub fn has_structural(&self) -> bool {
        self.acquire
            .iter()
            .chain(self.cleanup.iter())
            .any(|p| p.structural.is_some())
    }

    /// Call placeholders across all textual patterns.
    pub fn textual_calls(&self) -> impl Iterator<Item = &str> {
        self.acquire
            .iter()
            .chain(self.cleanup.iter())
            .filter_map(|p| p.textual.as_ref())
            .flat_map(|t| t.calls.iter().map(String::as_str))
    }

    pub fn allows(&self, context: CleanupContext) -> bool {
        self.contexts.contains(&context)
    }

    /// True when the rule has no anchors or any anchor occurs in `text`.
    pub fn anchors_present(&self, text: &str) -> bool {
        self.anchors.is_empty() || self.anchors.iter().any(|a| text.contains(a.as_str()))
    }

    /// Whether this rule applies to files of `language`.
    pub fn applies_to(&self, language: Language) -> bool {
        self.language == language
            || (language == Language::TypeScript && self.language == Language::JavaScript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_path() {
        assert_eq!(
            Language::from_path(Path::new("src/App.tsx")),
            Some(Language::TypeScript)
        );
        assert_eq!(Language::from_path(Path::new("main.go")), Some(Language::Go));
        assert_eq!(Language::from_path(Path::new("lib.HPP")), Some(Language::Cpp));
        assert_eq!(Language::from_path(Path::new("README.md")), None);
        assert_eq!(Language::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_tsx_uses_its_own_grammar_name() {
        assert_eq!(
            Language::TypeScript.ast_grep_name(Path::new("a.tsx")),
            "tsx"
        );
        assert_eq!(
            Language::TypeScript.ast_grep_name(Path::new("a.ts")),
            "typescript"
        );
        assert_eq!(Language::Cpp.ast_grep_name(Path::new("a.cc")), "cpp");
    }

    #[test]
    fn test_typescript_inherits_javascript_rules() {
        let rule = ResourceRule {
            id: "js.x".to_string(),
            language: Language::JavaScript,
            kind: ResourceKind::new("timer"),
            category: "async-resources".to_string(),
            severity: Severity::Warning,
            acquire: vec![],
            cleanup: vec![],
            anchors: vec!["setInterval".to_string()],
            summary: String::new(),
            remediation: None,
            contexts: vec![CleanupContext::SameScope],
        };
        assert!(rule.applies_to(Language::TypeScript));
        assert!(!rule.applies_to(Language::Python));
        assert!(rule.anchors_present("const t = setInterval(f)"));
        assert!(!rule.anchors_present("const t = setTimeout(f)"));
    }
}
