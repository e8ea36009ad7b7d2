//! Resource rule catalog.
//!
//! Rules are data: each one names a resource kind, its acquisition and
//! cleanup patterns, and the cleanup contexts that count as valid. The
//! built-in catalog is embedded at compile time; user rule files in the same
//! JSON format extend it. A malformed rule is dropped on its own with a
//! diagnostic and never aborts loading.

pub mod lifecycle;
pub mod loader;
pub mod rule;

pub use lifecycle::{LifecyclePair, LifecycleTable};
pub use loader::{parse_document, LoadedDocument};
pub use rule::{
    CleanupContext, Language, PatternSpec, ResourceKind, ResourceRule, Role, TextualPattern,
};

use crate::core::{CategorySelection, Diagnostic, DiagnosticKind};
use crate::error::{Result, ScanError};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, warn};

const BUILTIN_RULES: &str = include_str!("../../rules/lifecycle.json");

#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    rules: Vec<ResourceRule>,
    by_language: HashMap<Language, Vec<ResourceRule>>,
    lifecycle: LifecycleTable,
    diagnostics: Vec<Diagnostic>,
}

impl RuleCatalog {
    pub fn builtin() -> Result<Self> {
        Self::load_with(&[])
    }

    /// Built-in rules followed by the rules in `paths`, in order. An
    /// unreadable or non-JSON user file becomes a warning diagnostic.
    pub fn load_with(paths: &[PathBuf]) -> Result<Self> {
        let builtin = parse_document(BUILTIN_RULES, "builtin")?;
        let mut catalog = Self::default();
        catalog.absorb(builtin);

        for path in paths {
            let origin = path.display().to_string();
            let loaded = std::fs::read_to_string(path)
                .map_err(ScanError::from)
                .and_then(|text| parse_document(&text, &origin));
            match loaded {
                Ok(doc) => catalog.absorb(doc),
                Err(err) => {
                    warn!(path = %origin, "cannot load rule file: {}", err);
                    catalog.diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticKind::MalformedRule,
                            format!("cannot load rule file: {}", err),
                        )
                        .with_path(origin),
                    );
                }
            }
        }

        catalog.index();
        debug!(rules = catalog.rules.len(), "rule catalog loaded");
        Ok(catalog)
    }

    fn absorb(&mut self, doc: LoadedDocument) {
        self.diagnostics.extend(doc.diagnostics);
        if let Some(lifecycle) = doc.lifecycle {
            self.lifecycle.merge(lifecycle);
        }
        let mut seen: HashSet<String> = self.rules.iter().map(|r| r.id.clone()).collect();
        for rule in doc.rules {
            if !seen.insert(rule.id.clone()) {
                let err = ScanError::malformed(&rule.id, "duplicate rule id");
                warn!(rule = %rule.id, "dropping rule: {}", err);
                self.diagnostics.push(Diagnostic::from_error(&err));
                continue;
            }
            self.rules.push(rule);
        }
    }

    fn index(&mut self) {
        self.by_language = Language::ALL
            .iter()
            .map(|&language| {
                let rules = self
                    .rules
                    .iter()
                    .filter(|r| r.applies_to(language))
                    .cloned()
                    .collect();
                (language, rules)
            })
            .collect();
    }

    /// Rules applying to `language`, in catalog order.
    pub fn rules_for(&self, language: Language) -> &[ResourceRule] {
        self.by_language
            .get(&language)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// A copy keeping only rules whose category passes `selection`.
    pub fn select(&self, selection: &CategorySelection) -> Self {
        let mut selected = Self {
            rules: self
                .rules
                .iter()
                .filter(|r| selection.allows(&r.category))
                .cloned()
                .collect(),
            by_language: HashMap::new(),
            lifecycle: self.lifecycle.clone(),
            diagnostics: self.diagnostics.clone(),
        };
        selected.index();
        selected
    }

    pub fn rule(&self, id: &str) -> Option<&ResourceRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn all(&self) -> &[ResourceRule] {
        &self.rules
    }

    pub fn lifecycle(&self) -> &LifecycleTable {
        &self.lifecycle
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Union of all anchors; empty if any rule is unanchored.
    pub fn anchors(&self) -> Vec<String> {
        if self.rules.iter().any(|r| r.anchors.is_empty()) {
            return Vec::new();
        }
        let set: BTreeSet<&str> = self
            .rules
            .iter()
            .flat_map(|r| r.anchors.iter().map(String::as_str))
            .collect();
        set.into_iter().map(str::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
