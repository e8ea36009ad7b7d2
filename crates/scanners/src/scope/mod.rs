//! Scope resolution.
//!
//! A [`ScopeTree`] is an arena of scopes for one file (module, class,
//! function, method, closure, lifecycle callback) plus the guarded regions
//! that matter for cleanup validity: `finally`/`ensure` blocks, deferred
//! statements and managed acquisitions (`with`, try-with-resources).
//!
//! Both resolvers only collect a flat [`ScopeSkeleton`]; nesting, method
//! detection, lifecycle tagging and guard ownership are computed once in
//! [`ScopeTree::build`] so the two produce trees with the same meaning.

pub mod heuristic;
pub mod syntax;

pub use heuristic::HeuristicScopeResolver;
pub use syntax::SyntaxScopeResolver;

use crate::catalog::LifecycleTable;
use crate::core::{Diagnostic, DiagnosticKind, ScopeResolution};
use crate::error::Result;
use crate::matcher::SourceFile;
use serde::Serialize;
use std::fmt;
use std::ops::Range;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ScopeId(pub usize);

impl ScopeId {
    pub const ROOT: ScopeId = ScopeId(0);
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Module,
    Class,
    Function,
    Method,
    Closure,
    LifecycleCallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub name: Option<String>,
    pub parent: Option<ScopeId>,
    pub span: Range<usize>,
    /// Closure that is the operand of a `return` or an arrow body.
    pub returned: bool,
    /// Closure that starts inside a `finally` or deferred region of its parent.
    pub deferred: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardKind {
    Finally,
    Deferred,
    Managed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub kind: GuardKind,
    pub span: Range<usize>,
}

/// Where a match sits inside its innermost scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Plain,
    Finally,
    Deferred,
    Managed,
    ReturnedExpression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawScopeKind {
    Class,
    Function,
    Closure,
}

/// A scope candidate as found by a resolver, before nesting is computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawScope {
    pub kind: RawScopeKind,
    pub name: Option<String>,
    pub span: Range<usize>,
    /// Callee name when the closure is passed as a call argument.
    pub callee: Option<String>,
    pub returned: bool,
}

impl RawScope {
    pub fn new(kind: RawScopeKind, span: Range<usize>) -> Self {
        Self {
            kind,
            name: None,
            span,
            callee: None,
            returned: false,
        }
    }

    pub fn named(mut self, name: Option<String>) -> Self {
        self.name = name.filter(|n| !n.is_empty());
        self
    }

    pub fn with_callee(mut self, callee: Option<String>) -> Self {
        self.callee = callee.filter(|n| !n.is_empty());
        self
    }

    pub fn returned(mut self, returned: bool) -> Self {
        self.returned = returned;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScopeSkeleton {
    pub scopes: Vec<RawScope>,
    pub guards: Vec<Guard>,
    pub returns: Vec<Range<usize>>,
}

#[derive(Debug, Clone)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    guards: Vec<(Guard, ScopeId)>,
    returns: Vec<(Range<usize>, ScopeId)>,
    precise: bool,
}

impl ScopeTree {
    /// Computes nesting and applies the shared classification:
    /// functions directly inside classes become methods, methods with
    /// lifecycle names and hook callbacks become lifecycle callbacks, and closures opened inside a
    /// guarded region of their parent are marked deferred.
    pub fn build(
        skeleton: ScopeSkeleton,
        text_len: usize,
        precise: bool,
        lifecycle: &LifecycleTable,
    ) -> Self {
        let mut raws = skeleton.scopes;
        raws.retain(|r| r.span.start < r.span.end && r.span.end <= text_len);
        raws.sort_by(|a, b| {
            a.span
                .start
                .cmp(&b.span.start)
                .then(b.span.end.cmp(&a.span.end))
        });
        raws.dedup_by(|a, b| a.span == b.span);

        let mut scopes = vec![Scope {
            id: ScopeId::ROOT,
            kind: ScopeKind::Module,
            name: None,
            parent: None,
            span: 0..text_len,
            returned: false,
            deferred: false,
        }];
        let mut raw_kinds = vec![None];
        let mut stack: Vec<ScopeId> = vec![ScopeId::ROOT];

        for raw in raws {
            while let Some(&top) = stack.last() {
                if top == ScopeId::ROOT || raw.span.start < scopes[top.0].span.end {
                    break;
                }
                stack.pop();
            }
            let parent = stack.last().copied().unwrap_or(ScopeId::ROOT);
            let parent_end = scopes[parent.0].span.end;
            let span = raw.span.start..raw.span.end.min(parent_end);
            let parent_is_class = raw_kinds[parent.0] == Some(RawScopeKind::Class);

            let (kind, name) = match raw.kind {
                RawScopeKind::Class => (ScopeKind::Class, raw.name),
                RawScopeKind::Function | RawScopeKind::Closure => {
                    let is_method = parent_is_class
                        && (raw.kind == RawScopeKind::Function || raw.name.is_some());
                    let hook = raw
                        .callee
                        .as_deref()
                        .filter(|c| raw.kind == RawScopeKind::Closure && lifecycle.is_hook(c));
                    let lifecycle_name = raw
                        .name
                        .as_deref()
                        .filter(|_| is_method)
                        .filter(|n| lifecycle.is_lifecycle_callback(n));

                    if let Some(hook) = hook {
                        (ScopeKind::LifecycleCallback, Some(hook.to_string()))
                    } else if lifecycle_name.is_some() {
                        (ScopeKind::LifecycleCallback, raw.name)
                    } else if is_method {
                        (ScopeKind::Method, raw.name)
                    } else if raw.kind == RawScopeKind::Function {
                        (ScopeKind::Function, raw.name)
                    } else {
                        (ScopeKind::Closure, raw.name)
                    }
                }
            };

            let id = ScopeId(scopes.len());
            scopes.push(Scope {
                id,
                kind,
                name,
                parent: Some(parent),
                span,
                returned: raw.returned && raw.kind == RawScopeKind::Closure,
                deferred: false,
            });
            raw_kinds.push(Some(raw.kind));
            stack.push(id);
        }

        let mut tree = Self {
            scopes,
            guards: Vec::new(),
            returns: Vec::new(),
            precise,
        };

        tree.guards = skeleton
            .guards
            .into_iter()
            .filter(|g| g.span.start < g.span.end)
            .map(|g| {
                let owner = tree.scope_for(&(g.span.start..g.span.start));
                (g, owner)
            })
            .collect();
        tree.returns = skeleton
            .returns
            .into_iter()
            .map(|r| {
                let owner = tree.scope_for(&(r.start..r.start));
                (r, owner)
            })
            .collect();

        for index in 1..tree.scopes.len() {
            let scope = &tree.scopes[index];
            if !matches!(scope.kind, ScopeKind::Closure | ScopeKind::LifecycleCallback) {
                continue;
            }
            let parent = scope.parent;
            let start = scope.span.start;
            let deferred = tree.guards.iter().any(|(g, owner)| {
                matches!(g.kind, GuardKind::Deferred | GuardKind::Finally)
                    && Some(*owner) == parent
                    && g.span.start <= start
                    && start < g.span.end
            });
            tree.scopes[index].deferred = deferred;
        }

        tree
    }

    /// A tree holding only the module scope.
    pub fn flat(text_len: usize, precise: bool) -> Self {
        Self::build(ScopeSkeleton::default(), text_len, precise, &LifecycleTable::default())
    }

    pub fn is_precise(&self) -> bool {
        self.precise
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0.min(self.scopes.len() - 1)]
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Innermost scope containing the start of `span`.
    pub fn scope_for(&self, span: &Range<usize>) -> ScopeId {
        let pos = span.start;
        self.scopes
            .iter()
            .filter(|s| s.span.start <= pos && pos < s.span.end)
            .max_by(|a, b| {
                a.span
                    .start
                    .cmp(&b.span.start)
                    .then(b.span.end.cmp(&a.span.end))
                    .then(a.id.cmp(&b.id))
            })
            .map(|s| s.id)
            .unwrap_or(ScopeId::ROOT)
    }

    /// Parent chain from the immediate parent up to the module scope.
    pub fn ancestors(&self, id: ScopeId) -> Vec<ScopeId> {
        let mut chain = Vec::new();
        let mut current = self.get(id).parent;
        while let Some(parent) = current {
            chain.push(parent);
            current = self.get(parent).parent;
        }
        chain
    }

    /// Nearest enclosing class, the scope itself included.
    pub fn enclosing_class(&self, id: ScopeId) -> Option<ScopeId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|s| self.get(*s).kind == ScopeKind::Class)
    }

    /// Enclosing class, or the parent scope when there is none.
    pub fn owner(&self, id: ScopeId) -> Option<ScopeId> {
        self.ancestors(id)
            .into_iter()
            .find(|s| self.get(*s).kind == ScopeKind::Class)
            .or(self.get(id).parent)
    }

    pub fn position_of(&self, span: &Range<usize>, scope: ScopeId) -> Position {
        let pos = span.start;
        let guard_kind = |kind: GuardKind| {
            self.guards.iter().any(|(g, owner)| {
                g.kind == kind && *owner == scope && g.span.start <= pos && pos < g.span.end
            })
        };

        if guard_kind(GuardKind::Managed) {
            Position::Managed
        } else if guard_kind(GuardKind::Finally) {
            Position::Finally
        } else if guard_kind(GuardKind::Deferred) {
            Position::Deferred
        } else if self
            .returns
            .iter()
            .any(|(r, owner)| *owner == scope && r.start <= pos && pos < r.end)
        {
            Position::ReturnedExpression
        } else {
            Position::Plain
        }
    }
}

/// Resolves the scope tree of one file.
pub trait ScopeResolver: Send + Sync {
    fn is_precise(&self) -> bool;

    fn resolve(&self, source: &SourceFile, lifecycle: &LifecycleTable) -> Result<ScopeTree>;
}

/// Picks the tree-sitter resolver when a grammar exists for the file and
/// falls back to the heuristic resolver otherwise or on failure.
pub struct ScopeResolverChain {
    mode: ScopeResolution,
    syntax: SyntaxScopeResolver,
    heuristic: HeuristicScopeResolver,
}

impl ScopeResolverChain {
    pub fn new(mode: ScopeResolution) -> Self {
        Self {
            mode,
            syntax: SyntaxScopeResolver::new(),
            heuristic: HeuristicScopeResolver::new(),
        }
    }

    pub fn resolve(
        &self,
        source: &SourceFile,
        lifecycle: &LifecycleTable,
    ) -> (ScopeTree, Option<Diagnostic>) {
        if self.mode == ScopeResolution::Auto && SyntaxScopeResolver::supports(source.language) {
            match self.syntax.resolve(source, lifecycle) {
                Ok(tree) => return (tree, None),
                Err(err) => {
                    info!(file = %source.display, "tree-sitter scopes unavailable: {}", err);
                    let tree = self.heuristic_tree(source, lifecycle);
                    let diagnostic = Diagnostic::info(
                        DiagnosticKind::ScopeFallback,
                        format!("heuristic scopes used: {}", err),
                    )
                    .with_path(source.display.clone());
                    return (tree, Some(diagnostic));
                }
            }
        }
        (self.heuristic_tree(source, lifecycle), None)
    }

    fn heuristic_tree(&self, source: &SourceFile, lifecycle: &LifecycleTable) -> ScopeTree {
        self.heuristic
            .resolve(source, lifecycle)
            .unwrap_or_else(|_| ScopeTree::flat(source.text.len(), false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lifecycle() -> LifecycleTable {
        serde_json::from_str(
            r#"{"pairs": [{"setup": "componentDidMount", "teardown": ["componentWillUnmount"]}],
                "teardown": ["dispose"], "hooks": ["useEffect"]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_build_nests_and_classifies() {
        // class C { componentDidMount() { f(() => {}) } helper() {} }
        let skeleton = ScopeSkeleton {
            scopes: vec![
                RawScope::new(RawScopeKind::Function, 50..60).named(Some("helper".into())),
                RawScope::new(RawScopeKind::Class, 0..80).named(Some("C".into())),
                RawScope::new(RawScopeKind::Function, 10..40)
                    .named(Some("componentDidMount".into())),
                RawScope::new(RawScopeKind::Closure, 20..30).with_callee(Some("useEffect".into())),
                RawScope::new(RawScopeKind::Closure, 22..28).returned(true),
            ],
            guards: vec![Guard {
                kind: GuardKind::Finally,
                span: 32..38,
            }],
            returns: vec![],
        };
        let tree = ScopeTree::build(skeleton, 100, true, &lifecycle());

        let class = tree.scope_for(&(5..6));
        assert_eq!(tree.get(class).kind, ScopeKind::Class);

        let mount = tree.scope_for(&(12..13));
        assert_eq!(tree.get(mount).kind, ScopeKind::LifecycleCallback);
        assert_eq!(tree.get(mount).parent, Some(class));

        let hook = tree.scope_for(&(21..22));
        assert_eq!(tree.get(hook).kind, ScopeKind::LifecycleCallback);
        assert_eq!(tree.get(hook).name.as_deref(), Some("useEffect"));

        let inner = tree.scope_for(&(23..24));
        assert!(tree.get(inner).returned);
        assert_eq!(tree.ancestors(inner), vec![hook, mount, class, ScopeId::ROOT]);

        let helper = tree.scope_for(&(55..56));
        assert_eq!(tree.get(helper).kind, ScopeKind::Method);
        assert_eq!(tree.enclosing_class(helper), Some(class));
        assert_eq!(tree.owner(helper), Some(class));

        assert_eq!(tree.position_of(&(33..34), mount), Position::Finally);
        assert_eq!(tree.position_of(&(12..13), mount), Position::Plain);
        assert_eq!(tree.scope_for(&(90..91)), ScopeId::ROOT);
    }

    #[test]
    fn test_free_function_with_lifecycle_name_is_plain() {
        let skeleton = ScopeSkeleton {
            scopes: vec![
                RawScope::new(RawScopeKind::Function, 0..20)
                    .named(Some("componentDidMount".into())),
                RawScope::new(RawScopeKind::Function, 30..50)
                    .named(Some("componentWillUnmount".into())),
            ],
            ..ScopeSkeleton::default()
        };
        let tree = ScopeTree::build(skeleton, 60, true, &lifecycle());
        for pos in [5, 35] {
            let scope = tree.scope_for(&(pos..pos + 1));
            assert_eq!(tree.get(scope).kind, ScopeKind::Function);
            assert_eq!(tree.enclosing_class(scope), None);
        }
    }

    #[test]
    fn test_closure_in_deferred_region_is_marked() {
        let skeleton = ScopeSkeleton {
            scopes: vec![
                RawScope::new(RawScopeKind::Function, 0..50).named(Some("run".into())),
                RawScope::new(RawScopeKind::Closure, 20..40),
            ],
            guards: vec![Guard {
                kind: GuardKind::Deferred,
                span: 14..42,
            }],
            returns: vec![5..12],
        };
        let tree = ScopeTree::build(skeleton, 50, true, &LifecycleTable::default());
        let closure = tree.scope_for(&(25..26));
        assert!(tree.get(closure).deferred);
        let run = tree.scope_for(&(1..2));
        assert_eq!(tree.position_of(&(6..7), run), Position::ReturnedExpression);
        assert_eq!(tree.position_of(&(16..17), run), Position::Deferred);
    }
}
