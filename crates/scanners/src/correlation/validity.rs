//! Cleanup-context checks. Each check is a pure function of the acquisition
//! scope, the cleanup scope and the cleanup's position in its scope.

use crate::catalog::{CleanupContext, LifecycleTable};
use crate::scope::{Position, ScopeId, ScopeKind, ScopeTree};

/// The facts a context check may look at.
pub struct Placement<'a> {
    pub acquisition: ScopeId,
    pub cleanup: ScopeId,
    pub position: Position,
    pub tree: &'a ScopeTree,
    pub lifecycle: &'a LifecycleTable,
}

pub trait ContextCheck: Send + Sync {
    fn context(&self) -> CleanupContext;

    fn admits(&self, placement: &Placement<'_>) -> bool;
}

pub struct SameScopeCheck;

impl ContextCheck for SameScopeCheck {
    fn context(&self) -> CleanupContext {
        CleanupContext::SameScope
    }

    fn admits(&self, p: &Placement<'_>) -> bool {
        p.cleanup == p.acquisition
    }
}

pub struct FinallyCheck;

impl ContextCheck for FinallyCheck {
    fn context(&self) -> CleanupContext {
        CleanupContext::Finally
    }

    fn admits(&self, p: &Placement<'_>) -> bool {
        if p.cleanup == p.acquisition {
            return matches!(p.position, Position::Finally | Position::Deferred);
        }
        let scope = p.tree.get(p.cleanup);
        scope.deferred && scope.parent == Some(p.acquisition)
    }
}

pub struct ReturnedClosureCheck;

impl ContextCheck for ReturnedClosureCheck {
    fn context(&self) -> CleanupContext {
        CleanupContext::ReturnedClosure
    }

    fn admits(&self, p: &Placement<'_>) -> bool {
        if p.cleanup == p.acquisition {
            return p.position == Position::ReturnedExpression;
        }
        let scope = p.tree.get(p.cleanup);
        scope.returned && scope.parent == Some(p.acquisition)
    }
}

pub struct PairedLifecycleCheck;

impl ContextCheck for PairedLifecycleCheck {
    fn context(&self) -> CleanupContext {
        CleanupContext::PairedLifecycle
    }

    fn admits(&self, p: &Placement<'_>) -> bool {
        let setup = p.tree.get(p.acquisition);
        let teardown = p.tree.get(p.cleanup);
        if setup.kind != ScopeKind::LifecycleCallback || teardown.kind != ScopeKind::LifecycleCallback
        {
            return false;
        }
        let (Some(setup_name), Some(teardown_name)) = (&setup.name, &teardown.name) else {
            return false;
        };
        p.lifecycle.pairs_with(setup_name, teardown_name)
            && p.tree.owner(p.acquisition) == p.tree.owner(p.cleanup)
            && p.tree.enclosing_class(p.acquisition) == p.tree.enclosing_class(p.cleanup)
    }
}

pub struct TeardownMethodCheck;

impl ContextCheck for TeardownMethodCheck {
    fn context(&self) -> CleanupContext {
        CleanupContext::TeardownMethod
    }

    fn admits(&self, p: &Placement<'_>) -> bool {
        let Some(class) = p.tree.enclosing_class(p.acquisition) else {
            return false;
        };
        let method = p.tree.get(p.cleanup);
        matches!(method.kind, ScopeKind::Method | ScopeKind::LifecycleCallback)
            && method.parent == Some(class)
            && method
                .name
                .as_deref()
                .is_some_and(|name| p.lifecycle.is_teardown_name(name))
    }
}

/// Runs the checks a rule enables; the cleanup is valid if any admits it.
pub struct ScopeValidator {
    checks: Vec<Box<dyn ContextCheck>>,
}

impl ScopeValidator {
    pub fn new() -> Self {
        Self {
            checks: vec![
                Box::new(SameScopeCheck),
                Box::new(FinallyCheck),
                Box::new(ReturnedClosureCheck),
                Box::new(PairedLifecycleCheck),
                Box::new(TeardownMethodCheck),
            ],
        }
    }

    /// The first enabled context that admits the placement.
    pub fn admitting(
        &self,
        contexts: &[CleanupContext],
        placement: &Placement<'_>,
    ) -> Option<CleanupContext> {
        self.checks
            .iter()
            .filter(|check| contexts.contains(&check.context()))
            .find(|check| check.admits(placement))
            .map(|check| check.context())
    }

    pub fn is_valid(&self, contexts: &[CleanupContext], placement: &Placement<'_>) -> bool {
        self.admitting(contexts, placement).is_some()
    }
}

impl Default for ScopeValidator {
    fn default() -> Self {
        Self::new()
    }
}
