//! Resource-lifecycle correlation.
//!
//! For one file, matches are pooled per resource kind. Each acquisition is
//! paired with the first unconsumed cleanup (in source order) whose bindings
//! unify and whose placement one of the rule's cleanup contexts admits. A
//! cleanup satisfies at most one acquisition.

pub mod unify;
pub mod validity;

pub use unify::unify;
pub use validity::{ContextCheck, Placement, ScopeValidator};

use crate::catalog::{LifecycleTable, ResourceKind, ResourceRule, Role};
use crate::core::Verdict;
use crate::matcher::Match;
use crate::scope::{Position, ScopeTree};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationResult {
    pub acquisition: Match,
    pub cleanup: Option<Match>,
    pub verdict: Verdict,
}

#[derive(Default)]
struct KindPool {
    acquisitions: Vec<Match>,
    cleanups: Vec<Match>,
}

pub struct CorrelationEngine {
    validator: ScopeValidator,
}

impl CorrelationEngine {
    pub fn new() -> Self {
        Self {
            validator: ScopeValidator::new(),
        }
    }

    /// Classifies every acquisition in `matches`. `rules` are the rules that
    /// ran on the file; acquisitions of an unknown rule can only leak.
    pub fn correlate(
        &self,
        matches: Vec<Match>,
        rules: &[ResourceRule],
        tree: &ScopeTree,
        lifecycle: &LifecycleTable,
    ) -> Vec<CorrelationResult> {
        let by_id: HashMap<&str, &ResourceRule> =
            rules.iter().map(|r| (r.id.as_str(), r)).collect();

        let mut pools: BTreeMap<ResourceKind, KindPool> = BTreeMap::new();
        for m in matches {
            let pool = pools.entry(m.kind.clone()).or_default();
            match m.role {
                Role::Acquire => pool.acquisitions.push(m),
                Role::Cleanup => pool.cleanups.push(m),
            }
        }

        let mut results = Vec::new();
        for (kind, pool) in pools {
            let before = results.len();
            self.correlate_kind(pool, &by_id, tree, lifecycle, &mut results);
            debug!(kind = %kind, acquisitions = results.len() - before, "correlated kind");
        }
        results
    }

    fn correlate_kind(
        &self,
        pool: KindPool,
        rules: &HashMap<&str, &ResourceRule>,
        tree: &ScopeTree,
        lifecycle: &LifecycleTable,
        results: &mut Vec<CorrelationResult>,
    ) {
        let acquisitions = outermost_acquisitions(pool.acquisitions);
        let cleanups = distinct_cleanups(pool.cleanups);
        let mut consumed = vec![false; cleanups.len()];

        for acquisition in acquisitions {
            if acquisition.position == Position::Managed {
                results.push(CorrelationResult {
                    acquisition,
                    cleanup: None,
                    verdict: Verdict::Cleaned,
                });
                continue;
            }

            let contexts = rules
                .get(acquisition.rule_id.as_str())
                .map(|r| r.contexts.as_slice())
                .unwrap_or(&[]);
            let mut unified_any = false;
            let mut chosen = None;

            for (index, cleanup) in cleanups.iter().enumerate() {
                if consumed[index] || !unify(&acquisition.bindings, &cleanup.bindings) {
                    continue;
                }
                unified_any = true;
                let placement = Placement {
                    acquisition: acquisition.scope,
                    cleanup: cleanup.scope,
                    position: cleanup.position,
                    tree,
                    lifecycle,
                };
                if self.validator.is_valid(contexts, &placement) {
                    chosen = Some(index);
                    break;
                }
            }

            let result = match chosen {
                Some(index) => {
                    consumed[index] = true;
                    CorrelationResult {
                        acquisition,
                        cleanup: Some(cleanups[index].clone()),
                        verdict: Verdict::Cleaned,
                    }
                }
                None => {
                    let verdict = if unified_any && !tree.is_precise() {
                        Verdict::Ambiguous
                    } else {
                        Verdict::Leaked
                    };
                    CorrelationResult {
                        acquisition,
                        cleanup: None,
                        verdict,
                    }
                }
            };
            results.push(result);
        }
    }
}

impl Default for CorrelationEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn source_order(a: &Match, b: &Match) -> std::cmp::Ordering {
    a.span
        .start
        .cmp(&b.span.start)
        .then(b.span.end.cmp(&a.span.end))
        .then(a.rule_id.cmp(&b.rule_id))
}

/// Source-ordered acquisitions without duplicates or acquisitions nested
/// inside another acquisition of the same rule.
fn outermost_acquisitions(mut acquisitions: Vec<Match>) -> Vec<Match> {
    acquisitions.sort_by(source_order);
    acquisitions.dedup_by(|a, b| a.rule_id == b.rule_id && a.span == b.span);
    let nested: Vec<bool> = acquisitions
        .iter()
        .map(|inner| {
            acquisitions
                .iter()
                .any(|outer| outer.rule_id == inner.rule_id && outer.contains(inner))
        })
        .collect();
    acquisitions
        .into_iter()
        .zip(nested)
        .filter_map(|(m, nested)| (!nested).then_some(m))
        .collect()
}

fn distinct_cleanups(mut cleanups: Vec<Match>) -> Vec<Match> {
    cleanups.sort_by(source_order);
    cleanups.dedup_by(|a, b| a.span == b.span);
    cleanups
}
