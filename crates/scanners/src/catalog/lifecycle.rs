//! Framework lifecycle names: setup/teardown callback pairs, standalone
//! teardown method names, and hook functions whose callback is a lifecycle
//! callback.

use serde::Deserialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LifecyclePair {
    pub setup: String,
    pub teardown: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LifecycleTable {
    pairs: Vec<LifecyclePair>,
    teardown: BTreeSet<String>,
    hooks: BTreeSet<String>,
}

impl LifecycleTable {
    pub fn merge(&mut self, other: LifecycleTable) {
        for pair in other.pairs {
            match self.pairs.iter_mut().find(|p| p.setup == pair.setup) {
                Some(existing) => {
                    for name in pair.teardown {
                        if !existing.teardown.contains(&name) {
                            existing.teardown.push(name);
                        }
                    }
                }
                None => self.pairs.push(pair),
            }
        }
        self.teardown.extend(other.teardown);
        self.hooks.extend(other.hooks);
    }

    pub fn is_setup(&self, name: &str) -> bool {
        self.pairs.iter().any(|p| p.setup == name)
    }

    /// Setup or paired-teardown callback names.
    pub fn is_lifecycle_callback(&self, name: &str) -> bool {
        self.pairs
            .iter()
            .any(|p| p.setup == name || p.teardown.iter().any(|t| t == name))
    }

    /// Standalone teardown names plus every paired teardown.
    pub fn is_teardown_name(&self, name: &str) -> bool {
        self.teardown.contains(name)
            || self
                .pairs
                .iter()
                .any(|p| p.teardown.iter().any(|t| t == name))
    }

    pub fn is_hook(&self, name: &str) -> bool {
        self.hooks.contains(name)
    }

    pub fn pairs_with(&self, setup: &str, teardown: &str) -> bool {
        self.pairs
            .iter()
            .any(|p| p.setup == setup && p.teardown.iter().any(|t| t == teardown))
    }

    pub fn pairs(&self) -> &[LifecyclePair] {
        &self.pairs
    }
}
