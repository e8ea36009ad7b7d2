//! Python import aliases.
//!
//! Textual rules can name a call by its qualified path with a `@{module.name}`
//! placeholder. By default the placeholder matches the qualified spelling;
//! `@{*.name}` matches `name` with any dotted prefix. A file that rebinds the
//! call (`import socket as s`, `from subprocess import Popen as P`) gets the
//! placeholder widened with its local spellings.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*import[ \t]+([^#\n;]+)").expect("Invalid regex")
});
static FROM_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*from[ \t]+([\w.]+)[ \t]+import[ \t]+(\([^)]*\)|[^#\n;]+)")
        .expect("Invalid regex")
});
static BINDING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([\w.]+|\*)(?:\s+as\s+(\w+))?$").expect("Invalid regex")
});
static CALL_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@\{([\w.*]+)\}").expect("Invalid regex"));

/// Local name to the qualified path it is bound to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportAliases {
    bindings: BTreeMap<String, String>,
}

impl ImportAliases {
    pub fn parse_python(text: &str) -> Self {
        let mut bindings = BTreeMap::new();

        for caps in IMPORT.captures_iter(text) {
            for (path, alias) in split_names(&caps[1]) {
                // `import a.b` binds `a`, which already spells itself.
                if let Some(alias) = alias {
                    bindings.insert(alias, path);
                }
            }
        }
        for caps in FROM_IMPORT.captures_iter(text) {
            let module = &caps[1];
            for (name, alias) in split_names(&caps[2]) {
                if name == "*" {
                    continue;
                }
                let local = alias.unwrap_or_else(|| name.clone());
                bindings.insert(local, format!("{}.{}", module, name));
            }
        }

        Self { bindings }
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn get(&self, local: &str) -> Option<&str> {
        self.bindings.get(local).map(String::as_str)
    }

    /// Local spellings, other than the default one, that call `target`.
    pub fn spellings(&self, target: &str) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(name) = target.strip_prefix("*.") {
            for (local, path) in &self.bindings {
                let bound_name = path.rsplit_once('.').map_or(path.as_str(), |(_, n)| n);
                if bound_name == name && local != name {
                    out.push(local.clone());
                }
            }
            return out;
        }

        for (local, path) in &self.bindings {
            if path == target && local != target {
                out.push(local.clone());
            } else if let Some(rest) = target
                .strip_prefix(path.as_str())
                .and_then(|r| r.strip_prefix('.'))
            {
                out.push(format!("{}.{}", local, rest));
            }
        }
        out
    }

    /// Whether any of `calls` has a local spelling in this file.
    pub fn affects<'a>(&self, calls: impl IntoIterator<Item = &'a str>) -> bool {
        !self.is_empty() && calls.into_iter().any(|c| !self.spellings(c).is_empty())
    }

    /// Replaces every `@{...}` placeholder in `pattern` with an alternation
    /// of its default spelling and this file's local spellings.
    pub fn expand(&self, pattern: &str) -> String {
        CALL_PLACEHOLDER
            .replace_all(pattern, |caps: &Captures| {
                let target = &caps[1];
                let mut alternatives = vec![default_spelling(target)];
                alternatives.extend(self.spellings(target).iter().map(|s| regex::escape(s)));
                format!("(?:{})", alternatives.join("|"))
            })
            .into_owned()
    }
}

/// Qualified call paths named by placeholders in `pattern`.
pub fn placeholder_calls(pattern: &str) -> Vec<String> {
    CALL_PLACEHOLDER
        .captures_iter(pattern)
        .map(|caps| caps[1].to_string())
        .collect()
}

fn default_spelling(target: &str) -> String {
    match target.strip_prefix("*.") {
        Some(name) => format!(r"(?:[\w.]+\.)?{}", regex::escape(name)),
        None => regex::escape(target),
    }
}

fn split_names(list: &str) -> Vec<(String, Option<String>)> {
    let list = list.trim();
    let list = list
        .strip_prefix('(')
        .and_then(|l| l.strip_suffix(')'))
        .unwrap_or(list);
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .filter_map(|item| {
            let item = item.split_whitespace().collect::<Vec<_>>().join(" ");
            let caps = BINDING.captures(&item)?;
            Some((caps[1].to_string(), caps.get(2).map(|m| m.as_str().to_string())))
        })
        .collect()
}
