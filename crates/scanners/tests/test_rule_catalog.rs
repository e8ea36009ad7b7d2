use anyhow::Result;
use std::fs;
use tempfile::TempDir;
use tether_scanners::catalog::CleanupContext;
use tether_scanners::core::{CategorySelection, DiagnosticKind};
use tether_scanners::{Language, RuleCatalog};

#[test]
fn test_builtin_catalog_covers_every_language() -> Result<()> {
    let catalog = RuleCatalog::builtin()?;
    assert!(catalog.diagnostics().is_empty(), "{:?}", catalog.diagnostics());

    for language in [
        Language::JavaScript,
        Language::Python,
        Language::Go,
        Language::Java,
        Language::Swift,
        Language::Cpp,
        Language::Ruby,
    ] {
        assert!(
            !catalog.rules_for(language).is_empty(),
            "no rules for {:?}",
            language
        );
    }

    let ts: Vec<&str> = catalog
        .rules_for(Language::TypeScript)
        .iter()
        .map(|r| r.id.as_str())
        .collect();
    assert!(ts.contains(&"js.timer.interval"));
    assert!(ts.contains(&"js.listener.dom"));

    for rule in catalog.all() {
        assert!(!rule.acquire.is_empty(), "{} has no acquisitions", rule.id);
        assert!(!rule.cleanup.is_empty(), "{} has no cleanups", rule.id);
        assert!(!rule.anchors.is_empty(), "{} is unanchored", rule.id);
    }
    Ok(())
}

#[test]
fn test_user_rules_extend_and_drop_bad_entries() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("team-rules.json");
    fs::write(
        &path,
        r#"{
  "rules": [
    {
      "id": "js.worker",
      "language": "javascript",
      "kind": "worker",
      "category": "workers",
      "severity": "warning",
      "anchors": ["new Worker"],
      "summary": "Worker never terminated",
      "acquire": [{"textual": "(?P<W>[\\w$.]+)\\s*=\\s*new\\s+Worker\\s*\\("}],
      "cleanup": [{"textual": "(?P<W>[\\w$.]+)\\.terminate\\s*\\(\\s*\\)"}],
      "contexts": ["same_scope", "teardown_method"]
    },
    {
      "id": "js.no-cleanup",
      "language": "javascript",
      "kind": "thing",
      "category": "misc",
      "severity": "info",
      "summary": "grab without release",
      "acquire": [{"textual": "grab\\("}],
      "cleanup": []
    },
    {
      "id": "js.timer.interval",
      "language": "javascript",
      "kind": "timer",
      "category": "async-resources",
      "severity": "info",
      "summary": "shadowed",
      "acquire": [{"textual": "x"}],
      "cleanup": [{"textual": "y"}]
    }
  ]
}"#,
    )?;

    let catalog = RuleCatalog::load_with(&[path])?;
    let worker = catalog.rule("js.worker").expect("user rule loaded");
    assert_eq!(
        worker.contexts,
        vec![CleanupContext::SameScope, CleanupContext::TeardownMethod]
    );
    assert!(catalog.rule("js.no-cleanup").is_none());

    let malformed: Vec<_> = catalog
        .diagnostics()
        .iter()
        .filter(|d| d.kind == DiagnosticKind::MalformedRule)
        .collect();
    assert_eq!(malformed.len(), 2);
    assert!(malformed.iter().any(|d| d.rule_id.as_deref() == Some("js.no-cleanup")));
    assert!(malformed.iter().any(|d| d.message.contains("duplicate")));
    Ok(())
}

#[test]
fn test_unreadable_rule_file_is_a_diagnostic() -> Result<()> {
    let dir = TempDir::new()?;
    let broken = dir.path().join("broken.json");
    fs::write(&broken, "{ not json")?;
    let missing = dir.path().join("missing.json");

    let catalog = RuleCatalog::load_with(&[broken, missing])?;
    assert_eq!(catalog.len(), RuleCatalog::builtin()?.len());
    assert_eq!(catalog.diagnostics().len(), 2);
    Ok(())
}

#[test]
fn test_category_selection() -> Result<()> {
    let catalog = RuleCatalog::builtin()?;

    let only = catalog.select(&CategorySelection {
        only: vec!["event-listeners".to_string()],
        skip: Vec::new(),
    });
    assert!(!only.is_empty());
    assert!(only.all().iter().all(|r| r.category == "event-listeners"));

    let skipped = catalog.select(&CategorySelection {
        only: Vec::new(),
        skip: vec!["event-listeners".to_string()],
    });
    assert_eq!(skipped.len() + only.len(), catalog.len());
    assert!(skipped.all().iter().all(|r| r.category != "event-listeners"));
    Ok(())
}
