use anyhow::{bail, Result};
use clap::Subcommand;
use colored::*;
use serde_json::json;
use std::path::PathBuf;
use tether_scanners::{Language, RuleCatalog};

#[derive(Subcommand, Clone)]
pub enum RulesCommand {
    /// List the rules that would run
    List {
        /// Only rules applying to this language (TypeScript includes JavaScript rules)
        #[arg(long)]
        language: Option<String>,

        /// Extra rule files, applied after the built-in catalog
        #[arg(long = "rules")]
        rule_files: Vec<PathBuf>,

        #[arg(long)]
        json: bool,
    },
}

impl RulesCommand {
    pub fn execute(&self) -> Result<()> {
        match self {
            RulesCommand::List {
                language,
                rule_files,
                json,
            } => list(language.as_deref(), rule_files, *json),
        }
    }
}

fn list(language: Option<&str>, rule_files: &[PathBuf], as_json: bool) -> Result<()> {
    let catalog = RuleCatalog::load_with(rule_files)?;
    for diagnostic in catalog.diagnostics() {
        eprintln!("{} {}", "warning:".yellow().bold(), diagnostic.message);
    }

    let rules = match language {
        Some(name) => {
            let Some(language) = Language::parse(name) else {
                bail!("unknown language `{}`", name);
            };
            catalog.rules_for(language)
        }
        None => catalog.all(),
    };

    if as_json {
        let rows: Vec<_> = rules
            .iter()
            .map(|rule| {
                json!({
                    "id": rule.id,
                    "language": rule.language.as_str(),
                    "kind": rule.kind.as_str(),
                    "category": rule.category,
                    "severity": rule.severity.as_str(),
                    "contexts": rule.contexts.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
                    "summary": rule.summary,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{}", format!("{} rules", rules.len()).bright_blue().bold());
    for rule in rules {
        println!(
            "  {} {:<28} {:<11} {:<16} {:<18} {}",
            rule.severity.emoji(),
            rule.id.bold(),
            rule.language.as_str(),
            rule.kind.as_str(),
            rule.category,
            rule.summary.dimmed()
        );
    }
    Ok(())
}
