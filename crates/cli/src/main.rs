use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use colored::*;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
use commands::{rules::RulesCommand, scan::ScanCommand};

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Find resources that are acquired but never released")]
#[command(version)]
struct Cli {
    /// Log verbosity: -v info, -vv debug, -vvv trace (RUST_LOG wins when set)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a project for unreleased resources
    Scan {
        #[command(subcommand)]
        subcommand: ScanCommand,
    },

    /// Inspect the rule catalog
    Rules {
        #[command(subcommand)]
        subcommand: RulesCommand,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result: Result<u8> = match cli.command {
        Commands::Scan { subcommand } => subcommand.execute(),
        Commands::Rules { subcommand } => subcommand.execute().map(|()| 0),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("{} {:#}", "error:".bright_red().bold(), err);
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
