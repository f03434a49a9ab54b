//! Command-line runner: load a rule file, assert facts, print the trace.
//!
//! ```text
//! rulechain --rules rules.json ping '{"give":"book","to":"ada"}'
//! ```
//!
//! Every FACT is parsed as JSON, falling back to a plain text fact. All facts
//! are asserted together as one list, so sequence rules can span them. Each
//! processed fact is printed to stdout as one JSON line; logs go to stderr.

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use rulechain::{Config, Engine, PluginRegistry, RuleSet, RunTrace, Value};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "rulechain", version, about = "Forward-chaining rule engine")]
struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Rule file (`.json` or `.toml`). Overrides `rules` in the config.
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Write the run trace to this file as CBOR.
    #[arg(long)]
    trace_out: Option<PathBuf>,

    /// Facts to assert, in order.
    #[arg(required = true)]
    facts: Vec<String>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    let Some(rules_path) = cli.rules.clone().or(config.rules.clone()) else {
        bail!("no rule file given; pass --rules or set `rules` in the config");
    };
    let rules = RuleSet::load(&rules_path)
        .with_context(|| format!("loading rules {}", rules_path.display()))?;
    tracing::info!(path = %rules_path.display(), rules = rules.len(), "rules loaded");

    let mut engine =
        Engine::with_config(rules, config.engine).with_plugins(PluginRegistry::with_builtins());

    let input = Value::list(cli.facts.iter().map(|arg| parse_fact(arg)));
    let trace = match engine.run_assert(input) {
        Ok(trace) => trace,
        Err(err) => {
            print_steps(err.partial_trace())?;
            return Err(err.into());
        }
    };
    print_steps(&trace)?;

    if let Some(path) = &cli.trace_out {
        trace.save_to_file(path)?;
        tracing::info!(path = %path.display(), fingerprint = %trace.fingerprint(), "trace written");
    }
    Ok(())
}

/// Writes each step as one JSON line.
fn print_steps(trace: &RunTrace) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for step in trace.steps() {
        serde_json::to_writer(&mut out, step)?;
        writeln!(out)?;
    }
    Ok(())
}

/// JSON if it parses, otherwise the raw argument as text.
fn parse_fact(arg: &str) -> Value {
    Value::from_json_str(arg).unwrap_or_else(|_| Value::text(arg))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}
