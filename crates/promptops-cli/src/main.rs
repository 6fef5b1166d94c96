//! PromptOps integrity gate CLI
//!
//! The `promptops` command exposes the gate to operators and CI jobs.
//!
//! ## Commands
//!
//! - `evaluate`: run the rule catalog and scorer over an evaluation context
//! - `gate`: run the whole gate over a build result for a task
//! - `rules`: print the effective rule set and its digest

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, Level};

use promptops_core::{
    BuildResult, EvaluationContext, IntegrityGate, IntegrityScorer, PolicyEvaluator, RuleConfig,
    RunState, Task,
};

#[derive(Parser)]
#[command(name = "promptops")]
#[command(version = promptops_core::VERSION)]
#[command(about = "Integrity gate for generated code changes", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Rule set file (TOML, or JSON with a .json extension)
    #[arg(long, global = true, env = "PROMPTOPS_RULES")]
    rules: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate an evaluation context (JSON) against the rule set
    Evaluate {
        /// Path to the context file
        #[arg(short, long)]
        context: PathBuf,

        /// Exit with an error when the change is not allowed
        #[arg(long)]
        strict: bool,
    },

    /// Run the full gate over a build result (JSON) for a task
    Gate {
        /// Task description
        #[arg(short, long)]
        task: String,

        /// File holding the rendered generation prompt
        #[arg(short, long)]
        prompt: Option<PathBuf>,

        /// Path to the build result file
        #[arg(short, long)]
        build: PathBuf,

        /// Unified diff file; replaces the diff inside the build result
        #[arg(short, long)]
        diff: Option<PathBuf>,

        /// Exit with an error unless the run is auto-approved
        #[arg(long)]
        strict: bool,
    },

    /// Print the effective rule set
    Rules,
}

#[derive(Serialize)]
struct Evaluation {
    allowed: bool,
    score: u8,
    band: &'static str,
    decision: promptops_core::PolicyDecision,
    questions: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    promptops_core::telemetry::init_tracing(cli.json, level);

    let rules = load_rules(cli.rules.as_deref()).await?;

    let output = match cli.command {
        Commands::Evaluate { context, strict } => cmd_evaluate(rules, &context, strict).await?,
        Commands::Gate {
            task,
            prompt,
            build,
            diff,
            strict,
        } => cmd_gate(rules, &task, prompt.as_deref(), &build, diff.as_deref(), strict).await?,
        Commands::Rules => cmd_rules(&rules)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    promptops_core::METRICS.flush();
    Ok(())
}

/// Load the rule set (built-in when no file is given) and apply env overrides.
async fn load_rules(path: Option<&Path>) -> Result<RuleConfig> {
    let config = match path {
        Some(path) => RuleConfig::load_async(path)
            .await
            .with_context(|| format!("Failed to load rule set {}", path.display()))?,
        None => RuleConfig::default(),
    };
    config
        .with_env_overrides()
        .context("Invalid PROMPTOPS_* override")
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {what} {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid {what} {}", path.display()))
}

async fn cmd_evaluate(rules: RuleConfig, context: &Path, strict: bool) -> Result<Value> {
    let ctx: EvaluationContext = read_json(context, "evaluation context").await?;
    let rules = std::sync::Arc::new(rules);

    let decision = PolicyEvaluator::new(rules.clone()).evaluate(&ctx);
    let assessment = IntegrityScorer::new(rules).score(&ctx, &decision.violations);
    info!(
        allowed = decision.allowed(),
        score = assessment.score,
        violations = decision.violation_count(),
        "context evaluated"
    );

    if strict && !decision.allowed() {
        anyhow::bail!(
            "change not allowed: {} violation(s), score {}",
            decision.violation_count(),
            assessment.score
        );
    }

    Ok(serde_json::to_value(Evaluation {
        allowed: decision.allowed(),
        score: assessment.score,
        band: assessment.band(),
        decision,
        questions: assessment.questions,
    })?)
}

async fn cmd_gate(
    rules: RuleConfig,
    description: &str,
    prompt: Option<&Path>,
    build: &Path,
    diff: Option<&Path>,
    strict: bool,
) -> Result<Value> {
    let prompt_text = match prompt {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt {}", path.display()))?,
        None => String::new(),
    };
    let mut build: BuildResult = read_json(build, "build result").await?;
    if let Some(path) = diff {
        build.diff = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read diff {}", path.display()))?;
    }

    let gate = IntegrityGate::new(rules).context("Failed to initialise gate")?;
    let run_id = gate.create_run(Task::new(description, prompt_text));
    let outcome = gate
        .submit_build_result(run_id, build)
        .context("Gate evaluation failed")?;

    if strict && outcome.state != RunState::AutoApproved {
        anyhow::bail!(
            "run {} needs review: state {}, score {}",
            run_id,
            outcome.state,
            outcome.integrity_score.unwrap_or_default()
        );
    }
    Ok(serde_json::to_value(outcome)?)
}

fn cmd_rules(rules: &RuleConfig) -> Result<Value> {
    Ok(serde_json::json!({
        "digest": rules.digest(),
        "rules": rules,
    }))
}
