//! Evaluate command - run resources through the rules engine

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use policy_schema::files::read_document;
use rules_engine::{EvaluationResult, Resource, RulesEngine};
use serde::Deserialize;
use tabled::{settings::style::Style, Table, Tabled};
use tracing::info;

use super::OutputFormat;
use crate::output;

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Policy files or directories to register
    #[arg(long = "policies", value_name = "PATH", required = true, num_args = 1..)]
    pub policies: Vec<PathBuf>,

    /// Resources file (YAML or JSON): a list, a single resource, or {"resources": [...]}
    #[arg(long, value_name = "FILE")]
    pub resources: PathBuf,

    /// Maximum resources evaluated concurrently
    #[arg(long, env = "GOVERNANCE_MAX_CONCURRENCY")]
    pub max_concurrency: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ResourceInput {
    Wrapped { resources: Vec<Resource> },
    List(Vec<Resource>),
    Single(Resource),
}

impl ResourceInput {
    fn into_resources(self) -> Vec<Resource> {
        match self {
            ResourceInput::Wrapped { resources } | ResourceInput::List(resources) => resources,
            ResourceInput::Single(resource) => vec![resource],
        }
    }
}

#[derive(Tabled)]
struct ViolationRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Policy")]
    policy: String,
    #[tabled(rename = "Rule")]
    rule: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Enforcement")]
    enforcement: String,
    #[tabled(rename = "Message")]
    message: String,
}

pub async fn run(args: EvaluateArgs) -> Result<bool> {
    let mut config = rules_engine::load_from_env().context("Invalid engine configuration")?;
    if let Some(max) = args.max_concurrency {
        anyhow::ensure!(max > 0, "--max-concurrency must be at least 1");
        config.max_concurrency = max;
    }

    let engine = RulesEngine::new(config).context("Failed to initialise rules engine")?;
    let summary = engine
        .load_policies(&args.policies)
        .context("Failed to load policies")?;

    let failures: Vec<_> = summary.failures().collect();
    if !failures.is_empty() {
        for failure in &failures {
            eprintln!(
                "{} {}: {}",
                output::fail_mark(),
                failure.path.display(),
                failure.error.as_deref().unwrap_or("unknown error")
            );
        }
        anyhow::bail!("{} policy file(s) failed to load", failures.len());
    }
    if engine.is_empty() {
        anyhow::bail!("No policies found under the given paths");
    }
    info!("registered {} policies", engine.len());

    let document = read_document(&args.resources)
        .with_context(|| format!("Failed to load resources: {}", args.resources.display()))?;
    let resources = serde_json::from_value::<ResourceInput>(document)
        .with_context(|| format!("Malformed resources file: {}", args.resources.display()))?
        .into_resources();

    let results = Arc::new(engine)
        .evaluate_batch(resources)
        .await
        .context("Batch evaluation failed")?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
        OutputFormat::Text => print_text(&results),
    }

    Ok(results.iter().all(|r| r.passed))
}

fn print_text(results: &[EvaluationResult]) {
    for result in results {
        let mark = if result.passed {
            output::pass_mark()
        } else {
            output::fail_mark()
        };
        println!(
            "{} {} ({}) - {} policies, {} violation(s)",
            mark,
            result.resource_id,
            result.resource_type,
            result.evaluated_policies.len(),
            result.violations.len()
        );
    }

    let rows: Vec<ViolationRow> = results
        .iter()
        .flat_map(|result| {
            result.violations.iter().map(|v| ViolationRow {
                resource: result.resource_id.clone(),
                policy: v.policy.clone(),
                rule: v.rule.clone(),
                severity: v.severity.to_string(),
                enforcement: v.enforcement.to_string(),
                message: v.message.clone(),
            })
        })
        .collect();

    if !rows.is_empty() {
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("\n{}", table);
    }

    let failed = results.iter().filter(|r| !r.passed).count();
    println!();
    println!(
        "Evaluated {} resource(s): {} passed, {} failed",
        results.len(),
        results.len() - failed,
        failed
    );
}
