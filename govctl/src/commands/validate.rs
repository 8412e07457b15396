//! Validate command - check policy files against the policy schema

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use policy_schema::files::collect_policy_files;
use policy_schema::{
    FileReport, IssueSeverity, PolicyValidator, SchemaError, SchemaVersion, ValidationIssue,
};
use tracing::debug;

use super::OutputFormat;
use crate::output;

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Policy files or directories (searched recursively for .yaml, .yml, .json)
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Schema version every file must declare and validate against
    #[arg(long)]
    pub schema_version: Option<String>,

    /// Schema version for files that do not declare an apiVersion
    #[arg(
        long,
        env = "GOVERNANCE_SCHEMA_VERSION",
        value_parser = SchemaVersion::parse,
        default_value = "v1.0.0"
    )]
    pub default_schema_version: SchemaVersion,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Treat warnings as failures
    #[arg(long)]
    pub strict: bool,
}

pub fn run(args: ValidateArgs) -> Result<bool> {
    let validator = PolicyValidator::new()
        .context("Failed to load policy schemas")?
        .with_default_version(args.default_schema_version);
    debug!(
        "default schema version {}",
        validator.default_version().api_version()
    );
    let files = collect_policy_files(&args.paths).context("Failed to collect policy files")?;
    if files.is_empty() {
        anyhow::bail!("No policy files found under the given paths");
    }

    let reports: Vec<FileReport> = files
        .into_iter()
        .map(|path| {
            debug!("validating {}", path.display());
            validator
                .validate_file(&path, args.schema_version.as_deref())
                .unwrap_or_else(|e| unreadable(path, e))
        })
        .collect();

    let failed = reports
        .iter()
        .filter(|r| !passes(r, args.strict))
        .count();

    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        OutputFormat::Text => print_text(&reports, args.strict),
    }

    Ok(failed == 0)
}

fn passes(report: &FileReport, strict: bool) -> bool {
    report.valid
        && !(strict
            && report
                .issues
                .iter()
                .any(|i| i.severity == IssueSeverity::Warning))
}

fn unreadable(path: PathBuf, error: SchemaError) -> FileReport {
    FileReport {
        path,
        valid: false,
        policy_name: None,
        schema_version: None,
        issues: vec![ValidationIssue::error(error.to_string())],
    }
}

fn print_text(reports: &[FileReport], strict: bool) {
    for report in reports {
        let mark = if passes(report, strict) {
            output::pass_mark()
        } else {
            output::fail_mark()
        };
        match &report.policy_name {
            Some(name) => println!("{} {} ({})", mark, report.path.display(), name),
            None => println!("{} {}", mark, report.path.display()),
        }
        for issue in &report.issues {
            let location = issue
                .path
                .as_ref()
                .map(|p| format!(" (at {})", p))
                .unwrap_or_default();
            println!(
                "    {} {}{}",
                output::issue_label(issue.severity),
                issue.message,
                location
            );
        }
    }

    let failed = reports.iter().filter(|r| !passes(r, strict)).count();
    println!();
    println!(
        "Validated {} file(s): {} passed, {} failed",
        reports.len(),
        reports.len() - failed,
        failed
    );
}
