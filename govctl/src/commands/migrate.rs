//! Migrate command - rewrite a policy document for a newer schema version

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use policy_schema::files::read_document;
use policy_schema::{PolicyValidator, SchemaMigrator};
use serde_json::Value;

use crate::output;

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Policy file to migrate (YAML or JSON)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Source schema version (default: the document's apiVersion)
    #[arg(long)]
    pub from: Option<String>,

    /// Target schema version
    #[arg(long)]
    pub to: String,

    /// Write the migrated policy here instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

pub fn run(args: MigrateArgs) -> Result<bool> {
    let document = read_document(&args.file)
        .with_context(|| format!("Failed to load policy: {}", args.file.display()))?;

    let from = match &args.from {
        Some(from) => from.clone(),
        None => document
            .get("apiVersion")
            .and_then(Value::as_str)
            .map(String::from)
            .context("Policy has no apiVersion; pass --from")?,
    };

    let migrated = SchemaMigrator::new()
        .migrate(document, &from, &args.to)
        .with_context(|| format!("Failed to migrate {}", args.file.display()))?;

    let validator = PolicyValidator::new().context("Failed to load policy schemas")?;
    let report = validator.validate(&migrated, Some(&args.to));

    let rendered = serde_yaml::to_string(&migrated).context("Failed to render migrated policy")?;
    match &args.output {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            let mark = if report.valid {
                output::pass_mark()
            } else {
                output::fail_mark()
            };
            eprintln!(
                "{} Migrated {} from {} to {} -> {}",
                mark,
                args.file.display(),
                from,
                args.to,
                path.display()
            );
        }
        None => print!("{}", rendered),
    }

    if !report.valid {
        eprintln!("Migrated policy does not validate against {}:", args.to);
        for issue in report.errors() {
            eprintln!("    {}", issue);
        }
    }
    Ok(report.valid)
}
