use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "govctl", version)]
#[command(about = "Validate, migrate and evaluate governance policies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate policy files or directories against the policy schema
    Validate(commands::validate::ValidateArgs),
    /// Migrate a policy document between schema versions
    Migrate(commands::migrate::MigrateArgs),
    /// Evaluate resources against a set of policies
    Evaluate(commands::evaluate::EvaluateArgs),
    /// Print version and exit
    Version,
}

fn init_tracing() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    match run().await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(2);
        }
    }
}

/// `Ok(false)` means the command ran but found failures.
async fn run() -> Result<bool> {
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Validate(args) => commands::validate::run(args),
        Commands::Migrate(args) => commands::migrate::run(args),
        Commands::Evaluate(args) => commands::evaluate::run(args).await,
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(true)
        }
    }
}
