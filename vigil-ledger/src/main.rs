//! Vigil Ledger CLI
//!
//! Invoked by the process supervisor strictly after a job process has
//! terminated, with the exit code the supervisor observed and the job's
//! statically known identifiers. Appends exactly one row to the shared
//! fleet ledger.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil_core::domain::ledger::LedgerEntry;
use vigil_core::domain::severity::ExitStatus;
use vigil_ledger::LedgerWriter;

#[derive(Parser)]
#[command(name = "vigil-ledger")]
#[command(about = "Record one terminated job's exit status in the shared fleet ledger", long_about = None)]
struct Cli {
    /// Path of the shared ledger file
    #[arg(long, env = "VIGIL_LEDGER")]
    ledger: PathBuf,

    /// Project the terminated job belongs to
    #[arg(long, env = "VIGIL_PROJECT")]
    project: String,

    /// Script identifier of the terminated job
    #[arg(long, env = "VIGIL_SCRIPT")]
    script: String,

    /// Exit code the supervisor observed from the terminated process
    #[arg(long, allow_hyphen_values = true)]
    exit_code: i32,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil_ledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match ExitStatus::from_code(cli.exit_code) {
        Some(status) => info!(
            project = %cli.project,
            script = %cli.script,
            "recording {status} ({})",
            cli.exit_code
        ),
        // Recorded verbatim anyway: a code outside the protocol means the
        // process died before its exit manager could run.
        None => warn!(
            project = %cli.project,
            script = %cli.script,
            "exit code {} is not a recognized status; recording an ungoverned failure",
            cli.exit_code
        ),
    }

    let entry = LedgerEntry::new(&cli.project, &cli.script, cli.exit_code);
    LedgerWriter::new(&cli.ledger)
        .append(&entry)
        .with_context(|| format!("failed to append to ledger at {}", cli.ledger.display()))?;

    Ok(())
}
