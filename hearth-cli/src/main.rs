//! Hearth operator CLI
//!
//! Runs the state reconciliation engine over JSON files:
//!   hearth check  --schema light.json
//!   hearth init   --schema light.json
//!   hearth merge  --schema light.json --state state.json --patch cmd.json --in-place
//!   hearth load   --schema light.json --state stored.json
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use hearth_state::{Reconciler, ReconcilerConfig};
use serde::Serialize;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "hearth")]
#[command(about = "Validate, merge and diff device state documents")]
struct Args {
    /// Device id attached to log lines
    #[arg(long, global = true, default_value = "device")]
    device_id: String,

    /// Leave violations out of the printed report (they are still logged)
    #[arg(long, global = true)]
    quiet_violations: bool,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a schema file
    Check {
        #[arg(short, long)]
        schema: PathBuf,
    },
    /// Print the default state for a schema
    Init {
        #[arg(short, long)]
        schema: PathBuf,
    },
    /// Merge a patch into a state document
    Merge {
        #[arg(short, long)]
        schema: PathBuf,

        /// Current state; the default state is used when omitted
        #[arg(long)]
        state: Option<PathBuf>,

        #[arg(short, long)]
        patch: PathBuf,

        /// Write the merged state back to --state
        #[arg(long)]
        in_place: bool,
    },
    /// Load a persisted state document, dropping what does not fit
    Load {
        #[arg(short, long)]
        schema: PathBuf,

        #[arg(long)]
        state: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let reconciler = Reconciler::new(ReconcilerConfig {
        device_id: args.device_id,
        record_violations: !args.quiet_violations,
    });

    match args.command {
        Command::Check { schema } => print(&hearth_cli::check(&schema)?),
        Command::Init { schema } => print(&hearth_cli::init(&reconciler, &schema)?),
        Command::Merge {
            schema,
            state,
            patch,
            in_place,
        } => print(&hearth_cli::merge(
            &reconciler,
            &schema,
            state.as_deref(),
            &patch,
            in_place,
        )?),
        Command::Load { schema, state } => print(&hearth_cli::load(&reconciler, &schema, &state)?),
    }
}

fn print(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
