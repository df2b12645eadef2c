//! # vp-cli
//!
//! Command-line interface for verifiable policies.
//!
//! - `vp hash` — print a policy's `sha256:` hash (or its canonical bytes)
//! - `vp validate` — run static validation and report every issue
//! - `vp public` — project the publishable spec with its integrity block
//! - `vp verify-public` — check a public spec against the private policy
//! - `vp evaluate` — evaluate a policy against an observation file

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::CliContext;

/// Verifiable policy tool: hash, publish, and evaluate policies.
#[derive(Parser)]
#[command(name = "vp", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// Engine config file (defaults to .vp/engine.toml under the project root).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the policy hash.
    Hash {
        /// Policy file (.json, .yaml, .yml).
        policy: PathBuf,
        /// Print the RFC 8785 canonical form instead of the hash.
        #[arg(long)]
        canonical: bool,
    },
    /// Validate a policy without evaluating it.
    Validate {
        /// Policy file (.json, .yaml, .yml).
        policy: PathBuf,
    },
    /// Write the public projection of a policy.
    Public {
        #[command(flatten)]
        args: commands::public::PublicArgs,
    },
    /// Check that a public spec matches the private policy it describes.
    VerifyPublic {
        /// Public spec (JSON).
        public: PathBuf,
        /// Private policy file.
        policy: PathBuf,
    },
    /// Evaluate a policy against observations.
    Evaluate {
        #[command(flatten)]
        args: commands::evaluate::EvaluateArgs,
    },
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("vp_engine=info".parse()?)
        .add_directive("vp_policy=info".parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let ctx = CliContext::for_project(&project_root, cli.config.as_deref())?;

    match &cli.command {
        Commands::Hash { policy, canonical } => commands::hash::execute(policy, *canonical),
        Commands::Validate { policy } => commands::validate::execute(&ctx, policy),
        Commands::Public { args } => commands::public::execute(args),
        Commands::VerifyPublic { public, policy } => {
            commands::public::verify(public, policy)
        }
        Commands::Evaluate { args } => commands::evaluate::execute(&ctx, args),
    }
}
