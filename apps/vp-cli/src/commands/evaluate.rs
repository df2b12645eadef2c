// evaluate.rs — `vp evaluate`: run a policy against an observation file.
//
// The evaluation instant defaults to the current time here, at the edge.
// Pass `--at` to replay an evaluation exactly.

use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Args;
use vp_engine::{Evaluation, ObservationSet};

use super::{load_policy, CliContext};

#[derive(Args)]
pub struct EvaluateArgs {
    /// Policy file (.json, .yaml, .yml).
    pub policy: PathBuf,
    /// Observation file: {"<inputId>": [{"timestamp", "value", "unit"?}]}.
    pub observations: PathBuf,
    /// Evaluation instant (RFC 3339). Defaults to now.
    #[arg(long)]
    pub at: Option<String>,
    /// Print only the disclosed claim set, in canonical form.
    #[arg(long)]
    pub claims_only: bool,
    /// Exit with an error if any input or output failed.
    #[arg(long)]
    pub strict: bool,
}

fn parse_instant(text: &str) -> anyhow::Result<DateTime<Utc>> {
    let instant = DateTime::parse_from_rfc3339(text)
        .with_context(|| format!("--at '{}' is not an RFC 3339 timestamp", text))?;
    Ok(instant.with_timezone(&Utc))
}

pub fn run(ctx: &CliContext, args: &EvaluateArgs) -> anyhow::Result<Evaluation> {
    let at = match &args.at {
        Some(text) => parse_instant(text)?,
        None => Utc::now(),
    };
    let spec = load_policy(&args.policy)?;
    let observations = ObservationSet::load(&args.observations)
        .with_context(|| format!("loading observations {}", args.observations.display()))?;

    let engine = ctx.engine();
    let sealed = engine.prepare(spec)?;
    Ok(engine.evaluate(&sealed, &observations, at)?)
}

pub fn execute(ctx: &CliContext, args: &EvaluateArgs) -> anyhow::Result<()> {
    let evaluation = run(ctx, args)?;

    if args.claims_only {
        let bytes = evaluation.claim_set.canonical_bytes()?;
        println!("{}", String::from_utf8(bytes)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&evaluation)?);
    }

    if !evaluation.is_complete() {
        for failure in &evaluation.failures {
            eprintln!("failed: {}", failure.error);
        }
        if args.strict {
            anyhow::bail!("{} failure(s) during evaluation", evaluation.failures.len());
        }
    }
    Ok(())
}
