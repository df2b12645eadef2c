// validate.rs — `vp validate`: static checks plus engine limits.

use std::path::Path;

use vp_engine::EngineError;
use vp_policy::PolicyError;

use super::{load_policy, CliContext};

pub fn execute(ctx: &CliContext, policy: &Path) -> anyhow::Result<()> {
    let spec = load_policy(policy)?;
    tracing::debug!(config = %ctx.config_path.display(), "validating with engine limits");

    match ctx.engine().prepare(spec) {
        Ok(sealed) => {
            println!(
                "{} v{} is valid: {} input(s), {} output(s)",
                sealed.spec().id,
                sealed.spec().version,
                sealed.spec().inputs.len(),
                sealed.spec().outputs.len()
            );
            println!("policyHash: {}", sealed.policy_hash());
            Ok(())
        }
        Err(EngineError::Policy(PolicyError::InvalidPolicy { issues })) => {
            println!("{} is invalid:", policy.display());
            for issue in &issues {
                println!("  - {}", issue);
            }
            anyhow::bail!("{} validation issue(s)", issues.len())
        }
        Err(e) => Err(e.into()),
    }
}
