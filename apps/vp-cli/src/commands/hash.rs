// hash.rs — `vp hash`: the policy hash, or the canonical bytes behind it.

use std::io::Write;
use std::path::Path;

use vp_policy::{canonical_policy_bytes, hash_policy};

use super::load_policy;

pub fn execute(policy: &Path, canonical: bool) -> anyhow::Result<()> {
    let spec = load_policy(policy)?;
    if canonical {
        let bytes = canonical_policy_bytes(&spec)?;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&bytes)?;
        stdout.write_all(b"\n")?;
    } else {
        println!("{}", hash_policy(&spec)?);
    }
    Ok(())
}
