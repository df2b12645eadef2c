// public.rs — `vp public` and `vp verify-public`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use vp_policy::{verify_public, CodeRef, PublicPolicySpec};

use super::load_policy;

#[derive(Args)]
pub struct PublicArgs {
    /// Private policy file (.json, .yaml, .yml).
    pub policy: PathBuf,
    /// Write the public spec here instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Pin the evaluator to a git repository...
    #[arg(long, requires = "git_commit", conflicts_with = "oci_image")]
    pub git_repo: Option<String>,
    /// ...at this commit.
    #[arg(long, requires = "git_repo")]
    pub git_commit: Option<String>,
    /// Pin the evaluator to an OCI image...
    #[arg(long, requires = "oci_digest")]
    pub oci_image: Option<String>,
    /// ...with this digest.
    #[arg(long, requires = "oci_image")]
    pub oci_digest: Option<String>,
}

impl PublicArgs {
    fn code_ref(&self) -> Option<CodeRef> {
        match (&self.git_repo, &self.git_commit, &self.oci_image, &self.oci_digest) {
            (Some(repo), Some(commit), _, _) => Some(CodeRef::Git {
                repo: repo.clone(),
                commit: commit.clone(),
            }),
            (_, _, Some(image), Some(digest)) => Some(CodeRef::Oci {
                image: image.clone(),
                digest: digest.clone(),
            }),
            _ => None,
        }
    }
}

pub fn execute(args: &PublicArgs) -> anyhow::Result<()> {
    let spec = load_policy(&args.policy)?;
    let public = PublicPolicySpec::from_private(&spec, args.code_ref())?;
    let text = serde_json::to_string_pretty(&public)?;

    match &args.out {
        Some(path) => {
            std::fs::write(path, format!("{}\n", text))
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote public spec to {}", path.display());
            println!("policyHash: {}", public.policy_hash());
        }
        None => println!("{}", text),
    }
    Ok(())
}

pub fn verify(public: &Path, policy: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(public)
        .with_context(|| format!("reading public spec {}", public.display()))?;
    let public_spec: PublicPolicySpec = serde_json::from_str(&text)
        .with_context(|| format!("parsing public spec {}", public.display()))?;
    let private = load_policy(policy)?;

    verify_public(&public_spec, &private)?;
    println!(
        "Public spec matches {} ({})",
        policy.display(),
        public_spec.policy_hash()
    );
    Ok(())
}
