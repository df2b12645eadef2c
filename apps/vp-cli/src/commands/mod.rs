// mod.rs — Subcommand modules and the context they share.

pub mod evaluate;
pub mod hash;
pub mod public;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::Context;
use vp_engine::{EngineConfig, PolicyEngine};
use vp_policy::PolicySpec;

/// Configuration for one CLI invocation.
pub struct CliContext {
    pub config_path: PathBuf,
    pub engine_config: EngineConfig,
}

impl CliContext {
    /// Config comes from `--config` when given, else `.vp/engine.toml` under
    /// the project root. A missing file means defaults; a broken one is an
    /// error.
    pub fn for_project(project_root: &Path, config: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = config
            .map(Path::to_path_buf)
            .unwrap_or_else(|| project_root.join(".vp").join("engine.toml"));
        let engine_config = EngineConfig::load_or_default(&config_path)
            .with_context(|| format!("loading engine config {}", config_path.display()))?;
        Ok(Self {
            config_path,
            engine_config,
        })
    }

    pub fn engine(&self) -> PolicyEngine {
        PolicyEngine::new(self.engine_config.clone())
    }
}

/// Load a policy file with a path-bearing error.
pub fn load_policy(path: &Path) -> anyhow::Result<PolicySpec> {
    PolicySpec::load(path).with_context(|| format!("loading policy {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_defaults_when_no_config_exists() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = CliContext::for_project(dir.path(), None).unwrap();
        assert_eq!(ctx.config_path, dir.path().join(".vp").join("engine.toml"));
        assert_eq!(ctx.engine_config, EngineConfig::default());
    }

    #[test]
    fn context_reads_project_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".vp")).unwrap();
        std::fs::write(
            dir.path().join(".vp").join("engine.toml"),
            "[limits]\nmax_outputs = 4\n",
        )
        .unwrap();
        let ctx = CliContext::for_project(dir.path(), None).unwrap();
        assert_eq!(ctx.engine_config.limits.max_outputs, 4);
        assert_eq!(ctx.engine().config().limits.max_outputs, 4);
    }

    #[test]
    fn broken_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "not toml at all [").unwrap();
        assert!(CliContext::for_project(dir.path(), Some(&path)).is_err());
    }
}
