// config.rs — Engine configuration from `.vp/engine.toml`.
//
// Every field has a default, so an empty or missing file is a valid config.
//
// ```toml
// [limits]
// max_inputs = 256
// max_outputs = 256
// max_observations_per_input = 100000
//
// [evaluation]
// fail_fast = false
// ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

/// Bounds on policy and observation size. Every evaluation stays bounded in
/// time and memory regardless of what it is handed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    #[serde(default = "default_max_inputs")]
    pub max_inputs: usize,
    #[serde(default = "default_max_outputs")]
    pub max_outputs: usize,
    #[serde(default = "default_max_observations")]
    pub max_observations_per_input: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_inputs: default_max_inputs(),
            max_outputs: default_max_outputs(),
            max_observations_per_input: default_max_observations(),
        }
    }
}

fn default_max_inputs() -> usize {
    256
}

fn default_max_outputs() -> usize {
    256
}

fn default_max_observations() -> usize {
    100_000
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluationConfig {
    /// Stop deriving outputs after the first failure. The remaining outputs
    /// are reported as not evaluated rather than silently dropped.
    #[serde(default)]
    pub fail_fast: bool,
}

impl EngineConfig {
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, EngineError> {
        toml::from_str(text).map_err(|e| EngineError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load from a file that must exist.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Defaults when the file is absent; an error when it exists but is
    /// malformed. A broken config never silently becomes the default one.
    pub fn load_or_default(path: &Path) -> Result<Self, EngineError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}
