//! Data-access collaborator: where observations come from.
//!
//! The engine never talks to HTTP endpoints, warehouses, or chains. A caller
//! that wants the engine to pull observations implements [`ObservationSource`]
//! and passes it to [`PolicyEngine::evaluate_with_source`]; everything else
//! hands over an [`ObservationSet`] directly.
//!
//! [`PolicyEngine::evaluate_with_source`]: crate::PolicyEngine::evaluate_with_source
//! [`ObservationSet`]: crate::ObservationSet

use std::collections::HashMap;

use thiserror::Error;
use vp_policy::DataSourceRef;

use crate::observation::Observation;
use crate::resolver::ResolvedWindow;

/// Errors a source reports. Surfaced as `EvalError::SourceFailed` for the
/// input being fetched; the engine never retries.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("no such signal '{signal}' at '{reference}'")]
    UnknownSignal { reference: String, signal: String },
}

/// Fetch observations for one signal of one source within a window.
///
/// Implementations own connection handling, credentials, timeouts, and
/// retries. The returned sequence may include observations outside the
/// window; the resolver selects.
pub trait ObservationSource: Send + Sync {
    fn fetch(
        &self,
        source: &DataSourceRef,
        signal: &str,
        window: &ResolvedWindow,
    ) -> Result<Vec<Observation>, SourceError>;
}

/// In-memory source keyed by `(ref, signal)`.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    series: HashMap<(String, String), Vec<Observation>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        reference: impl Into<String>,
        signal: impl Into<String>,
        observations: Vec<Observation>,
    ) {
        self.series
            .insert((reference.into(), signal.into()), observations);
    }
}

impl ObservationSource for MemorySource {
    fn fetch(
        &self,
        source: &DataSourceRef,
        signal: &str,
        _window: &ResolvedWindow,
    ) -> Result<Vec<Observation>, SourceError> {
        self.series
            .get(&(source.reference.clone(), signal.to_string()))
            .cloned()
            .ok_or_else(|| SourceError::UnknownSignal {
                reference: source.reference.clone(),
                signal: signal.to_string(),
            })
    }
}
