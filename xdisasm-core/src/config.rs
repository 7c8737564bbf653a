//! Engine configuration
//!
//! Per Design Note 4, the classifier window size and prologue set are
//! configuration values rather than hard-coded constants. `EngineConfig`
//! is `Serialize`/`Deserialize` behind the `serialization` feature so a
//! caller can load it from a project's config file, the way the teacher's
//! pipeline/target configuration structs do.

use crate::classifier::Classifier;

/// Top-level knobs for a [`crate::engine::DisassemblyEngine`] run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    pub classifier: Classifier,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig { classifier: Classifier::default() }
    }
}
