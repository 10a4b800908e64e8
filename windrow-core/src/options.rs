//! Host-supplied configuration affecting core semantics.

use serde::{Deserialize, Serialize};

use crate::types::EventTime;

/// The subset of pipeline configuration the core reacts to.
///
/// Everything else a host might configure (adapters, coders, parallelism) is
/// resolved outside the engine and has no effect on its semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Swallow all metric updates.
    pub disable_metrics: bool,
    /// Replace the windowing strategy's allowed lateness, in milliseconds.
    pub allowed_lateness_override: Option<EventTime>,
    /// Whether time-sorted element delivery may be used. A user function that
    /// requires sorted input cannot run with this disabled.
    pub ordering_enabled: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            disable_metrics: false,
            allowed_lateness_override: None,
            ordering_enabled: true,
        }
    }
}
