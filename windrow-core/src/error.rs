//! Contract-level error kinds of the engine.
//!
//! Only late elements are handled locally (dropped and counted); every kind
//! below fails the current `process_element` / `on_timer` call and is left to
//! the host to handle. The engine never retries.

use crate::time::TimeDomain;
use crate::types::EventTime;

/// Errors raised by the engine core.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A watermark advance went backwards.
    #[error("{domain} watermark must not regress: current {current}, requested {requested}")]
    InvalidWatermark {
        /// Time domain whose clock was advanced.
        domain: TimeDomain,
        /// Current clock value.
        current: EventTime,
        /// Rejected new value.
        requested: EventTime,
    },

    /// A state cell was accessed with an incompatible variant or value type.
    #[error("state cell {id:?} holds {stored} but was accessed as {requested}")]
    StateTypeMismatch {
        /// Cell id within its namespace.
        id: String,
        /// Fingerprint the cell was created with.
        stored: String,
        /// Fingerprint of the conflicting access.
        requested: String,
    },

    /// The trigger machine was driven into an impossible transition.
    #[error("trigger contract violated: {0}")]
    TriggerContract(String),

    /// A window merge was proposed for a non-merging window assigner.
    #[error("window merge proposed for a non-merging window assigner")]
    MergeConflict,

    /// A user element, timer, or expiration callback failed.
    #[error("user code failed: {0}")]
    UserCodeFailure(anyhow::Error),

    /// The runner was constructed with options it cannot honor.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),
}
