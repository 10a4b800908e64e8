use super::*;

/// Declarative description of when a window fires.
///
/// The tree is serializable so hosts can ship it with a pipeline; it is
/// compiled once per key into a [`TriggerMachine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Trigger {
    /// The standard trigger: fire when the watermark passes the end of the
    /// window, then once per late stimulus until the window expires.
    /// Equivalent to `Repeatedly(AfterWatermark)`.
    Default,
    /// Fire when the watermark passes the end of the window, with optional
    /// speculative and late firings. The `early` and `late` sub-triggers
    /// repeat implicitly.
    AfterWatermark {
        early: Option<Box<Trigger>>,
        late: Option<Box<Trigger>>,
    },
    /// Fire `delay` after the first element of the pane arrived, in
    /// processing time.
    AfterProcessingTime { delay_ms: EventTime },
    /// Fire once the pane has at least this many elements.
    AfterCount(u64),
    /// Run each sub-trigger to completion, one after the other.
    AfterEach(Vec<Trigger>),
    /// Re-arm the sub-trigger every time it finishes.
    Repeatedly(Box<Trigger>),
    /// Fire per the first sub-trigger until the second one fires, which
    /// closes the window.
    OrFinally(Box<Trigger>, Box<Trigger>),
    /// Never fire; the window only produces its final pane at expiration.
    Never,
    /// Ready to fire at every stimulus.
    Always,
}
