use super::*;

/// Whether successive panes of a window re-emit prior contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccumulationMode {
    /// Each pane carries only the elements since the previous firing.
    Discarding,
    /// Each pane carries everything the window has received so far.
    Accumulating,
}

/// Whether the final pane at window expiration fires when it has no
/// new contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClosingBehavior {
    FireIfNonEmpty,
    FireAlways,
}

/// Whether the on-time pane fires when it has no new contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnTimeBehavior {
    FireIfNonEmpty,
    FireAlways,
}

/// How the output timestamp of a pane is derived from its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampCombiner {
    /// The window's maximum timestamp.
    EndOfWindow,
    /// The earliest element timestamp in the pane.
    Earliest,
    /// The latest element timestamp in the pane.
    Latest,
}

/// Everything that governs how a key's elements are windowed and fired:
/// the assigner, the declarative trigger, the lateness horizon, and the
/// pane emission behaviors.
pub struct WindowingStrategy {
    pub assigner: Box<dyn WindowAssigner>,
    pub trigger: Trigger,
    pub allowed_lateness_ms: EventTime,
    pub accumulation_mode: AccumulationMode,
    pub closing_behavior: ClosingBehavior,
    pub on_time_behavior: OnTimeBehavior,
    pub timestamp_combiner: TimestampCombiner,
}

impl WindowingStrategy {
    /// A strategy with the default trigger, zero allowed lateness, and
    /// discarding panes.
    pub fn of(assigner: impl WindowAssigner + 'static) -> Self {
        Self {
            assigner: Box::new(assigner),
            trigger: Trigger::Default,
            allowed_lateness_ms: 0,
            accumulation_mode: AccumulationMode::Discarding,
            closing_behavior: ClosingBehavior::FireIfNonEmpty,
            on_time_behavior: OnTimeBehavior::FireAlways,
            timestamp_combiner: TimestampCombiner::EndOfWindow,
        }
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_allowed_lateness(mut self, lateness: Duration) -> Self {
        self.allowed_lateness_ms = lateness.as_millis() as i64;
        self
    }

    pub fn with_accumulation_mode(mut self, mode: AccumulationMode) -> Self {
        self.accumulation_mode = mode;
        self
    }

    pub fn with_closing_behavior(mut self, behavior: ClosingBehavior) -> Self {
        self.closing_behavior = behavior;
        self
    }

    pub fn with_on_time_behavior(mut self, behavior: OnTimeBehavior) -> Self {
        self.on_time_behavior = behavior;
        self
    }

    pub fn with_timestamp_combiner(mut self, combiner: TimestampCombiner) -> Self {
        self.timestamp_combiner = combiner;
        self
    }

    /// The instant after which elements for `window` are dropped and its
    /// state becomes collectable.
    pub fn window_expiry(&self, window: &TimeWindow) -> EventTime {
        window
            .max_timestamp()
            .saturating_add(self.allowed_lateness_ms)
    }
}
