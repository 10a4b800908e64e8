use super::*;

/// What a user function sees while processing one element, timer, or window
/// expiration: state scoped to the current window, timers, and the output.
///
/// State handles are free-standing descriptors; access goes through
/// [`state_mut`](Self::state_mut) plus [`namespace`](Self::namespace):
///
/// ```ignore
/// let sum = ValueHandle::<i64>::new("sum");
/// let ns = ctx.namespace();
/// let current = sum.read(ctx.state(), &ns)?.unwrap_or(0);
/// sum.write(ctx.state_mut(), &ns, &(current + 1))?;
/// ```
pub struct StepContext<'a, O> {
    state: &'a mut StateStore,
    timers: &'a mut TimerStore,
    output: &'a mut dyn MultiReceiver<O>,
    main_tag: &'a TupleTag,
    window: TimeWindow,
    timestamp: EventTime,
    pane: PaneInfo,
}

impl<'a, O> StepContext<'a, O> {
    pub(crate) fn new(
        state: &'a mut StateStore,
        timers: &'a mut TimerStore,
        output: &'a mut dyn MultiReceiver<O>,
        main_tag: &'a TupleTag,
        window: TimeWindow,
        timestamp: EventTime,
        pane: PaneInfo,
    ) -> Self {
        Self {
            state,
            timers,
            output,
            main_tag,
            window,
            timestamp,
            pane,
        }
    }

    /// The window this invocation is scoped to.
    pub fn window(&self) -> TimeWindow {
        self.window
    }

    /// Event timestamp of the current element, or the output timestamp of
    /// the firing timer.
    pub fn timestamp(&self) -> EventTime {
        self.timestamp
    }

    pub fn pane(&self) -> PaneInfo {
        self.pane
    }

    /// The state namespace of the current window.
    pub fn namespace(&self) -> StateNamespace {
        StateNamespace::window(self.window)
    }

    pub fn state(&self) -> &StateStore {
        self.state
    }

    pub fn state_mut(&mut self) -> &mut StateStore {
        self.state
    }

    /// Set (or replace) an event-time timer scoped to the current window.
    /// The fire instant doubles as the output-watermark hold.
    pub fn set_event_timer(&mut self, timer_id: &str, fire_at: EventTime) {
        self.timers.set(TimerData::new(
            TimerId::new(self.namespace(), timer_id, "", TimeDomain::EventTime),
            fire_at,
            fire_at,
        ));
    }

    /// Set (or replace) a processing-time timer scoped to the current
    /// window, holding the output watermark at the current element
    /// timestamp.
    pub fn set_processing_timer(&mut self, timer_id: &str, fire_at: EventTime) {
        self.timers.set(TimerData::new(
            TimerId::new(self.namespace(), timer_id, "", TimeDomain::ProcessingTime),
            fire_at,
            self.timestamp,
        ));
    }

    /// Cancel a pending timer set through this context. No-op if absent.
    pub fn delete_timer(&mut self, timer_id: &str, domain: TimeDomain) {
        self.timers
            .delete(&TimerId::new(self.namespace(), timer_id, "", domain));
    }

    /// Emit to the main output, at the current timestamp and window.
    pub fn output(&mut self, value: O) -> Result<()> {
        let windowed = WindowedValue::of(value, self.timestamp, self.window, self.pane);
        self.output.push(self.main_tag, windowed)
    }

    /// Emit to the main output with an explicit timestamp.
    pub fn output_with_timestamp(&mut self, value: O, timestamp: EventTime) -> Result<()> {
        let windowed = WindowedValue::of(value, timestamp, self.window, self.pane);
        self.output.push(self.main_tag, windowed)
    }

    /// Emit to a tagged side output.
    pub fn output_tagged(&mut self, tag: &TupleTag, value: O) -> Result<()> {
        let windowed = WindowedValue::of(value, self.timestamp, self.window, self.pane);
        self.output.push(tag, windowed)
    }
}
