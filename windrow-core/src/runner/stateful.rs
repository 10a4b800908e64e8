use super::*;

/// Per-window buffer of `(timestamp, value)` pairs awaiting ordered delivery.
const SORT_BUFFER: &str = "sort-buffer";

/// A user function driven per (key, window), with access to persistent state
/// and timers through the [`StepContext`].
///
/// Implementations must set timers with finite fire times; the batch drain
/// relies on it to terminate.
pub trait StatefulFn<V, O>: Send {
    /// Called once per delivered element.
    fn process(&mut self, ctx: &mut StepContext<'_, O>, value: &V) -> Result<()>;

    /// Called when a timer set through the context fires.
    fn on_timer(
        &mut self,
        _ctx: &mut StepContext<'_, O>,
        _timer_id: &str,
        _fire_at: EventTime,
    ) -> Result<()> {
        Ok(())
    }

    /// Called once per window the key touched, right before the window's
    /// lifetime ends. Only invoked when the signature declares it.
    fn on_window_expiration(
        &mut self,
        _ctx: &mut StepContext<'_, O>,
        _window: &TimeWindow,
    ) -> Result<()> {
        Ok(())
    }
}

/// Compile-time descriptor of a user function's needs. Built once per
/// function and passed in as data; the engine never inspects the function
/// itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct FnSignature {
    /// Deliver elements per window in ascending event-time order, buffering
    /// them until the window's lateness horizon.
    pub requires_time_sorted_input: bool,
    /// Invoke `on_window_expiration` for every window the key touched.
    pub uses_window_expiration: bool,
}

/// Stateful element runner for one key.
///
/// Admits elements against the lateness horizon of their windows, keeps a
/// cleanup timer per window one instant past that horizon, optionally
/// buffers elements for event-time-ordered delivery, and dispatches fired
/// timers to state cleanup, buffer flushes, or the user function.
pub struct StatefulRunner<K, V, O, F, R>
where
    K: StreamData,
    V: StreamData,
    F: StatefulFn<V, O>,
    R: MultiReceiver<O>,
{
    key: K,
    signature: FnSignature,
    strategy: WindowingStrategy,
    user_fn: F,
    state: StateStore,
    timers: TimerStore,
    receiver: R,
    main_tag: TupleTag,
    dropped_due_to_lateness: Arc<Counter>,
    processed_elements: Arc<Counter>,
    windows_seen: BTreeSet<TimeWindow>,
    _phantom: PhantomData<(V, O)>,
}

impl<K, V, O, F, R> StatefulRunner<K, V, O, F, R>
where
    K: StreamData,
    V: StreamData,
    F: StatefulFn<V, O>,
    R: MultiReceiver<O>,
{
    /// Fails with `UnsupportedConfiguration` when the function requires
    /// time-sorted input but the options disable ordering.
    pub fn new(
        key: K,
        signature: FnSignature,
        mut strategy: WindowingStrategy,
        user_fn: F,
        main_tag: TupleTag,
        receiver: R,
        metrics: &MetricsRegistry,
        options: &PipelineOptions,
    ) -> Result<Self> {
        if signature.requires_time_sorted_input && !options.ordering_enabled {
            return Err(EngineError::UnsupportedConfiguration(
                "user function requires time-sorted input but ordering is disabled".to_string(),
            )
            .into());
        }
        if let Some(lateness) = options.allowed_lateness_override {
            strategy.allowed_lateness_ms = lateness;
        }
        let (dropped_due_to_lateness, processed_elements) = if options.disable_metrics {
            (Arc::new(Counter::new()), Arc::new(Counter::new()))
        } else {
            (
                metrics.counter(DROPPED_DUE_TO_LATENESS),
                metrics.counter(PROCESSED_ELEMENTS),
            )
        };
        Ok(Self {
            key,
            signature,
            strategy,
            user_fn,
            state: StateStore::new(),
            timers: TimerStore::new(),
            receiver,
            main_tag,
            dropped_due_to_lateness,
            processed_elements,
            windows_seen: BTreeSet::new(),
            _phantom: PhantomData,
        })
    }

    pub fn start_bundle(&mut self) -> Result<()> {
        Ok(())
    }

    /// Admit one element.
    ///
    /// Per window of the element: if the input watermark has passed the
    /// window's lateness horizon (or, in ordered mode, the element's own
    /// timestamp plus allowed lateness), the element is dropped and counted.
    /// Otherwise the window's cleanup timer is ensured and the element is
    /// either delivered immediately or buffered for the ordered flush.
    pub fn process_element(&mut self, element: WindowedValue<V>) -> Result<()> {
        let watermark = self.timers.input_watermark();
        let mut accepted = false;
        for window in element.windows.clone() {
            let expiry = self.strategy.window_expiry(&window);
            let late = watermark > expiry
                || (self.signature.requires_time_sorted_input
                    && watermark
                        > element
                            .timestamp
                            .saturating_add(self.strategy.allowed_lateness_ms));
            if late {
                self.dropped_due_to_lateness.inc(1);
                tracing::warn!(
                    timestamp = element.timestamp,
                    window = %window,
                    "dropping late element past its window's lateness horizon"
                );
                continue;
            }
            accepted = true;
            if self.signature.uses_window_expiration {
                self.windows_seen.insert(window);
            }

            // The cleanup delay keeps window state alive for user timers set
            // exactly at the horizon.
            let cleanup_at = expiry.saturating_add(GC_DELAY_MS);
            self.timers
                .set(TimerData::new(gc_timer_id(&window), cleanup_at, cleanup_at));

            if self.signature.requires_time_sorted_input {
                BagHandle::<(EventTime, V)>::new(SORT_BUFFER).add(
                    &mut self.state,
                    &StateNamespace::window(window),
                    &(element.timestamp, element.value.clone()),
                )?;
                self.timers
                    .set(TimerData::new(sort_flush_timer_id(&window), expiry, expiry));
            } else {
                self.invoke_process(window, element.timestamp, element.pane, &element.value)?;
            }
        }
        if accepted {
            self.processed_elements.inc(1);
        }
        Ok(())
    }

    /// Dispatch one fired timer: state cleanup, ordered-buffer flush, or the
    /// user function's timer callback.
    pub fn on_timer(&mut self, timer: TimerData) -> Result<()> {
        let Some(window) = timer.id.namespace.window_part() else {
            return Ok(());
        };
        match timer.id.timer_id.as_str() {
            GC_TIMER_ID => self.collect_window(&window),
            SORT_FLUSH_TIMER_ID => self.flush_sorted(&window),
            _ => self.invoke_on_timer(&window, &timer),
        }
    }

    /// Invoke the user's expiration callback for `window`, if declared.
    pub fn on_window_expiration(&mut self, window: &TimeWindow, timestamp: EventTime) -> Result<()> {
        if !self.signature.uses_window_expiration {
            return Ok(());
        }
        let Self {
            user_fn,
            state,
            timers,
            receiver,
            main_tag,
            ..
        } = self;
        let mut ctx = StepContext::new(
            state,
            timers,
            receiver,
            main_tag,
            *window,
            timestamp,
            PaneInfo::no_firing(),
        );
        user_fn
            .on_window_expiration(&mut ctx, window)
            .map_err(EngineError::UserCodeFailure)?;
        Ok(())
    }

    pub fn finish_bundle(&mut self) -> Result<()> {
        Ok(())
    }

    /// Advance the input watermark and fire every event timer that became
    /// eligible, in order.
    pub fn advance_input_watermark(&mut self, t: EventTime) -> Result<()> {
        self.timers.advance_input_watermark(t)?;
        while let Some(timer) = self.timers.remove_next_event_timer() {
            self.on_timer(timer)?;
        }
        Ok(())
    }

    /// Serialize this key's state cells and pending timers.
    pub fn persist(&self) -> Result<PersistedState> {
        Ok(PersistedState {
            state: self.state.snapshot()?,
            timers: self.timers.snapshot()?,
        })
    }

    /// Rebuild state cells and pending timers from a persisted snapshot.
    pub fn restore(&mut self, persisted: &PersistedState) -> Result<()> {
        self.state.restore(&persisted.state)?;
        self.timers.restore(&persisted.timers)
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn timers(&self) -> &TimerStore {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut TimerStore {
        &mut self.timers
    }

    /// Windows this key has touched, for the expiration sweep.
    pub fn windows_seen(&self) -> impl Iterator<Item = &TimeWindow> {
        self.windows_seen.iter()
    }

    pub fn receiver(&self) -> &R {
        &self.receiver
    }

    pub fn into_receiver(self) -> R {
        self.receiver
    }

    fn collect_window(&mut self, window: &TimeWindow) -> Result<()> {
        tracing::debug!(window = %window, "collecting expired window state");
        self.state.clear_window(window);
        Ok(())
    }

    /// Drain the ordered buffer through the user function, ascending by
    /// `(timestamp, insertion order)`.
    fn flush_sorted(&mut self, window: &TimeWindow) -> Result<()> {
        let bag = BagHandle::<(EventTime, V)>::new(SORT_BUFFER);
        let ns = StateNamespace::window(*window);
        let mut buffered = bag.read(&self.state, &ns)?;
        bag.clear(&mut self.state, &ns)?;
        // Stable sort: equal timestamps keep their arrival order.
        buffered.sort_by_key(|(timestamp, _)| *timestamp);
        for (timestamp, value) in buffered {
            self.invoke_process(*window, timestamp, PaneInfo::no_firing(), &value)?;
        }
        Ok(())
    }

    fn invoke_process(
        &mut self,
        window: TimeWindow,
        timestamp: EventTime,
        pane: PaneInfo,
        value: &V,
    ) -> Result<()> {
        let Self {
            user_fn,
            state,
            timers,
            receiver,
            main_tag,
            ..
        } = self;
        let mut ctx = StepContext::new(state, timers, receiver, main_tag, window, timestamp, pane);
        user_fn
            .process(&mut ctx, value)
            .map_err(EngineError::UserCodeFailure)?;
        Ok(())
    }

    fn invoke_on_timer(&mut self, window: &TimeWindow, timer: &TimerData) -> Result<()> {
        let Self {
            user_fn,
            state,
            timers,
            receiver,
            main_tag,
            ..
        } = self;
        let mut ctx = StepContext::new(
            state,
            timers,
            receiver,
            main_tag,
            *window,
            timer.output_timestamp,
            PaneInfo::no_firing(),
        );
        user_fn
            .on_timer(&mut ctx, &timer.id.timer_id, timer.fire_at)
            .map_err(EngineError::UserCodeFailure)?;
        Ok(())
    }
}
