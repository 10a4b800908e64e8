use super::*;

/// Per-window element buffer.
const BUFFER_STATE: &str = "buffer";
/// Elements added since the last emitted pane.
const NEW_COUNT: &str = "new-elements";
/// The previously emitted pane, for firing-index and timing bookkeeping.
const LAST_PANE: &str = "last-pane";

/// Group-also-by-window runner for one key.
///
/// Consumes the key's elements, assigns them to windows with the strategy's
/// assigner, merges session-like windows, drives the [`TriggerMachine`], and
/// pushes one `(key, elements)` pane per firing into the receiver.
///
/// Batch protocol (what [`BatchDriver`] does):
/// 1. [`process_elements`](Self::process_elements) with everything the key
///    has,
/// 2. advance all clocks to the maximum instant,
/// 3. [`on_timers`](Self::on_timers) until no timer is eligible,
/// 4. [`persist`](Self::persist).
pub struct ReduceFnRunner<K, V, R>
where
    K: StreamData,
    V: StreamData,
    R: Receiver<(K, Vec<V>)>,
{
    key: K,
    strategy: WindowingStrategy,
    machine: TriggerMachine,
    state: StateStore,
    timers: TimerStore,
    receiver: R,
    dropped_due_to_lateness: Arc<Counter>,
    processed_elements: Arc<Counter>,
    active_windows: BTreeSet<TimeWindow>,
    _phantom: PhantomData<V>,
}

impl<K, V, R> ReduceFnRunner<K, V, R>
where
    K: StreamData,
    V: StreamData,
    R: Receiver<(K, Vec<V>)>,
{
    pub fn new(
        key: K,
        mut strategy: WindowingStrategy,
        receiver: R,
        metrics: &MetricsRegistry,
        options: &PipelineOptions,
    ) -> Self {
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
        let machine = TriggerMachine::compile(&strategy.trigger);
        Self {
            key,
            strategy,
            machine,
            state: StateStore::new(),
            timers: TimerStore::new(),
            receiver,
            dropped_due_to_lateness,
            processed_elements,
            active_windows: BTreeSet::new(),
            _phantom: PhantomData,
        }
    }

    /// Process a batch of this key's elements.
    ///
    /// Windows are assigned from each element's timestamp; for merging
    /// assigners the merge runs first over all windows known for the key,
    /// so buffered state from earlier batches moves into merged targets
    /// before new elements land in them.
    pub fn process_elements(&mut self, elements: Vec<WindowedValue<V>>) -> Result<()> {
        let mut assigned: Vec<(V, EventTime, Vec<TimeWindow>)> = Vec::with_capacity(elements.len());
        for element in elements {
            let windows = self.strategy.assigner.assign(element.timestamp);
            assigned.push((element.value, element.timestamp, windows));
        }

        let mapping = if self.strategy.assigner.is_merging() {
            for (_, _, windows) in &assigned {
                for window in windows {
                    self.active_windows.insert(*window);
                }
            }
            self.merge_active_windows()?
        } else {
            BTreeMap::new()
        };

        for (value, timestamp, windows) in assigned {
            let mut accepted = false;
            for window in windows {
                let window = mapping.get(&window).copied().unwrap_or(window);
                let expiry = self.strategy.window_expiry(&window);
                if self.timers.input_watermark() > expiry {
                    self.dropped_due_to_lateness.inc(1);
                    tracing::warn!(
                        timestamp,
                        window = %window,
                        "dropping late element past its window's lateness horizon"
                    );
                    continue;
                }
                if self.machine.is_closed(&self.state, &window)? {
                    tracing::debug!(timestamp, window = %window, "dropping element for closed window");
                    continue;
                }
                accepted = true;
                self.active_windows.insert(window);

                let ns = StateNamespace::window(window);
                BagHandle::<(V, EventTime)>::new(BUFFER_STATE).add(
                    &mut self.state,
                    &ns,
                    &(value.clone(), timestamp),
                )?;
                let news = ValueHandle::<u64>::new(NEW_COUNT);
                let count = news.read(&self.state, &ns)?.unwrap_or(0) + 1;
                news.write(&mut self.state, &ns, &count)?;

                self.machine
                    .on_element(&mut self.state, &mut self.timers, &window, timestamp)?;
                self.timers
                    .set(TimerData::new(gc_timer_id(&window), expiry, expiry));

                if self.machine.should_fire(&self.state, &self.timers, &window)? {
                    self.trigger_fire(&window)?;
                }
            }
            if accepted {
                self.processed_elements.inc(1);
            }
        }
        Ok(())
    }

    /// Dispatch a batch of fired timers.
    pub fn on_timers(&mut self, timers: Vec<TimerData>) -> Result<()> {
        for timer in timers {
            self.on_timer(timer)?;
        }
        Ok(())
    }

    /// Dispatch one fired timer: state cleanup for the window cleanup timer,
    /// trigger evaluation for the machine's timers.
    pub fn on_timer(&mut self, timer: TimerData) -> Result<()> {
        let Some(window) = timer.id.namespace.window_part() else {
            return Ok(());
        };
        if !self.active_windows.contains(&window) {
            return Ok(());
        }
        if timer.id.timer_id == GC_TIMER_ID {
            if !self.machine.is_closed(&self.state, &window)? {
                self.emit_pane(&window, true, true)?;
            }
            self.gc_window(&window);
            Ok(())
        } else if timer.id.family == TRIGGER_TIMER_FAMILY {
            self.machine
                .on_timer(&mut self.state, &mut self.timers, &window, &timer)?;
            if self.machine.should_fire(&self.state, &self.timers, &window)? {
                self.trigger_fire(&window)?;
            }
            Ok(())
        } else {
            Ok(())
        }
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
    ///
    /// The active-window set is recovered from the pending cleanup timers:
    /// every live window keeps one until it is collected.
    pub fn restore(&mut self, persisted: &PersistedState) -> Result<()> {
        self.state.restore(&persisted.state)?;
        self.timers.restore(&persisted.timers)?;
        self.active_windows = self
            .timers
            .pending()
            .filter(|timer| timer.id.timer_id == GC_TIMER_ID)
            .filter_map(|timer| timer.id.namespace.window_part())
            .collect();
        Ok(())
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

    pub fn receiver(&self) -> &R {
        &self.receiver
    }

    pub fn into_receiver(self) -> R {
        self.receiver
    }

    /// Acknowledge a trigger firing and emit the pane.
    fn trigger_fire(&mut self, window: &TimeWindow) -> Result<()> {
        self.machine
            .on_fire(&mut self.state, &mut self.timers, window)?;
        let closed = self.machine.is_closed(&self.state, window)?;
        let is_last =
            closed || self.timers.input_watermark() >= self.strategy.window_expiry(window);
        self.emit_pane(window, is_last, false)
    }

    /// Read the window's buffer and push one pane.
    ///
    /// A pane with no new elements since the previous firing is only pushed
    /// when the strategy's on-time or closing behavior says to fire anyway.
    fn emit_pane(&mut self, window: &TimeWindow, is_last: bool, is_closing: bool) -> Result<()> {
        let ns = StateNamespace::window(*window);
        let news = ValueHandle::<u64>::new(NEW_COUNT);
        let last_pane = ValueHandle::<PaneInfo>::new(LAST_PANE);

        let has_new_elements = news.read(&self.state, &ns)?.unwrap_or(0) > 0;
        let fire_empty = if is_closing {
            self.strategy.closing_behavior == ClosingBehavior::FireAlways
        } else {
            self.strategy.on_time_behavior == OnTimeBehavior::FireAlways
                && self.timers.input_watermark() >= window.max_timestamp()
        };
        if !has_new_elements && !fire_empty {
            return Ok(());
        }

        let previous = last_pane.read(&self.state, &ns)?;
        let timing = if self.timers.input_watermark() < window.max_timestamp() {
            PaneTiming::Early
        } else {
            match previous {
                Some(p) if p.timing == PaneTiming::OnTime || p.timing == PaneTiming::Late => {
                    PaneTiming::Late
                }
                _ => PaneTiming::OnTime,
            }
        };
        let index = previous.map(|p| p.index + 1).unwrap_or(0);
        let non_speculative_index = if timing == PaneTiming::Early {
            -1
        } else {
            previous.map(|p| p.non_speculative_index).unwrap_or(-1) + 1
        };
        let pane = PaneInfo {
            is_first: index == 0,
            is_last,
            timing,
            index,
            non_speculative_index,
        };

        let contents =
            BagHandle::<(V, EventTime)>::new(BUFFER_STATE).read(&self.state, &ns)?;
        let timestamp = match self.strategy.timestamp_combiner {
            TimestampCombiner::EndOfWindow => window.max_timestamp(),
            TimestampCombiner::Earliest => contents
                .iter()
                .map(|(_, ts)| *ts)
                .min()
                .unwrap_or_else(|| window.max_timestamp()),
            TimestampCombiner::Latest => contents
                .iter()
                .map(|(_, ts)| *ts)
                .max()
                .unwrap_or_else(|| window.max_timestamp()),
        };
        let values: Vec<V> = contents.into_iter().map(|(value, _)| value).collect();

        self.receiver.push(WindowedValue::of(
            (self.key.clone(), values),
            timestamp,
            *window,
            pane,
        ))?;

        last_pane.write(&mut self.state, &ns, &pane)?;
        news.clear(&mut self.state, &ns)?;
        if self.strategy.accumulation_mode == AccumulationMode::Discarding {
            BagHandle::<(V, EventTime)>::new(BUFFER_STATE).clear(&mut self.state, &ns)?;
        }
        Ok(())
    }

    /// Merge overlapping active windows: buffered elements, pane
    /// bookkeeping, and trigger state all move into the merge target, and
    /// the cleanup timer is rescheduled for the target's horizon.
    fn merge_active_windows(&mut self) -> Result<BTreeMap<TimeWindow, TimeWindow>> {
        let active: Vec<TimeWindow> = self.active_windows.iter().copied().collect();
        let actions = self.strategy.assigner.merge_windows(&active)?;
        let mut mapping = BTreeMap::new();

        let bag = BagHandle::<(V, EventTime)>::new(BUFFER_STATE);
        let news = ValueHandle::<u64>::new(NEW_COUNT);
        let last_pane = ValueHandle::<PaneInfo>::new(LAST_PANE);

        for action in actions {
            let target_ns = StateNamespace::window(action.target);
            for source in &action.sources {
                if *source == action.target {
                    continue;
                }
                let source_ns = StateNamespace::window(*source);

                for entry in bag.read(&self.state, &source_ns)? {
                    bag.add(&mut self.state, &target_ns, &entry)?;
                }
                bag.clear(&mut self.state, &source_ns)?;

                let moved = news.read(&self.state, &source_ns)?.unwrap_or(0);
                if moved > 0 {
                    let total = news.read(&self.state, &target_ns)?.unwrap_or(0) + moved;
                    news.write(&mut self.state, &target_ns, &total)?;
                    news.clear(&mut self.state, &source_ns)?;
                }

                if let Some(pane) = last_pane.read(&self.state, &source_ns)? {
                    let keep = match last_pane.read(&self.state, &target_ns)? {
                        Some(existing) if existing.index >= pane.index => existing,
                        _ => pane,
                    };
                    last_pane.write(&mut self.state, &target_ns, &keep)?;
                    last_pane.clear(&mut self.state, &source_ns)?;
                }

                self.timers.delete(&gc_timer_id(source));
                self.active_windows.remove(source);
                mapping.insert(*source, action.target);
            }

            self.machine
                .on_merge(&mut self.state, &mut self.timers, &action.sources, &action.target)?;
            self.active_windows.insert(action.target);
            let expiry = self.strategy.window_expiry(&action.target);
            self.timers
                .set(TimerData::new(gc_timer_id(&action.target), expiry, expiry));
        }
        Ok(mapping)
    }

    fn gc_window(&mut self, window: &TimeWindow) {
        tracing::debug!(window = %window, "collecting expired window state");
        self.state.clear_window(window);
        self.timers.delete(&gc_timer_id(window));
        self.active_windows.remove(window);
    }
}
