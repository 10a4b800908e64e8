use super::*;

/// Runs one key's batch to completion.
///
/// With batch input the whole key is available up front, so there is no real
/// watermark to follow: the driver advances processing-time clocks to the
/// host's "now", processes every element, advances all clocks to the maximum
/// instant, and drains timers to exhaustion. Dispatching a timer may set
/// further timers in any domain, so the drain repeats until a full cycle
/// over all three domains fires nothing. Termination follows from user
/// timers having finite fire times.
pub struct BatchDriver {
    now: EventTime,
}

impl BatchDriver {
    /// `now` is the host's current processing time; only the transition to
    /// `now` at the start and to the maximum instant at the end are
    /// observable.
    pub fn new(now: EventTime) -> Self {
        Self { now }
    }

    /// Run the group-also-by-window flow for one key and persist it.
    pub fn run_group_also_by_window<K, V, R>(
        &self,
        runner: &mut ReduceFnRunner<K, V, R>,
        elements: Vec<WindowedValue<V>>,
    ) -> Result<PersistedState>
    where
        K: StreamData,
        V: StreamData,
        R: Receiver<(K, Vec<V>)>,
    {
        runner.timers_mut().advance_processing_time(self.now)?;
        runner
            .timers_mut()
            .advance_synchronized_processing_time(self.now)?;

        runner.process_elements(elements)?;

        // Finish every window by advancing the input watermark to the end,
        // then the processing clocks, and firing whatever became eligible.
        runner.timers_mut().advance_input_watermark(EVENT_TIME_MAX)?;
        runner.timers_mut().advance_processing_time(EVENT_TIME_MAX)?;
        runner
            .timers_mut()
            .advance_synchronized_processing_time(EVENT_TIME_MAX)?;

        loop {
            let mut fired = Vec::new();
            while let Some(timer) = runner.timers_mut().remove_next_event_timer() {
                fired.push(timer);
            }
            while let Some(timer) = runner.timers_mut().remove_next_processing_timer() {
                fired.push(timer);
            }
            while let Some(timer) = runner.timers_mut().remove_next_synchronized_processing_timer()
            {
                fired.push(timer);
            }
            if fired.is_empty() {
                break;
            }
            runner.on_timers(fired)?;
        }

        runner.persist()
    }

    /// Run the stateful-function flow for one key and persist it.
    pub fn run_stateful<K, V, O, F, R>(
        &self,
        runner: &mut StatefulRunner<K, V, O, F, R>,
        elements: Vec<WindowedValue<V>>,
    ) -> Result<PersistedState>
    where
        K: StreamData,
        V: StreamData,
        F: StatefulFn<V, O>,
        R: MultiReceiver<O>,
    {
        runner.timers_mut().advance_processing_time(self.now)?;
        runner
            .timers_mut()
            .advance_synchronized_processing_time(self.now)?;

        runner.start_bundle()?;
        for element in elements {
            runner.process_element(element)?;
        }

        runner.timers_mut().advance_input_watermark(EVENT_TIME_MAX)?;
        runner.timers_mut().advance_processing_time(EVENT_TIME_MAX)?;
        runner
            .timers_mut()
            .advance_synchronized_processing_time(EVENT_TIME_MAX)?;

        loop {
            let mut fired = false;
            while let Some(timer) = runner.timers_mut().remove_next_event_timer() {
                runner.on_timer(timer)?;
                fired = true;
            }
            while let Some(timer) = runner.timers_mut().remove_next_processing_timer() {
                runner.on_timer(timer)?;
                fired = true;
            }
            while let Some(timer) = runner.timers_mut().remove_next_synchronized_processing_timer()
            {
                runner.on_timer(timer)?;
                fired = true;
            }
            if !fired {
                break;
            }
        }

        // The expiration sweep runs after all timers have drained, one
        // callback per window the key touched.
        let windows: Vec<TimeWindow> = runner.windows_seen().copied().collect();
        for window in windows {
            runner.on_window_expiration(&window, window.max_timestamp().saturating_sub(1))?;
        }

        runner.finish_bundle()?;
        runner.persist()
    }
}
