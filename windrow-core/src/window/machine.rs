use super::*;

/// Family stamped on every timer the trigger machine registers, so runners
/// can route those timers back to the machine.
pub const TRIGGER_TIMER_FAMILY: &str = "__trigger";

const FINISHED: &str = "finished";
const COUNT: &str = "count";
const FIRE_AT: &str = "fire-at";
const ON_TIME_FIRED: &str = "on-time-fired";
const ACTIVE: &str = "active";

#[derive(Debug, Clone)]
enum NodeKind {
    AfterWatermark {
        early: Option<usize>,
        late: Option<usize>,
    },
    AfterProcessingTime {
        delay_ms: EventTime,
    },
    AfterCount(u64),
    AfterEach,
    Repeatedly,
    OrFinally,
    Never,
    Always,
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    children: Vec<usize>,
}

/// Finite state machine compiled from a declarative [`Trigger`] tree.
///
/// One machine is compiled per key and drives every window of that key; all
/// per-window state lives in the [`StateStore`] under
/// [`StateNamespace::WindowAndTrigger`] namespaces, one per tree node, so it
/// is isolated from user state yet collected together with the window. The
/// machine holds no references: the runner owns the state and timer stores
/// and lends them to each call.
///
/// Readiness is evaluated against the stores' clocks per stimulus (element
/// arrival or timer firing); [`on_fire`](Self::on_fire) acknowledges one
/// firing and transitions the tree. Once the root finishes the window is
/// closed, and acknowledging another firing is a contract violation.
pub struct TriggerMachine {
    nodes: Vec<Node>,
}

impl TriggerMachine {
    /// Compile the declarative tree. `Trigger::Default` and the implicit
    /// repetition of early/late watermark sub-triggers are expanded here.
    pub fn compile(trigger: &Trigger) -> Self {
        let mut nodes = Vec::new();
        build(trigger, &mut nodes);
        Self { nodes }
    }

    /// Record an element arriving in `window`.
    pub fn on_element(
        &self,
        state: &mut StateStore,
        timers: &mut TimerStore,
        window: &TimeWindow,
        timestamp: EventTime,
    ) -> Result<()> {
        self.element_at(0, state, timers, window, timestamp)
    }

    /// Reconcile per-window trigger state when `sources` merge into
    /// `target`: element counts add up, pending fire times keep the
    /// earliest, and finished bits survive the merge. Source-window timers
    /// are cancelled and the end-of-window timer moves to the target.
    pub fn on_merge(
        &self,
        state: &mut StateStore,
        timers: &mut TimerStore,
        sources: &[TimeWindow],
        target: &TimeWindow,
    ) -> Result<()> {
        let count_handle = ValueHandle::<u64>::new(COUNT);
        let fire_at_handle = ValueHandle::<EventTime>::new(FIRE_AT);
        let active_handle = ValueHandle::<u32>::new(ACTIVE);

        for node in 0..self.nodes.len() {
            let target_ns = node_ns(target, node);
            let mut count = count_handle.read(state, &target_ns)?.unwrap_or(0);
            let mut fire_at = fire_at_handle.read(state, &target_ns)?;
            let mut active = active_handle.read(state, &target_ns)?;
            let mut finished = flag(state, &target_ns, FINISHED)?;
            let mut on_time_fired = flag(state, &target_ns, ON_TIME_FIRED)?;

            for source in sources {
                if source == target {
                    continue;
                }
                let source_ns = node_ns(source, node);
                count += count_handle.read(state, &source_ns)?.unwrap_or(0);
                if let Some(t) = fire_at_handle.read(state, &source_ns)? {
                    fire_at = Some(fire_at.map_or(t, |cur| cur.min(t)));
                }
                if let Some(a) = active_handle.read(state, &source_ns)? {
                    active = Some(active.map_or(a, |cur| cur.min(a)));
                }
                finished |= flag(state, &source_ns, FINISHED)?;
                on_time_fired |= flag(state, &source_ns, ON_TIME_FIRED)?;
                state.clear_namespace(&source_ns);
                timers.delete(&eow_timer_id(source, node));
                timers.delete(&pt_timer_id(source, node));
            }

            if count > 0 {
                count_handle.write(state, &target_ns, &count)?;
            }
            if let Some(t) = fire_at {
                fire_at_handle.write(state, &target_ns, &t)?;
                timers.set(TimerData::new(
                    pt_timer_id(target, node),
                    t,
                    target.max_timestamp(),
                ));
            }
            if let Some(a) = active {
                active_handle.write(state, &target_ns, &a)?;
            }
            if finished {
                set_flag(state, &target_ns, FINISHED)?;
            }
            if on_time_fired {
                set_flag(state, &target_ns, ON_TIME_FIRED)?;
            }
            if matches!(self.nodes[node].kind, NodeKind::AfterWatermark { .. }) {
                timers.set(TimerData::new(
                    eow_timer_id(target, node),
                    target.max_timestamp(),
                    target.max_timestamp(),
                ));
            }
        }
        Ok(())
    }

    /// Notification that one of the machine's timers fired for `window`.
    ///
    /// Readiness is derived from the stores' clocks, so the timer carries no
    /// state transition of its own; it exists to guarantee the runner
    /// evaluates [`should_fire`](Self::should_fire) at the right instants.
    pub fn on_timer(
        &self,
        _state: &mut StateStore,
        _timers: &mut TimerStore,
        _window: &TimeWindow,
        _timer: &TimerData,
    ) -> Result<()> {
        Ok(())
    }

    /// Whether `window` is ready to fire right now.
    pub fn should_fire(
        &self,
        state: &StateStore,
        timers: &TimerStore,
        window: &TimeWindow,
    ) -> Result<bool> {
        self.should_fire_at(0, state, timers, window)
    }

    /// Acknowledge one firing of `window` and transition the tree.
    pub fn on_fire(
        &self,
        state: &mut StateStore,
        timers: &mut TimerStore,
        window: &TimeWindow,
    ) -> Result<()> {
        if self.is_closed(state, window)? {
            return Err(EngineError::TriggerContract(format!(
                "window {window} fired after the trigger closed it"
            ))
            .into());
        }
        self.fire_at(0, state, timers, window)
    }

    /// Whether the trigger has finished for `window`: no further panes will
    /// ever fire.
    pub fn is_closed(&self, state: &StateStore, window: &TimeWindow) -> Result<bool> {
        flag(state, &node_ns(window, 0), FINISHED)
    }

    /// Drop all of the machine's state for `window`.
    pub fn clear(&self, state: &mut StateStore, window: &TimeWindow) {
        for node in 0..self.nodes.len() {
            state.clear_namespace(&node_ns(window, node));
        }
    }

    fn element_at(
        &self,
        node: usize,
        state: &mut StateStore,
        timers: &mut TimerStore,
        window: &TimeWindow,
        timestamp: EventTime,
    ) -> Result<()> {
        let ns = node_ns(window, node);
        if flag(state, &ns, FINISHED)? {
            return Ok(());
        }
        match self.nodes[node].kind {
            NodeKind::AfterWatermark { early, late } => {
                timers.set(TimerData::new(
                    eow_timer_id(window, node),
                    window.max_timestamp(),
                    window.max_timestamp(),
                ));
                if !flag(state, &ns, ON_TIME_FIRED)? {
                    if let Some(early) = early {
                        self.element_at(early, state, timers, window, timestamp)?;
                    }
                } else if let Some(late) = late {
                    self.element_at(late, state, timers, window, timestamp)?;
                }
            }
            NodeKind::AfterProcessingTime { delay_ms } => {
                let handle = ValueHandle::<EventTime>::new(FIRE_AT);
                if handle.read(state, &ns)?.is_none() {
                    let fire_at = timers.processing_time().saturating_add(delay_ms);
                    handle.write(state, &ns, &fire_at)?;
                    timers.set(TimerData::new(
                        pt_timer_id(window, node),
                        fire_at,
                        window.max_timestamp(),
                    ));
                }
            }
            NodeKind::AfterCount(_) => {
                let handle = ValueHandle::<u64>::new(COUNT);
                let count = handle.read(state, &ns)?.unwrap_or(0) + 1;
                handle.write(state, &ns, &count)?;
            }
            NodeKind::AfterEach => {
                let active = self.active_child(node, state, window)?;
                if let Some(child) = active {
                    self.element_at(child, state, timers, window, timestamp)?;
                }
            }
            NodeKind::Repeatedly => {
                self.element_at(self.nodes[node].children[0], state, timers, window, timestamp)?;
            }
            NodeKind::OrFinally => {
                self.element_at(self.nodes[node].children[0], state, timers, window, timestamp)?;
                self.element_at(self.nodes[node].children[1], state, timers, window, timestamp)?;
            }
            NodeKind::Never | NodeKind::Always => {}
        }
        Ok(())
    }

    fn should_fire_at(
        &self,
        node: usize,
        state: &StateStore,
        timers: &TimerStore,
        window: &TimeWindow,
    ) -> Result<bool> {
        let ns = node_ns(window, node);
        if flag(state, &ns, FINISHED)? {
            return Ok(false);
        }
        let ready = match self.nodes[node].kind {
            NodeKind::Always => true,
            NodeKind::Never => false,
            NodeKind::AfterWatermark { early, late } => {
                if !flag(state, &ns, ON_TIME_FIRED)? {
                    if timers.input_watermark() >= window.max_timestamp() {
                        true
                    } else {
                        match early {
                            Some(early) => self.should_fire_at(early, state, timers, window)?,
                            None => false,
                        }
                    }
                } else {
                    match late {
                        Some(late) => self.should_fire_at(late, state, timers, window)?,
                        None => false,
                    }
                }
            }
            NodeKind::AfterProcessingTime { .. } => {
                match ValueHandle::<EventTime>::new(FIRE_AT).read(state, &ns)? {
                    Some(fire_at) => timers.processing_time() >= fire_at,
                    None => false,
                }
            }
            NodeKind::AfterCount(n) => {
                ValueHandle::<u64>::new(COUNT).read(state, &ns)?.unwrap_or(0) >= n
            }
            NodeKind::AfterEach => match self.active_child(node, state, window)? {
                Some(child) => self.should_fire_at(child, state, timers, window)?,
                None => false,
            },
            NodeKind::Repeatedly => {
                self.should_fire_at(self.nodes[node].children[0], state, timers, window)?
            }
            NodeKind::OrFinally => {
                self.should_fire_at(self.nodes[node].children[0], state, timers, window)?
                    || self.should_fire_at(self.nodes[node].children[1], state, timers, window)?
            }
        };
        Ok(ready)
    }

    fn fire_at(
        &self,
        node: usize,
        state: &mut StateStore,
        timers: &mut TimerStore,
        window: &TimeWindow,
    ) -> Result<()> {
        let ns = node_ns(window, node);
        match self.nodes[node].kind {
            NodeKind::Always | NodeKind::Never => {}
            NodeKind::AfterWatermark { early, late } => {
                if !flag(state, &ns, ON_TIME_FIRED)? {
                    // Event time wins over any simultaneously-ready early
                    // sub-trigger.
                    if timers.input_watermark() >= window.max_timestamp() {
                        set_flag(state, &ns, ON_TIME_FIRED)?;
                        if late.is_none() {
                            set_flag(state, &ns, FINISHED)?;
                        }
                    } else if let Some(early) = early {
                        self.fire_at(early, state, timers, window)?;
                    }
                } else if let Some(late) = late {
                    self.fire_at(late, state, timers, window)?;
                }
            }
            NodeKind::AfterProcessingTime { .. } => {
                ValueHandle::<EventTime>::new(FIRE_AT).clear(state, &ns)?;
                set_flag(state, &ns, FINISHED)?;
            }
            NodeKind::AfterCount(_) => {
                ValueHandle::<u64>::new(COUNT).clear(state, &ns)?;
                set_flag(state, &ns, FINISHED)?;
            }
            NodeKind::AfterEach => {
                if let Some(child) = self.active_child(node, state, window)? {
                    self.fire_at(child, state, timers, window)?;
                    if flag(state, &node_ns(window, child), FINISHED)? {
                        let position = self.nodes[node]
                            .children
                            .iter()
                            .position(|&c| c == child)
                            .unwrap_or(0) as u32;
                        let next = position + 1;
                        ValueHandle::<u32>::new(ACTIVE).write(state, &ns, &next)?;
                        if next as usize >= self.nodes[node].children.len() {
                            set_flag(state, &ns, FINISHED)?;
                        }
                    }
                }
            }
            NodeKind::Repeatedly => {
                let child = self.nodes[node].children[0];
                self.fire_at(child, state, timers, window)?;
                if flag(state, &node_ns(window, child), FINISHED)? {
                    self.reset_subtree(child, state, window);
                }
            }
            NodeKind::OrFinally => {
                let main = self.nodes[node].children[0];
                let until = self.nodes[node].children[1];
                if self.should_fire_at(until, state, timers, window)? {
                    self.fire_at(until, state, timers, window)?;
                    set_flag(state, &ns, FINISHED)?;
                } else {
                    self.fire_at(main, state, timers, window)?;
                    if flag(state, &node_ns(window, main), FINISHED)? {
                        set_flag(state, &ns, FINISHED)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// The first unfinished child of an `AfterEach` node.
    fn active_child(
        &self,
        node: usize,
        state: &StateStore,
        window: &TimeWindow,
    ) -> Result<Option<usize>> {
        let ns = node_ns(window, node);
        let start = ValueHandle::<u32>::new(ACTIVE).read(state, &ns)?.unwrap_or(0) as usize;
        Ok(self.nodes[node].children.get(start).copied())
    }

    fn reset_subtree(&self, node: usize, state: &mut StateStore, window: &TimeWindow) {
        state.clear_namespace(&node_ns(window, node));
        let children = self.nodes[node].children.clone();
        for child in children {
            self.reset_subtree(child, state, window);
        }
    }
}

fn node_ns(window: &TimeWindow, node: usize) -> StateNamespace {
    StateNamespace::window_and_trigger(*window, node as u32)
}

fn flag(state: &StateStore, ns: &StateNamespace, id: &'static str) -> Result<bool> {
    Ok(ValueHandle::<bool>::new(id).read(state, ns)?.unwrap_or(false))
}

fn set_flag(state: &mut StateStore, ns: &StateNamespace, id: &'static str) -> Result<()> {
    ValueHandle::<bool>::new(id).write(state, ns, &true)
}

fn eow_timer_id(window: &TimeWindow, node: usize) -> TimerId {
    TimerId::new(
        StateNamespace::window(*window),
        format!("__trigger-eow-{node}"),
        TRIGGER_TIMER_FAMILY,
        TimeDomain::EventTime,
    )
}

fn pt_timer_id(window: &TimeWindow, node: usize) -> TimerId {
    TimerId::new(
        StateNamespace::window(*window),
        format!("__trigger-pt-{node}"),
        TRIGGER_TIMER_FAMILY,
        TimeDomain::ProcessingTime,
    )
}

fn build(trigger: &Trigger, nodes: &mut Vec<Node>) -> usize {
    match trigger {
        Trigger::Default => build(
            &Trigger::Repeatedly(Box::new(Trigger::AfterWatermark {
                early: None,
                late: None,
            })),
            nodes,
        ),
        Trigger::AfterWatermark { early, late } => {
            let idx = reserve(nodes);
            let early_idx = early
                .as_ref()
                .map(|t| build(&Trigger::Repeatedly(t.clone()), nodes));
            let late_idx = late
                .as_ref()
                .map(|t| build(&Trigger::Repeatedly(t.clone()), nodes));
            let children = early_idx.into_iter().chain(late_idx).collect();
            nodes[idx] = Node {
                kind: NodeKind::AfterWatermark {
                    early: early_idx,
                    late: late_idx,
                },
                children,
            };
            idx
        }
        Trigger::AfterProcessingTime { delay_ms } => push(
            nodes,
            NodeKind::AfterProcessingTime {
                delay_ms: *delay_ms,
            },
        ),
        Trigger::AfterCount(n) => push(nodes, NodeKind::AfterCount(*n)),
        Trigger::AfterEach(subs) => {
            let idx = reserve(nodes);
            let children: Vec<usize> = subs.iter().map(|t| build(t, nodes)).collect();
            nodes[idx] = Node {
                kind: NodeKind::AfterEach,
                children,
            };
            idx
        }
        Trigger::Repeatedly(sub) => {
            let idx = reserve(nodes);
            let child = build(sub, nodes);
            nodes[idx] = Node {
                kind: NodeKind::Repeatedly,
                children: vec![child],
            };
            idx
        }
        Trigger::OrFinally(main, until) => {
            let idx = reserve(nodes);
            let main_idx = build(main, nodes);
            let until_idx = build(until, nodes);
            nodes[idx] = Node {
                kind: NodeKind::OrFinally,
                children: vec![main_idx, until_idx],
            };
            idx
        }
        Trigger::Never => push(nodes, NodeKind::Never),
        Trigger::Always => push(nodes, NodeKind::Always),
    }
}

fn reserve(nodes: &mut Vec<Node>) -> usize {
    nodes.push(Node {
        kind: NodeKind::Never,
        children: Vec::new(),
    });
    nodes.len() - 1
}

fn push(nodes: &mut Vec<Node>, kind: NodeKind) -> usize {
    nodes.push(Node {
        kind,
        children: Vec::new(),
    });
    nodes.len() - 1
}
