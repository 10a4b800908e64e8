use super::*;

// ── TimeWindow ────────────────────────────────────────────────────────────

#[test]
fn test_time_window_contains() {
    let w = TimeWindow::new(0, 10_000);
    assert!(w.contains(0));
    assert!(w.contains(5_000));
    assert!(!w.contains(10_000)); // end is exclusive
}

#[test]
fn test_time_window_max_timestamp() {
    let w = TimeWindow::new(0, 10_000);
    assert_eq!(w.max_timestamp(), 9_999);
}

#[test]
fn test_time_window_span() {
    let a = TimeWindow::new(0, 10);
    let b = TimeWindow::new(5, 20);
    assert_eq!(a.span(&b), TimeWindow::new(0, 20));
    assert!(a.intersects(&b));
    assert!(!a.intersects(&TimeWindow::new(11, 20)));
    // Abutting windows count as intersecting for session merging.
    assert!(a.intersects(&TimeWindow::new(10, 20)));
}

// ── Fixed ─────────────────────────────────────────────────────────────────

#[test]
fn test_fixed_assigns_correct_window() {
    let assigner = FixedWindows::of(Duration::from_secs(10));
    // timestamp 3s falls in [0, 10s)
    let wins = assigner.assign(3_000);
    assert_eq!(wins, vec![TimeWindow::new(0, 10_000)]);
    // timestamp 10s falls in [10s, 20s)
    let wins = assigner.assign(10_000);
    assert_eq!(wins, vec![TimeWindow::new(10_000, 20_000)]);
}

#[test]
fn test_fixed_with_offset() {
    let assigner = FixedWindows::of_with_offset(Duration::from_secs(10), Duration::from_secs(2));
    let wins = assigner.assign(1_000);
    assert_eq!(wins, vec![TimeWindow::new(-8_000, 2_000)]);
}

#[test]
fn test_fixed_is_not_merging_and_rejects_merge_plans() {
    let assigner = FixedWindows::of(Duration::from_secs(10));
    assert!(!assigner.is_merging());
    let err = assigner.merge_windows(&[]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::MergeConflict)
    ));
}

// ── Sliding ───────────────────────────────────────────────────────────────

#[test]
fn test_sliding_element_in_multiple_windows() {
    // size=10s, slide=5s -> each element belongs to 2 windows
    let assigner = SlidingWindows::of(Duration::from_secs(10), Duration::from_secs(5));
    let wins = assigner.assign(7_000);
    assert_eq!(wins.len(), 2);
    for w in &wins {
        assert!(w.contains(7_000), "{w} should contain 7000ms");
    }
}

// ── Sessions ──────────────────────────────────────────────────────────────

#[test]
fn test_session_assigns_gap_window() {
    let assigner = Sessions::with_gap(Duration::from_secs(5));
    let wins = assigner.assign(10_000);
    assert_eq!(wins, vec![TimeWindow::new(10_000, 15_000)]);
    assert!(assigner.is_merging());
}

#[test]
fn test_session_merge_plan_unions_overlaps() {
    let assigner = Sessions::with_gap(Duration::from_secs(5));
    let active = vec![
        TimeWindow::new(0, 5_000),
        TimeWindow::new(3_000, 8_000),
        TimeWindow::new(20_000, 25_000),
    ];
    let actions = assigner.merge_windows(&active).unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].target, TimeWindow::new(0, 8_000));
    assert_eq!(
        actions[0].sources,
        vec![TimeWindow::new(0, 5_000), TimeWindow::new(3_000, 8_000)]
    );
}

#[test]
fn test_session_merge_plan_handles_abutting_and_chains() {
    let assigner = Sessions::with_gap(Duration::from_secs(5));
    // [0,5) touches [5,10) which overlaps [9,14): all one session.
    let active = vec![
        TimeWindow::new(9_000, 14_000),
        TimeWindow::new(0, 5_000),
        TimeWindow::new(5_000, 10_000),
    ];
    let actions = assigner.merge_windows(&active).unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].target, TimeWindow::new(0, 14_000));
    assert_eq!(actions[0].sources.len(), 3);
}

#[test]
fn test_session_merge_plan_empty_when_disjoint() {
    let assigner = Sessions::with_gap(Duration::from_secs(1));
    let active = vec![TimeWindow::new(0, 1_000), TimeWindow::new(5_000, 6_000)];
    assert!(assigner.merge_windows(&active).unwrap().is_empty());
}

// ── Global ────────────────────────────────────────────────────────────────

#[test]
fn test_global_single_all_time_window() {
    let assigner = GlobalWindows::new();
    let wins = assigner.assign(999_999_999);
    assert_eq!(wins, vec![TimeWindow::global()]);
    assert!(wins[0].is_global());
}

// ── WindowingStrategy ─────────────────────────────────────────────────────

#[test]
fn test_strategy_window_expiry() {
    let strategy = WindowingStrategy::of(FixedWindows::of(Duration::from_millis(10)))
        .with_allowed_lateness(Duration::from_millis(1));
    let w = TimeWindow::new(0, 10);
    assert_eq!(strategy.window_expiry(&w), 10); // max_timestamp 9 + lateness 1
}

#[test]
fn test_strategy_expiry_saturates_for_global_window() {
    let strategy = WindowingStrategy::of(GlobalWindows::new())
        .with_allowed_lateness(Duration::from_secs(3600));
    let w = TimeWindow::global();
    assert_eq!(strategy.window_expiry(&w), EVENT_TIME_MAX);
}

// ── TriggerMachine ────────────────────────────────────────────────────────

fn fresh() -> (StateStore, TimerStore) {
    (StateStore::new(), TimerStore::new())
}

#[test]
fn test_default_trigger_fires_when_watermark_passes_window_end() {
    let machine = TriggerMachine::compile(&Trigger::Default);
    let (mut state, mut timers) = fresh();
    let w = TimeWindow::new(0, 10);

    machine.on_element(&mut state, &mut timers, &w, 3).unwrap();
    assert!(!machine.should_fire(&state, &timers, &w).unwrap());
    // The machine drives its firing through an end-of-window timer.
    assert_eq!(timers.next_timer(TimeDomain::EventTime), Some(9));

    timers.advance_input_watermark(9).unwrap();
    assert!(machine.should_fire(&state, &timers, &w).unwrap());

    machine.on_fire(&mut state, &mut timers, &w).unwrap();
    // Default trigger repeats: a late element can fire another pane.
    assert!(!machine.is_closed(&state, &w).unwrap());
    machine.on_element(&mut state, &mut timers, &w, 5).unwrap();
    assert!(machine.should_fire(&state, &timers, &w).unwrap());
}

#[test]
fn test_after_count_fires_and_closes() {
    let machine = TriggerMachine::compile(&Trigger::AfterCount(2));
    let (mut state, mut timers) = fresh();
    let w = TimeWindow::new(0, 10);

    machine.on_element(&mut state, &mut timers, &w, 1).unwrap();
    assert!(!machine.should_fire(&state, &timers, &w).unwrap());
    machine.on_element(&mut state, &mut timers, &w, 2).unwrap();
    assert!(machine.should_fire(&state, &timers, &w).unwrap());

    machine.on_fire(&mut state, &mut timers, &w).unwrap();
    assert!(machine.is_closed(&state, &w).unwrap());

    // Acknowledging a firing on a closed window violates the contract.
    let err = machine.on_fire(&mut state, &mut timers, &w).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::TriggerContract(_))
    ));
}

#[test]
fn test_repeatedly_after_count_rearms() {
    let machine = TriggerMachine::compile(&Trigger::Repeatedly(Box::new(Trigger::AfterCount(2))));
    let (mut state, mut timers) = fresh();
    let w = TimeWindow::new(0, 10);

    for _ in 0..2 {
        machine.on_element(&mut state, &mut timers, &w, 1).unwrap();
    }
    assert!(machine.should_fire(&state, &timers, &w).unwrap());
    machine.on_fire(&mut state, &mut timers, &w).unwrap();
    assert!(!machine.is_closed(&state, &w).unwrap());
    assert!(!machine.should_fire(&state, &timers, &w).unwrap());

    // The count starts over after the reset.
    machine.on_element(&mut state, &mut timers, &w, 1).unwrap();
    assert!(!machine.should_fire(&state, &timers, &w).unwrap());
    machine.on_element(&mut state, &mut timers, &w, 1).unwrap();
    assert!(machine.should_fire(&state, &timers, &w).unwrap());
}

#[test]
fn test_after_processing_time_fires_after_delay() {
    let machine =
        TriggerMachine::compile(&Trigger::AfterProcessingTime { delay_ms: 100 });
    let (mut state, mut timers) = fresh();
    let w = TimeWindow::new(0, 10);

    timers.advance_processing_time(1_000).unwrap();
    machine.on_element(&mut state, &mut timers, &w, 1).unwrap();
    assert!(!machine.should_fire(&state, &timers, &w).unwrap());
    assert_eq!(timers.next_timer(TimeDomain::ProcessingTime), Some(1_100));

    timers.advance_processing_time(1_100).unwrap();
    assert!(machine.should_fire(&state, &timers, &w).unwrap());
    machine.on_fire(&mut state, &mut timers, &w).unwrap();
    assert!(machine.is_closed(&state, &w).unwrap());
}

#[test]
fn test_after_each_runs_sub_triggers_in_sequence() {
    let machine = TriggerMachine::compile(&Trigger::AfterEach(vec![
        Trigger::AfterCount(1),
        Trigger::AfterCount(2),
    ]));
    let (mut state, mut timers) = fresh();
    let w = TimeWindow::new(0, 10);

    machine.on_element(&mut state, &mut timers, &w, 1).unwrap();
    assert!(machine.should_fire(&state, &timers, &w).unwrap());
    machine.on_fire(&mut state, &mut timers, &w).unwrap();
    assert!(!machine.is_closed(&state, &w).unwrap());

    machine.on_element(&mut state, &mut timers, &w, 2).unwrap();
    assert!(!machine.should_fire(&state, &timers, &w).unwrap());
    machine.on_element(&mut state, &mut timers, &w, 3).unwrap();
    assert!(machine.should_fire(&state, &timers, &w).unwrap());
    machine.on_fire(&mut state, &mut timers, &w).unwrap();
    assert!(machine.is_closed(&state, &w).unwrap());
}

#[test]
fn test_or_finally_closes_on_until() {
    let machine = TriggerMachine::compile(&Trigger::OrFinally(
        Box::new(Trigger::Repeatedly(Box::new(Trigger::AfterCount(1)))),
        Box::new(Trigger::AfterCount(3)),
    ));
    let (mut state, mut timers) = fresh();
    let w = TimeWindow::new(0, 10);

    machine.on_element(&mut state, &mut timers, &w, 1).unwrap();
    assert!(machine.should_fire(&state, &timers, &w).unwrap());
    machine.on_fire(&mut state, &mut timers, &w).unwrap();
    assert!(!machine.is_closed(&state, &w).unwrap());

    machine.on_element(&mut state, &mut timers, &w, 2).unwrap();
    machine.on_element(&mut state, &mut timers, &w, 3).unwrap();
    assert!(machine.should_fire(&state, &timers, &w).unwrap());
    machine.on_fire(&mut state, &mut timers, &w).unwrap();
    assert!(machine.is_closed(&state, &w).unwrap());
}

#[test]
fn test_never_only_closes_by_expiration() {
    let machine = TriggerMachine::compile(&Trigger::Never);
    let (mut state, mut timers) = fresh();
    let w = TimeWindow::new(0, 10);

    machine.on_element(&mut state, &mut timers, &w, 1).unwrap();
    timers.advance_input_watermark(EVENT_TIME_MAX).unwrap();
    assert!(!machine.should_fire(&state, &timers, &w).unwrap());
    assert!(!machine.is_closed(&state, &w).unwrap());
}

#[test]
fn test_always_is_ready_at_every_stimulus() {
    let machine = TriggerMachine::compile(&Trigger::Always);
    let (mut state, mut timers) = fresh();
    let w = TimeWindow::new(0, 10);

    machine.on_element(&mut state, &mut timers, &w, 1).unwrap();
    assert!(machine.should_fire(&state, &timers, &w).unwrap());
    machine.on_fire(&mut state, &mut timers, &w).unwrap();
    assert!(machine.should_fire(&state, &timers, &w).unwrap());
    assert!(!machine.is_closed(&state, &w).unwrap());
}

#[test]
fn test_early_firings_before_end_of_window() {
    let machine = TriggerMachine::compile(&Trigger::AfterWatermark {
        early: Some(Box::new(Trigger::AfterCount(2))),
        late: None,
    });
    let (mut state, mut timers) = fresh();
    let w = TimeWindow::new(0, 10);

    machine.on_element(&mut state, &mut timers, &w, 1).unwrap();
    assert!(!machine.should_fire(&state, &timers, &w).unwrap());
    machine.on_element(&mut state, &mut timers, &w, 2).unwrap();
    // Speculative pane before the watermark reaches the end of the window.
    assert!(machine.should_fire(&state, &timers, &w).unwrap());
    machine.on_fire(&mut state, &mut timers, &w).unwrap();
    assert!(!machine.should_fire(&state, &timers, &w).unwrap());

    // On-time firing closes the trigger (no late sub-trigger).
    timers.advance_input_watermark(9).unwrap();
    assert!(machine.should_fire(&state, &timers, &w).unwrap());
    machine.on_fire(&mut state, &mut timers, &w).unwrap();
    assert!(machine.is_closed(&state, &w).unwrap());
}

#[test]
fn test_merge_sums_counts_and_moves_timers() {
    let machine = TriggerMachine::compile(&Trigger::Repeatedly(Box::new(Trigger::AfterCount(3))));
    let (mut state, mut timers) = fresh();
    let a = TimeWindow::new(0, 5);
    let b = TimeWindow::new(3, 8);
    let target = TimeWindow::new(0, 8);

    machine.on_element(&mut state, &mut timers, &a, 1).unwrap();
    machine.on_element(&mut state, &mut timers, &b, 4).unwrap();

    machine
        .on_merge(&mut state, &mut timers, &[a, b], &target)
        .unwrap();

    // 1 + 1 elements so far; the third arrives in the merged window.
    machine
        .on_element(&mut state, &mut timers, &target, 5)
        .unwrap();
    assert!(machine.should_fire(&state, &timers, &target).unwrap());

    // Source trigger state is gone.
    assert!(state.is_namespace_empty(&StateNamespace::window_and_trigger(a, 1)));
    assert!(state.is_namespace_empty(&StateNamespace::window_and_trigger(b, 1)));
}
