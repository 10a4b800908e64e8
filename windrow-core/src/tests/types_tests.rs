use super::*;

use crate::window::TimeWindow;

#[test]
fn test_no_firing_pane_is_first_and_last() {
    let pane = PaneInfo::no_firing();
    assert!(pane.is_first);
    assert!(pane.is_last);
    assert_eq!(pane.timing, PaneTiming::Unknown);
    assert_eq!(pane.index, 0);
}

#[test]
fn test_timestamped_value_lands_in_global_window() {
    let value = WindowedValue::timestamped("x", 42);
    assert_eq!(value.timestamp, 42);
    assert_eq!(value.windows, vec![TimeWindow::global()]);
}

#[test]
fn test_with_value_keeps_windowing() {
    let window = TimeWindow::new(0, 10);
    let original = WindowedValue::of(1, 5, window, PaneInfo::no_firing());
    let rewrapped = original.with_value("one");
    assert_eq!(rewrapped.value, "one");
    assert_eq!(rewrapped.timestamp, 5);
    assert_eq!(rewrapped.windows, vec![window]);
    assert_eq!(rewrapped.pane, original.pane);
}

#[test]
fn test_tuple_tag_identity() {
    let a = TupleTag::new("main");
    let b = TupleTag::new("main");
    let c = TupleTag::new("errors");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.id(), "main");
    assert_eq!(format!("{c}"), "TupleTag(errors)");
}
