use serde::{Deserialize, Serialize};

use crate::window::TimeWindow;

/// Event time in milliseconds since epoch.
pub type EventTime = i64;

/// When a pane fired relative to the input watermark.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaneTiming {
    /// Fired before the watermark reached the end of the window.
    Early,
    /// The first firing at or after the watermark passed the end of the window.
    OnTime,
    /// Fired after the on-time pane.
    Late,
    /// Timing is not known (input elements that never went through a firing).
    Unknown,
}

/// Describes one firing of a window.
///
/// `index` counts every pane emitted for the window;
/// `non_speculative_index` counts only on-time and late panes and is `-1`
/// while the pane is speculative (early).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaneInfo {
    pub is_first: bool,
    pub is_last: bool,
    pub timing: PaneTiming,
    pub index: u64,
    pub non_speculative_index: i64,
}

impl PaneInfo {
    /// Pane info carried by input elements that have not been through any
    /// firing yet.
    pub fn no_firing() -> Self {
        Self {
            is_first: true,
            is_last: true,
            timing: PaneTiming::Unknown,
            index: 0,
            non_speculative_index: 0,
        }
    }

    /// The single pane of a window that fires exactly once, on time.
    pub fn on_time_and_only() -> Self {
        Self {
            is_first: true,
            is_last: true,
            timing: PaneTiming::OnTime,
            index: 0,
            non_speculative_index: 0,
        }
    }
}

impl Default for PaneInfo {
    fn default() -> Self {
        Self::no_firing()
    }
}

impl std::fmt::Display for PaneInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pane(index={}, timing={:?}{}{})",
            self.index,
            self.timing,
            if self.is_first { ", first" } else { "" },
            if self.is_last { ", last" } else { "" },
        )
    }
}

/// A value together with its event-time timestamp, the windows it belongs to,
/// and the pane it was emitted in.
///
/// The window set is never empty; values that have not been windowed yet live
/// in the global window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowedValue<T> {
    pub value: T,
    pub timestamp: EventTime,
    pub windows: Vec<TimeWindow>,
    pub pane: PaneInfo,
}

impl<T> WindowedValue<T> {
    /// Create a windowed value in a single explicit window.
    pub fn of(value: T, timestamp: EventTime, window: TimeWindow, pane: PaneInfo) -> Self {
        Self {
            value,
            timestamp,
            windows: vec![window],
            pane,
        }
    }

    /// Create a timestamped value in the global window with no firing info.
    pub fn timestamped(value: T, timestamp: EventTime) -> Self {
        Self {
            value,
            timestamp,
            windows: vec![TimeWindow::global()],
            pane: PaneInfo::no_firing(),
        }
    }

    /// Re-wrap a different value, keeping timestamp, windows, and pane.
    pub fn with_value<U>(&self, value: U) -> WindowedValue<U> {
        WindowedValue {
            value,
            timestamp: self.timestamp,
            windows: self.windows.clone(),
            pane: self.pane,
        }
    }
}

/// Identifies one output of a multi-output user function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TupleTag(String);

impl TupleTag {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TupleTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TupleTag({})", self.0)
    }
}

/// Trait bound for types that can flow through the engine.
/// All user data types must satisfy this.
pub trait StreamData: Send + Clone + Serialize + for<'de> Deserialize<'de> + 'static {}

// Blanket implementation: any type satisfying the bounds is StreamData.
impl<T> StreamData for T where T: Send + Clone + Serialize + for<'de> Deserialize<'de> + 'static {}

#[cfg(test)]
#[path = "tests/types_tests.rs"]
mod tests;
