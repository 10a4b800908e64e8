use super::*;

/// One planned merge: all `sources` collapse into their union `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeAction {
    pub sources: Vec<TimeWindow>,
    pub target: TimeWindow,
}

/// Assigns one or more [`TimeWindow`]s to each element based on its
/// event-time timestamp, and plans window merges for gap-based strategies.
///
/// The four standard assigners:
/// - [`FixedWindows`]   — fixed-size, non-overlapping
/// - [`SlidingWindows`] — fixed-size, possibly overlapping
/// - [`Sessions`]       — gap-based, merging
/// - [`GlobalWindows`]  — single window for all elements
pub trait WindowAssigner: Send {
    /// Return the windows that contain an element with the given timestamp.
    fn assign(&self, timestamp: EventTime) -> Vec<TimeWindow>;

    /// Whether this assigner produces windows that must be merged.
    fn is_merging(&self) -> bool {
        false
    }

    /// Plan merges over the currently active windows.
    ///
    /// Only meaningful for merging assigners; proposing a merge through a
    /// non-merging assigner is a contract violation.
    fn merge_windows(&self, _active: &[TimeWindow]) -> Result<Vec<MergeAction>> {
        Err(EngineError::MergeConflict.into())
    }
}

// ── Fixed ─────────────────────────────────────────────────────────────────────

/// Fixed-size, non-overlapping windows aligned to multiples of `size`.
#[derive(Clone)]
pub struct FixedWindows {
    size_ms: i64,
    offset_ms: i64,
}

impl FixedWindows {
    /// Create fixed windows of the given `size`.
    pub fn of(size: Duration) -> Self {
        Self {
            size_ms: size.as_millis() as i64,
            offset_ms: 0,
        }
    }

    /// Create fixed windows with a non-zero alignment `offset`.
    pub fn of_with_offset(size: Duration, offset: Duration) -> Self {
        Self {
            size_ms: size.as_millis() as i64,
            offset_ms: offset.as_millis() as i64,
        }
    }
}

impl WindowAssigner for FixedWindows {
    fn assign(&self, timestamp: EventTime) -> Vec<TimeWindow> {
        let start = timestamp - (timestamp - self.offset_ms).rem_euclid(self.size_ms);
        vec![TimeWindow::new(start, start + self.size_ms)]
    }
}

// ── Sliding ───────────────────────────────────────────────────────────────────

/// Fixed-size, possibly overlapping windows.
/// An element belongs to `ceil(size / slide)` windows.
#[derive(Clone)]
pub struct SlidingWindows {
    size_ms: i64,
    slide_ms: i64,
    offset_ms: i64,
}

impl SlidingWindows {
    /// Create sliding windows of the given `size` advancing every `slide`.
    pub fn of(size: Duration, slide: Duration) -> Self {
        Self {
            size_ms: size.as_millis() as i64,
            slide_ms: slide.as_millis() as i64,
            offset_ms: 0,
        }
    }
}

impl WindowAssigner for SlidingWindows {
    fn assign(&self, timestamp: EventTime) -> Vec<TimeWindow> {
        // Walk back from the last window start by slide until no window
        // covers the timestamp.
        let last_start = timestamp - (timestamp - self.offset_ms).rem_euclid(self.slide_ms);
        let mut windows = Vec::new();
        let mut start = last_start;
        while start > timestamp - self.size_ms {
            windows.push(TimeWindow::new(start, start + self.size_ms));
            start -= self.slide_ms;
        }
        windows
    }
}

// ── Sessions ──────────────────────────────────────────────────────────────────

/// Gap-based windows: a new session starts whenever the gap between
/// consecutive events exceeds `gap`. Each element initially gets a window
/// `[timestamp, timestamp + gap)`; the runner merges overlapping sessions as
/// elements arrive.
#[derive(Clone)]
pub struct Sessions {
    gap_ms: i64,
}

impl Sessions {
    /// Create session windows with the given minimum `gap` between sessions.
    pub fn with_gap(gap: Duration) -> Self {
        Self {
            gap_ms: gap.as_millis() as i64,
        }
    }
}

impl WindowAssigner for Sessions {
    fn assign(&self, timestamp: EventTime) -> Vec<TimeWindow> {
        vec![TimeWindow::new(timestamp, timestamp + self.gap_ms)]
    }

    fn is_merging(&self) -> bool {
        true
    }

    fn merge_windows(&self, active: &[TimeWindow]) -> Result<Vec<MergeAction>> {
        let mut sorted: Vec<TimeWindow> = active.to_vec();
        sorted.sort();

        let mut actions = Vec::new();
        let mut group: Vec<TimeWindow> = Vec::new();
        let mut union: Option<TimeWindow> = None;
        for window in sorted {
            match union {
                // Overlapping or abutting sessions collapse into one.
                Some(current) if window.start <= current.end => {
                    union = Some(current.span(&window));
                    group.push(window);
                }
                Some(current) => {
                    if group.len() > 1 {
                        actions.push(MergeAction {
                            sources: std::mem::take(&mut group),
                            target: current,
                        });
                    } else {
                        group.clear();
                    }
                    group.push(window);
                    union = Some(window);
                }
                None => {
                    union = Some(window);
                    group.push(window);
                }
            }
        }
        if let (Some(current), true) = (union, group.len() > 1) {
            actions.push(MergeAction {
                sources: group,
                target: current,
            });
        }
        Ok(actions)
    }
}

// ── Global ────────────────────────────────────────────────────────────────────

/// A single window that spans all time. Useful with count or
/// processing-time triggers.
#[derive(Clone, Copy)]
pub struct GlobalWindows;

impl GlobalWindows {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GlobalWindows {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowAssigner for GlobalWindows {
    fn assign(&self, _timestamp: EventTime) -> Vec<TimeWindow> {
        vec![TimeWindow::global()]
    }
}
