use super::*;

/// A half-open event-time window `[start, end)`.
///
/// The window's serialized form is its stable identity: it qualifies state
/// namespaces and timer ids.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TimeWindow {
    pub start: EventTime,
    pub end: EventTime,
}

impl TimeWindow {
    pub fn new(start: EventTime, end: EventTime) -> Self {
        Self { start, end }
    }

    /// The single window spanning all of event time.
    pub fn global() -> Self {
        Self {
            start: EVENT_TIME_MIN,
            end: EVENT_TIME_MAX,
        }
    }

    /// The maximum timestamp that belongs to this window.
    /// A window fires when the watermark reaches `max_timestamp()`.
    pub fn max_timestamp(&self) -> EventTime {
        self.end - 1
    }

    /// Return true if `timestamp` falls inside this window.
    pub fn contains(&self, timestamp: EventTime) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Return true if the two windows share at least one instant or abut.
    pub fn intersects(&self, other: &TimeWindow) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// The smallest window covering both `self` and `other`.
    pub fn span(&self, other: &TimeWindow) -> TimeWindow {
        TimeWindow {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn is_global(&self) -> bool {
        *self == Self::global()
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TimeWindow([{}, {}))", self.start, self.end)
    }
}
