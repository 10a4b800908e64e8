use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::metrics::{Counter, MetricsRegistry, DROPPED_DUE_TO_LATENESS, PROCESSED_ELEMENTS};
use crate::options::PipelineOptions;
use crate::output::{MultiReceiver, Receiver};
use crate::state::{BagHandle, StateNamespace, StateStore, ValueHandle};
use crate::time::{TimeDomain, TimerData, TimerId, TimerStore, EVENT_TIME_MAX};
use crate::types::{EventTime, PaneInfo, PaneTiming, StreamData, TupleTag, WindowedValue};
use crate::window::{
    AccumulationMode, ClosingBehavior, OnTimeBehavior, TimeWindow, TimestampCombiner,
    TriggerMachine, WindowingStrategy, TRIGGER_TIMER_FAMILY,
};

mod context;
mod driver;
mod reduce;
mod stateful;

pub use context::*;
pub use driver::*;
pub use reduce::*;
pub use stateful::*;

/// Delay past a window's lateness horizon before its state is collected, so
/// a user timer set exactly at the horizon still fires against live state.
pub const GC_DELAY_MS: EventTime = 1;

/// Timer id of the per-window state cleanup timer.
pub(crate) const GC_TIMER_ID: &str = "__gc";
/// Timer id of the ordered-mode buffer flush timer.
pub(crate) const SORT_FLUSH_TIMER_ID: &str = "__sort-flush";
/// Family stamped on engine-internal timers, as opposed to user timers.
pub(crate) const SYSTEM_TIMER_FAMILY: &str = "__system";

pub(crate) fn gc_timer_id(window: &TimeWindow) -> TimerId {
    TimerId::new(
        StateNamespace::window(*window),
        GC_TIMER_ID,
        SYSTEM_TIMER_FAMILY,
        TimeDomain::EventTime,
    )
}

pub(crate) fn sort_flush_timer_id(window: &TimeWindow) -> TimerId {
    TimerId::new(
        StateNamespace::window(*window),
        SORT_FLUSH_TIMER_ID,
        SYSTEM_TIMER_FAMILY,
        TimeDomain::EventTime,
    )
}

/// Serialized state cells and pending timers of one key.
///
/// Persisting with no intervening mutation is idempotent: the bytes are
/// identical, and a runner restored from them reproduces the same cells and
/// pending timers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub state: Vec<u8>,
    pub timers: Vec<u8>,
}

#[cfg(test)]
#[path = "tests/runner_tests.rs"]
mod tests;
