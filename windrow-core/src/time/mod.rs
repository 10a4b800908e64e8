use std::collections::BTreeMap;

use ahash::AHashMap;
use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::state::StateNamespace;
use crate::types::EventTime;

mod timer_store;

pub use timer_store::*;

/// Minimum possible event time. Used as the initial "no watermark" sentinel.
pub const EVENT_TIME_MIN: EventTime = EventTime::MIN;

/// Maximum possible event time. Advancing a clock here means "end of input".
pub const EVENT_TIME_MAX: EventTime = EventTime::MAX;

#[cfg(test)]
#[path = "tests/time_tests.rs"]
mod tests;
