use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::state::{StateNamespace, StateStore, ValueHandle};
use crate::time::{TimeDomain, TimerData, TimerId, TimerStore, EVENT_TIME_MAX, EVENT_TIME_MIN};
use crate::types::EventTime;

mod assigners;
mod machine;
mod primitives;
mod strategy;
mod triggers;

pub use assigners::*;
pub use machine::*;
pub use primitives::*;
pub use strategy::*;
pub use triggers::*;

#[cfg(test)]
#[path = "tests/window_tests.rs"]
mod tests;
