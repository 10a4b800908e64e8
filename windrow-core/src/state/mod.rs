use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;

use ahash::AHashMap;
use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::StreamData;
use crate::window::TimeWindow;

mod backend;
mod store;

pub use backend::*;
pub use store::*;

/// The qualifier under which state cells and timers live.
///
/// Namespaces isolate per-window state from key-global state, and the trigger
/// machine's private bookkeeping from user state under the same window.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum StateNamespace {
    /// Key-global state not tied to any window.
    Global,
    /// State scoped to one window of the key.
    Window(TimeWindow),
    /// Private scope of one trigger-machine node under a window.
    WindowAndTrigger(TimeWindow, u32),
}

impl StateNamespace {
    pub fn window(window: TimeWindow) -> Self {
        Self::Window(window)
    }

    pub fn window_and_trigger(window: TimeWindow, node: u32) -> Self {
        Self::WindowAndTrigger(window, node)
    }

    /// The window this namespace is scoped to, if any.
    pub fn window_part(&self) -> Option<TimeWindow> {
        match self {
            StateNamespace::Global => None,
            StateNamespace::Window(w) => Some(*w),
            StateNamespace::WindowAndTrigger(w, _) => Some(*w),
        }
    }
}

impl std::fmt::Display for StateNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateNamespace::Global => write!(f, "global"),
            StateNamespace::Window(w) => write!(f, "window/{w}"),
            StateNamespace::WindowAndTrigger(w, node) => write!(f, "trigger/{w}/{node}"),
        }
    }
}

/// Incremental combining function backing a combining state cell.
///
/// The accumulator is updated on each input, so only `O(1)` state is kept
/// per (namespace, cell) instead of the full input list.
pub trait CombineFn<IN, ACC, OUT>: Send {
    /// Create a fresh accumulator.
    fn create_accumulator(&self) -> ACC;
    /// Fold one input into the accumulator.
    fn add(&self, acc: &mut ACC, input: &IN);
    /// Merge another accumulator into `acc` (used when windows merge).
    fn merge(&self, acc: &mut ACC, other: ACC);
    /// Convert the final accumulator into the output.
    fn get_result(&self, acc: ACC) -> OUT;
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
