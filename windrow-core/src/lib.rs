//! # Windrow Core
//!
//! A per-key, per-window stateful processing engine for batch execution of
//! windowed dataflows.
//!
//! For each grouping key the host hands the engine the complete, finite
//! sequence of timestamped windowed elements for that key. The engine offers
//! two processing flows on top of shared time and state infrastructure:
//!
//! - [`runner::ReduceFnRunner`] — *group-also-by-window*: assigns elements to
//!   windows, merges session-like windows, and emits grouped panes under
//!   trigger control.
//! - [`runner::StatefulRunner`] — *stateful element runner*: drives a user
//!   function per (key, window) with access to persistent state and timers,
//!   dropping late data and optionally delivering elements in event-time
//!   order.
//!
//! The shared infrastructure:
//!
//! - [`time`] — [`TimerStore`](time::TimerStore) coordinating pending timers
//!   across the event-time, processing-time, and synchronized-processing-time
//!   domains.
//! - [`state`] — [`StateStore`](state::StateStore): named, typed state cells
//!   scoped by [`StateNamespace`](state::StateNamespace).
//! - [`window`] — [`TimeWindow`](window::TimeWindow), the window assigners,
//!   [`WindowingStrategy`](window::WindowingStrategy), and the
//!   [`TriggerMachine`](window::TriggerMachine) compiled from a declarative
//!   [`Trigger`](window::Trigger) tree.
//! - [`runner::BatchDriver`] — end-of-input watermark advancement and the
//!   timer drain loop.
//!
//! Everything is single-threaded and synchronous: parallelism exists only
//! across keys, by running one engine instance per key.

pub mod error;
pub mod metrics;
pub mod options;
pub mod output;
pub mod runner;
pub mod state;
pub mod time;
pub mod types;
pub mod window;
