//! Push sinks the runners emit into.
//!
//! Receivers are called synchronously from within `process_element`,
//! `on_timer`, and pane emission; a receiver error fails the calling method.

use anyhow::Result;

use crate::types::{TupleTag, WindowedValue};

/// Single-output sink.
pub trait Receiver<T>: Send {
    fn push(&mut self, value: WindowedValue<T>) -> Result<()>;
}

/// Multi-output sink addressed by [`TupleTag`].
pub trait MultiReceiver<T>: Send {
    fn push(&mut self, tag: &TupleTag, value: WindowedValue<T>) -> Result<()>;
}

/// Collects outputs into a vector, in emission order.
#[derive(Debug)]
pub struct VecReceiver<T> {
    outputs: Vec<WindowedValue<T>>,
}

impl<T> VecReceiver<T> {
    pub fn new() -> Self {
        Self {
            outputs: Vec::new(),
        }
    }

    pub fn outputs(&self) -> &[WindowedValue<T>] {
        &self.outputs
    }

    pub fn into_outputs(self) -> Vec<WindowedValue<T>> {
        self.outputs
    }
}

impl<T> Default for VecReceiver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Receiver<T> for VecReceiver<T> {
    fn push(&mut self, value: WindowedValue<T>) -> Result<()> {
        self.outputs.push(value);
        Ok(())
    }
}

/// Collects tagged outputs into a vector, in emission order.
#[derive(Debug)]
pub struct TaggedVecReceiver<T> {
    outputs: Vec<(TupleTag, WindowedValue<T>)>,
}

impl<T> TaggedVecReceiver<T> {
    pub fn new() -> Self {
        Self {
            outputs: Vec::new(),
        }
    }

    pub fn outputs(&self) -> &[(TupleTag, WindowedValue<T>)] {
        &self.outputs
    }

    pub fn into_outputs(self) -> Vec<(TupleTag, WindowedValue<T>)> {
        self.outputs
    }
}

impl<T> Default for TaggedVecReceiver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> MultiReceiver<T> for TaggedVecReceiver<T> {
    fn push(&mut self, tag: &TupleTag, value: WindowedValue<T>) -> Result<()> {
        self.outputs.push((tag.clone(), value));
        Ok(())
    }
}

/// Discards everything pushed into it.
#[derive(Debug, Default)]
pub struct DiscardingReceiver;

impl<T: Send> Receiver<T> for DiscardingReceiver {
    fn push(&mut self, _value: WindowedValue<T>) -> Result<()> {
        Ok(())
    }
}

impl<T: Send> MultiReceiver<T> for DiscardingReceiver {
    fn push(&mut self, _tag: &TupleTag, _value: WindowedValue<T>) -> Result<()> {
        Ok(())
    }
}
