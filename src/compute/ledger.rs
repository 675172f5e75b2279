//! Execution state: the per-call store routing values between nodes.

use crate::error::CallError;
use crate::value::{Kwargs, Value};
use std::collections::HashMap;

/// A name -> value store scoped to one model invocation.
pub trait ExecutionState {
    fn write(&mut self, key: &str, value: Value) -> Result<(), CallError>;

    /// Reads a value; implementations may evict it as a side effect.
    fn read(&mut self, key: &str) -> Result<Value, CallError>;

    /// Number of values currently held.
    fn live_count(&self) -> usize;

    /// Records a node failure before the state is closed.
    fn note_failure(&mut self, _message: &str) -> Result<(), CallError> { Ok(()) }

    /// Releases held resources. Called on both success and failure paths.
    fn close(&mut self) -> Result<(), CallError> { Ok(()) }
}

/// Keeps every value until the end of the run.
#[derive(Debug, Clone, Default)]
pub struct PlainLedger {
    values: Kwargs,
}

impl PlainLedger {
    pub fn new() -> Self { Self::default() }
}

impl ExecutionState for PlainLedger {
    fn write(&mut self, key: &str, value: Value) -> Result<(), CallError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn read(&mut self, key: &str) -> Result<Value, CallError> {
        self.values.get(key).cloned().ok_or_else(|| CallError::MissingValue(key.to_string()))
    }

    fn live_count(&self) -> usize { self.values.len() }
}

#[derive(Debug, Clone, Default)]
struct Slot {
    remaining: usize,
    value: Option<Value>,
}

/// Reference-counted store: a value is evicted by the read that uses it
/// for the last time.
///
/// Counts come from `topology::param_counter`: one per node parameter that
/// reads the name, plus one if the name is returned. Names nobody reads are
/// never stored.
#[derive(Debug, Clone, Default)]
pub struct CountedLedger {
    slots: HashMap<String, Slot>,
}

impl CountedLedger {
    pub fn new(counter: &HashMap<String, usize>) -> Self {
        let slots = counter
            .iter()
            .map(|(name, &remaining)| (name.clone(), Slot { remaining, value: None }))
            .collect();
        Self { slots }
    }

    /// Reads left before `key` is evicted.
    pub fn remaining(&self, key: &str) -> usize {
        self.slots.get(key).map_or(0, |slot| slot.remaining)
    }
}

impl ExecutionState for CountedLedger {
    fn write(&mut self, key: &str, value: Value) -> Result<(), CallError> {
        match self.slots.get_mut(key) {
            Some(slot) if slot.remaining > 0 => slot.value = Some(value),
            _ => log::trace!("dropping unread value '{}'", key),
        }
        Ok(())
    }

    fn read(&mut self, key: &str) -> Result<Value, CallError> {
        let slot = self.slots.get_mut(key).ok_or_else(|| CallError::MissingValue(key.to_string()))?;
        if slot.value.is_none() {
            return Err(CallError::MissingValue(key.to_string()));
        }
        slot.remaining = slot.remaining.saturating_sub(1);
        let value = if slot.remaining == 0 { slot.value.take() } else { slot.value.clone() };
        value.ok_or_else(|| CallError::MissingValue(key.to_string()))
    }

    fn live_count(&self) -> usize {
        self.slots.values().filter(|slot| slot.value.is_some()).count()
    }
}
