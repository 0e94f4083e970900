//! Per-run slot store.

use crate::stages::StageResult;
use std::collections::HashMap;

/// Maps slot names to the stage results written into them.
///
/// A store is created empty at the start of a run, filled as stages execute
/// and dropped when the run ends. It is never shared between runs.
#[derive(Debug, Default)]
pub struct DataSlotStore {
    slots: HashMap<String, StageResult>,
}

impl DataSlotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the result stored in a slot.
    #[must_use]
    pub fn get(&self, slot: &str) -> Option<&StageResult> {
        self.slots.get(slot)
    }

    /// Checks if a slot is populated.
    #[must_use]
    pub fn contains(&self, slot: &str) -> bool {
        self.slots.contains_key(slot)
    }

    /// Writes a slot, replacing any previous result.
    ///
    /// Writes to an unnamed (empty) slot are dropped.
    pub fn put(&mut self, slot: &str, result: StageResult) {
        if slot.is_empty() {
            return;
        }
        self.slots.insert(slot.to_string(), result);
    }

    /// Removes and returns the result stored in a slot.
    pub fn take(&mut self, slot: &str) -> Option<StageResult> {
        self.slots.remove(slot)
    }

    /// Returns the number of populated slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no slot is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns all populated slot names, sorted.
    #[must_use]
    pub fn slot_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.keys().cloned().collect();
        names.sort();
        names
    }

    /// Empties the store.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
