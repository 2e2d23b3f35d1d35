//! Per-document copy-on-write change tracking (spec §4.5).
//!
//! The tracker never holds a second copy of the document's current data —
//! that would defeat the point. It only remembers, per field, the value a
//! field held the moment it was first reassigned. `get_changes`/`rollback`
//! take the document's current data as a parameter and read `data` through
//! it; the tracker itself stays small regardless of document size.

use std::collections::HashSet;

use bson::{Bson, Document as BsonDocument};

/// Tracks which fields of a document have been reassigned since the last
/// save, and what value they held before the first reassignment.
#[derive(Debug, Clone, Default)]
pub struct StateTracker {
    original: BsonDocument,
    changed_fields: HashSet<String>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self { original: BsonDocument::new(), changed_fields: HashSet::new() }
    }

    /// Records that `name` is about to change, snapshotting `old_value` the
    /// first time this happens. A second reassignment of the same field
    /// before a save is a no-op: the first-write snapshot is the only one
    /// that matters for building a diff against the saved state.
    pub fn track_change(&mut self, name: &str, old_value: Bson) {
        if self.changed_fields.insert(name.to_string()) {
            self.original.insert(name, old_value);
        }
    }

    /// True iff any field has been reassigned since construction or the
    /// last `reset()`.
    pub fn is_modified(&self) -> bool {
        !self.changed_fields.is_empty()
    }

    /// Builds the `$set` payload: each changed field mapped to its current
    /// value in `data`. Fields reassigned then removed from `data` entirely
    /// are omitted — there is no current value to set.
    pub fn get_changes(&self, data: &BsonDocument) -> BsonDocument {
        let mut changes = BsonDocument::new();
        for name in &self.changed_fields {
            if let Some(value) = data.get(name) {
                changes.insert(name.clone(), value.clone());
            }
        }
        changes
    }

    /// Restores every changed field in `data` to its pre-change value, then
    /// clears the tracker as if no change had ever been tracked.
    pub fn rollback(&mut self, data: &mut BsonDocument) {
        for name in &self.changed_fields {
            match self.original.get(name) {
                Some(value) => {
                    data.insert(name.clone(), value.clone());
                }
                None => {
                    data.remove(name);
                }
            }
        }
        self.reset();
    }

    /// Clears `original` and `changed_fields`. Called by the operation
    /// layer immediately after a successful save — from this point,
    /// `get_changes` reports nothing until the next reassignment, even if
    /// `data` is later mutated in place without going through `track_change`.
    pub fn reset(&mut self) {
        self.original.clear();
        self.changed_fields.clear();
    }
}
