//! Ordered in-memory copy of the to-do list.
//!
//! Items keep the slot in which they were first observed. Updates replace a
//! record in place; an update for an identity that has not been seen yet is
//! appended, so out-of-order or duplicated feed deliveries never produce two
//! records with the same identity.

use std::collections::HashMap;

use shared::domain::{TodoId, TodoItem};

/// What a write did to the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Appended,
    Replaced,
    Unchanged,
}

impl ApplyOutcome {
    pub fn changed(self) -> bool {
        self != Self::Unchanged
    }
}

#[derive(Debug, Clone, Default)]
pub struct TodoList {
    items: Vec<TodoItem>,
    index: HashMap<TodoId, usize>,
}

impl TodoList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole collection, keeping the given order.
    ///
    /// A repeated identity in `items` takes over the slot of its first
    /// occurrence.
    pub fn load(&mut self, items: impl IntoIterator<Item = TodoItem>) {
        self.items.clear();
        self.index.clear();
        for item in items {
            self.upsert(item);
        }
    }

    /// Adds a newly created item at the end. An identity that is already
    /// present is left untouched.
    pub fn append(&mut self, item: TodoItem) -> ApplyOutcome {
        if self.index.contains_key(&item.id) {
            return ApplyOutcome::Unchanged;
        }
        self.push(item);
        ApplyOutcome::Appended
    }

    /// Replaces the record with the same identity in place, or appends it when
    /// the identity is unknown.
    pub fn upsert(&mut self, item: TodoItem) -> ApplyOutcome {
        match self.index.get(&item.id) {
            Some(&slot) if self.items[slot] == item => ApplyOutcome::Unchanged,
            Some(&slot) => {
                self.items[slot] = item;
                ApplyOutcome::Replaced
            }
            None => {
                self.push(item);
                ApplyOutcome::Appended
            }
        }
    }

    pub fn snapshot(&self) -> &[TodoItem] {
        &self.items
    }

    pub fn get(&self, slot: usize) -> Option<&TodoItem> {
        self.items.get(slot)
    }

    pub fn position(&self, id: TodoId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn find(&self, id: TodoId) -> Option<&TodoItem> {
        self.position(id).map(|slot| &self.items[slot])
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn push(&mut self, item: TodoItem) {
        self.index.insert(item.id, self.items.len());
        self.items.push(item);
    }
}

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod tests;
