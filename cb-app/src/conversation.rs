//! Per-identity history of resolved exchanges.
//!
//! Each identity keeps at most `capacity` entries. Appending past that drops the
//! oldest one; reading never reorders anything.

use std::collections::{HashMap, VecDeque, vec_deque};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEntry {
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct ConversationCache {
    capacity: usize,
    histories: HashMap<String, VecDeque<ConversationEntry>>,
}

impl ConversationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            histories: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries for `identity`, oldest first.
    pub fn history(&self, identity: &str) -> vec_deque::Iter<'_, ConversationEntry> {
        self.histories
            .get(identity)
            .map(VecDeque::iter)
            .unwrap_or_default()
    }

    pub fn len(&self, identity: &str) -> usize {
        self.histories.get(identity).map_or(0, VecDeque::len)
    }

    pub fn record(&mut self, identity: &str, entry: ConversationEntry) {
        let capacity = self.capacity;
        if capacity == 0 {
            return;
        }
        let history = self
            .histories
            .entry(identity.to_string())
            .or_insert_with(|| VecDeque::with_capacity(capacity));
        if history.len() >= capacity {
            history.pop_front();
        }
        history.push_back(entry);
    }
}
