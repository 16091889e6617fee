//! Transcript merge engine
//!
//! A keyed set of messages with a derived view ordered by timestamp. Merging
//! is a union where the first-seen copy of an id always wins, so re-ingesting
//! events (overlapping history pages, repeated sync deliveries) is harmless.

use crate::message::{Message, MessageId};
use std::collections::HashSet;

/// Deduplicated, time-ordered set of messages for one conversation or room
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    /// Messages in first-insertion order
    entries: Vec<Message>,
    /// Ids already present in `entries`
    seen: HashSet<MessageId>,
    /// Indices into `entries`, sorted by timestamp (stable)
    order: Vec<usize>,
}

impl Transcript {
    /// Create an empty transcript
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch of messages
    ///
    /// Messages whose id is already present are discarded, not overwritten.
    /// The ordered view is recomputed afterwards. Returns how many messages
    /// were inserted.
    pub fn merge<I>(&mut self, batch: I) -> usize
    where
        I: IntoIterator<Item = Message>,
    {
        let mut inserted = 0;
        for message in batch {
            if self.seen.insert(message.id.clone()) {
                self.entries.push(message);
                inserted += 1;
            }
        }

        if inserted > 0 {
            self.reorder();
        }
        inserted
    }

    /// Whether a message with this id is present
    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Number of messages in the underlying set, including hidden ones
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the transcript holds no messages
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Messages sorted ascending by timestamp; ties keep insertion order
    pub fn ordered(&self) -> impl Iterator<Item = &Message> + '_ {
        self.order.iter().map(move |&idx| &self.entries[idx])
    }

    /// Ordered messages with at least one populated content branch
    pub fn visible(&self) -> impl Iterator<Item = &Message> + '_ {
        self.ordered().filter(|m| m.is_displayable())
    }

    /// Owned copy of the ordered view
    pub fn snapshot(&self) -> Vec<Message> {
        self.ordered().cloned().collect()
    }

    fn reorder(&mut self) {
        let entries = &self.entries;
        let mut order: Vec<usize> = (0..entries.len()).collect();
        // sort_by_key is stable, so equal timestamps stay in insertion order
        order.sort_by_key(|&idx| entries[idx].timestamp);
        self.order = order;
    }
}
