use std::{mem::take, time::Duration};

use crate::{BatchOptions, CallOptions, ResolvedOptions, Snapshot};


/// An update waiting for the next flush.
///
/// `value == None` removes the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub key: String,
    pub value: Option<String>,
}

/// Updates taken out of an [`UpdateQueue`] for a single flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub entries: Vec<PendingEntry>,
    pub options: ResolvedOptions,
}
impl Batch {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key.clone()).collect()
    }
    pub fn apply_to(&self, snapshot: &mut Snapshot) {
        for e in &self.entries {
            snapshot.apply(&e.key, e.value.as_deref());
        }
    }
}

/// Pending serialized values keyed by bound key, plus the options merged across them.
///
/// Keys are unique. A later update for a key overwrites the earlier one
/// but keeps its position, so a batch is applied in first-enqueue order.
#[derive(Debug)]
pub struct UpdateQueue {
    entries: Vec<PendingEntry>,
    options: BatchOptions,
}

impl UpdateQueue {
    pub fn new(min_throttle: Duration) -> Self {
        Self {
            entries: Vec::new(),
            options: BatchOptions::new(min_throttle),
        }
    }

    /// Serializes `value` and stores it under `key`.
    ///
    /// Returns what was stored, so that it can be published before the flush.
    pub fn enqueue<V: ?Sized>(
        &mut self,
        key: &str,
        value: Option<&V>,
        serialize: impl FnOnce(&V) -> String,
        options: CallOptions,
    ) -> Option<String> {
        self.enqueue_raw(key, value.map(serialize), options)
    }

    pub fn enqueue_raw(
        &mut self,
        key: &str,
        value: Option<String>,
        options: CallOptions,
    ) -> Option<String> {
        tracing::debug!(key, value = ?value, options = ?options, "enqueue");
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(e) => e.value.clone_from(&value),
            None => self.entries.push(PendingEntry {
                key: key.to_string(),
                value: value.clone(),
            }),
        }
        self.options |= options;
        value
    }

    /// Returns the pending value for `key`.
    ///
    /// `None` means no pending change, `Some(None)` a pending removal.
    pub fn peek(&self, key: &str) -> Option<Option<&str>> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_deref())
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Takes every pending entry and the merged options, then restores defaults.
    pub fn drain_and_reset(&mut self) -> Batch {
        let batch = Batch {
            entries: take(&mut self.entries),
            options: self.options.resolve(),
        };
        self.options.reset();
        batch
    }
}
