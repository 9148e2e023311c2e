//! Append-only, size-bounded history ledger
//!
//! Entries are kept in arrival order. When the ledger is full the oldest
//! entry is evicted before the new one is appended, so the ledger never
//! exceeds its capacity no matter how many entries are pushed.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::VecDeque;

/// Bounded FIFO of history records
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryLedger<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> HistoryLedger<T> {
    /// Create an empty ledger
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Ledger capacity must be > 0");
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Seed a ledger from previously persisted entries
    ///
    /// If `entries` is longer than `capacity`, only the newest are kept.
    pub fn from_entries(capacity: usize, entries: Vec<T>) -> Self {
        let mut ledger = Self::new(capacity);
        for entry in entries {
            ledger.append(entry);
        }
        ledger
    }

    /// Append an entry, evicting the oldest when full
    ///
    /// Returns the evicted entry, if any.
    pub fn append(&mut self, entry: T) -> Option<T> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest-first iterator
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.iter()
    }

    /// Most recent entry
    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Up to `n` most recent entries, oldest first
    pub fn recent(&self, n: usize) -> Vec<&T> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).collect()
    }
}

impl<T: Clone> HistoryLedger<T> {
    /// Snapshot of all entries, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

impl<T: Serialize> HistoryLedger<T> {
    /// Serialize the whole ledger as a JSON array (oldest first)
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        let entries: Vec<&T> = self.entries.iter().collect();
        serde_json::to_vec_pretty(&entries)
    }
}

impl<T: DeserializeOwned> HistoryLedger<T> {
    /// Rebuild a ledger from a JSON array
    pub fn from_json(capacity: usize, bytes: &[u8]) -> serde_json::Result<Self> {
        let entries: Vec<T> = serde_json::from_slice(bytes)?;
        Ok(Self::from_entries(capacity, entries))
    }
}
