//! Bounded, timestamped status history
//!
//! Every entity in the hierarchy tracks its administrative and operational
//! status in a [`StatusSchedule`]: a newest-first sequence of
//! `(timestamp, status)` pairs capped at a configurable size. The owning
//! entity is the sole mutator and the lock boundary; the schedule itself is
//! a plain value.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MAX_HISTORY_SIZE;

/// One history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry<S> {
    pub timestamp: DateTime<Utc>,
    pub status: S,
}

/// Bulk-load semantics for [`StatusSchedule::insert_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeMethod {
    /// Discard the existing history, then load the given entries.
    Replace,
    /// Prepend the given entries, preserving their relative order.
    Merge,
}

/// Newest-first bounded status history.
///
/// Insertion policy is last-write-wins by *insertion order*: an entry whose
/// timestamp is older than or equal to the current head still becomes the
/// new head. Inserting the same status value as the head is a no-op. The
/// schedule is non-empty from construction onward and never errors.
#[derive(Debug, Clone)]
pub struct StatusSchedule<S> {
    entries: VecDeque<StatusEntry<S>>,
    max_size: usize,
}

impl<S: Copy + PartialEq> StatusSchedule<S> {
    /// Seed the schedule with an initial status, timestamped now.
    pub fn new(initial: S) -> Self {
        Self::with_capacity(initial, MAX_HISTORY_SIZE)
    }

    /// Seed with an explicit history cap (minimum 1).
    pub fn with_capacity(initial: S, max_size: usize) -> Self {
        let max_size = max_size.max(1);
        let mut entries = VecDeque::with_capacity(max_size);
        entries.push_front(StatusEntry {
            timestamp: Utc::now(),
            status: initial,
        });
        Self { entries, max_size }
    }

    /// Insert a new status, timestamped now.
    pub fn insert(&mut self, status: S) -> bool {
        self.insert_at(status, Utc::now())
    }

    /// Insert a new status with an explicit timestamp.
    ///
    /// Returns whether the head changed.
    pub fn insert_at(&mut self, status: S, timestamp: DateTime<Utc>) -> bool {
        if self.entries.front().map(|e| e.status) == Some(status) {
            return false;
        }
        self.entries.push_front(StatusEntry { timestamp, status });
        self.trim();
        true
    }

    /// Bulk-load entries, newest last in `entries` iteration order.
    pub fn insert_all<I>(&mut self, entries: I, method: ChangeMethod)
    where
        I: IntoIterator<Item = StatusEntry<S>>,
    {
        let incoming: Vec<StatusEntry<S>> = entries.into_iter().collect();
        // Non-empty invariant: an empty Replace keeps the current head.
        if matches!(method, ChangeMethod::Replace) && !incoming.is_empty() {
            self.entries.clear();
        }
        for entry in incoming {
            self.entries.push_front(entry);
        }
        self.trim();
    }

    /// The `n` most recent entries, newest first; all entries when `None`.
    pub fn take(&self, n: Option<usize>) -> Vec<StatusEntry<S>> {
        let limit = n.unwrap_or(self.entries.len());
        self.entries.iter().take(limit).copied().collect()
    }

    /// The current `(timestamp, status)` head.
    pub fn current(&self) -> StatusEntry<S> {
        // Non-empty by construction.
        *self.entries.front().expect("status schedule is never empty")
    }

    /// The current status value.
    pub fn current_status(&self) -> S {
        self.current().status
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn trim(&mut self) {
        while self.entries.len() > self.max_size {
            self.entries.pop_back();
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EvseStatus;
    use chrono::Duration;

    #[test]
    fn seeded_with_initial_status() {
        let schedule = StatusSchedule::new(EvseStatus::Unknown);
        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule.current_status(), EvseStatus::Unknown);
    }

    #[test]
    fn insert_moves_head() {
        let mut schedule = StatusSchedule::new(EvseStatus::Unknown);
        assert!(schedule.insert(EvseStatus::Available));
        assert_eq!(schedule.current_status(), EvseStatus::Available);
        assert_eq!(schedule.len(), 2);
    }

    #[test]
    fn same_status_is_noop() {
        let mut schedule = StatusSchedule::new(EvseStatus::Available);
        assert!(!schedule.insert(EvseStatus::Available));
        assert_eq!(schedule.len(), 1);
    }

    #[test]
    fn older_timestamp_still_wins() {
        // Last-write-wins by insertion order, not by timestamp.
        let mut schedule = StatusSchedule::new(EvseStatus::Available);
        let past = Utc::now() - Duration::hours(1);
        assert!(schedule.insert_at(EvseStatus::Charging, past));
        assert_eq!(schedule.current_status(), EvseStatus::Charging);
        assert_eq!(schedule.current().timestamp, past);
    }

    #[test]
    fn history_is_bounded() {
        // After m > n inserts, take(None) returns exactly n entries.
        let mut schedule = StatusSchedule::with_capacity(EvseStatus::Unknown, 5);
        for i in 0..20 {
            let status = if i % 2 == 0 {
                EvseStatus::Available
            } else {
                EvseStatus::Charging
            };
            schedule.insert(status);
        }
        let all = schedule.take(None);
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].status, EvseStatus::Charging);
    }

    #[test]
    fn take_n_returns_newest_first() {
        let mut schedule = StatusSchedule::with_capacity(EvseStatus::Unknown, 10);
        schedule.insert(EvseStatus::Available);
        schedule.insert(EvseStatus::Reserved);
        schedule.insert(EvseStatus::Charging);

        let two = schedule.take(Some(2));
        assert_eq!(two.len(), 2);
        assert_eq!(two[0].status, EvseStatus::Charging);
        assert_eq!(two[1].status, EvseStatus::Reserved);
    }

    #[test]
    fn replace_discards_history() {
        let mut schedule = StatusSchedule::with_capacity(EvseStatus::Unknown, 10);
        schedule.insert(EvseStatus::Available);
        schedule.insert(EvseStatus::Charging);

        let now = Utc::now();
        schedule.insert_all(
            vec![
                StatusEntry { timestamp: now, status: EvseStatus::OutOfService },
                StatusEntry { timestamp: now, status: EvseStatus::Available },
            ],
            ChangeMethod::Replace,
        );
        assert_eq!(schedule.len(), 2);
        assert_eq!(schedule.current_status(), EvseStatus::Available);
    }

    #[test]
    fn replace_with_no_entries_keeps_head() {
        let mut schedule = StatusSchedule::new(EvseStatus::Charging);
        schedule.insert_all(std::iter::empty(), ChangeMethod::Replace);
        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule.current_status(), EvseStatus::Charging);
    }

    #[test]
    fn merge_prepends_preserving_order() {
        let mut schedule = StatusSchedule::with_capacity(EvseStatus::Unknown, 10);
        let now = Utc::now();
        schedule.insert_all(
            vec![
                StatusEntry { timestamp: now, status: EvseStatus::Available },
                StatusEntry { timestamp: now, status: EvseStatus::Reserved },
            ],
            ChangeMethod::Merge,
        );
        // Last loaded entry is the new head; seed entry survives at the back.
        assert_eq!(schedule.current_status(), EvseStatus::Reserved);
        assert_eq!(schedule.len(), 3);
        assert_eq!(schedule.take(None)[2].status, EvseStatus::Unknown);
    }
}
